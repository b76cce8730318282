//! Local output directory.
//!
//! The output directory is the only state that outlives a run. Completed
//! exports are named `{identity}_{label}.{ext}`; anything still being
//! written carries a partial-download extension and is never treated as
//! completed output.
//!
//! ```text
//! {root}/
//! ├── 42_My Story.epub       # completed
//! ├── 43_Another.epub.part   # being written by the direct strategy
//! └── 44_Third.crdownload    # being written by a browser
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Extensions browsers and this crate use for files still being written.
const PARTIAL_EXTENSIONS: &[&str] = &["part", "crdownload", "tmp", "download", "partial"];

/// Whether a path looks like an unfinished download.
pub fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PARTIAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Filesystem access to the output directory.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    root_dir: PathBuf,
    extension: String,
}

impl OutputDirectory {
    /// Create a handle for `root_dir` whose completed files end in `extension`.
    pub fn new(root_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Absolute form of the root for reporting.
    pub fn absolute_root(&self) -> PathBuf {
        std::path::absolute(&self.root_dir).unwrap_or_else(|_| self.root_dir.clone())
    }

    /// Get the full path for a file name.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root_dir.join(name)
    }

    /// Create the directory if missing.
    pub async fn ensure_exists(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        Ok(())
    }

    /// Whether a path has the expected output extension.
    pub fn has_output_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    /// Non-empty regular files with the output extension.
    pub async fn completed_files(&self) -> Result<Vec<PathBuf>> {
        let files = self.snapshot().await?;
        let mut completed: Vec<PathBuf> = files
            .into_iter()
            .filter(|(path, size)| {
                *size > 0 && !is_partial(path) && self.has_output_extension(path)
            })
            .map(|(path, _)| path)
            .collect();
        completed.sort();
        Ok(completed)
    }

    /// Every regular file with its current size.
    pub async fn snapshot(&self) -> Result<HashMap<PathBuf, u64>> {
        let mut files = HashMap::new();
        let mut entries = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(AppError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Vanished between listing and stat
                Err(_) => continue,
            };
            if metadata.is_file() {
                files.insert(entry.path(), metadata.len());
            }
        }
        Ok(files)
    }

    /// Write a byte stream to `name` atomically (write to `.part`, then rename).
    pub async fn write_stream<S, B, E>(&self, name: &str, mut stream: S) -> Result<PathBuf>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        self.ensure_exists().await?;
        let path = self.path(name);
        let tmp = self.path(&format!("{name}.part"));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            let mut total = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    AppError::Io(std::io::Error::other(format!("stream interrupted: {e}")))
                })?;
                file.write_all(chunk.as_ref()).await?;
                total += chunk.as_ref().len() as u64;
            }
            file.flush().await?;
            Ok::<u64, AppError>(total)
        }
        .await;

        match written {
            Ok(_) => {
                tokio::fs::rename(&tmp, &path).await?;
                Ok(path)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }

    /// Write bytes atomically.
    pub async fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let chunks = futures::stream::iter([Ok::<_, std::io::Error>(bytes)]);
        self.write_stream(name, chunks).await
    }

    /// Rename `from` to `name` inside the directory, refusing to overwrite.
    pub async fn rename_to(&self, from: &Path, name: &str) -> Result<PathBuf> {
        let target = self.path(name);
        if target == from {
            return Ok(target);
        }
        if tokio::fs::try_exists(&target).await? {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            )));
        }
        tokio::fs::rename(from, &target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_list_completed() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");

        output.write_bytes("1_One.epub", b"data").await.unwrap();
        tokio::fs::write(tmp.path().join("2_Two.epub.part"), b"half")
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join("3_Three.epub"), b"")
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join("notes.txt"), b"x")
            .await
            .unwrap();

        let completed = output.completed_files().await.unwrap();
        assert_eq!(completed, vec![tmp.path().join("1_One.epub")]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path().join("nope"), "epub");
        assert!(output.completed_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");

        let chunks = futures::stream::iter(vec![
            Ok(b"partial".to_vec()),
            Err("connection reset"),
        ]);
        assert!(output.write_stream("9_Nine.epub", chunks).await.is_err());

        let snapshot = output.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_rename_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let output = OutputDirectory::new(tmp.path(), "epub");

        let a = output.write_bytes("a.epub", b"a").await.unwrap();
        output.write_bytes("b.epub", b"b").await.unwrap();

        assert!(output.rename_to(&a, "b.epub").await.is_err());
        let renamed = output.rename_to(&a, "c.epub").await.unwrap();
        assert_eq!(renamed, tmp.path().join("c.epub"));
    }

    #[test]
    fn test_is_partial() {
        assert!(is_partial(Path::new("x.epub.part")));
        assert!(is_partial(Path::new("x.CRDOWNLOAD")));
        assert!(!is_partial(Path::new("x.epub")));
    }
}
