//! In-memory fakes for the crawl's external collaborators.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Config, GroupRef, ItemRef, ListingPage};
use crate::services::browser::BrowserDriver;
use crate::services::download::DownloadStrategy;
use crate::services::listing::Fetcher;
use crate::storage::OutputDirectory;
use crate::utils::filename::canonical_file_name;

/// A listing page of direct items that claims more pages follow.
pub(crate) fn listing(items: &[(&str, &str)]) -> ListingPage {
    ListingPage {
        items: items
            .iter()
            .map(|(id, label)| ItemRef::direct(*id, *label))
            .collect(),
        groups: Vec::new(),
        has_more: true,
    }
}

#[derive(Clone)]
enum Reply {
    Page(ListingPage),
    Fail,
    AuthWall,
}

impl Reply {
    fn resolve(&self, context: &str) -> Result<ListingPage> {
        match self {
            Self::Page(page) => Ok(page.clone()),
            Self::Fail => Err(AppError::fetch(context, "scripted failure")),
            Self::AuthWall => Err(AppError::auth_required("https://example.test/user/login")),
        }
    }
}

/// Fetcher that replays scripted pages in order.
///
/// Pages past the script are empty. Unscripted groups fail.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    pages: Vec<Reply>,
    groups: HashMap<String, Reply>,
    endless: bool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every page holds one new item and claims more follow.
    pub(crate) fn endless() -> Self {
        Self {
            endless: true,
            ..Self::default()
        }
    }

    pub(crate) fn page(mut self, page: ListingPage) -> Self {
        self.pages.push(Reply::Page(page));
        self
    }

    pub(crate) fn failure(mut self) -> Self {
        self.pages.push(Reply::Fail);
        self
    }

    pub(crate) fn auth_wall(mut self) -> Self {
        self.pages.push(Reply::AuthWall);
        self
    }

    pub(crate) fn group(mut self, identity: &str, page: ListingPage) -> Self {
        self.groups.insert(identity.to_string(), Reply::Page(page));
        self
    }

    pub(crate) fn auth_wall_group(mut self, identity: &str) -> Self {
        self.groups.insert(identity.to_string(), Reply::AuthWall);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, page: u32) -> Result<ListingPage> {
        let context = format!("page {page}");
        self.calls.lock().unwrap().push(context.clone());

        if self.endless {
            let id = page.to_string();
            let title = format!("Story {page}");
            return Ok(listing(&[(id.as_str(), title.as_str())]));
        }
        match self.pages.get(page as usize - 1) {
            Some(reply) => reply.resolve(&context),
            None => Ok(ListingPage::default()),
        }
    }

    async fn fetch_group(&self, group: &GroupRef) -> Result<ListingPage> {
        let context = format!("group {}", group.identity);
        self.calls.lock().unwrap().push(context.clone());

        match self.groups.get(&group.identity) {
            Some(reply) => reply.resolve(&context),
            None => Err(AppError::fetch(context, "no such group")),
        }
    }
}

/// Strategy that writes a small file per item and records each call.
#[derive(Default)]
pub(crate) struct RecordingStrategy {
    failing: HashSet<String>,
    auth_wall: HashSet<String>,
    raw_names: bool,
    calls: Mutex<Vec<String>>,
    shut_down: Mutex<bool>,
}

impl RecordingStrategy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, identity: &str) -> Self {
        self.failing.insert(identity.to_string());
        self
    }

    pub(crate) fn auth_wall_at(mut self, identity: &str) -> Self {
        self.auth_wall.insert(identity.to_string());
        self
    }

    /// Save as `export-{id}.{ext}` instead of the canonical name.
    pub(crate) fn with_raw_names(mut self) -> Self {
        self.raw_names = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shut_down.lock().unwrap()
    }
}

#[async_trait]
impl DownloadStrategy for RecordingStrategy {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn download(&self, item: &ItemRef, output: &OutputDirectory) -> Result<PathBuf> {
        self.calls.lock().unwrap().push(item.identity.clone());

        if self.auth_wall.contains(&item.identity) {
            return Err(AppError::auth_required("https://example.test/user/login"));
        }
        if self.failing.contains(&item.identity) {
            return Err(AppError::download(&item.identity, "scripted failure"));
        }

        let name = if self.raw_names {
            format!("export-{}.{}", item.identity, output.extension())
        } else {
            canonical_file_name(&item.identity, &item.label, output.extension(), 200)
        };
        output
            .write_bytes(&name, format!("export of {}", item.identity).as_bytes())
            .await
    }

    async fn shutdown(&self) -> Result<()> {
        *self.shut_down.lock().unwrap() = true;
        Ok(())
    }
}

/// Bytes a scripted export writes at a time.
pub(crate) const EXPORT_CHUNK: &[u8] = b"epub bytes";

/// How the fake browser reacts to a download trigger.
#[derive(Debug, Clone)]
pub(crate) enum DownloadScript {
    /// The file appears complete right away
    Immediate(String),
    /// A `.crdownload` appears first and is renamed after a delay
    Staged { name: String, after: Duration },
    /// The file keeps growing by one chunk every `every` until it holds
    /// `chunks` chunks
    Growing {
        name: String,
        chunks: usize,
        every: Duration,
    },
    /// The browser lands on the login page
    LoginRedirect,
}

struct ScriptedPage {
    final_url: String,
    html: String,
}

/// Browser driver backed by scripted pages and download behaviors.
pub(crate) struct ScriptedDriver {
    pages: HashMap<String, ScriptedPage>,
    downloads: HashMap<String, DownloadScript>,
    download_dir: Option<PathBuf>,
    current: Mutex<(String, String)>,
    triggered: Mutex<Vec<String>>,
    shut_down: Mutex<bool>,
}

impl ScriptedDriver {
    pub(crate) fn new() -> Self {
        Self {
            pages: HashMap::new(),
            downloads: HashMap::new(),
            download_dir: None,
            current: Mutex::new(("about:blank".to_string(), String::new())),
            triggered: Mutex::new(Vec::new()),
            shut_down: Mutex::new(false),
        }
    }

    pub(crate) fn with_page(mut self, url: &str, final_url: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            ScriptedPage {
                final_url: final_url.to_string(),
                html: html.to_string(),
            },
        );
        self
    }

    pub(crate) fn with_download_dir(mut self, dir: &Path) -> Self {
        self.download_dir = Some(dir.to_path_buf());
        self
    }

    /// Script the export of `identity` under the default export URL.
    pub(crate) fn with_download(mut self, identity: &str, script: DownloadScript) -> Self {
        let url = Config::default().site.export_url_for(identity);
        self.downloads.insert(url, script);
        self
    }

    pub(crate) fn triggered(&self) -> Vec<String> {
        self.triggered.lock().unwrap().clone()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shut_down.lock().unwrap()
    }

    fn set_current(&self, url: &str, html: &str) {
        *self.current.lock().unwrap() = (url.to_string(), html.to_string());
    }

    fn download_path(&self, name: &str) -> Result<PathBuf> {
        self.download_dir
            .as_ref()
            .map(|dir| dir.join(name))
            .ok_or_else(|| AppError::browser("no download directory"))
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let page = self
            .pages
            .get(url)
            .ok_or_else(|| AppError::browser(format!("net::ERR_NAME_NOT_RESOLVED at {url}")))?;
        self.set_current(&page.final_url, &page.html);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().0.clone())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().1.clone())
    }

    async fn trigger_download(&self, url: &str) -> Result<()> {
        self.triggered.lock().unwrap().push(url.to_string());

        match self.downloads.get(url).cloned() {
            None => {}
            Some(DownloadScript::Immediate(name)) => {
                tokio::fs::write(self.download_path(&name)?, EXPORT_CHUNK).await?;
            }
            Some(DownloadScript::Staged { name, after }) => {
                let done = self.download_path(&name)?;
                let partial = self.download_path(&format!("{name}.crdownload"))?;
                tokio::fs::write(&partial, EXPORT_CHUNK).await?;
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tokio::fs::rename(&partial, &done).await;
                });
            }
            Some(DownloadScript::Growing {
                name,
                chunks,
                every,
            }) => {
                let path = self.download_path(&name)?;
                tokio::fs::write(&path, EXPORT_CHUNK).await?;
                tokio::spawn(async move {
                    for _ in 1..chunks {
                        tokio::time::sleep(every).await;
                        let appended = async {
                            let mut file = tokio::fs::OpenOptions::new()
                                .append(true)
                                .open(&path)
                                .await?;
                            file.write_all(EXPORT_CHUNK).await?;
                            file.flush().await
                        };
                        if appended.await.is_err() {
                            break;
                        }
                    }
                });
            }
            Some(DownloadScript::LoginRedirect) => {
                self.set_current("https://www.sofurry.com/user/login", "<form></form>");
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        *self.shut_down.lock().unwrap() = true;
        Ok(())
    }
}
