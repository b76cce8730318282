//! Pipeline entry points for crawler operations.
//!
//! - `PaginationController`: walk listing pages into a crawl result
//! - `run_crawler`: crawl one collection and download what is missing

pub mod crawl;
pub mod paginate;

pub use crawl::{CrawlJob, run_crawl, run_crawler};
pub use paginate::{PaginationController, PaginationOutcome};
