// src/lib.rs

//! Story Crawler Library
//!
//! Walks the paginated story listing of one collection, expands first-page
//! folders, and exports every story that is not already in the output
//! directory.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
