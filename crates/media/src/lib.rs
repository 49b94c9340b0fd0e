//! Upload handling: fetch message content, normalize, store, mint URLs.

pub mod error;
pub mod image_ops;
pub mod ingest;

pub use {
    error::{Error, Result},
    ingest::{ContentSource, MediaIngest, SavedMedia},
};
