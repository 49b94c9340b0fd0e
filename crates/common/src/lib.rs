//! Shared error plumbing used across all dormbot crates.

pub mod error;

pub use error::FromMessage;
