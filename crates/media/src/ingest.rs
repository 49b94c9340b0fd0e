//! Fetch-and-store pipeline for uploaded images.

use std::path::{Path, PathBuf};

use {async_trait::async_trait, tracing::debug, uuid::Uuid};

use crate::{
    Result,
    error::Context as _,
    image_ops::{self, DEFAULT_MAX_WIDTH},
};

/// Source of raw message content bytes. The gateway backs this with the
/// platform content API; tests back it with a byte map.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, message_id: &str) -> Result<Vec<u8>>;
}

/// A stored upload: where it landed on disk and the URL handed to flows.
#[derive(Debug, Clone)]
pub struct SavedMedia {
    pub url: String,
    pub path: PathBuf,
}

/// Writes normalized uploads under a media directory and mints public URLs
/// for them.
#[derive(Clone)]
pub struct MediaIngest {
    dir: PathBuf,
    public_base: String,
    max_width: u32,
}

impl MediaIngest {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        let mut public_base = public_base.into();
        while public_base.ends_with('/') {
            public_base.pop();
        }
        Self {
            dir: dir.into(),
            public_base,
            max_width: DEFAULT_MAX_WIDTH,
        }
    }

    #[must_use]
    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch the message content, downscale oversized images, and persist
    /// under a random name. Fetch and write errors propagate; normalization
    /// errors do not.
    pub async fn save_image(
        &self,
        source: &dyn ContentSource,
        message_id: &str,
    ) -> Result<SavedMedia> {
        let raw = source.fetch(message_id).await?;
        let data = image_ops::normalize_best_effort(raw, self.max_width);
        let name = format!("{}.{}", Uuid::new_v4(), image_ops::extension_for(&data));
        let path = self.dir.join(&name);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .context("media dir unavailable")?;
        tokio::fs::write(&path, &data)
            .await
            .with_context(|| format!("media write failed for {name}"))?;

        debug!(message_id, file = %name, bytes = data.len(), "upload stored");
        Ok(SavedMedia {
            url: format!("{}/{name}", self.public_base),
            path,
        })
    }
}
