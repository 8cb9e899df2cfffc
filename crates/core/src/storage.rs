//! Audio publishing seams: turning raw speech into a file, and putting that file online.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A published audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub url: String,
    pub size: u64,
}

/// Encodes raw 16-bit mono PCM into a playable file named after `stem`.
#[async_trait]
pub trait AudioEncoder: Send + Sync {
    async fn encode(&self, pcm: Vec<u8>, stem: &str) -> Result<PathBuf>;
}

/// Uploads a local file and returns its public URL and size.
#[async_trait]
pub trait AudioStore: Send + Sync {
    async fn upload(&self, path: &Path, name: &str) -> Result<Uploaded>;
}
