//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use toolgraph_core::config::LoaderConfig;
use toolgraph_core::error::{LoadError, Result};
use toolgraph_core::source::{Fetcher, Location, Source};

/// In-memory fetcher that counts how often each location is fetched.
#[derive(Default)]
pub struct MemoryFetcher {
    files: BTreeMap<String, Vec<u8>>,
    fetches: Mutex<BTreeMap<String, usize>>,
    delay: Option<Duration>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` at `location` (an absolute path or URL).
    pub fn file(mut self, location: &str, content: &str) -> Self {
        self.files
            .insert(location.to_string(), content.as_bytes().to_vec());
        self
    }

    /// Sleep before answering each fetch.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self, location: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(location)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, location: &Location) -> Result<Source> {
        let key = location.to_string();
        *self.fetches.lock().unwrap().entry(key.clone()).or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.files.get(&key) {
            Some(content) => Ok(Source::new(location.clone(), content.clone())),
            None => Err(LoadError::source_not_found(key, "not found")),
        }
    }
}

/// Config rooted at `/work` with a fixed model name.
pub fn config() -> LoaderConfig {
    LoaderConfig {
        default_model: "test-model".to_string(),
        working_dir: Some(PathBuf::from("/work")),
        ..LoaderConfig::default()
    }
}
