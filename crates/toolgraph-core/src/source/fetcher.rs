//! Fetch raw source content from disk or over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};

use super::spec::{Location, Source};

/// Reads the bytes behind a canonical location.
///
/// Implementations own any retry policy; the resolver never retries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, location: &Location) -> Result<Source>;
}

/// Fetcher for local files and http(s) URLs.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| LoadError::Io(std::io::Error::other(e)))?;

        Ok(Self { client })
    }

    async fn read_file(&self, location: &Location) -> Result<Vec<u8>> {
        let Some(path) = location.as_path() else {
            return Err(LoadError::source_not_found(location.to_string(), "not a file"));
        };

        tokio::fs::read(path)
            .await
            .map_err(|e| LoadError::source_not_found(location.to_string(), e))
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LoadError::source_not_found(url.as_str(), e))?;

        if !response.status().is_success() {
            return Err(LoadError::source_not_found(
                url.as_str(),
                format!("HTTP {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::source_not_found(url.as_str(), e))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Fetcher for DefaultFetcher {
    async fn fetch(&self, location: &Location) -> Result<Source> {
        let (location, content) = match location {
            Location::Local(_) => (location.clone(), self.read_file(location).await?),
            Location::Remote(url) => {
                let url = normalize_view_url(url.clone());
                let content = self.download(&url).await?;
                (Location::Remote(url), content)
            }
        };

        tracing::debug!(%location, bytes = content.len(), "fetched source");
        Ok(Source::new(location, content))
    }
}

/// Rewrite a code-hosting "view" URL to its raw-content equivalent.
///
/// `https://github.com/<owner>/<repo>/blob/<ref>/<path>` becomes
/// `https://raw.githubusercontent.com/<owner>/<repo>/<ref>/<path>`.
pub fn normalize_view_url(url: Url) -> Url {
    if url.host_str() != Some("github.com") {
        return url;
    }

    let segments: Vec<&str> = match url.path_segments() {
        Some(segments) => segments.collect(),
        None => return url,
    };

    // owner / repo / "blob" / ref / path...
    if segments.len() < 5 || segments[2] != "blob" {
        return url;
    }

    let raw = format!(
        "https://raw.githubusercontent.com/{}/{}/{}",
        segments[0],
        segments[1],
        segments[3..].join("/")
    );

    Url::parse(&raw).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_blob_url() {
        let url = Url::parse("https://github.com/acme/tools/blob/main/example/sub/tool.gpt").unwrap();
        assert_eq!(
            normalize_view_url(url).as_str(),
            "https://raw.githubusercontent.com/acme/tools/main/example/sub/tool.gpt"
        );
    }

    #[test]
    fn test_normalize_keeps_other_urls() {
        let url = Url::parse("https://github.com/acme/tools/tree/main/example").unwrap();
        assert_eq!(normalize_view_url(url.clone()), url);

        let url = Url::parse("https://example.com/acme/tools/blob/main/x.gpt").unwrap();
        assert_eq!(normalize_view_url(url.clone()), url);
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let fetcher = DefaultFetcher::new(&LoaderConfig::default()).unwrap();
        let location = Location::Local(std::path::PathBuf::from("/nonexistent/toolgraph/a.gpt"));

        let err = fetcher.fetch(&location).await.unwrap_err();
        assert!(matches!(err, LoadError::SourceNotFound { .. }));
    }
}
