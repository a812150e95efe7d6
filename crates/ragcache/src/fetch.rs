//! Fetching tree artifacts from the authoritative store.
//!
//! The store is any S3-compatible HTTP endpoint. Two key layouts are
//! tried in order: `trees/{name}/{name}.tree`, then
//! `trees/{name}.tree`. Downloads land in a `.downloading` temp file
//! and are renamed into place, so readers never observe a torn file.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use ifox_domain::config::S3Config;
use ifox_domain::{Error, Result};

#[async_trait]
pub trait TreeFetcher: Send + Sync {
    /// Download the artifact for `name` to `dest`.
    async fn fetch(&self, name: &str, dest: &Path) -> Result<()>;
}

/// Fetcher for when lazy loading is disabled: everything is a miss.
pub struct DisabledFetcher;

#[async_trait]
impl TreeFetcher for DisabledFetcher {
    async fn fetch(&self, name: &str, _dest: &Path) -> Result<()> {
        Err(Error::NotFound(format!(
            "lazy loading disabled, tree not found: {name}"
        )))
    }
}

pub struct HttpTreeFetcher {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    prefix: String,
}

impl HttpTreeFetcher {
    pub fn new(cfg: &S3Config) -> Result<Self> {
        // Tree downloads are unbounded (multi-GB artifacts) but logged.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_owned(),
            bucket: cfg.bucket.clone(),
            prefix: cfg.prefix.trim_matches('/').to_owned(),
        })
    }

    fn keys_for(&self, name: &str) -> [String; 2] {
        [
            format!("{}/{name}/{name}.tree", self.prefix),
            format!("{}/{name}.tree", self.prefix),
        ]
    }
}

#[async_trait]
impl TreeFetcher for HttpTreeFetcher {
    async fn fetch(&self, name: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = dest.with_extension("downloading");

        for key in self.keys_for(name) {
            let url = format!("{}/{}/{key}", self.endpoint, self.bucket);
            tracing::info!(tree = name, %url, "attempting tree download");

            let resp = match self.http.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    return Err(Error::Upstream(format!("tree store: {e}")));
                }
            };
            if resp.status().as_u16() == 404 || resp.status().as_u16() == 403 {
                tracing::debug!(tree = name, key = %key, "not at this key, trying next");
                continue;
            }
            if !resp.status().is_success() {
                return Err(Error::Upstream(format!(
                    "tree store returned {} for {key}",
                    resp.status().as_u16()
                )));
            }

            let start = Instant::now();
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| Error::Upstream(format!("tree download: {e}")))?;
            let size = bytes.len() as u64;
            tokio::fs::write(&temp, &bytes).await?;
            tokio::fs::rename(&temp, dest).await?;

            let secs = start.elapsed().as_secs_f64().max(0.001);
            tracing::info!(
                tree = name,
                bytes = size,
                seconds = format!("{secs:.1}"),
                mb_per_s = format!("{:.1}", (size as f64 / 1_048_576.0) / secs),
                "tree downloaded"
            );
            return Ok(());
        }

        Err(Error::NotFound(format!(
            "tree '{name}' not found in {}/{} (tried {:?})",
            self.endpoint,
            self.bucket,
            self.keys_for(name)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_patterns_in_order() {
        let fetcher = HttpTreeFetcher::new(&S3Config {
            enabled: true,
            endpoint: "https://s3.example.com".into(),
            bucket: "kb".into(),
            prefix: "trees".into(),
        })
        .unwrap();
        assert_eq!(
            fetcher.keys_for("k8s"),
            ["trees/k8s/k8s.tree".to_string(), "trees/k8s.tree".to_string()]
        );
    }

    #[tokio::test]
    async fn disabled_fetcher_reports_not_found() {
        let err = DisabledFetcher
            .fetch("k8s", Path::new("/tmp/never"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
