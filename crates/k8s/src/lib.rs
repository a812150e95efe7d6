//! Kubernetes access for the orchestrator and the in-cluster agent.
//!
//! The API is spoken directly over HTTPS: in-cluster the client reads
//! the mounted service-account token and CA, out-of-cluster an explicit
//! `api_url` can point at a proxy (e.g. `kubectl proxy`). Every call is
//! bounded by a 15 second deadline.

pub mod cronjobs;
pub mod deployments;
pub mod executor;
pub mod names;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use ifox_domain::config::K8sConfig;
use ifox_domain::{Error, Result};

/// Deadline for Kubernetes API calls.
pub const K8S_API_TIMEOUT: Duration = Duration::from_secs(15);

const IN_CLUSTER_URL: &str = "https://kubernetes.default.svc";
const IN_CLUSTER_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Thin typed client over the Kubernetes REST API.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    pub namespace: String,
}

impl KubeClient {
    /// Build a client from config. Returns `Ok(None)` when neither an
    /// explicit API URL nor in-cluster credentials are present —
    /// callers then report `kubernetes_not_available` instead of
    /// failing requests outright.
    pub fn from_config(cfg: &K8sConfig) -> Result<Option<Self>> {
        let mut builder = Client::builder().timeout(K8S_API_TIMEOUT);

        let (base_url, token) = if !cfg.api_url.is_empty() {
            (cfg.api_url.trim_end_matches('/').to_owned(), None)
        } else {
            let token = match std::fs::read_to_string(&cfg.token_path) {
                Ok(t) => t.trim().to_owned(),
                Err(_) => return Ok(None),
            };
            if let Ok(ca) = std::fs::read(IN_CLUSTER_CA) {
                if let Ok(cert) = reqwest::Certificate::from_pem(&ca) {
                    builder = builder.add_root_certificate(cert);
                }
            }
            (IN_CLUSTER_URL.to_owned(), Some(token))
        };

        let http = builder
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Some(Self {
            http,
            base_url,
            token,
            namespace: cfg.namespace.clone(),
        }))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let mut rb = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            rb = rb.header("Authorization", format!("Bearer {token}"));
        }
        rb
    }

    async fn read_response(resp: reqwest::Response, path: &str) -> Result<Value> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("k8s: {path}")));
        }
        if status == StatusCode::CONFLICT {
            return Err(Error::Conflict(format!("k8s: {path}")));
        }
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "k8s {path} returned {}: {}",
                status.as_u16(),
                body.chars().take(300).collect::<String>()
            )));
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(Error::from)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(from_reqwest)?;
        Self::read_response(resp, path).await
    }

    /// GET returning the raw body (pod logs are plain text).
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(from_reqwest)?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("k8s: {path}")));
        }
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "k8s {path} returned {}",
                status.as_u16()
            )));
        }
        Ok(body)
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;
        Self::read_response(resp, path).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .request(reqwest::Method::PUT, path)
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;
        Self::read_response(resp, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        let resp = self
            .request(reqwest::Method::DELETE, path)
            .send()
            .await
            .map_err(from_reqwest)?;
        Self::read_response(resp, path).await
    }

    /// Cluster facts reported when an agent registers: version and
    /// node/namespace counts. Failures degrade to an empty object.
    pub async fn cluster_info(&self) -> Value {
        let mut info = serde_json::Map::new();
        if let Ok(version) = self.get("/version").await {
            if let Some(git) = version.get("gitVersion").and_then(Value::as_str) {
                info.insert("kubernetes_version".into(), Value::String(git.into()));
            }
        }
        if let Ok(nodes) = self.get("/api/v1/nodes").await {
            if let Some(items) = nodes.get("items").and_then(Value::as_array) {
                info.insert("node_count".into(), Value::from(items.len()));
            }
        }
        if let Ok(namespaces) = self.get("/api/v1/namespaces").await {
            if let Some(items) = namespaces.get("items").and_then(Value::as_array) {
                info.insert("namespace_count".into(), Value::from(items.len()));
            }
        }
        Value::Object(info)
    }
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("k8s api: {e}"))
    } else {
        Error::Http(e.to_string())
    }
}
