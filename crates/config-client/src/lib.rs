//! HTTP client for the Config Service.
//!
//! The Config Service owns org/team hierarchy, effective configuration,
//! team tokens, and admin identities. This crate wraps its API behind a
//! typed client plus a short-TTL cache for admin-auth lookups so hot
//! admin paths do not hammer `/auth/me`.

mod cache;

pub use cache::AdminAuthCache;

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;

use ifox_domain::team::TeamConfig;
use ifox_domain::{Error, Result};

/// Identity returned by `/auth/me` for an admin token.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminPrincipal {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl AdminPrincipal {
    /// Whether this principal holds `required`. `admin:*` satisfies any
    /// scoped admin permission.
    pub fn has_permission(&self, required: &str) -> bool {
        self.permissions.iter().any(|p| p == "admin:*" || p == required)
    }

    /// Best display name for audit logs.
    pub fn actor(&self) -> &str {
        self.email
            .as_deref()
            .or(self.subject.as_deref())
            .unwrap_or("unknown")
    }
}

/// Identity behind a team token.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamIdentity {
    pub org_id: String,
    pub team_node_id: String,
}

/// A short-lived token minted to act as a team.
#[derive(Debug, Clone, Deserialize)]
pub struct ImpersonationToken {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// One row from the team-token listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamTokenRow {
    pub id: String,
    #[serde(default)]
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A team entry with its effective config, used to build routing indexes.
#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfigEntry {
    pub org_id: String,
    pub team_node_id: String,
    pub config: TeamConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST client for the Config Service.
///
/// Created once per process; the underlying `reqwest::Client` keeps a
/// connection pool. Every call carries a bearer token — either the
/// caller's admin token or a team token, depending on the endpoint.
#[derive(Debug, Clone)]
pub struct ConfigServiceClient {
    http: Client,
    base_url: String,
}

impl ConfigServiceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(rb: RequestBuilder, token: &str) -> RequestBuilder {
        rb.header("Authorization", format!("Bearer {token}"))
    }

    /// Send a request and decode the JSON body, mapping failures onto
    /// the shared error taxonomy (401/403 → auth, other 4xx → the
    /// status's kind, 5xx and transport errors → upstream).
    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        rb: RequestBuilder,
    ) -> Result<T> {
        let resp = rb
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("config_service {endpoint}: {e}")))?;
        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(Error::Auth(format!("config_service rejected token ({endpoint})")));
        }
        if status.as_u16() == 403 {
            return Err(Error::Forbidden(format!(
                "config_service denied access ({endpoint})"
            )));
        }
        if status.as_u16() == 404 {
            return Err(Error::NotFound(format!("config_service: {endpoint}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "config_service {endpoint} returned {}: {body}",
                status.as_u16()
            )));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Error::Upstream(format!("config_service {endpoint} decode: {e}")))
    }

    // ── auth ─────────────────────────────────────────────────────────

    /// Resolve an admin token to its principal.
    pub async fn auth_me_admin(&self, token: &str) -> Result<AdminPrincipal> {
        let rb = Self::bearer(self.http.get(self.url("/api/v1/auth/me")), token);
        self.send_json("auth/me", rb).await
    }

    /// Resolve a team token to its org/team identity.
    pub async fn auth_me_team(&self, team_token: &str) -> Result<TeamIdentity> {
        let rb = Self::bearer(self.http.get(self.url("/api/v1/auth/me")), team_token);
        self.send_json("auth/me", rb).await
    }

    // ── effective config ─────────────────────────────────────────────

    /// Effective config for the team behind `team_token`.
    pub async fn get_effective_config(&self, team_token: &str) -> Result<TeamConfig> {
        let rb = Self::bearer(self.http.get(self.url("/api/v1/config/effective")), team_token);
        self.send_json("config/effective", rb).await
    }

    /// Effective config for a node, resolved with admin credentials.
    pub async fn get_effective_config_for_node(
        &self,
        token: &str,
        org_id: &str,
        node_id: &str,
    ) -> Result<TeamConfig> {
        let path = format!("/api/v1/admin/orgs/{org_id}/nodes/{node_id}/effective-config");
        let rb = Self::bearer(self.http.get(self.url(&path)), token);
        self.send_json("effective-config", rb).await
    }

    /// Merge a JSON patch into a team node's config.
    pub async fn patch_node_config(
        &self,
        token: &str,
        org_id: &str,
        node_id: &str,
        patch: &Value,
    ) -> Result<()> {
        let path = format!("/api/v1/admin/orgs/{org_id}/nodes/{node_id}/config");
        let rb = Self::bearer(self.http.patch(self.url(&path)), token).json(patch);
        let _: Value = self.send_json("patch-node-config", rb).await?;
        Ok(())
    }

    /// All team entries (scoped to `org` when given) with their
    /// effective configs; feeds the routing index.
    pub async fn list_team_configs(
        &self,
        token: &str,
        org_id: Option<&str>,
    ) -> Result<Vec<TeamConfigEntry>> {
        let mut rb = Self::bearer(self.http.get(self.url("/api/v1/internal/teams")), token)
            .header("X-Internal-Service", "orchestrator");
        if let Some(org) = org_id {
            rb = rb.query(&[("org_id", org)]);
        }
        #[derive(Deserialize)]
        struct Listing {
            teams: Vec<TeamConfigEntry>,
        }
        let listing: Listing = self.send_json("internal/teams", rb).await?;
        Ok(listing.teams)
    }

    // ── team tokens ──────────────────────────────────────────────────

    pub async fn list_team_tokens(
        &self,
        token: &str,
        org_id: &str,
        node_id: &str,
    ) -> Result<Vec<TeamTokenRow>> {
        let path = format!("/api/v1/admin/orgs/{org_id}/nodes/{node_id}/tokens");
        let rb = Self::bearer(self.http.get(self.url(&path)), token);
        #[derive(Deserialize)]
        struct Listing {
            tokens: Vec<TeamTokenRow>,
        }
        let listing: Listing = self.send_json("list-team-tokens", rb).await?;
        Ok(listing.tokens)
    }

    /// Mint a long-lived team token. Returned exactly once; the Config
    /// Service only stores its hash.
    pub async fn issue_team_token(
        &self,
        token: &str,
        org_id: &str,
        node_id: &str,
    ) -> Result<String> {
        let path = format!("/api/v1/admin/orgs/{org_id}/nodes/{node_id}/tokens");
        let rb = Self::bearer(self.http.post(self.url(&path)), token);
        #[derive(Deserialize)]
        struct Minted {
            token: String,
        }
        let minted: Minted = self.send_json("issue-team-token", rb).await?;
        Ok(minted.token)
    }

    /// Mint a short-lived impersonation token for a team.
    pub async fn issue_impersonation_token(
        &self,
        token: &str,
        org_id: &str,
        node_id: &str,
    ) -> Result<ImpersonationToken> {
        let path =
            format!("/api/v1/admin/orgs/{org_id}/nodes/{node_id}/impersonation-token");
        let rb = Self::bearer(self.http.post(self.url(&path)), token);
        self.send_json("impersonation-token", rb).await
    }

    // ── integrations (credential fetch) ──────────────────────────────

    /// Raw integration config for `(org, team, integration)`.
    pub async fn get_integration_config(
        &self,
        token: &str,
        org_id: &str,
        team_node_id: &str,
        integration_id: &str,
    ) -> Result<Option<Value>> {
        let path = format!(
            "/api/v1/internal/orgs/{org_id}/teams/{team_node_id}/integrations/{integration_id}"
        );
        let rb = Self::bearer(self.http.get(self.url(&path)), token)
            .header("X-Internal-Service", "credential-resolver");
        match self.send_json::<Value>("integration-config", rb).await {
            Ok(v) if v.is_null() => Ok(None),
            Ok(v) => Ok(Some(v)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_star_satisfies_scoped_permissions() {
        let p = AdminPrincipal {
            subject: None,
            email: Some("ops@example.com".into()),
            permissions: vec!["admin:*".into()],
        };
        assert!(p.has_permission("admin:provision"));
        assert!(p.has_permission("admin:deprovision"));
        assert_eq!(p.actor(), "ops@example.com");
    }

    #[test]
    fn scoped_permission_is_exact() {
        let p = AdminPrincipal {
            subject: Some("svc".into()),
            email: None,
            permissions: vec!["admin:provision".into()],
        };
        assert!(p.has_permission("admin:provision"));
        assert!(!p.has_permission("admin:agent:run"));
        assert_eq!(p.actor(), "svc");
    }
}
