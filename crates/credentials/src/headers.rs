//! Auth-header construction per integration.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use ifox_domain::team::IntegrationConfig;

/// Build the headers to inject upstream for an integration.
///
/// Anthropic gets `x-api-key`; when the team rides the shared platform
/// key, attribution headers are added so usage can be cost-tagged per
/// workspace. Confluence uses Basic auth (`email:api_key`); everything
/// else defaults to a bearer token.
pub fn build_auth_headers(
    integration_id: &str,
    creds: &IntegrationConfig,
) -> Vec<(String, String)> {
    let api_key = creds.api_key.clone().unwrap_or_default();

    match integration_id {
        "anthropic" => {
            let mut headers = vec![("x-api-key".to_string(), api_key)];
            if let Some(workspace) = &creds.workspace_attribution {
                headers.push(("x-infrafox-workspace".to_string(), workspace.clone()));
                headers.push(("x-infrafox-tenant".to_string(), workspace.clone()));
                tracing::info!(workspace = %workspace, "added cost attribution headers");
            }
            headers
        }
        "confluence" => {
            let email = creds.extra_str("email").unwrap_or_default();
            if email.is_empty() || api_key.is_empty() {
                tracing::warn!("confluence credentials incomplete for basic auth");
                return Vec::new();
            }
            let encoded = BASE64.encode(format!("{email}:{api_key}"));
            vec![("Authorization".to_string(), format!("Basic {encoded}"))]
        }
        _ => vec![("Authorization".to_string(), format!("Bearer {api_key}"))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn creds(api_key: &str) -> IntegrationConfig {
        IntegrationConfig {
            api_key: Some(api_key.into()),
            ..IntegrationConfig::default()
        }
    }

    #[test]
    fn anthropic_uses_x_api_key() {
        let headers = build_auth_headers("anthropic", &creds("sk-ant"));
        assert_eq!(headers, vec![("x-api-key".to_string(), "sk-ant".to_string())]);
    }

    #[test]
    fn shared_key_adds_attribution() {
        let mut c = creds("sk-shared");
        c.workspace_attribution = Some("acme".into());
        let headers = build_auth_headers("anthropic", &c);
        assert!(headers.contains(&("x-infrafox-workspace".to_string(), "acme".to_string())));
        assert!(headers.contains(&("x-infrafox-tenant".to_string(), "acme".to_string())));
    }

    #[test]
    fn confluence_is_basic_auth() {
        let mut c = creds("token");
        c.extra = HashMap::from([(
            "email".to_string(),
            serde_json::Value::String("ops@acme.com".into()),
        )]);
        let headers = build_auth_headers("confluence", &c);
        assert_eq!(headers.len(), 1);
        let (name, value) = &headers[0];
        assert_eq!(name, "Authorization");
        let encoded = value.strip_prefix("Basic ").unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(decoded, b"ops@acme.com:token");
    }

    #[test]
    fn confluence_without_email_yields_nothing() {
        assert!(build_auth_headers("confluence", &creds("token")).is_empty());
    }

    #[test]
    fn default_is_bearer() {
        let headers = build_auth_headers("coralogix", &creds("cx-key"));
        assert_eq!(
            headers,
            vec![("Authorization".to_string(), "Bearer cx-key".to_string())]
        );
    }
}
