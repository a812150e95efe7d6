//! Target host/path → integration mapping.
//!
//! Direct egress is matched by hostname (with subdomain suffix match);
//! traffic that already went through the local egress proxy is matched
//! by path prefix instead.

/// Hostname → integration id. Suffix-matched, so regional subdomains
/// resolve without listing every one.
const DOMAIN_TO_INTEGRATION: &[(&str, &str)] = &[
    ("api.anthropic.com", "anthropic"),
    ("coralogix.com", "coralogix"),
    ("atlassian.net", "confluence"),
    ("api.honeycomb.io", "honeycomb"),
    ("api.eu1.honeycomb.io", "honeycomb"),
    ("api.clickup.com", "clickup"),
    ("sentry.io", "sentry"),
    ("api.pagerduty.com", "pagerduty"),
    ("gitlab.com", "gitlab"),
    ("newrelic.com", "newrelic"),
    ("api.vercel.com", "vercel"),
];

/// Path prefix → integration id, for proxy-mode requests.
const PATH_TO_INTEGRATION: &[(&str, &str)] = &[
    ("/v1/", "anthropic"),
    ("/api/event_logging/", "anthropic"),
    ("/api/v1/dataprime/", "coralogix"),
    ("/api/v1/query", "coralogix"),
    ("/honeycomb/", "honeycomb"),
    ("/clickup/", "clickup"),
];

/// Whether the host is the local egress proxy (path-based routing).
fn is_proxy_host(host: &str) -> bool {
    host == "envoy:8001"
        || host.starts_with("localhost:")
        || host.starts_with("127.0.0.1:")
}

/// Resolve the integration for a target host and request path.
/// Returns `None` for unmapped hosts (passthrough, no injection).
pub fn integration_for_host(host: &str, path: &str) -> Option<&'static str> {
    if is_proxy_host(host) {
        return PATH_TO_INTEGRATION
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map(|(_, id)| *id);
    }

    DOMAIN_TO_INTEGRATION
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{domain}")))
        .map(|(_, id)| *id)
        .or_else(|| {
            // Bare suffix match for apex entries like "sentry.io".
            DOMAIN_TO_INTEGRATION
                .iter()
                .find(|(domain, _)| host.ends_with(domain))
                .map(|(_, id)| *id)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_host_match() {
        assert_eq!(
            integration_for_host("api.anthropic.com", "/v1/messages"),
            Some("anthropic")
        );
    }

    #[test]
    fn regional_subdomain_matches_by_suffix() {
        assert_eq!(
            integration_for_host("api.eu2.coralogix.com", "/api/v1/query"),
            Some("coralogix")
        );
        assert_eq!(
            integration_for_host("mycorp.atlassian.net", "/wiki/rest/api"),
            Some("confluence")
        );
    }

    #[test]
    fn proxy_host_uses_path_routing() {
        assert_eq!(
            integration_for_host("envoy:8001", "/v1/messages"),
            Some("anthropic")
        );
        assert_eq!(
            integration_for_host("127.0.0.1:45667", "/api/v1/dataprime/query"),
            Some("coralogix")
        );
        assert_eq!(integration_for_host("localhost:8001", "/unknown"), None);
    }

    #[test]
    fn unmapped_host_is_passthrough() {
        assert_eq!(integration_for_host("example.com", "/"), None);
    }
}
