//! Trial and subscription gating.

use chrono::{DateTime, Utc};

use ifox_domain::team::IntegrationConfig;
use ifox_domain::{Error, Result};

/// Enforce trial eligibility for an integration.
///
/// A trial is valid only while `trial_expires_at` is in the future.
/// An expired trial without an active subscription is denied even when
/// the team has its own key configured.
pub fn check_entitlement(creds: &IntegrationConfig, now: DateTime<Utc>) -> Result<()> {
    if creds.is_trial != Some(true) {
        return Ok(());
    }

    let trial_active = creds
        .trial_expires_at
        .is_some_and(|expires| expires > now);
    if trial_active {
        return Ok(());
    }

    let subscribed = creds.subscription_status.as_deref() == Some("active");
    if subscribed {
        return Ok(());
    }

    Err(Error::Forbidden(
        "trial expired and no active subscription".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn trial(expires_in_hours: i64, subscription: Option<&str>) -> IntegrationConfig {
        IntegrationConfig {
            api_key: Some("byok-key".into()),
            is_trial: Some(true),
            trial_expires_at: Some(Utc::now() + Duration::hours(expires_in_hours)),
            subscription_status: subscription.map(String::from),
            ..IntegrationConfig::default()
        }
    }

    #[test]
    fn non_trial_always_passes() {
        let creds = IntegrationConfig {
            api_key: Some("k".into()),
            ..IntegrationConfig::default()
        };
        assert!(check_entitlement(&creds, Utc::now()).is_ok());
    }

    #[test]
    fn active_trial_passes() {
        assert!(check_entitlement(&trial(24, None), Utc::now()).is_ok());
    }

    #[test]
    fn expired_trial_without_subscription_is_denied_even_with_byok() {
        let creds = trial(-1, None);
        assert!(creds.api_key.is_some());
        let err = check_entitlement(&creds, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn expired_trial_with_active_subscription_passes() {
        assert!(check_entitlement(&trial(-1, Some("active")), Utc::now()).is_ok());
    }

    #[test]
    fn trial_without_expiry_is_denied() {
        let creds = IntegrationConfig {
            is_trial: Some(true),
            ..IntegrationConfig::default()
        };
        assert!(check_entitlement(&creds, Utc::now()).is_err());
    }
}
