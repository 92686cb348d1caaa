//! Digest delivery for newly discovered grants.
//!
//! A run that finds something new can send one digest message to a single
//! recipient. Delivery goes through a mail relay that accepts a JSON
//! message over HTTP; the relay itself is outside this crate.

use std::time::Duration;

use async_trait::async_trait;
use grantscout_shared::{Grant, GrantScoutError, NotificationConfig, Result, read_secret};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

/// User-Agent string for relay requests.
const USER_AGENT: &str = concat!("GrantScout/", env!("CARGO_PKG_VERSION"));

/// Sends a digest of new grants to a recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Make exactly one delivery attempt.
    async fn notify(&self, recipient: &str, grants: &[Grant]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// Rendered digest message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub text: String,
}

/// Render the digest for a batch of new grants.
pub fn build_digest(grants: &[Grant]) -> Digest {
    let count = grants.len();
    let subject = if count == 1 {
        "GrantScout: 1 new funding opportunity".to_string()
    } else {
        format!("GrantScout: {count} new funding opportunities")
    };

    let mut text = format!("GrantScout found {count} new opportunit{}:\n", plural_y(count));
    for (i, grant) in grants.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {}\n   Agency: {}\n   Status: {}\n",
            i + 1,
            grant.program_title,
            grant.agency_name,
            grant.status
        ));
        if let Some(deadline) = &grant.application_deadline {
            text.push_str(&format!("   Deadline: {deadline}\n"));
        }
        text.push_str(&format!("   Apply: {}\n", grant.official_application_link));
    }

    Digest { subject, text }
}

fn plural_y(count: usize) -> &'static str {
    if count == 1 { "y" } else { "ies" }
}

// ---------------------------------------------------------------------------
// Mail relay notifier
// ---------------------------------------------------------------------------

/// Settings for [`MailRelayNotifier`]. The token is passed in explicitly.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub endpoint: String,
    /// Bearer token for the relay, if it requires one.
    pub api_key: Option<String>,
    pub sender: String,
    pub timeout_secs: u64,
}

impl NotifierSettings {
    /// Resolve settings from the config file section, reading the token from
    /// the env var it names.
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: read_secret(&config.api_key_env),
            sender: config.sender.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Delivers digests by POSTing a JSON message to a mail relay.
pub struct MailRelayNotifier {
    settings: NotifierSettings,
    http: Client,
}

impl MailRelayNotifier {
    pub fn new(settings: NotifierSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                GrantScoutError::Notification(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { settings, http })
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    #[instrument(skip_all, fields(recipient = %recipient, grants = grants.len()))]
    async fn notify(&self, recipient: &str, grants: &[Grant]) -> Result<()> {
        if grants.is_empty() {
            return Err(GrantScoutError::Notification(
                "refusing to send an empty digest".into(),
            ));
        }
        if recipient.trim().is_empty() {
            return Err(GrantScoutError::Notification("no recipient configured".into()));
        }

        let digest = build_digest(grants);
        let message = RelayMessage {
            from: &self.settings.sender,
            to: recipient.trim(),
            subject: &digest.subject,
            text: &digest.text,
        };

        let mut request = self.http.post(&self.settings.endpoint).json(&message);
        if let Some(token) = &self.settings.api_key {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GrantScoutError::Notification(format!("relay unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantScoutError::Notification(format!(
                "relay returned HTTP {status}"
            )));
        }

        info!("digest delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use grantscout_shared::{GrantId, GrantStatus};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn grant(title: &str, deadline: Option<&str>) -> Grant {
        Grant {
            id: GrantId::new(),
            agency_name: "NSF".into(),
            program_title: title.into(),
            funding_type: "Grant".into(),
            brief_description: String::new(),
            eligibility_criteria: String::new(),
            application_deadline: deadline.map(String::from),
            funding_amount: None,
            geographic_scope: "US".into(),
            official_application_link: format!("https://nsf.gov/{}", title.to_lowercase()),
            status: GrantStatus::Open,
            confidence_score: 0.95,
            discovered_at: Utc::now(),
        }
    }

    fn settings(endpoint: String, api_key: Option<&str>) -> NotifierSettings {
        NotifierSettings {
            endpoint,
            api_key: api_key.map(String::from),
            sender: "scout@example.org".into(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn digest_lists_title_agency_and_link() {
        let digest = build_digest(&[grant("Alpha", Some("2026-04-01")), grant("Beta", None)]);
        assert_eq!(digest.subject, "GrantScout: 2 new funding opportunities");
        assert!(digest.text.contains("1. Alpha"));
        assert!(digest.text.contains("Agency: NSF"));
        assert!(digest.text.contains("Apply: https://nsf.gov/beta"));
        assert!(digest.text.contains("Deadline: 2026-04-01"));
        assert_eq!(digest.text.matches("Deadline:").count(), 1);
    }

    #[test]
    fn digest_singular_subject() {
        let digest = build_digest(&[grant("Alpha", None)]);
        assert_eq!(digest.subject, "GrantScout: 1 new funding opportunity");
        assert!(digest.text.starts_with("GrantScout found 1 new opportunity:"));
    }

    #[tokio::test]
    async fn sends_one_message_to_relay() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer relay-token"))
            .and(body_partial_json(serde_json::json!({
                "from": "scout@example.org",
                "to": "team@example.org",
                "subject": "GrantScout: 1 new funding opportunity"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            MailRelayNotifier::new(settings(format!("{}/send", server.uri()), Some("relay-token")))
                .unwrap();
        notifier
            .notify(" team@example.org ", &[grant("Alpha", None)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn relay_failure_is_notification_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = MailRelayNotifier::new(settings(server.uri(), None)).unwrap();
        let err = notifier
            .notify("team@example.org", &[grant("Alpha", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, GrantScoutError::Notification(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn empty_batch_never_reaches_relay() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = MailRelayNotifier::new(settings(server.uri(), None)).unwrap();
        assert!(notifier.notify("team@example.org", &[]).await.is_err());
        assert!(notifier.notify("", &[grant("Alpha", None)]).await.is_err());
    }
}
