//! Outbound notification dispatch.
//!
//! Posts an alert to the configured notification endpoint after a
//! message is recorded. The endpoint expects a login call that returns
//! a bearer token, then the notification itself. Failures are logged
//! and never affect the cycle.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::message::RemoteMessage;

const LOGIN_PATH: &str = "/api/v1/account/login/";
const NOTIFICATIONS_PATH: &str = "/api/v1/notifications/";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access: String,
}

#[derive(Serialize)]
struct NotificationBody {
    body: String,
    tag: &'static str,
    extra: NotificationExtra,
}

#[derive(Serialize)]
struct NotificationExtra {
    alertname: String,
    mailbox: String,
    sender: String,
    subject: String,
}

/// Client for the notification endpoint.
pub struct Notifier {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: SecretString,
}

impl Notifier {
    /// Build from `NOTIF_URL` / `NOTIF_USERNAME` / `NOTIF_PASSWORD`.
    /// Returns `None` when `NOTIF_URL` is unset (notifications disabled).
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("NOTIF_URL").ok()?;
        let username = std::env::var("NOTIF_USERNAME").unwrap_or_default();
        let password = std::env::var("NOTIF_PASSWORD").unwrap_or_default();
        Some(Self::new(base_url, username, password))
    }

    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Send an alert for one newly recorded message. Never fails the
    /// caller; delivery problems are logged at warn.
    pub async fn notify_new_message(&self, mailbox: &str, message: &RemoteMessage) {
        let body = NotificationBody {
            body: format!(
                "New email from {}: {}",
                message.sender,
                message.subject.as_deref().unwrap_or("(no subject)")
            ),
            tag: "mailbox",
            extra: NotificationExtra {
                alertname: format!("New email in {mailbox}"),
                mailbox: mailbox.to_string(),
                sender: message.sender.clone(),
                subject: message.subject.clone().unwrap_or_default(),
            },
        };

        match self.send(&body).await {
            Ok(()) => debug!(mailbox = mailbox, sender = %message.sender, "Notification sent"),
            Err(reason) => warn!(mailbox = mailbox, "Notification failed: {reason}"),
        }
    }

    async fn send(&self, body: &NotificationBody) -> Result<(), String> {
        let token = self.login().await?;

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, NOTIFICATIONS_PATH))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("notification request failed: {e}"))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("notification endpoint returned {}", resp.status()))
        }
    }

    async fn login(&self) -> Result<String, String> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, LOGIN_PATH))
            .json(&LoginRequest {
                username: &self.username,
                password: self.password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| format!("login request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("login endpoint returned {}", resp.status()));
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| format!("login response malformed: {e}"))?;
        Ok(login.access)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_body_serializes() {
        let body = NotificationBody {
            body: "New email from a@b.c: hi".into(),
            tag: "mailbox",
            extra: NotificationExtra {
                alertname: "New email in work".into(),
                mailbox: "work".into(),
                sender: "a@b.c".into(),
                subject: "hi".into(),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["tag"], "mailbox");
        assert_eq!(json["extra"]["mailbox"], "work");
        assert_eq!(json["extra"]["alertname"], "New email in work");
    }
}
