//! Transient protocol-side message representation.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use uuid::Uuid;

/// A message fetched from the server during one cycle.
///
/// The `uid` is only valid within the session that produced it; the
/// `stable_id` is derived from the message itself and survives across
/// sessions, which is what deduplication keys on. Instances live for
/// one cycle step and are never held across cycles.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    /// Server-assigned UID, session-scoped.
    pub uid: u32,
    /// Cross-session identifier: the Message-ID header when present,
    /// otherwise a deterministic fingerprint of the raw bytes.
    pub stable_id: String,
    /// Flags as reported at fetch time (e.g. `\Seen`).
    pub flags: Vec<String>,
    /// Raw RFC 822 content.
    pub raw: Vec<u8>,
    pub sender: String,
    pub subject: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl RemoteMessage {
    /// Build a message from fetched bytes, extracting header metadata.
    pub fn new(uid: u32, flags: Vec<String>, raw: Vec<u8>) -> Self {
        let parsed = MessageParser::default().parse(&raw);

        let stable_id = parsed
            .as_ref()
            .and_then(|m| m.message_id())
            .map(|s| s.to_string())
            .unwrap_or_else(|| fingerprint(&raw));

        let sender = parsed
            .as_ref()
            .and_then(|m| m.from())
            .and_then(|addr| addr.first())
            .and_then(|a| a.address())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".into());

        let subject = parsed
            .as_ref()
            .and_then(|m| m.subject())
            .map(|s| s.to_string());

        let received_at = parsed
            .as_ref()
            .and_then(|m| m.date())
            .and_then(|d| {
                chrono::NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))
                    .and_then(|date| {
                        date.and_hms_opt(
                            u32::from(d.hour),
                            u32::from(d.minute),
                            u32::from(d.second),
                        )
                    })
                    .map(|n| n.and_utc())
            })
            .unwrap_or_else(Utc::now);

        Self {
            uid,
            stable_id,
            flags,
            raw,
            sender,
            subject,
            received_at,
        }
    }

    /// Whether the `\Seen` flag was set at fetch time.
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen"))
    }
}

/// Deterministic fallback identifier for messages without a Message-ID.
///
/// A UUIDv5 over the raw bytes, so the same message always maps to the
/// same identifier and deduplication still holds.
fn fingerprint(raw: &[u8]) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, raw).to_string()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"Message-ID: <abc123@mail.example.com>\r\n\
From: Alice <alice@example.com>\r\n\
Subject: Quarterly report\r\n\
Date: Mon, 6 Jan 2025 10:30:00 +0000\r\n\
\r\n\
Body text.\r\n";

    #[test]
    fn stable_id_from_message_id_header() {
        let msg = RemoteMessage::new(7, vec![], SAMPLE.to_vec());
        assert_eq!(msg.stable_id, "abc123@mail.example.com");
    }

    #[test]
    fn header_metadata_extracted() {
        let msg = RemoteMessage::new(7, vec![], SAMPLE.to_vec());
        assert_eq!(msg.sender, "alice@example.com");
        assert_eq!(msg.subject.as_deref(), Some("Quarterly report"));
        assert_eq!(msg.received_at.to_rfc3339(), "2025-01-06T10:30:00+00:00");
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let raw = b"From: x@y.z\r\n\r\nno message id\r\n".to_vec();
        let a = RemoteMessage::new(1, vec![], raw.clone());
        let b = RemoteMessage::new(2, vec![], raw);
        assert_eq!(a.stable_id, b.stable_id);

        let other = RemoteMessage::new(3, vec![], b"From: x@y.z\r\n\r\ndifferent\r\n".to_vec());
        assert_ne!(a.stable_id, other.stable_id);
    }

    #[test]
    fn seen_flag_detection() {
        let seen = RemoteMessage::new(1, vec!["\\Seen".into()], SAMPLE.to_vec());
        assert!(seen.is_seen());

        let unseen = RemoteMessage::new(1, vec!["\\Answered".into()], SAMPLE.to_vec());
        assert!(!unseen.is_seen());
    }
}
