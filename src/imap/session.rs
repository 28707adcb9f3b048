//! Minimal IMAP session: login, folder selection, UID-based search,
//! peek fetch, flag store, copy and logout.
//!
//! Fetches always use `BODY.PEEK[]` so the server never flips `\Seen`
//! as a side effect; any flag change is an explicit `UID STORE` issued
//! by the caller.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

use crate::config::{ConnectionDescriptor, Security};
use crate::error::{SessionError, SyncError};
use crate::imap::stream::ImapStream;
use crate::message::RemoteMessage;
use crate::sync::strategy::Selection;

/// Per-command timeout covering write plus full response read.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a tagged command.
#[derive(Debug)]
struct Response {
    /// Untagged (`* ...`) lines, literal markers left in place.
    untagged: Vec<String>,
    /// Literal payloads in the order they appeared.
    literals: Vec<Vec<u8>>,
    /// Whether the tagged completion was `OK`.
    ok: bool,
    /// Text of the tagged completion line.
    text: String,
}

/// An authenticated IMAP session with one folder selected.
///
/// `close` is idempotent; every method after `close` fails with
/// `SessionError::Closed` instead of touching the network.
pub struct ImapSession {
    stream: Option<BufReader<ImapStream>>,
    host: String,
    tag_seq: u32,
}

impl ImapSession {
    /// Connect, authenticate and select the target folder.
    pub async fn open(
        descriptor: &ConnectionDescriptor,
        folder: &str,
    ) -> Result<Self, SessionError> {
        let stream = match descriptor.security {
            Security::Ssl => ImapStream::connect_tls(&descriptor.host, descriptor.port).await?,
            Security::Plain | Security::StartTls => {
                ImapStream::connect_plain(&descriptor.host, descriptor.port).await?
            }
        };

        let mut session = Self {
            stream: Some(BufReader::new(stream)),
            host: descriptor.host.clone(),
            tag_seq: 0,
        };

        let greeting = session.read_greeting().await?;
        trace!(host = %session.host, greeting = %greeting.trim_end(), "IMAP greeting");

        if descriptor.security == Security::StartTls {
            let resp = session.command("STARTTLS").await?;
            if !resp.ok {
                return Err(SessionError::Protocol(format!(
                    "STARTTLS rejected: {}",
                    resp.text
                )));
            }
            let reader = session.stream.take().ok_or(SessionError::Closed)?;
            let upgraded = reader.into_inner().upgrade_to_tls(&session.host).await?;
            session.stream = Some(BufReader::new(upgraded));
        }

        let login = session
            .command(&format!(
                "LOGIN {} {}",
                quote(&descriptor.username),
                quote(descriptor.password())
            ))
            .await?;
        if !login.ok {
            return Err(SessionError::AuthRejected {
                host: descriptor.host.clone(),
                username: descriptor.username.clone(),
            });
        }
        debug!(host = %session.host, user = %descriptor.username, "IMAP login ok");

        session.select_folder(folder).await?;
        Ok(session)
    }

    /// Switch the active folder within the open session.
    pub async fn select_folder(&mut self, folder: &str) -> Result<(), SessionError> {
        let resp = self.command(&format!("SELECT {}", quote(folder))).await?;
        if !resp.ok {
            return Err(SessionError::FolderNotFound(folder.to_string()));
        }
        debug!(folder = folder, "Folder selected");
        Ok(())
    }

    /// List candidate UIDs, oldest first. The result is a snapshot;
    /// later server-side changes are not reflected.
    pub async fn list_candidates(&mut self, selection: Selection) -> Result<Vec<u32>, SyncError> {
        let criterion = match selection {
            Selection::All => "ALL",
            Selection::UnseenOnly => "UNSEEN",
        };
        let resp = self
            .command(&format!("UID SEARCH {criterion}"))
            .await
            .map_err(|e| SyncError::Selection(e.to_string()))?;
        if !resp.ok {
            return Err(SyncError::Selection(resp.text));
        }

        let mut uids: Vec<u32> = resp
            .untagged
            .iter()
            .filter_map(|line| parse_search_line(line))
            .flatten()
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// Fetch one message without touching its flags.
    pub async fn fetch(&mut self, uid: u32) -> Result<RemoteMessage, SyncError> {
        let resp = self
            .command(&format!("UID FETCH {uid} (UID FLAGS BODY.PEEK[])"))
            .await
            .map_err(|e| SyncError::Fetch {
                uid,
                reason: e.to_string(),
            })?;
        if !resp.ok {
            return Err(SyncError::Fetch {
                uid,
                reason: resp.text,
            });
        }

        let fetch_line = resp.untagged.iter().find(|l| l.contains(" FETCH "));
        let raw = resp.literals.into_iter().next();
        match (fetch_line, raw) {
            (Some(line), Some(raw)) if !raw.is_empty() => {
                let flags = parse_flags(line);
                Ok(RemoteMessage::new(uid, flags, raw))
            }
            // Empty FETCH response: the message vanished between the
            // search snapshot and this fetch. Recoverable.
            _ => Err(SyncError::Fetch {
                uid,
                reason: "no content returned (message deleted by another client?)".into(),
            }),
        }
    }

    /// Set the `\Seen` flag on one message.
    pub async fn add_seen_flag(&mut self, uid: u32) -> Result<(), SyncError> {
        let resp = self
            .command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))
            .await
            .map_err(|e| SyncError::Mutation {
                uid,
                reason: e.to_string(),
            })?;
        if !resp.ok {
            return Err(SyncError::Mutation {
                uid,
                reason: resp.text,
            });
        }
        Ok(())
    }

    /// Copy one message into another folder.
    pub async fn copy_to(&mut self, uid: u32, folder: &str) -> Result<(), SyncError> {
        let resp = self
            .command(&format!("UID COPY {uid} {}", quote(folder)))
            .await
            .map_err(|e| SyncError::Archive {
                folder: folder.to_string(),
                reason: e.to_string(),
            })?;
        if !resp.ok {
            return Err(SyncError::Archive {
                folder: folder.to_string(),
                reason: resp.text,
            });
        }
        Ok(())
    }

    /// Create the folder if the server does not list it.
    pub async fn ensure_folder(&mut self, folder: &str) -> Result<(), SyncError> {
        let to_archive_err = |folder: &str, reason: String| SyncError::Archive {
            folder: folder.to_string(),
            reason,
        };

        let listed = self
            .command(&format!("LIST \"\" {}", quote(folder)))
            .await
            .map_err(|e| to_archive_err(folder, e.to_string()))?;
        if listed.untagged.iter().any(|l| l.starts_with("* LIST")) {
            return Ok(());
        }

        debug!(folder = folder, "Creating missing folder");
        let created = self
            .command(&format!("CREATE {}", quote(folder)))
            .await
            .map_err(|e| to_archive_err(folder, e.to_string()))?;
        if !created.ok {
            return Err(to_archive_err(folder, created.text));
        }
        Ok(())
    }

    /// Log out and drop the connection. Safe to call more than once and
    /// after a partial failure.
    pub async fn close(&mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.command("LOGOUT").await {
                warn!(host = %self.host, "LOGOUT failed: {e}");
            }
            self.stream = None;
        }
    }

    // ── Wire plumbing ───────────────────────────────────────────────

    async fn read_greeting(&mut self) -> Result<String, SessionError> {
        tokio::time::timeout(COMMAND_TIMEOUT, async {
            let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
            let (line, _) = read_unit(stream).await?;
            if line.starts_with("* OK") || line.starts_with("* PREAUTH") {
                Ok(line)
            } else {
                Err(SessionError::Protocol(format!(
                    "unexpected greeting: {}",
                    line.trim_end()
                )))
            }
        })
        .await
        .map_err(|_| SessionError::Protocol("greeting timed out".into()))?
    }

    /// Send one tagged command and collect the full response.
    async fn command(&mut self, cmd: &str) -> Result<Response, SessionError> {
        self.tag_seq += 1;
        let tag = format!("W{}", self.tag_seq);
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;

        tokio::time::timeout(COMMAND_TIMEOUT, async {
            stream.write_all(format!("{tag} {cmd}\r\n").as_bytes()).await?;
            stream.flush().await?;

            let mut untagged = Vec::new();
            let mut literals = Vec::new();
            loop {
                let (line, literal) = read_unit(stream).await?;
                if let Some(bytes) = literal {
                    literals.push(bytes);
                }
                if let Some(rest) = line.strip_prefix(&format!("{tag} ")) {
                    let ok = rest.starts_with("OK");
                    return Ok(Response {
                        untagged,
                        literals,
                        ok,
                        text: rest.trim_end().to_string(),
                    });
                }
                if line.starts_with('*') {
                    untagged.push(line.trim_end().to_string());
                }
            }
        })
        .await
        .map_err(|_| SessionError::Protocol(format!("command timed out: {}", cmd_name(cmd))))?
    }
}

/// Read one line; when it announces a literal (`{n}` suffix), also read
/// the following `n` raw bytes.
async fn read_unit(
    stream: &mut BufReader<ImapStream>,
) -> Result<(String, Option<Vec<u8>>), SessionError> {
    let mut buf = Vec::new();
    let n = stream.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Err(SessionError::Protocol("connection closed by server".into()));
    }
    let line = String::from_utf8_lossy(&buf).to_string();

    let literal = match parse_literal_len(&line) {
        Some(len) => {
            let mut bytes = vec![0u8; len];
            stream.read_exact(&mut bytes).await?;
            Some(bytes)
        }
        None => None,
    };
    Ok((line, literal))
}

/// `{n}` at the end of a line announces an n-byte literal.
fn parse_literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let open = trimmed.rfind('{')?;
    let inner = trimmed.get(open + 1..trimmed.len() - 1)?;
    if !trimmed.ends_with('}') {
        return None;
    }
    inner.parse().ok()
}

/// Extract UIDs from an untagged `* SEARCH 1 2 3` line.
fn parse_search_line(line: &str) -> Option<Vec<u32>> {
    let rest = line.strip_prefix("* SEARCH")?;
    Some(
        rest.split_whitespace()
            .filter_map(|tok| tok.parse().ok())
            .collect(),
    )
}

/// Extract the flag list from a FETCH response line.
fn parse_flags(line: &str) -> Vec<String> {
    let Some(start) = line.find("FLAGS (") else {
        return Vec::new();
    };
    let rest = &line[start + "FLAGS (".len()..];
    let Some(end) = rest.find(')') else {
        return Vec::new();
    };
    rest[..end]
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Quote an IMAP string argument.
fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// First word of a command, for log messages that must not echo credentials.
fn cmd_name(cmd: &str) -> &str {
    cmd.split_whitespace().next().unwrap_or(cmd)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_line_parses_uids() {
        assert_eq!(parse_search_line("* SEARCH 4 8 15"), Some(vec![4, 8, 15]));
        assert_eq!(parse_search_line("* SEARCH"), Some(vec![]));
        assert_eq!(parse_search_line("* EXISTS 3"), None);
    }

    #[test]
    fn flags_parsed_from_fetch_line() {
        let line = r"* 12 FETCH (UID 102 FLAGS (\Seen \Answered) BODY[] {342}";
        assert_eq!(parse_flags(line), vec![r"\Seen", r"\Answered"]);
    }

    #[test]
    fn flags_empty_when_absent() {
        assert!(parse_flags("* 12 FETCH (UID 102 BODY[] {10}").is_empty());
        assert!(parse_flags("* 12 FETCH (UID 102 FLAGS () BODY[] {10}").is_empty());
    }

    #[test]
    fn literal_length_detected() {
        assert_eq!(parse_literal_len("* 1 FETCH (BODY[] {342}\r\n"), Some(342));
        assert_eq!(parse_literal_len("W3 OK FETCH completed\r\n"), None);
        assert_eq!(parse_literal_len("* 1 FETCH (BODY[] {bad}\r\n"), None);
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"a"b"#), r#""a\"b""#);
        assert_eq!(quote(r"a\b"), r#""a\\b""#);
    }

    #[test]
    fn cmd_name_strips_arguments() {
        assert_eq!(cmd_name("LOGIN \"user\" \"hunter2\""), "LOGIN");
        assert_eq!(cmd_name("UID SEARCH UNSEEN"), "UID");
    }
}
