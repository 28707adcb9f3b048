//! Post-processing strategy variants.
//!
//! Each variant fixes both sides of a coupled pair: which candidates
//! are selected, and what happens to a message on the server after it
//! has been durably recorded. Keeping the pair in one enum makes a
//! mismatched combination unrepresentable.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Candidate selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every message in the folder.
    All,
    /// Only messages without the `\Seen` flag at listing time.
    UnseenOnly,
}

/// Server-side action applied after successful persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    /// Leave the message untouched.
    None,
    /// Add the `\Seen` flag.
    MarkSeen,
}

/// How a mailbox is processed, fixed for the duration of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Process everything, change nothing on the server.
    #[default]
    NoMutate,
    /// Process everything, mark processed messages as read.
    MarkSeen,
    /// Process only unread messages, then mark them read so the next
    /// cycle does not revisit them.
    UnseenOnlyThenMark,
    /// Process only unread messages and leave them unread. Duplicate
    /// suppression by stable id is the only reprocessing guard; if the
    /// store is ever reset, the folder's history is reprocessed on the
    /// next cycle. Accepted behavior for audit/monitoring use.
    UnseenOnlyNoMark,
}

impl Strategy {
    /// Candidate selection predicate coupled to this strategy.
    pub fn selection(self) -> Selection {
        match self {
            Strategy::NoMutate | Strategy::MarkSeen => Selection::All,
            Strategy::UnseenOnlyThenMark | Strategy::UnseenOnlyNoMark => Selection::UnseenOnly,
        }
    }

    /// Post-fetch server action coupled to this strategy.
    pub fn post_action(self) -> PostAction {
        match self {
            Strategy::NoMutate | Strategy::UnseenOnlyNoMark => PostAction::None,
            Strategy::MarkSeen | Strategy::UnseenOnlyThenMark => PostAction::MarkSeen,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::NoMutate => "no-mutate",
            Strategy::MarkSeen => "mark-seen",
            Strategy::UnseenOnlyThenMark => "unseen-then-mark",
            Strategy::UnseenOnlyNoMark => "unseen-no-mark",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-mutate" => Ok(Strategy::NoMutate),
            "mark-seen" => Ok(Strategy::MarkSeen),
            "unseen-then-mark" => Ok(Strategy::UnseenOnlyThenMark),
            "unseen-no-mark" => Ok(Strategy::UnseenOnlyNoMark),
            other => Err(ConfigError::InvalidValue {
                key: "strategy".into(),
                message: format!(
                    "unknown strategy {other:?} (expected no-mutate, mark-seen, \
                     unseen-then-mark or unseen-no-mark)"
                ),
            }),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_and_action_are_coupled() {
        assert_eq!(Strategy::NoMutate.selection(), Selection::All);
        assert_eq!(Strategy::NoMutate.post_action(), PostAction::None);

        assert_eq!(Strategy::MarkSeen.selection(), Selection::All);
        assert_eq!(Strategy::MarkSeen.post_action(), PostAction::MarkSeen);

        assert_eq!(Strategy::UnseenOnlyThenMark.selection(), Selection::UnseenOnly);
        assert_eq!(Strategy::UnseenOnlyThenMark.post_action(), PostAction::MarkSeen);

        assert_eq!(Strategy::UnseenOnlyNoMark.selection(), Selection::UnseenOnly);
        assert_eq!(Strategy::UnseenOnlyNoMark.post_action(), PostAction::None);
    }

    #[test]
    fn parse_round_trips() {
        for s in [
            Strategy::NoMutate,
            Strategy::MarkSeen,
            Strategy::UnseenOnlyThenMark,
            Strategy::UnseenOnlyNoMark,
        ] {
            assert_eq!(s.as_str().parse::<Strategy>().unwrap(), s);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("delete-everything".parse::<Strategy>().is_err());
    }

    #[test]
    fn default_is_no_mutate() {
        assert_eq!(Strategy::default(), Strategy::NoMutate);
    }
}
