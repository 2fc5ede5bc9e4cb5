//! Block-list moderation shared by usernames and post content.
//!
//! Each context has its own word list, but both are matched by the same
//! policy: a text is flagged when its lowercased form contains any
//! lowercased blocked word as a substring.

use aho_corasick::AhoCorasick;

use crate::config::ModerationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationContext {
    Username,
    Content,
}

#[derive(Debug, Default)]
pub struct ModerationPolicy {
    username: Option<AhoCorasick>,
    content: Option<AhoCorasick>,
}

impl ModerationPolicy {
    pub fn new(config: &ModerationConfig) -> Self {
        Self {
            username: build_automaton(&config.username_blocklist),
            content: build_automaton(&config.content_blocklist),
        }
    }

    /// A policy that flags nothing.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn is_flagged(&self, context: ModerationContext, text: &str) -> bool {
        let automaton = match context {
            ModerationContext::Username => self.username.as_ref(),
            ModerationContext::Content => self.content.as_ref(),
        };

        match automaton {
            Some(ac) => ac.is_match(&text.to_lowercase()),
            None => false,
        }
    }
}

fn build_automaton(words: &[String]) -> Option<AhoCorasick> {
    let lowered: Vec<String> = words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    if lowered.is_empty() {
        return None;
    }

    match AhoCorasick::new(&lowered) {
        Ok(ac) => {
            tracing::debug!(count = lowered.len(), "moderation automaton built");
            Some(ac)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to build moderation automaton");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ModerationPolicy {
        ModerationPolicy::new(&ModerationConfig {
            username_blocklist: vec!["badword".into(), "Jerk".into()],
            content_blocklist: vec!["contraband".into(), "  ".into()],
        })
    }

    #[test]
    fn flags_substring_case_insensitively() {
        let p = policy();
        assert!(p.is_flagged(ModerationContext::Username, "xxBADWORDxx"));
        assert!(p.is_flagged(ModerationContext::Username, "bigjerk"));
        assert!(p.is_flagged(ModerationContext::Content, "selling ConTraBand here"));
    }

    #[test]
    fn clean_text_passes() {
        let p = policy();
        assert!(!p.is_flagged(ModerationContext::Username, "alice"));
        assert!(!p.is_flagged(ModerationContext::Content, "a nice sunset"));
        assert!(!p.is_flagged(ModerationContext::Content, ""));
    }

    #[test]
    fn contexts_use_their_own_lists() {
        let p = policy();
        assert!(!p.is_flagged(ModerationContext::Content, "badword"));
        assert!(!p.is_flagged(ModerationContext::Username, "contraband"));
    }

    #[test]
    fn blank_words_are_ignored() {
        let p = ModerationPolicy::new(&ModerationConfig {
            username_blocklist: vec!["".into(), " ".into()],
            content_blocklist: vec![],
        });
        assert!(!p.is_flagged(ModerationContext::Username, "anything at all"));
    }

    #[test]
    fn permissive_policy_flags_nothing() {
        let p = ModerationPolicy::permissive();
        assert!(!p.is_flagged(ModerationContext::Username, "badword"));
        assert!(!p.is_flagged(ModerationContext::Content, "contraband"));
    }
}
