use thiserror::Error;

use crate::moderation::{ModerationContext, ModerationPolicy};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 20;
pub const PASSWORD_MIN: usize = 3;
pub const DESCRIPTION_MAX: usize = 100;
pub const BIO_MAX: usize = 80;
pub const TEXT_POST_MAX: usize = 300;

/// Why a write was refused before it reached storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Username must be {USERNAME_MIN} to {USERNAME_MAX} characters long")]
    UsernameLength,

    #[error("Username may only contain letters")]
    UsernameCharacters,

    #[error("Username contains offensive words. Please choose a different username")]
    UsernameOffensive,

    #[error("Username already exists. Please choose a different username")]
    UsernameTaken,

    #[error("Password must be at least {PASSWORD_MIN} characters long")]
    PasswordTooShort,

    #[error("Description must be {DESCRIPTION_MAX} characters or less")]
    DescriptionTooLong,

    #[error("Your post contains blocked words. Please remove them")]
    ContentFlagged,

    #[error("Write something before posting")]
    PostEmpty,

    #[error("Posts must be {TEXT_POST_MAX} characters or less")]
    PostTooLong,

    #[error("Bio must be {BIO_MAX} characters or less")]
    BioTooLong,

    #[error("Unknown author: {0}")]
    UnknownAuthor(String),
}

/// Strip everything that is not an ASCII letter, the way the signup
/// form filters input as it is typed.
pub fn sanitize_username(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

/// Checks that do not need storage. Uniqueness is checked by the store.
pub fn validate_signup(
    policy: &ModerationPolicy,
    username: &str,
    password: &str,
) -> Result<(), Rejection> {
    if policy.is_flagged(ModerationContext::Username, username) {
        return Err(Rejection::UsernameOffensive);
    }

    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(Rejection::UsernameLength);
    }
    if !username.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Rejection::UsernameCharacters);
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(Rejection::PasswordTooShort);
    }

    Ok(())
}

pub fn validate_description(policy: &ModerationPolicy, description: &str) -> Result<(), Rejection> {
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(Rejection::DescriptionTooLong);
    }
    if policy.is_flagged(ModerationContext::Content, description) {
        return Err(Rejection::ContentFlagged);
    }
    Ok(())
}

/// A text post from the profile page: non-blank, at most
/// [`TEXT_POST_MAX`] characters, and clear of blocked words.
pub fn validate_text_post(policy: &ModerationPolicy, content: &str) -> Result<(), Rejection> {
    if content.trim().is_empty() {
        return Err(Rejection::PostEmpty);
    }
    if content.chars().count() > TEXT_POST_MAX {
        return Err(Rejection::PostTooLong);
    }
    if policy.is_flagged(ModerationContext::Content, content) {
        return Err(Rejection::ContentFlagged);
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<(), Rejection> {
    if bio.chars().count() > BIO_MAX {
        return Err(Rejection::BioTooLong);
    }
    Ok(())
}

/// Offset of a 1-based page. Pages and sizes below 1 are refused.
pub fn page_offset(page: i64, page_size: i64) -> Result<i64, String> {
    if page < 1 {
        return Err(format!("page must be 1 or greater, got {page}"));
    }
    if page_size < 1 {
        return Err(format!("page size must be 1 or greater, got {page_size}"));
    }
    page.checked_sub(1)
        .and_then(|p| p.checked_mul(page_size))
        .ok_or_else(|| format!("page {page} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModerationConfig;

    fn policy() -> ModerationPolicy {
        ModerationPolicy::new(&ModerationConfig {
            username_blocklist: vec!["jerk".into()],
            content_blocklist: vec!["contraband".into()],
        })
    }

    #[test]
    fn sanitize_strips_non_letters() {
        assert_eq!(sanitize_username("al1ce_99!"), "alce");
        assert_eq!(sanitize_username("Bob Smith"), "BobSmith");
        assert_eq!(sanitize_username("żółw"), "w");
    }

    #[test]
    fn username_length_bounds() {
        let p = policy();
        assert_eq!(validate_signup(&p, "ab", "pw123"), Err(Rejection::UsernameLength));
        assert_eq!(
            validate_signup(&p, &"a".repeat(21), "pw123"),
            Err(Rejection::UsernameLength)
        );
        assert!(validate_signup(&p, "abc", "pw123").is_ok());
        assert!(validate_signup(&p, &"a".repeat(20), "pw123").is_ok());
    }

    #[test]
    fn username_must_be_letters() {
        assert_eq!(
            validate_signup(&policy(), "alice1", "pw123"),
            Err(Rejection::UsernameCharacters)
        );
    }

    #[test]
    fn offensive_username_is_rejected() {
        assert_eq!(
            validate_signup(&policy(), "BigJerkFace", "pw123"),
            Err(Rejection::UsernameOffensive)
        );
    }

    #[test]
    fn short_password_is_rejected() {
        assert_eq!(
            validate_signup(&policy(), "alice", "pw"),
            Err(Rejection::PasswordTooShort)
        );
    }

    #[test]
    fn description_rules() {
        let p = policy();
        assert!(validate_description(&p, "").is_ok());
        assert!(validate_description(&p, &"x".repeat(100)).is_ok());
        assert_eq!(
            validate_description(&p, &"x".repeat(101)),
            Err(Rejection::DescriptionTooLong)
        );
        assert_eq!(
            validate_description(&p, "buy CONTRABAND"),
            Err(Rejection::ContentFlagged)
        );
    }

    #[test]
    fn text_post_rules() {
        let p = policy();
        assert!(validate_text_post(&p, "Share your ideas").is_ok());
        assert!(validate_text_post(&p, &"x".repeat(300)).is_ok());
        assert_eq!(validate_text_post(&p, "   "), Err(Rejection::PostEmpty));
        assert_eq!(
            validate_text_post(&p, &"x".repeat(301)),
            Err(Rejection::PostTooLong)
        );
        assert_eq!(
            validate_text_post(&p, "my Contraband stash"),
            Err(Rejection::ContentFlagged)
        );
    }

    #[test]
    fn bio_length_counts_chars() {
        assert!(validate_bio(&"é".repeat(80)).is_ok());
        assert_eq!(validate_bio(&"é".repeat(81)), Err(Rejection::BioTooLong));
    }

    #[test]
    fn page_offset_is_one_based() {
        assert_eq!(page_offset(1, 10), Ok(0));
        assert_eq!(page_offset(3, 10), Ok(20));
        assert!(page_offset(0, 10).is_err());
        assert!(page_offset(-1, 10).is_err());
        assert!(page_offset(1, 0).is_err());
        assert!(page_offset(i64::MAX, 10).is_err());
    }
}
