//! OpenPGP user-ID parsing.
//!
//! User IDs on this network follow the conventional forms
//! `Name (Comment) <email>` and `Name <email>`. Only the email part carries
//! meaning: `localpart@domain` is the externally visible account address.

use std::fmt;

/// A parsed OpenPGP user ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId {
    pub name: String,
    pub comment: Option<String>,
    pub email: String,
}

impl UserId {
    /// Parses `Name (Comment) <email>` or `Name <email>`.
    ///
    /// Returns `None` when the string matches neither form. The email must
    /// be the last bracketed component and a space must precede it.
    pub fn parse(uid: &str) -> Option<UserId> {
        let open = uid.rfind('<')?;
        let close = uid.rfind('>')?;
        if close != uid.len() - 1 || close < open {
            return None;
        }
        let email = uid[open + 1..close].to_string();
        let head = uid[..open].strip_suffix(' ')?;

        if let Some(stripped) = head.strip_suffix(')') {
            if let Some(par) = stripped.rfind(" (") {
                return Some(UserId {
                    name: stripped[..par].to_string(),
                    comment: Some(stripped[par + 2..].to_string()),
                    email,
                });
            }
        }

        Some(UserId {
            name: head.to_string(),
            comment: None,
            email,
        })
    }

    /// Splits the email into `(localpart, domain)`.
    pub fn address_parts(&self) -> Option<(&str, &str)> {
        let at = self.email.rfind('@')?;
        Some((&self.email[..at], &self.email[at + 1..]))
    }

    /// The domain part of the email, if any.
    pub fn domain(&self) -> Option<&str> {
        self.address_parts().map(|(_, domain)| domain)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(comment) = &self.comment {
            write!(f, " ({comment})")?;
        }
        write!(f, " <{}>", self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_form() {
        let uid = UserId::parse("Example User <user@example.com>").unwrap();
        assert_eq!(uid.name, "Example User");
        assert_eq!(uid.comment, None);
        assert_eq!(uid.email, "user@example.com");
    }

    #[test]
    fn parses_commented_form() {
        let uid = UserId::parse("Example User (Test comment) <user@example.com>").unwrap();
        assert_eq!(uid.name, "Example User");
        assert_eq!(uid.comment.as_deref(), Some("Test comment"));
        assert_eq!(uid.email, "user@example.com");
    }

    #[test]
    fn rejects_malformed() {
        assert!(UserId::parse("user@example.com").is_none());
        assert!(UserId::parse("Example User").is_none());
        // missing the space before the bracket
        assert!(UserId::parse("Example<user@example.com>").is_none());
        // trailing garbage after the bracket
        assert!(UserId::parse("Example <user@example.com> x").is_none());
    }

    #[test]
    fn splits_address() {
        let uid = UserId::parse("Alice <alice@example.org>").unwrap();
        assert_eq!(uid.address_parts(), Some(("alice", "example.org")));
        assert_eq!(uid.domain(), Some("example.org"));
    }

    #[test]
    fn display_round_trips() {
        for s in [
            "Alice <alice@example.org>",
            "Alice (laptop) <alice@example.org>",
        ] {
            assert_eq!(UserId::parse(s).unwrap().to_string(), s);
        }
    }
}
