use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest identifier accepted from collaborators.
pub const MAX_ID_LEN: usize = 128;

/// Error type for identifiers that fail validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    #[error("{kind} exceeds the maximum identifier length")]
    TooLong { kind: &'static str },
}

fn validate(kind: &'static str, raw: String) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if trimmed.chars().count() > MAX_ID_LEN {
        return Err(IdError::TooLong { kind });
    }
    if trimmed.len() == raw.len() {
        Ok(raw)
    } else {
        Ok(trimmed.to_string())
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier (trimmed, non-empty, bounded length).
            ///
            /// # Errors
            ///
            /// Returns `IdError` if the value is empty or too long.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                validate($kind, value.into()).map(Self)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Identity of a learner, supplied by the identity collaborator.
    UserId,
    "user id"
);
string_id!(
    /// Identifier of a catalog course.
    CourseId,
    "course id"
);
string_id!(
    /// Identifier of a section within a course outline.
    SectionId,
    "section id"
);
string_id!(
    /// Identifier of a quiz.
    QuizId,
    "quiz id"
);
string_id!(
    /// Name of a tracked competency.
    SkillId,
    "skill id"
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_trimmed() {
        let id = CourseId::new("  rust-101 ").unwrap();
        assert_eq!(id.as_str(), "rust-101");
        assert_eq!(id.to_string(), "rust-101");
    }

    #[test]
    fn blank_id_is_rejected() {
        let err = UserId::new("   ").unwrap_err();
        assert_eq!(err, IdError::Empty { kind: "user id" });
    }

    #[test]
    fn overlong_id_is_rejected() {
        let raw = "x".repeat(MAX_ID_LEN + 1);
        assert!(matches!(
            SectionId::new(raw),
            Err(IdError::TooLong { kind: "section id" })
        ));
    }

    #[test]
    fn parse_from_str() {
        let quiz: QuizId = "q1".parse().unwrap();
        assert_eq!(quiz, QuizId::new("q1").unwrap());
    }

    #[test]
    fn deserialization_validates() {
        let ok: SkillId = serde_json::from_str("\"ownership\"").unwrap();
        assert_eq!(ok.as_str(), "ownership");
        assert!(serde_json::from_str::<SkillId>("\"  \"").is_err());
    }
}
