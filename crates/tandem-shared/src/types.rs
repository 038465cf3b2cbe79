use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn short(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s.trim())?))
            }
        }
    };
}

uuid_id!(
    /// Opaque identity of an authenticated user. The derived `Ord` is the
    /// total order used for canonical pair ordering.
    UserId
);
uuid_id!(MatchId);
uuid_id!(MessageId);

/// Map an unordered pair of users to `(lower, higher)`.
///
/// Every match row is keyed by this ordering, so `{a, b}` and `{b, a}` land
/// on the same storage key.
pub fn canonical_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ---------------------------------------------------------------------------
// Swipe direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Like,
    Pass,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Pass => "pass",
        }
    }
}

impl FromStr for SwipeDirection {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "pass" => Ok(Self::Pass),
            other => Err(ParseError::SwipeDirection(other.to_string())),
        }
    }
}

impl fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Match status
// ---------------------------------------------------------------------------

/// Lifecycle of a match: `Pending -> Active <-> Pending`, any -> `Ended`.
/// `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Active,
    Ended,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(ParseError::MatchStatus(other.to_string())),
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_order_independent() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(canonical_pair(a, b), canonical_pair(b, a));
        let (lo, hi) = canonical_pair(a, b);
        assert!(lo < hi);
    }

    #[test]
    fn status_text_round_trip() {
        for status in [MatchStatus::Pending, MatchStatus::Active, MatchStatus::Ended] {
            assert_eq!(status.as_str().parse::<MatchStatus>().unwrap(), status);
        }
        assert!("archived".parse::<MatchStatus>().is_err());
    }

    #[test]
    fn direction_serializes_lowercase() {
        let json = serde_json::to_string(&SwipeDirection::Like).unwrap();
        assert_eq!(json, "\"like\"");
        assert!("maybe".parse::<SwipeDirection>().is_err());
    }

    #[test]
    fn user_id_parses_and_serializes_transparently() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }
}
