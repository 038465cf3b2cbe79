//! Identifier and enum types shared by every tandem crate.

pub mod constants;
pub mod error;
pub mod types;

pub use error::ParseError;
pub use types::{canonical_pair, MatchId, MatchStatus, MessageId, SwipeDirection, UserId};
