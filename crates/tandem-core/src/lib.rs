//! # tandem-core
//!
//! The matching and active-conversation subsystem.
//!
//! [`MatchEngine`] is the single entry point. It owns the store handle and
//! the real-time [`EventHub`], and exposes the operations grouped by
//! concern:
//!
//! - swipe ledger: [`MatchEngine::record_swipe`], [`MatchEngine::swiped_targets`]
//! - match resolver: [`MatchEngine::resolve_match`]
//! - match lifecycle: [`MatchEngine::activate`], [`MatchEngine::end`]
//! - conversation channel: [`MatchEngine::send`], [`MatchEngine::mark_read`],
//!   [`MatchEngine::list_messages`], [`MatchEngine::subscribe`]
//! - listing: [`MatchEngine::list_matches`], [`MatchEngine::get_match`]
//!
//! All mutation of matches and messages goes through these methods; events
//! are published only after the corresponding write has committed.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hub;
pub mod ledger;
pub mod lifecycle;
pub mod listing;
pub mod resolver;

pub use channel::{Listener, MessagePage};
pub use config::CoreConfig;
pub use engine::{MatchEngine, ProfileView};
pub use error::{CoreError, ErrorKind, Result};
pub use events::{ConversationEvent, MatchEvent};
pub use hub::{EventHub, Subscription};
pub use ledger::SwipeOutcome;
pub use listing::MatchSummary;
pub use resolver::Resolution;
