use tandem_shared::constants::{
    DEFAULT_EVENT_BUFFER, DEFAULT_MAX_MESSAGE_CHARS, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

/// Tunables for [`MatchEngine`](crate::MatchEngine).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Longest accepted message, in characters after trimming.
    pub max_message_chars: usize,

    /// Page size used when a caller does not ask for one.
    pub default_page_size: u32,

    /// Upper bound on any requested page size.
    pub max_page_size: u32,

    /// Capacity of each per-match and per-user event buffer. A subscriber
    /// that falls further behind skips ahead and must re-fetch.
    pub event_buffer: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl CoreConfig {
    /// Clamp a requested page size into `[1, max_page_size]`.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}
