/// Default upper bound on message length, in characters, after trimming
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;

/// Default page size for message listing
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Hard cap on message listing page size
pub const MAX_PAGE_SIZE: u32 = 200;

/// Default capacity of each real-time topic buffer
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Header carrying the authenticated caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";
