//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `profiles`, `swipes`, `matches` and
//! `messages`, together with the uniqueness constraints that make swipe
//! recording write-once and match creation idempotent.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (only the fields the matching core touches)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    user_id         TEXT PRIMARY KEY NOT NULL,   -- UUID
    display_name    TEXT,
    active_match_id TEXT,                        -- default conversation hint
    created_at      TEXT NOT NULL                -- RFC-3339, microseconds
);

-- ----------------------------------------------------------------
-- Swipes (append-only, write-once per ordered pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS swipes (
    id         TEXT PRIMARY KEY NOT NULL,
    swiper_id  TEXT NOT NULL,
    swiped_id  TEXT NOT NULL,
    direction  TEXT NOT NULL CHECK (direction IN ('like', 'pass')),
    created_at TEXT NOT NULL,

    UNIQUE (swiper_id, swiped_id),
    CHECK (swiper_id <> swiped_id),
    FOREIGN KEY (swiper_id) REFERENCES profiles(user_id) ON DELETE CASCADE,
    FOREIGN KEY (swiped_id) REFERENCES profiles(user_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_swipes_swiped ON swipes(swiped_id, direction);

-- ----------------------------------------------------------------
-- Matches (one row per canonical unordered pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS matches (
    id         TEXT PRIMARY KEY NOT NULL,
    user_a     TEXT NOT NULL,
    user_b     TEXT NOT NULL,
    status     TEXT NOT NULL CHECK (status IN ('pending', 'active', 'ended')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (user_a, user_b),
    CHECK (user_a < user_b),
    FOREIGN KEY (user_a) REFERENCES profiles(user_id) ON DELETE CASCADE,
    FOREIGN KEY (user_b) REFERENCES profiles(user_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_matches_user_b ON matches(user_b);

-- ----------------------------------------------------------------
-- Messages (seq is the monotonic tie-break for equal timestamps)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL UNIQUE,
    match_id   TEXT NOT NULL,
    sender_id  TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    read_at    TEXT,

    FOREIGN KEY (match_id) REFERENCES matches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_match_seq ON messages(match_id, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
