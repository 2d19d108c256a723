//! SP session management.
//!
//! Sessions carrying the raw SSO assertion are persisted in redb, cached in
//! memory, and evicted by a background task once expired.

pub mod cleanup;
pub mod lookup;
pub mod store;
pub mod types;

pub use cleanup::{spawn_cleanup_task, DEFAULT_CLEANUP_INTERVAL_SECS};
pub use lookup::{CookieSessionLookup, SessionLookup};
pub use store::SessionStore;
pub use types::{SessionId, SpSession, MAX_SESSION_TTL_SECS};
