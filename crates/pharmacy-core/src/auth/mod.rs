//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionStore`: in-memory session with change notifications
//! - `TokenStorage`: durable token persistence (file, OS keychain, memory)
//!
//! The store is the only writer of token storage; everything else reads the
//! token through the store or asks it to end the session.

pub mod session;
pub mod storage;

pub use session::{
    IdentityFetch, IdentityFetcher, IdentityOutcome, Session, SessionError, SessionStore,
    SessionSubscription,
};
pub use storage::{
    FileTokenStorage, KeyringTokenStorage, MemoryTokenStorage, StorageError, TokenStorage,
};
