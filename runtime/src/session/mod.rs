//! Session management
//!
//! A session is one conversation's ordered, append-only turn history. The
//! `SessionStore` trait is the durability side of it; the conversation runtime
//! keeps the live copy of every session it is executing and treats the store
//! as a write-behind target.

pub mod adapters;
pub mod store;

pub use adapters::{InMemorySessionStore, ManagedSessionStore};
pub use store::{Session, SessionState, SessionStore, SessionStoreError, SessionStoreRef};
