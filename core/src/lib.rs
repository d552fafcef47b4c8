// Shared building blocks for the membot workspace:
// - Conversation data model (turns, session keys, snapshots)
// - Configuration loading
// - Shared error types
// - Generative model client

// Export types module - Turns, session keys and memory scopes
pub mod types;
pub use types::*;

// Export config module - Configuration loading and backend selection
pub mod config;
pub use config::{AppConfig, Backend, CommitPolicy, ManagedTarget};

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;

// Export client module - generateContent client
pub mod client;
pub use client::ModelClient;
