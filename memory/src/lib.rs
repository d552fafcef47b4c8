// The membot-memory crate is the client side of the long-term memory store.
// It defines the `MemoryIndex` interface the commit pipeline and the retrieval
// hook talk to, an in-process index for development and tests, and the REST
// client for the managed memory bank.

pub mod broker;
pub mod errors;
pub mod in_memory;
pub mod index;
pub mod memory_bank;
mod memory;

pub use broker::format_memories_for_prompt;
pub use errors::MemoryIndexError;
pub use in_memory::InMemoryMemoryIndex;
pub use index::{IngestReceipt, MemoryIndex, MemoryIndexRef};
pub use memory::{MemoryRecord, MemorySnippet};
pub use memory_bank::MemoryBankClient;
