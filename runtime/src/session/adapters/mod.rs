pub mod in_memory;
pub mod managed;

pub use in_memory::InMemorySessionStore;
pub use managed::ManagedSessionStore;
