// Module declarations
pub mod connector;
pub mod persistence;
pub mod search;

// Re-export all implementations
pub use connector::{InMemoryConnector, MEMORY_SCHEME};
pub use persistence::InMemoryDocumentRepository;
pub use search::InMemoryIndex;
