pub mod in_memory_repository;
mod query;

pub use in_memory_repository::InMemoryDocumentRepository;
