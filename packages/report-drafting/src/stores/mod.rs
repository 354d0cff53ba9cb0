//! Embedding index implementations.

mod memory;

pub use memory::MemoryIndex;
