//! Core trait abstractions for the drafting library.
//!
//! Applications implement these to plug in model vendors, asset storage
//! and a vector index.

pub mod ai;
pub mod assets;
pub mod index;
