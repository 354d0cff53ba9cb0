//! Data types for the drafting library.

pub mod analysis;
pub mod building;
pub mod config;
pub mod draft;
pub mod evidence;
pub mod retrieval;
pub mod section;
pub mod style;
