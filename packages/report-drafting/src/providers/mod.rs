//! Vendor implementations of the model collaborator traits.
//!
//! Enable with the `openai` (hosted) or `ollama` (on-premises) feature.
//! Applications can also implement the traits themselves.

#[cfg(feature = "ollama")]
mod ollama;
#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "ollama")]
pub use ollama::Ollama;
#[cfg(feature = "openai")]
pub use openai::OpenAI;
