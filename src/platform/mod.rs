//! Platform process primitives
//!
//! The coordination core relies on fork semantics (inherited shared
//! mappings and descriptors), so only Unix is supported.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::ForkCreator;
