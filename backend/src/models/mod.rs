//! Data models for the Bamboo Forest backend.
//!
//! Field names serialize in camelCase to match the web client.

mod games;
mod poll;
mod profile;

pub use games::*;
pub use poll::*;
pub use profile::*;
