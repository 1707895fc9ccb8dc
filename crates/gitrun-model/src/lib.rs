//! Plain data shared by the gitrun crates.
//!
//! Holds the executor configuration (deserializable from JSON/TOML/etc.) and the small value types that
//! travel through the execution core: process environment, output encoding and invocation outcomes.
mod config;
pub use config::*;

mod domain;
pub use domain::*;
