//! Configuration schema for the engine's own tunables. Loading this from a
//! CLI flag, env file, or RPC surface is the process boundary's job, not
//! this crate's; this only owns the `serde`-deserializable shape and a
//! convenience TOML loader.

mod config;

pub use config::{CursorEncryptionConfig, EngineConfig, RetryPolicy};
