//! Configuration loading for the linglear session core.
//!
//! Uses figment: serialized defaults, an optional YAML file, then
//! `LINGLEAR_*` environment overrides.

pub mod schema;

pub use schema::{
    ApiConfig, Config, ENV_PREFIX, IdentityConfig, LoopbackConfig, RefreshConfig, StorageConfig,
};
