//! # Skein Node Configuration
//!
//! Configuration model for one runtime process: worker count, listen
//! addresses, remote actor placement, proxy session tuning and shutdown
//! bounds.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use node_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load("config/node.toml")?;
//! config.validate()?;
//! println!("workers = {}", config.workers);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Values come from the TOML file first, then from `SKEIN__`-prefixed
//! environment variables (`SKEIN__PROXY__SECRET=...`).

pub mod defaults;
pub mod runtime_config;

pub use runtime_config::{
    CustomListenerConfig, Distribution, ProxyConfig, RemoteActorConfig, RuntimeConfig,
    ShutdownConfig,
};
