//! # Module Runtime Configuration
//!
//! Startup parameters for a runtime instance: where the middleware listens,
//! which host/user/device this runtime speaks for, and connection limits.
//!
//! ## Sources
//!
//! Later sources override earlier ones:
//!
//! 1. Built-in defaults ([`RuntimeConfig::default`])
//! 2. An optional TOML file
//! 3. `MODULE_RUNTIME_*` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load(Some("config/runtime.toml".as_ref()))?;
//! println!("middleware at {}", config.socket_address);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod runtime_config;

// Re-export commonly used types
pub use runtime_config::{RuntimeConfig, ENV_PREFIX};
