//! Core application plumbing.
//!
//! Holds the configuration layer shared by the CLI and the library.

mod config;

pub use config::{Config, EvalsConfig, GeneralConfig, NotifyConfig, OutputConfig, LOCAL_CONFIG};
