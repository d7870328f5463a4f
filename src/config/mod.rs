//! Configuration module for the broker definitions tool.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `brokerdefs.yaml`
//! - `.env` loading and environment overrides
//! - Validation of configuration values
//! - Loading the JSON input files (definitions, ignore lists, usage)

mod parser;
mod spec;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_PASSWORD, ENV_URL, ENV_USERNAME, find_config_file,
    load_definitions, load_ignore_list, load_usage,
};
pub use spec::{AuditConfig, BrokerConfig, DeploySettings, ToolConfig};
