//! Configuration for setup runs.
//!
//! Settings come from defaults and environment variables.

mod settings;

pub use settings::{
    SetupConfig, DEFAULT_USER_AGENT, OUTPUT_DIR_ENV_VAR, TIMEOUT_ENV_VAR, TOKEN_ENV_VARS,
};
