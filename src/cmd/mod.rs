//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled        |
//! |-------------|-------------------------|
//! | `summarize` | `Summarize`, `Batch`    |
//! | `tokens`    | `Tokens`                |
//! | `chunks`    | `Chunks`                |
//! | `config`    | `Config`                |

pub mod chunks;
pub mod config;
pub mod summarize;
pub mod tokens;

pub use chunks::cmd_chunks;
pub use config::cmd_config;
pub use summarize::{cmd_batch, cmd_summarize};
pub use tokens::cmd_tokens;

use anyhow::{Context, Result};
use std::path::Path;

use condense::config::CondenseConfig;

use super::Cli;

/// Load configuration for a command, honouring `--config`.
pub(crate) fn load_config(cli: &Cli, work_dir: &Path) -> Result<CondenseConfig> {
    let config = CondenseConfig::discover(cli.config.as_deref(), work_dir)
        .context("Failed to load configuration")?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}
