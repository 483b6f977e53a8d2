//! Run configuration: a partial TOML file merged with command-line
//! overrides into the core's [`TriangleConfig`] and [`RunOptions`].

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::info;
use trirotate::workflows::rotate::{RunOptions, TriangleConfig};

use crate::cli::RunArgs;
use crate::error::{CliError, Result};

/// The on-disk shape of a run configuration; every field is optional so a
/// file only has to pin down what the command line does not.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    pub side_length: Option<i32>,
    pub set_center: Option<bool>,
    pub seed: Option<u64>,
    pub max_activations: Option<u64>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Resolve the final configuration; explicit flags beat file values.
    pub fn merge_with_cli(self, args: &RunArgs) -> Result<(TriangleConfig, RunOptions)> {
        let side_length = args.side_length.or(self.side_length).ok_or_else(|| {
            CliError::Argument(
                "a side length is required (--side-length or `side_length` in the config file)"
                    .to_string(),
            )
        })?;

        let set_center = if args.center.set_center {
            true
        } else if args.center.discover_center {
            false
        } else {
            self.set_center.unwrap_or(false)
        };

        let seed = match args.seed.or(self.seed) {
            Some(seed) => seed,
            None => {
                let seed = time_seed();
                info!(seed, "no seed given, derived one from the clock");
                seed
            }
        };

        let config = TriangleConfig {
            side_length,
            set_center,
            seed,
        };
        let options = RunOptions {
            max_activations: args.max_activations.or(self.max_activations),
        };
        Ok((config, options))
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
