// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command line and configuration loading.

use anyhow::{Context, Result};
use cadence_core::{SessionConfig, StreamConfig};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Runs a Cadence session over simulated token streams and writes one JSON
/// frame per tick to standard output.
#[derive(Parser, Debug)]
#[command(name = "cadence-runtime", version)]
pub struct Args {
    /// Session configuration file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Simulated streams to start when the configuration lists none.
    #[arg(long, default_value_t = 2)]
    pub streams: usize,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long, value_name = "SECS")]
    pub duration_secs: Option<u64>,

    /// Default log filter. `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Hardware polling interval in milliseconds. `0` disables polling.
    #[arg(long, default_value_t = 500)]
    pub device_poll_ms: u64,

    /// Seed for the stream simulator.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Reads the session configuration, or the defaults when no path is given.
///
/// A configuration without streams gets `fallback_streams` simulated ones
/// named `sim-0`, `sim-1`, ...
pub fn load_config(path: Option<&Path>, fallback_streams: usize) -> Result<SessionConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<SessionConfig>(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => SessionConfig::default(),
    };

    if config.streams.is_empty() {
        config.streams = (0..fallback_streams)
            .map(|i| StreamConfig::new(format!("sim-{i}")))
            .collect();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("config/cadence.toml")
    }

    #[test]
    fn test_sample_config_loads() {
        let config = load_config(Some(&sample_path()), 4).unwrap();
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams[1].id.as_str(), "model-b");
        assert_eq!(config.streams[1].weight, 0.5);
        assert_eq!(config.emitter.queue_capacity, 1);
    }

    #[test]
    fn test_missing_streams_are_simulated() {
        let config = load_config(None, 3).unwrap();
        let ids: Vec<&str> = config.streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sim-0", "sim-1", "sim-2"]);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/cadence.toml")), 1).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "cadence-runtime",
            "--streams",
            "3",
            "--duration-secs",
            "5",
            "--device-poll-ms",
            "0",
        ])
        .unwrap();
        assert_eq!(args.streams, 3);
        assert_eq!(args.duration_secs, Some(5));
        assert_eq!(args.device_poll_ms, 0);
        assert_eq!(args.log_level, "info");
        assert!(args.config.is_none());
    }
}
