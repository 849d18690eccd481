// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use anyhow::{Result, bail};

use crate::commands::{Cli, FormatArg};

pub struct Config {
    pub format: OutputFormat,
    pub max_concurrency: usize,
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            max_concurrency: 20,
            verbose: 0,
        }
    }
}

impl Config {
    /// Build the runtime configuration from parsed arguments.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = Self::default();
        config.format = match cli.format {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        };
        if let Some(n) = cli.max_concurrency {
            if n == 0 {
                bail!("--max-concurrency must be at least 1");
            }
            config.max_concurrency = n;
        }
        config.verbose = cli.verbose;
        Ok(config)
    }
}
