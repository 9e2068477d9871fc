// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulator configuration.
//!
//! ```toml
//! arena_pages = 1024
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::pte::PPN_BITS;

/// Arena size used when no configuration is supplied (4 MiB).
pub const DEFAULT_ARENA_PAGES: usize = 1024;

/// Tunables for a [`crate::Vms`] instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmsConfig {
    /// Number of physical pages in the arena.
    pub arena_pages: usize,
}

impl Default for VmsConfig {
    fn default() -> Self {
        Self { arena_pages: DEFAULT_ARENA_PAGES }
    }
}

impl VmsConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.arena_pages == 0 {
            return Err(Error::Config("arena_pages must be non-zero".into()));
        }
        if (self.arena_pages as u64) >> PPN_BITS != 0 {
            return Err(Error::Config(format!("arena_pages {} exceeds the PPN range", self.arena_pages)));
        }
        Ok(())
    }
}
