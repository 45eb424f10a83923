//! Which processes get the custom config

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

/// Which config file a process should be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigVariant {
    /// `pif.json`
    Default,
    /// `custom.pif.json`, falling back to `pif.json`
    Override,
}

impl ConfigVariant {
    /// The byte a requester sends to select this variant.
    pub fn selector(self) -> u8 {
        match self {
            ConfigVariant::Default => 0,
            ConfigVariant::Override => 1,
        }
    }

    pub fn from_selector(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ConfigVariant::Default),
            1 => Some(ConfigVariant::Override),
            _ => None,
        }
    }
}

/// Process names listed in `target.txt`, one per line.
///
/// Lines are trimmed. Blank lines and lines starting with `#` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    targets: HashSet<String>,
}

impl TargetList {
    pub fn parse(contents: &str) -> Self {
        let targets = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { targets }
    }

    /// Read the list from disk. A missing or unreadable file is an empty list.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let list = Self::parse(&contents);
                debug!("Loaded {} targets from {}", list.len(), path.display());
                list
            }
            Err(e) => {
                warn!("Failed to open target list file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, process: &str) -> bool {
        self.targets.contains(process)
    }

    pub fn classify(&self, process: &str) -> ConfigVariant {
        if self.contains(process) {
            ConfigVariant::Override
        } else {
            ConfigVariant::Default
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
