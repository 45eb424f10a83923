//! Path utilities

use std::path::{Path, PathBuf};

/// Where the module is installed by the root manager.
pub const MODULE_DIR: &str = "/data/adb/modules/playintegrityfix";

const DEFAULT_CONFIG: &str = "pif.json";
const CUSTOM_CONFIG: &str = "custom.pif.json";
const TARGET_LIST: &str = "target.txt";

/// The files the module reads, all relative to one module directory.
///
/// Only the companion process can read the config files. The target list is
/// read from inside zygote at load time, before any app is specialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    root: PathBuf,
}

impl Default for ModulePaths {
    fn default() -> Self {
        Self::new(MODULE_DIR)
    }
}

impl ModulePaths {
    /// Use `root` as the module directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The module directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The default configuration, `pif.json`
    pub fn default_config(&self) -> PathBuf {
        self.root.join(DEFAULT_CONFIG)
    }

    /// The per-target override configuration, `custom.pif.json`
    pub fn custom_config(&self) -> PathBuf {
        self.root.join(CUSTOM_CONFIG)
    }

    /// The list of target process names, `target.txt`
    pub fn target_list(&self) -> PathBuf {
        self.root.join(TARGET_LIST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_live_in_module_dir() {
        let paths = ModulePaths::default();
        assert_eq!(
            paths.default_config(),
            PathBuf::from("/data/adb/modules/playintegrityfix/pif.json")
        );
        assert_eq!(
            paths.custom_config(),
            PathBuf::from("/data/adb/modules/playintegrityfix/custom.pif.json")
        );
        assert_eq!(
            paths.target_list(),
            PathBuf::from("/data/adb/modules/playintegrityfix/target.txt")
        );
    }

    #[test]
    fn custom_root() {
        let paths = ModulePaths::new("/tmp/pif");
        assert_eq!(paths.root(), Path::new("/tmp/pif"));
        assert_eq!(paths.target_list(), PathBuf::from("/tmp/pif/target.txt"));
    }
}
