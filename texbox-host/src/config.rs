//! Host configuration
//!
//! Geometry of the guest memory, asset naming and execution limits.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size of one wasm page in bytes
pub const PAGE_SIZE: usize = 64 * 1024;

/// Largest memory whose end address still fits a 32-bit control word
pub const MAX_MEMORY_PAGES: u32 = 65535;

/// Names and directories inside the content store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetLayout {
    /// Compressed engine binary
    pub engine: String,

    /// Compressed memory snapshot
    pub snapshot: String,

    /// Directory of compressed individual TeX files
    pub tex_files: String,

    /// Directory of package manifests
    pub packages: String,

    /// Directory of TikZ library manifests
    pub libraries: String,
}

impl Default for AssetLayout {
    fn default() -> Self {
        Self {
            engine: "tex.wasm.gz".to_string(),
            snapshot: "core.dump.gz".to_string(),
            tex_files: "tex_files".to_string(),
            packages: "packages".to_string(),
            libraries: "tikz_libs".to_string(),
        }
    }
}

/// Configuration for the typesetting host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Fixed size of the guest memory in wasm pages
    pub memory_pages: u32,

    /// Pages at the top of memory reserved for the suspension buffer
    pub continuation_pages: u32,

    /// Base name of the input document (`<name>.tex` in, `<name>.dvi` out)
    pub input_name: String,

    /// Fuel limit per session (CPU limit); `None` runs unmetered
    pub fuel_limit: Option<u64>,

    /// Maximum wasm stack size in bytes
    pub max_stack_size: usize,

    /// Number of parallel execution contexts
    pub contexts: usize,

    pub assets: AssetLayout,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            memory_pages: 1100,
            continuation_pages: 100,
            input_name: "input".to_string(),
            fuel_limit: None,
            max_stack_size: 1024 * 1024, // 1MB, below tokio worker stacks
            contexts: 1,
            assets: AssetLayout::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from a JSON file, filling unset fields with defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: HostConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check memory geometry and context count
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_pages > MAX_MEMORY_PAGES {
            return Err(ConfigError::MemoryTooLarge {
                pages: self.memory_pages,
                max: MAX_MEMORY_PAGES,
            });
        }
        if self.continuation_pages == 0 || self.continuation_pages >= self.memory_pages {
            return Err(ConfigError::Geometry {
                memory: self.memory_pages,
                continuation: self.continuation_pages,
            });
        }
        if self.contexts == 0 {
            return Err(ConfigError::NoContexts);
        }
        Ok(())
    }

    /// Name of the document the engine reads
    pub fn input_file(&self) -> String {
        format!("{}.tex", self.input_name)
    }

    /// Name of the page description the engine writes
    pub fn output_file(&self) -> String {
        format!("{}.dvi", self.input_name)
    }

    /// Script typed at the engine's terminal
    pub fn terminal_input(&self) -> String {
        format!(" {} \n\\end\n", self.input_file())
    }

    /// Guest memory size in bytes
    pub fn memory_bytes(&self) -> usize {
        self.memory_pages as usize * PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.input_file(), "input.tex");
        assert_eq!(config.output_file(), "input.dvi");
        assert_eq!(config.terminal_input(), " input.tex \n\\end\n");
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let config = HostConfig {
            memory_pages: 10,
            continuation_pages: 10,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Geometry { .. })));

        let config = HostConfig {
            contexts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoContexts)));
    }

    #[test]
    fn test_rejects_full_address_space() {
        let config = HostConfig {
            memory_pages: 65536,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MemoryTooLarge { pages: 65536, .. })
        ));

        let config = HostConfig {
            memory_pages: MAX_MEMORY_PAGES,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: HostConfig =
            serde_json::from_str(r#"{"memory_pages": 8, "continuation_pages": 2, "assets": {"engine": "etex.wasm.gz"}}"#)
                .unwrap();
        assert_eq!(config.memory_pages, 8);
        assert_eq!(config.assets.engine, "etex.wasm.gz");
        assert_eq!(config.assets.snapshot, "core.dump.gz");
        assert_eq!(config.input_name, "input");
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(&path, r#"{"contexts": 3}"#).unwrap();

        let config = HostConfig::from_json_file(&path).unwrap();
        assert_eq!(config.contexts, 3);

        let missing = HostConfig::from_json_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
