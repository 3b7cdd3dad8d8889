//! Font metric synthesis
//!
//! The engine opens `*.tfm` files for every font it touches. A [`FontMetrics`]
//! source can answer these from built-in tables instead of shipping each
//! metric file through the content store.

use std::collections::HashMap;
use std::path::Path;

/// Source of TeX font metric data
pub trait FontMetrics: Send + Sync {
    /// Metric bytes for `font` (name without the `.tfm` extension)
    fn metrics(&self, font: &str) -> Option<Vec<u8>>;
}

/// Metric source that knows no fonts; every lookup falls through
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFontMetrics;

impl FontMetrics for NoFontMetrics {
    fn metrics(&self, _font: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Metric source backed by an in-memory table
#[derive(Debug, Default, Clone)]
pub struct FontMetricTable {
    fonts: HashMap<String, Vec<u8>>,
}

impl FontMetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add metrics for a font
    pub fn with_font(mut self, font: impl Into<String>, data: Vec<u8>) -> Self {
        self.fonts.insert(font.into(), data);
        self
    }

    /// Load every `*.tfm` file in `dir`, keyed by file stem
    ///
    /// Subdirectories and other files are ignored.
    pub fn from_dir(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut table = Self::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("tfm") {
                continue;
            }
            if let Some(font) = path.file_stem().and_then(|stem| stem.to_str()) {
                let data = std::fs::read(&path)?;
                table.fonts.insert(font.to_string(), data);
            }
        }
        tracing::debug!(dir = %dir.as_ref().display(), fonts = table.len(), "Loaded font metrics");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

impl FromIterator<(String, Vec<u8>)> for FontMetricTable {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            fonts: iter.into_iter().collect(),
        }
    }
}

impl FontMetrics for FontMetricTable {
    fn metrics(&self, font: &str) -> Option<Vec<u8>> {
        self.fonts.get(font).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        let table = FontMetricTable::new().with_font("cmr10", vec![1, 2, 3]);
        assert_eq!(table.metrics("cmr10"), Some(vec![1, 2, 3]));
        assert_eq!(table.metrics("cmbx10"), None);
        assert_eq!(NoFontMetrics.metrics("cmr10"), None);
    }

    #[test]
    fn test_from_dir_reads_tfm_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cmr10.tfm"), [1, 2]).unwrap();
        std::fs::write(dir.path().join("cmr10.pk"), [9]).unwrap();
        std::fs::create_dir(dir.path().join("nested.tfm")).unwrap();

        let table = FontMetricTable::from_dir(dir.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.metrics("cmr10"), Some(vec![1, 2]));
        assert_eq!(table.metrics("nested"), None);
    }

    #[test]
    fn test_from_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FontMetricTable::from_dir(dir.path().join("absent")).is_err());
    }
}
