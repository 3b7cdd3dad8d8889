//! texbox-api: Shared types for the texbox typesetting host
//!
//! This crate defines what a caller asks the host to render and how results
//! are keyed. Fingerprints are computed over a MessagePack encoding of the
//! request options, so they are stable across processes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A LaTeX package to load ahead of the picture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name as given to `\usepackage`
    pub name: String,

    /// Raw option list placed in brackets (e.g. "dvipsnames,table")
    #[serde(default)]
    pub options: Option<String>,
}

/// Options that shape the document built around the source text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Packages loaded with `\usepackage`, in order
    #[serde(default)]
    pub packages: Vec<PackageSpec>,

    /// TikZ libraries loaded with `\usetikzlibrary`
    #[serde(default)]
    pub libraries: Vec<String>,

    /// Free-form text injected into the preamble
    #[serde(default)]
    pub preamble: Option<String>,

    /// Options for the `tikzpicture` environment
    #[serde(default)]
    pub tikz_options: Option<String>,

    /// Forward engine console output to the host log
    #[serde(default)]
    pub show_console: bool,
}

/// A single typesetting request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Picture body (the contents of the `tikzpicture` environment)
    pub source: String,

    #[serde(default)]
    pub options: RenderOptions,
}

/// Cache key for a request: blake3 over normalized source and options
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

/// Package or library manifest as stored in the content store
///
/// Either a list of member filenames (fetched individually) or a map of
/// filename to inline content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleManifest {
    Members(Vec<String>),
    Inline(BTreeMap<String, String>),
}

impl PackageSpec {
    /// Create a package without options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: None,
        }
    }

    /// Set the option list
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Build the option list from key/value settings
    ///
    /// Keys without a value are emitted bare, e.g. `[draft,scale=2]`.
    pub fn with_settings<'a>(
        self,
        settings: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
    ) -> Self {
        let joined = settings
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{}={}", key, value),
                None => key.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");
        if joined.is_empty() {
            self
        } else {
            self.with_options(joined)
        }
    }
}

/// Error returned when a package argument cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageParseError(String);

impl fmt::Display for PackageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid package spec '{}': expected name or name[options]", self.0)
    }
}

impl std::error::Error for PackageParseError {}

impl FromStr for PackageSpec {
    type Err = PackageParseError;

    /// Parse `name` or `name[options]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || PackageParseError(s.to_string());

        match s.find('[') {
            None if !s.is_empty() && !s.contains(']') => Ok(PackageSpec::new(s)),
            None => Err(invalid()),
            Some(open) => {
                let name = s[..open].trim();
                let rest = s[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
                if name.is_empty() {
                    return Err(invalid());
                }
                let spec = PackageSpec::new(name);
                if rest.is_empty() {
                    Ok(spec)
                } else {
                    Ok(spec.with_options(rest))
                }
            }
        }
    }
}

impl RenderRequest {
    /// Create a request with default options
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            options: RenderOptions::default(),
        }
    }

    /// Add a package
    pub fn package(mut self, package: PackageSpec) -> Self {
        self.options.packages.push(package);
        self
    }

    /// Add a TikZ library
    pub fn library(mut self, library: impl Into<String>) -> Self {
        self.options.libraries.push(library.into());
        self
    }

    /// Set preamble text
    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.options.preamble = Some(preamble.into());
        self
    }

    /// Set `tikzpicture` options
    pub fn tikz_options(mut self, options: impl Into<String>) -> Self {
        self.options.tikz_options = Some(options.into());
        self
    }

    /// Forward engine console output to the log
    pub fn show_console(mut self, show: bool) -> Self {
        self.options.show_console = show;
        self
    }

    /// Source text with line endings unified and outer whitespace removed
    pub fn normalized_source(&self) -> String {
        self.source.replace("\r\n", "\n").trim().to_string()
    }

    /// Compute the cache fingerprint for this request
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.normalized_source().as_bytes());
        hasher.update(&[0]);
        // Encoding a plain struct of strings and vectors cannot fail.
        let options = rmp_serde::to_vec(&self.options).unwrap_or_default();
        hasher.update(&options);
        Fingerprint(hasher.finalize().to_hex().to_string())
    }
}

impl Fingerprint {
    /// Hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix suitable for element ids and log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl BundleManifest {
    /// Member filenames named by the manifest
    pub fn member_names(&self) -> Vec<&str> {
        match self {
            BundleManifest::Members(names) => names
                .iter()
                .map(String::as_str)
                .filter(|name| !name.is_empty())
                .collect(),
            BundleManifest::Inline(files) => files.keys().map(String::as_str).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_line_endings_and_padding() {
        let a = RenderRequest::new("\\draw (0,0) -- (1,1);\r\n");
        let b = RenderRequest::new("  \\draw (0,0) -- (1,1);");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_covers_options() {
        let plain = RenderRequest::new("\\draw (0,0) -- (1,1);");
        let with_lib = plain.clone().library("arrows");
        let verbose = plain.clone().show_console(true);

        assert_ne!(plain.fingerprint(), with_lib.fingerprint());
        assert_ne!(plain.fingerprint(), verbose.fingerprint());
        assert_eq!(plain.fingerprint().as_str().len(), 64);
    }

    #[test]
    fn test_package_spec_parse() {
        let plain: PackageSpec = "xcolor".parse().unwrap();
        assert_eq!(plain, PackageSpec::new("xcolor"));

        let with_opts: PackageSpec = "xcolor[dvipsnames,table]".parse().unwrap();
        assert_eq!(with_opts.options.as_deref(), Some("dvipsnames,table"));

        assert!("".parse::<PackageSpec>().is_err());
        assert!("[x]".parse::<PackageSpec>().is_err());
        assert!("xcolor[open".parse::<PackageSpec>().is_err());
    }

    #[test]
    fn test_package_settings() {
        let spec = PackageSpec::new("geometry").with_settings([("margin", Some("1cm")), ("landscape", None)]);
        assert_eq!(spec.options.as_deref(), Some("margin=1cm,landscape"));
    }

    #[test]
    fn test_manifest_shapes() {
        let members: BundleManifest =
            serde_json::from_str(r#"["tikzlibraryarrows.code.tex", ""]"#).unwrap();
        assert_eq!(members.member_names(), vec!["tikzlibraryarrows.code.tex"]);

        let inline: BundleManifest =
            serde_json::from_str(r#"{"xcolor.sty": "\\ProvidesPackage{xcolor}"}"#).unwrap();
        assert_eq!(inline.member_names(), vec!["xcolor.sty"]);
    }

    #[test]
    fn test_request_serialization_defaults() {
        let request: RenderRequest = serde_json::from_str(r#"{"source": "x"}"#).unwrap();
        assert_eq!(request.options, RenderOptions::default());
    }
}
