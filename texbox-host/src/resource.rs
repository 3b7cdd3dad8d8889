//! Resource loading
//!
//! Assets live in a [`ContentStore`] addressed by name and are stored
//! gzip-compressed. The engine binary and memory image are loaded once per
//! process; individual TeX files are fetched when the guest misses on them,
//! and package/library bundles are fetched up front through their manifests.

use crate::config::AssetLayout;
use crate::error::ResourceError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use texbox_api::BundleManifest;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Library files under this prefix are retried under [`LEGACY_LIBRARY_PREFIX`]
const LIBRARY_PREFIX: &str = "tikzlibrary";
const LEGACY_LIBRARY_PREFIX: &str = "pgflibrary";

/// Name-addressed source of compressed asset bytes
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Raw stored bytes for `name`
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ResourceError>;
}

/// Content store backed by a local directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ContentStore for DirectoryStore {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ResourceError> {
        let path = self.root.join(name);
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound(name.to_string())
            } else {
                ResourceError::Io {
                    name: name.to_string(),
                    source,
                }
            }
        })
    }
}

/// Content store held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_entry(self, name: impl Into<String>, content: Vec<u8>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn insert(&self, name: impl Into<String>, content: Vec<u8>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), content);
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ResourceError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }
}

/// Content store reached over HTTP(S), relative to a base URL
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "http")]
impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ContentStore for HttpStore {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ResourceError> {
        let url = format!("{}/{}", self.base_url, name);
        let http_error = |source| ResourceError::Http {
            name: name.to_string(),
            source,
        };

        let response = self.client.get(&url).send().await.map_err(http_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResourceError::NotFound(name.to_string()));
        }
        let response = response.error_for_status().map_err(http_error)?;
        let body = response.bytes().await.map_err(http_error)?;
        Ok(body.to_vec())
    }
}

/// Inflate gzip data
pub fn inflate(name: &str, compressed: &[u8]) -> Result<Vec<u8>, ResourceError> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|source| ResourceError::Inflate {
            name: name.to_string(),
            source,
        })?;
    Ok(out)
}

/// Inflate only if the data carries the gzip magic
fn inflate_if_compressed(name: &str, data: Vec<u8>) -> Result<Vec<u8>, ResourceError> {
    if data.starts_with(&GZIP_MAGIC) {
        inflate(name, &data)
    } else {
        Ok(data)
    }
}

/// Engine binary plus the initial memory image
#[derive(Debug, Clone)]
pub struct EngineAssets {
    pub wasm: Vec<u8>,
    pub image: Arc<[u8]>,
}

/// Kind of front-loaded bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Package,
    Library,
}

/// Fetches and inflates assets from a content store
pub struct ResourceLoader {
    store: Arc<dyn ContentStore>,
    layout: AssetLayout,
}

impl ResourceLoader {
    pub fn new(store: Arc<dyn ContentStore>, layout: AssetLayout) -> Self {
        Self { store, layout }
    }

    pub fn layout(&self) -> &AssetLayout {
        &self.layout
    }

    /// Fetch `name` and gunzip it
    pub async fn fetch_inflated(&self, name: &str) -> Result<Vec<u8>, ResourceError> {
        let compressed = self.store.fetch(name).await?;
        inflate(name, &compressed)
    }

    /// Load the engine binary and memory image
    ///
    /// Both are required; any failure here is fatal.
    pub async fn load_engine(&self) -> Result<EngineAssets, ResourceError> {
        let (wasm, image) = tokio::try_join!(
            self.fetch_inflated(&self.layout.engine),
            self.fetch_inflated(&self.layout.snapshot),
        )?;
        tracing::info!(
            engine = %self.layout.engine,
            wasm_bytes = wasm.len(),
            image_bytes = image.len(),
            "Loaded engine assets"
        );
        Ok(EngineAssets {
            wasm,
            image: image.into(),
        })
    }

    /// Fetch one TeX file by the name the guest asked for
    ///
    /// A missing `tikzlibrary*` file is retried once as `pgflibrary*`.
    pub async fn fetch_tex_file(&self, filename: &str) -> Result<Vec<u8>, ResourceError> {
        match self.fetch_inflated(&self.tex_file_path(filename)).await {
            Err(ResourceError::NotFound(_)) if filename.starts_with(LIBRARY_PREFIX) => {
                let legacy = format!(
                    "{}{}",
                    LEGACY_LIBRARY_PREFIX,
                    &filename[LIBRARY_PREFIX.len()..]
                );
                tracing::debug!(requested = filename, retry = %legacy, "Retrying library file");
                self.fetch_inflated(&self.tex_file_path(&legacy)).await
            }
            other => other,
        }
    }

    /// Fetch for a suspended guest; failures become "absent"
    pub async fn fetch_optional(&self, filename: &str) -> Option<Vec<u8>> {
        match self.fetch_tex_file(filename).await {
            Ok(content) => Some(content),
            Err(ResourceError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!(name = filename, error = %e, "Fetch failed, treating as missing");
                None
            }
        }
    }

    /// Fetch a bundle manifest and every file it lists
    ///
    /// A missing manifest fails the request; a missing member is skipped.
    pub async fn fetch_bundle(
        &self,
        kind: BundleKind,
        name: &str,
    ) -> Result<Vec<(String, Vec<u8>)>, ResourceError> {
        let directory = match kind {
            BundleKind::Package => &self.layout.packages,
            BundleKind::Library => &self.layout.libraries,
        };
        let (manifest_name, raw) = self.fetch_manifest(directory, name).await?;
        let raw = inflate_if_compressed(&manifest_name, raw)?;
        let manifest: BundleManifest =
            serde_json::from_slice(&raw).map_err(|source| ResourceError::Manifest {
                name: manifest_name.clone(),
                source,
            })?;

        let files = match manifest {
            BundleManifest::Inline(files) => files
                .into_iter()
                .map(|(file, content)| (file, content.into_bytes()))
                .collect(),
            members @ BundleManifest::Members(_) => {
                let mut files = Vec::new();
                for member in members.member_names() {
                    match self.fetch_tex_file(member).await {
                        Ok(content) => files.push((member.to_string(), content)),
                        Err(e) => {
                            tracing::warn!(bundle = name, member, error = %e, "Skipping bundle member")
                        }
                    }
                }
                files
            }
        };

        tracing::debug!(bundle = name, ?kind, files = files.len(), "Loaded bundle");
        Ok(files)
    }

    /// Fetch `<dir>/<name>.json`, falling back to the published `.json.gz`
    async fn fetch_manifest(
        &self,
        directory: &str,
        name: &str,
    ) -> Result<(String, Vec<u8>), ResourceError> {
        let plain = format!("{}/{}.json", directory, name);
        match self.store.fetch(&plain).await {
            Ok(raw) => Ok((plain, raw)),
            Err(ResourceError::NotFound(_)) => {
                let compressed = format!("{}.gz", plain);
                let raw = self.store.fetch(&compressed).await?;
                Ok((compressed, raw))
            }
            Err(e) => Err(e),
        }
    }

    fn tex_file_path(&self, filename: &str) -> String {
        format!("{}/{}.gz", self.layout.tex_files, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn loader(store: MemoryStore) -> ResourceLoader {
        ResourceLoader::new(Arc::new(store), AssetLayout::default())
    }

    #[tokio::test]
    async fn test_fetch_tex_file_inflates() {
        let store = MemoryStore::new().with_entry("tex_files/pgf.sty.gz", gzip(b"\\relax"));
        let content = loader(store).fetch_tex_file("pgf.sty").await.unwrap();
        assert_eq!(content, b"\\relax");
    }

    #[tokio::test]
    async fn test_library_prefix_retry() {
        let store = MemoryStore::new().with_entry(
            "tex_files/pgflibraryarrows.code.tex.gz",
            gzip(b"arrows"),
        );
        let loader = loader(store);

        let content = loader
            .fetch_tex_file("tikzlibraryarrows.code.tex")
            .await
            .unwrap();
        assert_eq!(content, b"arrows");

        // Only the one prefix is substituted
        assert!(loader.fetch_optional("libraryarrows.code.tex").await.is_none());
    }

    #[tokio::test]
    async fn test_bundle_member_manifest() {
        let store = MemoryStore::new()
            .with_entry("tikz_libs/arrows.json", br#"["a.tex", "missing.tex"]"#.to_vec())
            .with_entry("tex_files/a.tex.gz", gzip(b"A"));

        let files = loader(store)
            .fetch_bundle(BundleKind::Library, "arrows")
            .await
            .unwrap();
        assert_eq!(files, vec![("a.tex".to_string(), b"A".to_vec())]);
    }

    #[tokio::test]
    async fn test_bundle_inline_compressed_manifest() {
        let store = MemoryStore::new().with_entry(
            "packages/amsmath.json",
            gzip(br#"{"amsmath.sty": "\\ProvidesPackage{amsmath}"}"#),
        );

        let files = loader(store)
            .fetch_bundle(BundleKind::Package, "amsmath")
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "amsmath.sty");
    }

    #[tokio::test]
    async fn test_bundle_manifest_published_as_gz() {
        let store = MemoryStore::new()
            .with_entry("tikz_libs/calc.json.gz", gzip(br#"["tikzlibrarycalc.code.tex"]"#))
            .with_entry("tex_files/tikzlibrarycalc.code.tex.gz", gzip(b"CALC"));

        let files = loader(store)
            .fetch_bundle(BundleKind::Library, "calc")
            .await
            .unwrap();
        assert_eq!(
            files,
            vec![("tikzlibrarycalc.code.tex".to_string(), b"CALC".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_is_error() {
        let result = loader(MemoryStore::new())
            .fetch_bundle(BundleKind::Package, "nope")
            .await;
        assert!(matches!(result, Err(ResourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_directory_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tex.wasm.gz"), gzip(b"\0asm")).unwrap();
        std::fs::write(dir.path().join("core.dump.gz"), gzip(&[7; 16])).unwrap();

        let loader = ResourceLoader::new(
            Arc::new(DirectoryStore::new(dir.path())),
            AssetLayout::default(),
        );
        let assets = loader.load_engine().await.unwrap();
        assert_eq!(assets.wasm, b"\0asm");
        assert_eq!(assets.image.len(), 16);

        assert!(matches!(
            loader.fetch_inflated("absent.gz").await,
            Err(ResourceError::NotFound(_))
        ));
    }
}
