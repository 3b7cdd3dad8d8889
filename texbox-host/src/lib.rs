//! texbox-host: runtime host for the wasm TeX engine
//!
//! Provides the engine's Pascal file runtime on top of an in-memory virtual
//! filesystem, pauses the engine while missing files are fetched, and turns
//! requests into rendered markup through a pool of execution contexts.

pub mod cache;
pub mod config;
pub mod error;
pub mod imports;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod render;
pub mod resource;
pub mod runtime;
pub mod service;
pub mod session;
pub mod suspend;
pub mod vfs;

pub use cache::{CacheStore, DirectoryCache, RenderedDocument, ResultCache};
pub use config::{AssetLayout, HostConfig};
pub use error::{ConfigError, MemoryError, RenderError, ResourceError, TypesetError, VfsError};
pub use metrics::{FontMetricTable, FontMetrics, NoFontMetrics};
pub use orchestrator::{compose_document, TypesetOutput, Typesetter};
pub use render::{postprocess_markup, CommandRenderer, DocumentRenderer};
#[cfg(feature = "http")]
pub use resource::HttpStore;
pub use resource::{BundleKind, ContentStore, DirectoryStore, EngineAssets, MemoryStore, ResourceLoader};
pub use runtime::GuestRuntime;
pub use service::{TexService, TexServiceBuilder};
pub use session::Session;
pub use suspend::{SuspendState, SuspensionController};
pub use texbox_api::{Fingerprint, PackageSpec, RenderOptions, RenderRequest};
