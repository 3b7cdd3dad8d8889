//! Typesetting service: a pool of execution contexts behind a result cache

use crate::cache::{CacheStore, RenderedDocument, ResultCache};
use crate::config::HostConfig;
use crate::error::TypesetError;
use crate::metrics::{FontMetrics, NoFontMetrics};
use crate::orchestrator::{TypesetOutput, Typesetter};
use crate::render::DocumentRenderer;
use crate::resource::{ContentStore, ResourceLoader};
use crate::runtime::GuestRuntime;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use texbox_api::RenderRequest;

/// Builder for [`TexService`]
pub struct TexServiceBuilder {
    store: Arc<dyn ContentStore>,
    renderer: Arc<dyn DocumentRenderer>,
    config: HostConfig,
    metrics: Arc<dyn FontMetrics>,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl TexServiceBuilder {
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn FontMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Persist rendered markup
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Load the engine assets and start the contexts
    pub async fn build(self) -> Result<TexService, TypesetError> {
        self.config.validate()?;

        let loader = Arc::new(ResourceLoader::new(self.store, self.config.assets.clone()));
        let assets = loader.load_engine().await?;
        let runtime = Arc::new(GuestRuntime::new(&assets, self.config.clone())?);

        let contexts = (0..self.config.contexts)
            .map(|_| {
                Typesetter::new(
                    Arc::clone(&runtime),
                    Arc::clone(&loader),
                    Arc::clone(&self.metrics),
                )
            })
            .collect();

        let cache = match self.cache_store {
            Some(store) => ResultCache::with_store(store),
            None => ResultCache::new(),
        };

        tracing::info!(contexts = self.config.contexts, "Typesetting service ready");

        Ok(TexService {
            contexts,
            next: AtomicUsize::new(0),
            renderer: self.renderer,
            cache,
        })
    }
}

/// Renders requests to markup, coalescing identical requests
pub struct TexService {
    contexts: Vec<Typesetter>,
    next: AtomicUsize,
    renderer: Arc<dyn DocumentRenderer>,
    cache: ResultCache,
}

impl TexService {
    pub fn builder(
        store: Arc<dyn ContentStore>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> TexServiceBuilder {
        TexServiceBuilder {
            store,
            renderer,
            config: HostConfig::default(),
            metrics: Arc::new(NoFontMetrics),
            cache_store: None,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Render `request`, serving repeats from the cache
    pub async fn render(&self, request: &RenderRequest) -> Result<Arc<RenderedDocument>, TypesetError> {
        let fingerprint = request.fingerprint();
        self.cache
            .get_or_render(fingerprint, || self.context().render(request, self.renderer.as_ref()))
            .await
    }

    /// Compile `request` to DVI without rendering or caching
    pub async fn typeset(&self, request: &RenderRequest) -> Result<TypesetOutput, TypesetError> {
        self.context().typeset(request).await
    }

    /// Pick a context: the first idle one, else round-robin
    fn context(&self) -> &Typesetter {
        if let Some(idle) = self.contexts.iter().find(|context| !context.is_busy()) {
            return idle;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.contexts.len();
        &self.contexts[index]
    }
}
