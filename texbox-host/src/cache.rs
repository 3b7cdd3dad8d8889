//! Result cache keyed by request fingerprint
//!
//! At most one computation runs per fingerprint: later callers wait on the
//! first caller's in-flight cell instead of starting their own. Entries are
//! immutable once written. A [`CacheStore`] can back the in-memory map so
//! renderings survive the process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use texbox_api::Fingerprint;
use tokio::sync::OnceCell;

/// Rendered markup for one fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub fingerprint: Fingerprint,
    pub markup: String,
}

/// Persistent backing for rendered markup
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self, fingerprint: &Fingerprint) -> std::io::Result<Option<String>>;
    async fn save(&self, fingerprint: &Fingerprint, markup: &str) -> std::io::Result<()>;
}

/// One file per fingerprint under a directory
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    dir: PathBuf,
}

impl DirectoryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.svg", fingerprint))
    }
}

#[async_trait]
impl CacheStore for DirectoryCache {
    async fn load(&self, fingerprint: &Fingerprint) -> std::io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(fingerprint)).await {
            Ok(markup) => Ok(Some(markup)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, fingerprint: &Fingerprint, markup: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Write then rename so readers never see a partial file
        let path = self.path(fingerprint);
        let staging = path.with_extension("svg.tmp");
        tokio::fs::write(&staging, markup).await?;
        tokio::fs::rename(&staging, &path).await
    }
}

type Slot = Arc<OnceCell<Arc<RenderedDocument>>>;

/// In-memory cache with per-fingerprint coalescing
#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<Fingerprint, Slot>>,
    store: Option<Arc<dyn CacheStore>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache backed by a persistent store
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            entries: Mutex::default(),
            store: Some(store),
        }
    }

    /// Completed entry for `fingerprint`, if any
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<RenderedDocument>> {
        self.slot_if_present(fingerprint)
            .and_then(|slot| slot.get().cloned())
    }

    /// Number of completed entries
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the entry for `fingerprint`, computing it with `render` if needed
    ///
    /// Concurrent callers with the same fingerprint share one computation. A
    /// failed computation leaves the slot empty so the next caller retries.
    pub async fn get_or_render<F, Fut, E>(
        &self,
        fingerprint: Fingerprint,
        render: F,
    ) -> Result<Arc<RenderedDocument>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let slot = Arc::clone(self.lock().entry(fingerprint.clone()).or_default());

        if let Some(document) = slot.get() {
            tracing::debug!(fingerprint = %fingerprint.short(), "Cache hit");
            return Ok(Arc::clone(document));
        }

        let result = slot.get_or_try_init(|| async {
            if let Some(markup) = self.load_persistent(&fingerprint).await {
                tracing::debug!(fingerprint = %fingerprint.short(), "Persistent cache hit");
                return Ok(Arc::new(RenderedDocument {
                    fingerprint: fingerprint.clone(),
                    markup,
                }));
            }

            let markup = render().await?;
            self.save_persistent(&fingerprint, &markup).await;
            Ok(Arc::new(RenderedDocument {
                fingerprint: fingerprint.clone(),
                markup,
            }))
        })
        .await
        .cloned();

        if result.is_err() {
            self.discard_empty(&fingerprint, &slot);
        }
        result
    }

    /// Drop a slot left empty by a failure unless another caller still holds it
    fn discard_empty(&self, fingerprint: &Fingerprint, slot: &Slot) {
        let mut entries = self.lock();
        let unused = entries.get(fingerprint).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(slot) == 2
        });
        if unused {
            entries.remove(fingerprint);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Fingerprint, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_if_present(&self, fingerprint: &Fingerprint) -> Option<Slot> {
        self.lock().get(fingerprint).cloned()
    }

    async fn load_persistent(&self, fingerprint: &Fingerprint) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.load(fingerprint).await {
            Ok(markup) => markup,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint.short(), error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn save_persistent(&self, fingerprint: &Fingerprint, markup: &str) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(fingerprint, markup).await {
            tracing::warn!(fingerprint = %fingerprint.short(), error = %e, "Cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use texbox_api::RenderRequest;

    #[tokio::test]
    async fn test_computes_once() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let fp = RenderRequest::new("a").fingerprint();

        for _ in 0..3 {
            let doc = cache
                .get_or_render(fp.clone(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>("<svg/>".to_string())
                })
                .await
                .unwrap();
            assert_eq!(doc.markup, "<svg/>");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&fp).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_callers_coalesce() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let fp = RenderRequest::new("b").fingerprint();

        let render = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>("<svg>b</svg>".to_string())
        };
        let (first, second) = tokio::join!(
            cache.get_or_render(fp.clone(), render),
            cache.get_or_render(fp.clone(), render),
        );

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = ResultCache::new();
        let fp = RenderRequest::new("c").fingerprint();

        let failed = cache
            .get_or_render(fp.clone(), || async { Err::<String, _>("boom") })
            .await;
        assert_eq!(failed.unwrap_err(), "boom");
        assert!(cache.is_empty());
        assert_eq!(cache.lock().len(), 0);

        let doc = cache
            .get_or_render(fp, || async { Ok::<_, &str>("ok".to_string()) })
            .await
            .unwrap();
        assert_eq!(doc.markup, "ok");
    }

    #[tokio::test]
    async fn test_distinct_failures_leave_no_slots() {
        let cache = ResultCache::new();
        for source in ["f1", "f2", "f3"] {
            let fp = RenderRequest::new(source).fingerprint();
            let failed = cache
                .get_or_render(fp, || async { Err::<String, _>("boom") })
                .await;
            assert!(failed.is_err());
        }
        assert_eq!(cache.lock().len(), 0);
    }

    #[tokio::test]
    async fn test_directory_cache_survives_instances() {
        let dir = tempfile::tempdir().unwrap();
        let fp = RenderRequest::new("d").fingerprint();

        let first = ResultCache::with_store(Arc::new(DirectoryCache::new(dir.path())));
        first
            .get_or_render(fp.clone(), || async { Ok::<_, std::io::Error>("<svg>d</svg>".to_string()) })
            .await
            .unwrap();

        let second = ResultCache::with_store(Arc::new(DirectoryCache::new(dir.path())));
        let doc = second
            .get_or_render(fp, || async {
                Err::<String, _>(std::io::Error::other("must not render"))
            })
            .await
            .unwrap();
        assert_eq!(doc.markup, "<svg>d</svg>");
    }

    #[tokio::test]
    async fn test_unwritable_store_is_ignored() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // A regular file where the directory should be
        let cache = ResultCache::with_store(Arc::new(DirectoryCache::new(file.path())));
        let fp = RenderRequest::new("e").fingerprint();

        let doc = cache
            .get_or_render(fp, || async { Ok::<_, std::io::Error>("<svg/>".to_string()) })
            .await
            .unwrap();
        assert_eq!(doc.markup, "<svg/>");
    }
}
