//! Session orchestration
//!
//! A [`Typesetter`] is one execution context: it runs one compile at a time,
//! each in a fresh [`Session`] that is dropped as soon as the output has been
//! read back.

use crate::config::HostConfig;
use crate::error::TypesetError;
use crate::metrics::FontMetrics;
use crate::render::{postprocess_markup, DocumentRenderer};
use crate::resource::{BundleKind, ResourceLoader};
use crate::runtime::{self, GuestRuntime};
use crate::session::Session;
use crate::suspend;
use std::sync::Arc;
use texbox_api::RenderRequest;
use tokio::sync::Mutex;

/// Result of one compile
#[derive(Debug, Clone)]
pub struct TypesetOutput {
    /// Contents of the output file up to its logical length
    pub dvi: Vec<u8>,

    /// Console lines the engine printed
    pub transcript: Vec<String>,

    /// How many times the guest was suspended for a fetch
    pub suspensions: u32,

    /// Whether the engine reached its final end before `main` returned
    pub finished: bool,
}

/// Assemble the engine input for `request`
///
/// Package directives, library directive, preamble, then the source wrapped
/// in a `tikzpicture` environment.
pub fn compose_document(request: &RenderRequest) -> String {
    let options = &request.options;
    let mut document = String::new();

    for package in &options.packages {
        match &package.options {
            Some(opts) => document.push_str(&format!("\\usepackage[{}]{{{}}}", opts, package.name)),
            None => document.push_str(&format!("\\usepackage{{{}}}", package.name)),
        }
    }
    if !options.libraries.is_empty() {
        document.push_str(&format!("\\usetikzlibrary{{{}}}", options.libraries.join(",")));
    }
    if let Some(preamble) = &options.preamble {
        document.push_str(preamble);
    }

    document.push_str("\\begin{document}\\begin{tikzpicture}");
    if let Some(tikz_options) = &options.tikz_options {
        document.push_str(&format!("[{}]", tikz_options));
    }
    document.push_str(&request.normalized_source());
    document.push_str("\n\\end{tikzpicture}\\end{document}\n");
    document
}

/// One execution context
pub struct Typesetter {
    runtime: Arc<GuestRuntime>,
    loader: Arc<ResourceLoader>,
    metrics: Arc<dyn FontMetrics>,
    busy: Mutex<()>,
}

impl Typesetter {
    pub fn new(
        runtime: Arc<GuestRuntime>,
        loader: Arc<ResourceLoader>,
        metrics: Arc<dyn FontMetrics>,
    ) -> Self {
        Self {
            runtime,
            loader,
            metrics,
            busy: Mutex::new(()),
        }
    }

    fn config(&self) -> &HostConfig {
        self.runtime.config()
    }

    /// Whether a compile is running on this context
    pub fn is_busy(&self) -> bool {
        self.busy.try_lock().is_err()
    }

    /// Compile `request` to DVI
    ///
    /// Waits if another compile holds this context.
    pub async fn typeset(&self, request: &RenderRequest) -> Result<TypesetOutput, TypesetError> {
        let _guard = self.busy.lock().await;
        let config = self.config();
        let echo = request.options.show_console;

        let mut session = Session::new(config, Arc::clone(&self.metrics), echo);
        self.preload(&mut session, request).await?;

        let document = compose_document(request);
        if echo {
            tracing::info!(target: "texbox::console", "{}", document);
        }
        session
            .vfs_mut()
            .insert(config.input_file(), document.into_bytes());

        let mut store = self.runtime.instantiate(session)?;
        let loader = Arc::clone(&self.loader);
        let result = suspend::run_to_completion(&mut store, |name| {
            let loader = Arc::clone(&loader);
            async move { loader.fetch_optional(&name).await }
        })
        .await;

        let suspensions = store.data().suspension().suspensions();
        let mut session = store.into_data();
        debug_assert!(
            result.is_err() || session.suspension().is_idle(),
            "guest returned with a fetch outstanding"
        );
        session.vfs_mut().console_mut().flush();
        let transcript = session.vfs_mut().console_mut().take_transcript();

        if let Err(source) = result {
            return Err(if runtime::is_out_of_fuel(&source) {
                TypesetError::FuelExhausted { transcript }
            } else {
                TypesetError::GuestTrap { source, transcript }
            });
        }

        let dvi = session
            .vfs()
            .read_back(&config.output_file())
            .filter(|dvi| !dvi.is_empty())
            .map(<[u8]>::to_vec);
        let finished = session.vfs().is_finished();
        drop(session);

        if !finished {
            tracing::warn!(
                fingerprint = %request.fingerprint().short(),
                "Engine returned without reaching its final end"
            );
        }

        match dvi {
            Some(dvi) => {
                tracing::info!(
                    fingerprint = %request.fingerprint().short(),
                    dvi_bytes = dvi.len(),
                    suspensions,
                    "Typeset complete"
                );
                Ok(TypesetOutput {
                    dvi,
                    transcript,
                    suspensions,
                    finished,
                })
            }
            None => Err(TypesetError::NoOutput { transcript }),
        }
    }

    /// Compile and convert to markup
    pub async fn render(
        &self,
        request: &RenderRequest,
        renderer: &dyn DocumentRenderer,
    ) -> Result<String, TypesetError> {
        let output = self.typeset(request).await?;
        let markup = renderer.render(&output.dvi).await?;
        Ok(postprocess_markup(&markup, &request.fingerprint()))
    }

    /// Load every bundle the request names before the guest starts
    async fn preload(&self, session: &mut Session, request: &RenderRequest) -> Result<(), TypesetError> {
        let bundles = request
            .options
            .packages
            .iter()
            .map(|package| (BundleKind::Package, package.name.as_str()))
            .chain(
                request
                    .options
                    .libraries
                    .iter()
                    .map(|library| (BundleKind::Library, library.as_str())),
            );

        for (kind, name) in bundles {
            for (file, content) in self.loader.fetch_bundle(kind, name).await? {
                session.vfs_mut().insert(file, content);
            }
        }
        Ok(())
    }
}
