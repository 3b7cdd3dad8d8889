//! texbox - render TikZ pictures with the wasm TeX engine
//!
//! # Usage
//!
//! ```bash
//! # Render a picture to SVG on stdout
//! echo '\draw (0,0) -- (1,1);' | texbox render --assets ./dist
//!
//! # With packages and libraries
//! texbox render figure.tikz -p 'xcolor[dvipsnames]' -l arrows -o figure.svg
//!
//! # Stop after typesetting and keep the DVI
//! texbox dvi figure.tikz -o figure.dvi
//!
//! # Print the cache key
//! texbox fingerprint figure.tikz -l arrows
//! ```

mod logging;

use clap::{ArgAction, Args, Parser, Subcommand};
use logging::{LogConfig, LogFormat};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use texbox_api::{PackageSpec, RenderRequest};
use texbox_host::{
    CommandRenderer, ContentStore, DirectoryCache, DirectoryStore, FontMetricTable, FontMetrics,
    HostConfig, NoFontMetrics, TexService, TypesetError,
};

const DEFAULT_RENDERER: &str = "dvisvgm --stdin --stdout --no-fonts --exact-bbox";

#[derive(Parser)]
#[command(name = "texbox", version)]
#[command(about = "Render TikZ pictures with a sandboxed wasm TeX engine", long_about = None)]
struct Cli {
    /// Asset directory (or http(s) base URL when built with `http`)
    #[arg(long, env = "TEXBOX_ASSETS", default_value = "assets", global = true)]
    assets: String,

    /// Host configuration file (JSON)
    #[arg(long, env = "TEXBOX_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,

    /// Directory of `*.tfm` font metric files served to the engine
    #[arg(long, env = "TEXBOX_FONTS", global = true)]
    fonts: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a picture to SVG markup
    Render {
        #[command(flatten)]
        request: RequestArgs,

        /// Command converting DVI on stdin to markup on stdout
        #[arg(long, env = "TEXBOX_RENDERER", default_value = DEFAULT_RENDERER)]
        renderer: String,

        /// Directory for persisted renderings
        #[arg(long, env = "TEXBOX_CACHE_DIR")]
        cache_dir: Option<PathBuf>,

        /// Do not persist renderings
        #[arg(long)]
        no_cache: bool,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Typeset only and write the DVI
    Dvi {
        #[command(flatten)]
        request: RequestArgs,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the cache fingerprint of a request
    Fingerprint {
        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// TikZ picture source; stdin when omitted or "-"
    input: Option<PathBuf>,

    /// Package to load, as `name` or `name[options]`
    #[arg(short = 'p', long = "package")]
    packages: Vec<PackageSpec>,

    /// TikZ library to load
    #[arg(short = 'l', long = "library")]
    libraries: Vec<String>,

    /// Text inserted before `\begin{document}`
    #[arg(long)]
    preamble: Option<String>,

    /// Options for the `tikzpicture` environment
    #[arg(long)]
    tikz_options: Option<String>,

    /// Show the engine's console output
    #[arg(long)]
    show_console: bool,
}

impl RequestArgs {
    fn to_request(&self) -> anyhow::Result<RenderRequest> {
        let source = match &self.input {
            Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?,
            _ => {
                let mut source = String::new();
                std::io::stdin().read_to_string(&mut source)?;
                source
            }
        };

        let mut request = RenderRequest::new(source).show_console(self.show_console);
        for package in &self.packages {
            request = request.package(package.clone());
        }
        for library in &self.libraries {
            request = request.library(library.clone());
        }
        if let Some(preamble) = &self.preamble {
            request = request.preamble(preamble.clone());
        }
        if let Some(options) = &self.tikz_options {
            request = request.tikz_options(options.clone());
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let show_console = match &cli.command {
        Command::Render { request, .. }
        | Command::Dvi { request, .. }
        | Command::Fingerprint { request } => request.show_console,
    };
    let log_config = LogConfig {
        format: cli.log_format,
        show_console,
        ..Default::default()
    }
    .with_verbosity(cli.verbose);
    if let Err(e) = logging::init(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(typeset) = e.downcast_ref::<TypesetError>() {
                for line in typeset.transcript() {
                    eprintln!("{}", line);
                }
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => HostConfig::from_json_file(path)?,
        None => HostConfig::default(),
    };
    let metrics: Arc<dyn FontMetrics> = match &cli.fonts {
        Some(dir) => Arc::new(
            FontMetricTable::from_dir(dir)
                .map_err(|e| anyhow::anyhow!("Failed to load fonts from {}: {}", dir.display(), e))?,
        ),
        None => Arc::new(NoFontMetrics),
    };

    match cli.command {
        Command::Fingerprint { request } => {
            println!("{}", request.to_request()?.fingerprint());
        }
        Command::Dvi { request, output } => {
            let request = request.to_request()?;
            let renderer = Arc::new(CommandRenderer::dvisvgm());
            let service = TexService::builder(content_store(&cli.assets), renderer)
                .config(config)
                .metrics(metrics)
                .build()
                .await?;

            let result = service.typeset(&request).await?;
            std::fs::write(&output, &result.dvi)?;
            tracing::info!(
                output = %output.display(),
                bytes = result.dvi.len(),
                suspensions = result.suspensions,
                "Wrote DVI"
            );
        }
        Command::Render {
            request,
            renderer,
            cache_dir,
            no_cache,
            output,
        } => {
            let request = request.to_request()?;
            let renderer = CommandRenderer::from_command_line(&renderer)
                .ok_or_else(|| anyhow::anyhow!("Renderer command is empty"))?;

            let mut builder = TexService::builder(content_store(&cli.assets), Arc::new(renderer))
                .config(config)
                .metrics(metrics);
            if !no_cache {
                if let Some(dir) = cache_dir.or_else(|| dirs::cache_dir().map(|d| d.join("texbox"))) {
                    tracing::debug!(dir = %dir.display(), "Using render cache");
                    builder = builder.cache_store(Arc::new(DirectoryCache::new(dir)));
                }
            }
            let service = builder.build().await?;

            let document = service.render(&request).await?;
            match output {
                Some(path) => std::fs::write(path, &document.markup)?,
                None => println!("{}", document.markup),
            }
        }
    }

    Ok(())
}

#[cfg(feature = "http")]
fn content_store(assets: &str) -> Arc<dyn ContentStore> {
    if assets.starts_with("http://") || assets.starts_with("https://") {
        Arc::new(texbox_host::HttpStore::new(assets))
    } else {
        Arc::new(DirectoryStore::new(assets))
    }
}

#[cfg(not(feature = "http"))]
fn content_store(assets: &str) -> Arc<dyn ContentStore> {
    Arc::new(DirectoryStore::new(assets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_render_arguments() {
        let cli = Cli::try_parse_from([
            "texbox",
            "render",
            "figure.tikz",
            "-p",
            "xcolor[dvipsnames]",
            "-l",
            "arrows",
            "--tikz-options",
            "scale=2",
        ])
        .unwrap();

        match cli.command {
            Command::Render { request, renderer, .. } => {
                assert_eq!(request.packages[0].name, "xcolor");
                assert_eq!(request.packages[0].options.as_deref(), Some("dvipsnames"));
                assert_eq!(request.libraries, vec!["arrows"]);
                assert_eq!(renderer, DEFAULT_RENDERER);
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_fonts_option_is_global() {
        let cli = Cli::try_parse_from(["texbox", "dvi", "-o", "out.dvi", "--fonts", "tfm"]).unwrap();
        assert_eq!(cli.fonts, Some(PathBuf::from("tfm")));
    }

    #[test]
    fn test_rejects_malformed_package() {
        assert!(Cli::try_parse_from(["texbox", "fingerprint", "-p", "xcolor[oops"]).is_err());
    }
}
