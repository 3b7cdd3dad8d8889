//! DVI to markup conversion
//!
//! The page description the engine writes is handed to an external renderer.
//! Its markup is then post-processed so several renderings can share one
//! document.

use crate::error::RenderError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::process::Stdio;
use texbox_api::Fingerprint;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Converts DVI bytes into markup
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, dvi: &[u8]) -> Result<String, RenderError>;
}

/// Renderer that pipes the DVI through an external program
///
/// The program reads DVI on stdin and writes markup to stdout.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `dvisvgm` emitting SVG with glyphs as paths
    pub fn dvisvgm() -> Self {
        Self::new("dvisvgm", ["--stdin", "--stdout", "--no-fonts", "--exact-bbox"])
    }

    /// Parse a whitespace-separated command line
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program, words))
    }
}

#[async_trait]
impl DocumentRenderer for CommandRenderer {
    async fn render(&self, dvi: &[u8]) -> Result<String, RenderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            RenderError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "renderer stdin unavailable",
            ))
        })?;
        let input = dvi.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child.wait_with_output().await?;
        // The exit status is authoritative; a renderer may stop reading early
        if let Ok(Err(e)) = writer.await {
            tracing::debug!(program = %self.program, error = %e, "Renderer closed stdin early");
        }

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

const PGF_ID_ATTR: &str = "id=\"pgf";

/// Namespace `pgf…` element ids with the request fingerprint
///
/// Every `pgf<suffix>` occurrence whose suffix is a declared id gets the
/// fingerprint inserted after `pgf`, so references (`href="#pgf1"`) follow
/// their targets. The soft-hyphen entity is replaced as well.
pub fn postprocess_markup(markup: &str, fingerprint: &Fingerprint) -> String {
    let suffixes: HashSet<&str> = collect_pgf_ids(markup).into_iter().collect();

    let namespace = fingerprint.short();
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    if !suffixes.is_empty() {
        while let Some(found) = rest.find("pgf") {
            let after = found + 3;
            out.push_str(&rest[..after]);
            rest = &rest[after..];
            if suffixes.iter().any(|suffix| rest.starts_with(suffix)) {
                out.push_str(namespace);
            }
        }
    }
    out.push_str(rest);

    out.replace("&#173;", "&#172;")
}

fn collect_pgf_ids(markup: &str) -> Vec<&str> {
    let mut ids = Vec::new();
    let mut from = 0;
    while let Some(found) = markup[from..].find(PGF_ID_ATTR) {
        let start = from + found;
        let value = start + PGF_ID_ATTR.len();
        let Some(len) = markup[value..].find('"') else {
            break;
        };

        let at_boundary = markup[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '-'));
        if at_boundary && len > 0 {
            ids.push(&markup[value..value + len]);
        }
        from = value + len + 1;
    }
    ids
}
