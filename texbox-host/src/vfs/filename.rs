//! Pascal filename parsing
//!
//! The engine passes filenames as fixed-width, space padded buffers, sometimes
//! wrapped in braces or quotes and carrying system-specific prefixes.

const FONT_AREA: &str = "TeXfonts:";
const POOL_ALIAS: &str = "TeXformats:TEX.POOL";
const POOL_FILE: &str = "tex.pool";
const TERMINAL: &str = "TTY:";

/// A filename as requested by the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PascalName {
    /// The terminal (`TTY:`)
    Terminal,
    File(String),
}

/// Parse a raw name buffer into a filename
pub fn parse(raw: &[u8]) -> PascalName {
    let text = crate::memory::latin1(raw);
    let mut name = text.trim_end_matches('\0');

    if let Some(rest) = name.strip_prefix('{') {
        name = rest.split('}').next().unwrap_or_default();
    }
    if let Some(rest) = name.strip_prefix('"') {
        name = rest.split('"').next().unwrap_or_default();
    }

    name = name.trim_end_matches(' ');
    name = name.strip_prefix('*').unwrap_or(name);
    name = name.strip_prefix(FONT_AREA).unwrap_or(name);

    match name {
        TERMINAL => PascalName::Terminal,
        POOL_ALIAS => PascalName::File(POOL_FILE.to_string()),
        other => PascalName::File(other.to_string()),
    }
}

/// Whether the name is a font metric file
pub fn is_font_metric(name: &str) -> bool {
    name.ends_with(".tfm")
}

/// Whether the name is an engine scratch file that must never be fetched
pub fn is_scratch(name: &str) -> bool {
    [".aux", ".log", ".dvi"].iter().any(|ext| name.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> PascalName {
        PascalName::File(name.to_string())
    }

    #[test]
    fn test_padded_names() {
        assert_eq!(parse(b"input.tex      "), file("input.tex"));
        assert_eq!(parse(b"input.tex\0\0\0"), file("input.tex"));
        assert_eq!(parse(b"TTY:    "), PascalName::Terminal);
    }

    #[test]
    fn test_wrapped_names() {
        assert_eq!(parse(b"{my file.tex} trailing"), file("my file.tex"));
        assert_eq!(parse(b"\"quoted.sty\"   "), file("quoted.sty"));
    }

    #[test]
    fn test_prefixes_and_aliases() {
        assert_eq!(parse(b"*pgfcore.code.tex"), file("pgfcore.code.tex"));
        assert_eq!(parse(b"TeXfonts:cmr10.tfm  "), file("cmr10.tfm"));
        assert_eq!(parse(b"TeXformats:TEX.POOL "), file("tex.pool"));
    }

    #[test]
    fn test_classification() {
        assert!(is_font_metric("cmr10.tfm"));
        assert!(!is_font_metric("cmr10.tex"));
        assert!(is_scratch("input.aux"));
        assert!(is_scratch("input.log"));
        assert!(is_scratch("input.dvi"));
        assert!(!is_scratch("tikz.sty"));
    }
}
