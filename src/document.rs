//! Turning what the user typed into a compilable LaTeX document.

use crate::EngineError;

/// Preamble wrapped around bare snippets.
const SNIPPET_PREAMBLE: &str = "\\documentclass{article}\n\
\\usepackage{amsmath,amssymb}\n\
\\pagestyle{empty}\n";

/// Snippet lines with this prefix are moved into the preamble.
pub const PREAMBLE_MARKER: &str = "%!";

/// Returns a complete document for `text`.
///
/// Text that already declares a document class or a document environment
/// is returned unchanged. Anything else is treated as a snippet and wrapped
/// in a minimal `article`; snippet lines starting with `%!` contribute
/// their remainder to the preamble, e.g. `%!\usepackage{tikz}`.
///
/// # Errors
///
/// [`EngineError::EmptySource`] if `text` is blank.
///
/// # Example
///
/// ```rust
/// use textonic::prepare_source;
///
/// let doc = prepare_source("%!\\usepackage{bm}\n$\\bm{x}$")?;
/// assert!(doc.starts_with("\\documentclass{article}"));
/// assert!(doc.contains("\\usepackage{bm}\n\\begin{document}"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn prepare_source(text: &str) -> Result<String, EngineError> {
    if text.trim().is_empty() {
        return Err(EngineError::EmptySource);
    }
    if text.contains("\\documentclass") || text.contains("\\begin{document}") {
        return Ok(text.to_string());
    }

    let mut preamble = String::from(SNIPPET_PREAMBLE);
    let mut body = String::with_capacity(text.len());
    for line in text.lines() {
        match line.strip_prefix(PREAMBLE_MARKER) {
            Some(extra) => {
                preamble.push_str(extra);
                preamble.push('\n');
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    Ok(format!(
        "{}\\begin{{document}}\n{}\\end{{document}}\n",
        preamble, body
    ))
}

/// Whether a LaTeX log line reports an error.
///
/// TeX prefixes error messages with `!` on standard output.
pub fn is_error_line(line: &str) -> bool {
    line.starts_with('!')
}
