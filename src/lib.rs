#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(rustdoc::invalid_codeblock_attributes)]

pub mod bbox;
pub mod clipboard;
pub mod document;
pub mod engine;
pub mod ghostscript;
pub mod process;
pub mod settings;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use bbox::BoundingBox;
pub use clipboard::{ClipboardError, ClipboardKind, ClipboardPayload, ClipboardSink, SystemClipboard};
pub use document::{is_error_line, prepare_source};
pub use engine::{Engine, ToolStatus};
pub use ghostscript::EpsDevice;
pub use process::ProcessHandle;
pub use settings::{Settings, SettingsError};
pub use worker::{Event, Worker, WorkerError};

/// Ghostscript invocation a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `bbox` device run measuring the ink extent.
    BoundingBox,
    /// Rasterisation to `output.png`.
    PngConversion,
    /// Cropping (and outlining) to `output.eps`.
    EpsConversion,
    /// Second pass turning the EPS into `output.pdf`.
    PdfConversion,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::BoundingBox => "bounding box computation",
            Stage::PngConversion => "PNG conversion",
            Stage::EpsConversion => "EPS conversion",
            Stage::PdfConversion => "PDF conversion",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while compiling or converting a document.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The scratch directory could not be created.
    #[error("failed to create scratch directory: {0}")]
    Session(#[source] std::io::Error),

    /// The session was torn down; no further work is possible.
    #[error("session has been closed")]
    SessionClosed,

    /// There was nothing to compile.
    #[error("document is empty")]
    EmptySource,

    /// An external program could not be started at all.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying launch failure.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing a file inside the session failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LaTeX exited with a non-zero status.
    #[error("LaTeX compilation failed ({})", describe_exit(.code))]
    CompilationFailed {
        /// Exit code, `None` when the process was killed.
        code: Option<i32>,
    },

    /// Ghostscript exited with a non-zero status.
    #[error("Ghostscript {stage} failed ({})", describe_exit(.code))]
    InterpreterFailed {
        /// Invocation that failed.
        stage: Stage,
        /// Exit code, `None` when the process was killed.
        code: Option<i32>,
    },

    /// Ghostscript ran but never reported a bounding box.
    #[error("failed to compute bounding box")]
    BoundingBoxFailed,

    /// The installed Ghostscript has neither `eps2write` nor `epswrite`.
    #[error("Ghostscript does not support an EPS output device")]
    NoEpsDevice,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Output format of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Cropped PDF, fonts optionally outlined.
    Pdf,
    /// Cropped Encapsulated PostScript.
    Eps,
    /// Tightly cropped raster with alpha channel.
    #[default]
    Png,
}

impl OutputFormat {
    /// File extension, also used for the fixed artifact name.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Eps => "eps",
            OutputFormat::Png => "png",
        }
    }

    /// Fixed artifact name inside the session directory.
    pub fn artifact_name(self) -> String {
        format!("output.{}", self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

/// Configuration for an [`Engine`].
///
/// Holds the executables to run and the parameters that shape every
/// conversion. The defaults match a stock TeX Live + Ghostscript install.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// LaTeX compiler producing PDF. Default: `pdflatex`
    pub latex: PathBuf,

    /// Ghostscript console executable. Default: `gs` (`gswin64c`/`gswin32c` on Windows)
    pub ghostscript: PathBuf,

    /// Raster resolution of PNG output in dpi. Default: 300
    pub resolution: u32,

    /// Resolution the bounding box is measured at in dpi. Default: 1200
    pub bbox_resolution: u32,

    /// Whether EPS/PDF output should carry glyph outlines instead of fonts.
    pub outline_fonts: bool,
}

/// Default Ghostscript executable name for this platform.
pub fn default_ghostscript() -> &'static str {
    if cfg!(all(windows, target_pointer_width = "64")) {
        "gswin64c"
    } else if cfg!(windows) {
        "gswin32c"
    } else {
        "gs"
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latex: PathBuf::from("pdflatex"),
            ghostscript: PathBuf::from(default_ghostscript()),
            resolution: 300,
            bbox_resolution: 1200,
            outline_fonts: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.latex, PathBuf::from("pdflatex"));
        assert_eq!(config.resolution, 300);
        assert_eq!(config.bbox_resolution, 1200);
        assert!(config.bbox_resolution > config.resolution);
        assert!(config.outline_fonts);
        #[cfg(unix)]
        assert_eq!(config.ghostscript, PathBuf::from("gs"));
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(OutputFormat::Pdf.artifact_name(), "output.pdf");
        assert_eq!(OutputFormat::Eps.artifact_name(), "output.eps");
        assert_eq!(OutputFormat::Png.artifact_name(), "output.png");
        assert_eq!(OutputFormat::default(), OutputFormat::Png);
    }

    #[test]
    fn test_error_display_mentions_stage() {
        let err = EngineError::InterpreterFailed {
            stage: Stage::PdfConversion,
            code: Some(1),
        };
        let msg = err.to_string();
        assert!(msg.contains("PDF conversion"));
        assert!(msg.contains("exit code 1"));

        let err = EngineError::CompilationFailed { code: None };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn test_output_format_serde() {
        let json = serde_json::to_string(&OutputFormat::Eps).unwrap();
        assert_eq!(json, "\"eps\"");
        let back: OutputFormat = serde_json::from_str("\"pdf\"").unwrap();
        assert_eq!(back, OutputFormat::Pdf);
    }
}
