//! The render/convert engine.
//!
//! An [`Engine`] owns one scratch directory for its whole life. LaTeX
//! compiles into it, Ghostscript converts inside it, and everything is
//! removed on [`Engine::teardown`] or drop.

use crate::bbox::BoundingBox;
use crate::ghostscript::{self, EpsDevice};
use crate::process::{self, Invocation, ProcessHandle};
use crate::{EngineConfig, EngineError, OutputFormat, Stage};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Name of the LaTeX source written into the session.
pub const SOURCE_NAME: &str = "textonic.tex";
/// Name of the PDF LaTeX produces from [`SOURCE_NAME`].
pub const RENDER_NAME: &str = "textonic.pdf";
/// Prefix of scratch directory names.
pub const SESSION_PREFIX: &str = "textonic_";

const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Optional per-line progress callback.
pub type Progress<'a> = Option<&'a mut dyn FnMut(&str)>;

/// Result of probing one external tool.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    /// Executable that was probed.
    pub program: PathBuf,
    /// First line of its version banner, or why it could not be run.
    pub outcome: Result<String, String>,
}

impl ToolStatus {
    /// Whether the tool ran successfully.
    pub fn is_available(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// LaTeX-to-PDF/EPS/PNG pipeline bound to one scratch directory.
///
/// # Example
///
/// ```rust,no_run
/// use textonic::{Engine, EngineConfig, OutputFormat};
///
/// let mut engine = Engine::new(EngineConfig::default())?;
/// let pdf = engine.run_latex(
///     br"\documentclass{article}\begin{document}x\end{document}",
///     None,
/// )?;
/// let png = engine.convert(&pdf, OutputFormat::Png, None)?;
/// println!("preview at {}", engine.artifact_path(&png)?.display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    session: Option<TempDir>,
    last_compile: Option<Compiled>,
    eps_device: Option<EpsDevice>,
    process: ProcessHandle,
}

/// Source of the last successful compile and the compiler that built it.
#[derive(Debug)]
struct Compiled {
    latex: PathBuf,
    source: Vec<u8>,
}

fn no_progress(_: &str) {}

fn or_noop<'a, 'p: 'a>(
    progress: Option<&'a mut (dyn FnMut(&str) + 'p)>,
    noop: &'a mut fn(&str),
) -> &'a mut (dyn FnMut(&str) + 'a) {
    match progress {
        Some(progress) => progress,
        None => noop,
    }
}

impl Engine {
    /// Creates an engine with a fresh scratch directory.
    ///
    /// # Errors
    ///
    /// [`EngineError::Session`] if the directory cannot be created.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let session = tempfile::Builder::new()
            .prefix(SESSION_PREFIX)
            .tempdir()
            .map_err(EngineError::Session)?;
        log::info!("created session {}", session.path().display());
        Ok(Self {
            config,
            session: Some(session),
            last_compile: None,
            eps_device: None,
            process: ProcessHandle::new(),
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutable configuration; changes apply to the next invocation.
    ///
    /// The probed EPS device is forgotten since the Ghostscript executable
    /// may change. The compiled source stays valid unless the LaTeX
    /// executable changes.
    pub fn config_mut(&mut self) -> &mut EngineConfig {
        self.eps_device = None;
        &mut self.config
    }

    /// Scratch directory, `None` after teardown.
    pub fn dir(&self) -> Option<&Path> {
        self.session.as_ref().map(TempDir::path)
    }

    fn session_dir(&self) -> Result<&Path, EngineError> {
        self.dir().ok_or(EngineError::SessionClosed)
    }

    /// Resolves a session-relative artifact path to an absolute one.
    pub fn artifact_path(&self, rel: &Path) -> Result<PathBuf, EngineError> {
        Ok(self.session_dir()?.join(rel))
    }

    /// Handle that can kill the running external process from elsewhere.
    pub fn process_handle(&self) -> ProcessHandle {
        self.process.clone()
    }

    /// EPS device chosen for this session, if already probed.
    pub fn probed_eps_device(&self) -> Option<EpsDevice> {
        self.eps_device
    }

    /// Forgets the last compiled source so the next [`Engine::run_latex`]
    /// recompiles.
    pub fn invalidate(&mut self) {
        self.last_compile = None;
    }

    fn exec(
        &self,
        program: &Path,
        args: &[String],
        progress: &mut dyn FnMut(&str),
    ) -> Result<Invocation, EngineError> {
        process::run(program, args, self.session_dir()?, &self.process, progress)
    }

    fn ghostscript(
        &self,
        stage: Stage,
        args: &[String],
        progress: &mut dyn FnMut(&str),
    ) -> Result<Invocation, EngineError> {
        let inv = self.exec(&self.config.ghostscript, args, progress)?;
        if !inv.success() {
            log::warn!("Ghostscript {} failed: {}", stage, inv.stderr.trim_end());
            return Err(EngineError::InterpreterFailed {
                stage,
                code: inv.code(),
            });
        }
        Ok(inv)
    }

    /// Compiles `source` to PDF.
    ///
    /// Source byte-identical to the last successful compile is not
    /// recompiled. Every line LaTeX prints is passed to `progress` as it
    /// arrives. Returns the PDF path relative to the session directory.
    ///
    /// # Errors
    ///
    /// [`EngineError::CompilationFailed`] if LaTeX exits non-zero; the
    /// diagnostics have already been streamed to `progress` by then.
    pub fn run_latex(
        &mut self,
        source: &[u8],
        progress: Progress<'_>,
    ) -> Result<PathBuf, EngineError> {
        let mut noop: fn(&str) = no_progress;
        self.compile(source, or_noop(progress, &mut noop))
    }

    fn compile(
        &mut self,
        source: &[u8],
        progress: &mut dyn FnMut(&str),
    ) -> Result<PathBuf, EngineError> {
        let dir = self.session_dir()?.to_path_buf();
        let unchanged = self
            .last_compile
            .as_ref()
            .is_some_and(|c| c.latex == self.config.latex && c.source == source);
        if unchanged {
            log::debug!("source unchanged, skipping LaTeX");
            return Ok(PathBuf::from(RENDER_NAME));
        }
        self.last_compile = None;

        fs::write(dir.join(SOURCE_NAME), source)?;
        let stale = [RENDER_NAME.to_string()].into_iter().chain(
            [OutputFormat::Pdf, OutputFormat::Eps, OutputFormat::Png]
                .into_iter()
                .map(OutputFormat::artifact_name),
        );
        for name in stale {
            remove_if_exists(&dir.join(name))?;
        }

        let args = ["-interaction=nonstopmode".to_string(), SOURCE_NAME.to_string()];
        let inv = self.exec(&self.config.latex, &args, progress)?;
        if !inv.success() {
            return Err(EngineError::CompilationFailed { code: inv.code() });
        }

        self.last_compile = Some(Compiled {
            latex: self.config.latex.clone(),
            source: source.to_vec(),
        });
        Ok(PathBuf::from(RENDER_NAME))
    }

    /// Measures the ink extent of a PDF or EPS file.
    ///
    /// Runs at [`EngineConfig::bbox_resolution`], independent of the output
    /// resolution.
    ///
    /// # Errors
    ///
    /// [`EngineError::InterpreterFailed`] with [`Stage::BoundingBox`] on a
    /// non-zero exit, [`EngineError::BoundingBoxFailed`] if no box was
    /// reported.
    pub fn compute_bounds(&self, src: &Path) -> Result<BoundingBox, EngineError> {
        let args = ghostscript::bbox_args(src, self.config.bbox_resolution);
        let inv = self.ghostscript(Stage::BoundingBox, &args, &mut no_progress)?;
        let bbox = BoundingBox::from_diagnostics(&inv.stderr)?;
        log::debug!("bounding box of {}: {:?}", src.display(), bbox);
        Ok(bbox)
    }

    /// EPS device of the installed Ghostscript, probed once per session.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoEpsDevice`] if neither device is listed.
    pub fn eps_device(&mut self) -> Result<EpsDevice, EngineError> {
        if let Some(device) = self.eps_device {
            return Ok(device);
        }
        let mut help = String::new();
        let args = ghostscript::help_args(self.config.resolution);
        let inv = self.exec(&self.config.ghostscript, &args, &mut |line| {
            help.push_str(line);
            help.push('\n');
        })?;
        if !inv.success() {
            log::debug!("`gs -h` exited with {:?}", inv.code());
        }
        let device = EpsDevice::detect(&help).ok_or(EngineError::NoEpsDevice)?;
        log::info!("using EPS device {}", device.name());
        self.eps_device = Some(device);
        Ok(device)
    }

    /// Converts `src` (relative to the session or absolute) to `format`.
    ///
    /// PNG output is cropped to the measured bounding box. PDF output goes
    /// through an intermediate EPS so that cropping and font outlining are
    /// applied before the PDF is written. Returns the artifact path relative
    /// to the session directory.
    ///
    /// # Errors
    ///
    /// [`EngineError::InterpreterFailed`] tagged with the failing stage,
    /// plus the bounding box and EPS device errors of the steps involved.
    pub fn convert(
        &mut self,
        src: &Path,
        format: OutputFormat,
        progress: Progress<'_>,
    ) -> Result<PathBuf, EngineError> {
        let mut noop: fn(&str) = no_progress;
        self.convert_with(src, format, or_noop(progress, &mut noop))
    }

    fn convert_with(
        &mut self,
        src: &Path,
        format: OutputFormat,
        progress: &mut dyn FnMut(&str),
    ) -> Result<PathBuf, EngineError> {
        self.session_dir()?;
        let dest = PathBuf::from(format.artifact_name());

        match format {
            OutputFormat::Png => {
                let bbox = self.compute_bounds(src)?;
                let args = ghostscript::png_args(src, &dest, &bbox, self.config.resolution);
                self.ghostscript(Stage::PngConversion, &args, progress)?;
            }
            OutputFormat::Eps => {
                self.convert_eps(src, &dest, progress)?;
            }
            OutputFormat::Pdf => {
                let eps = PathBuf::from(OutputFormat::Eps.artifact_name());
                let device = self.convert_eps(src, &eps, progress)?;
                let args = ghostscript::pdf_args(&eps, &dest, device, self.config.outline_fonts);
                self.ghostscript(Stage::PdfConversion, &args, progress)?;
            }
        }
        Ok(dest)
    }

    fn convert_eps(
        &mut self,
        src: &Path,
        dest: &Path,
        progress: &mut dyn FnMut(&str),
    ) -> Result<EpsDevice, EngineError> {
        let device = self.eps_device()?;
        let args = ghostscript::eps_args(src, dest, device, self.config.outline_fonts);
        self.ghostscript(Stage::EpsConversion, &args, progress)?;
        Ok(device)
    }

    /// Compiles `source` and converts the result in one go.
    pub fn render(
        &mut self,
        source: &[u8],
        format: OutputFormat,
        progress: Progress<'_>,
    ) -> Result<PathBuf, EngineError> {
        let mut noop: fn(&str) = no_progress;
        let progress = or_noop(progress, &mut noop);
        let pdf = self.compile(source, progress)?;
        self.convert_with(&pdf, format, progress)
    }

    /// Runs each configured tool with its version flag.
    pub fn check_tools(&self) -> Vec<ToolStatus> {
        [
            (&self.config.latex, "--version"),
            (&self.config.ghostscript, "-v"),
        ]
        .into_iter()
        .map(|(program, flag)| {
            let mut first: Option<String> = None;
            let result = self.exec(program, &[flag.to_string()], &mut |line| {
                if first.is_none() && !line.is_empty() {
                    first = Some(line.to_string());
                }
            });
            let outcome = match result {
                Ok(inv) if inv.success() => Ok(first.unwrap_or_default()),
                Ok(inv) => Err(format!("exited with {:?}", inv.code())),
                Err(e) => Err(e.to_string()),
            };
            ToolStatus {
                program: program.clone(),
                outcome,
            }
        })
        .collect()
    }

    /// Kills any running external process, waits for it to exit, and
    /// deletes the scratch directory.
    ///
    /// Safe to call repeatedly. A directory that cannot be removed is
    /// logged and left behind.
    pub fn teardown(&mut self) {
        if !self.process.terminate(TEARDOWN_GRACE) {
            log::warn!("external process still running after {:?}", TEARDOWN_GRACE);
        }
        self.last_compile = None;
        let Some(session) = self.session.take() else {
            return;
        };
        let path = session.path().to_path_buf();
        match session.close() {
            Ok(()) => log::info!("removed session {}", path.display()),
            Err(e) => log::error!("failed to remove session {}: {}", path.display(), e),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
