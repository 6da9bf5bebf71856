/// Command-line interface for TexTonic.
///
/// Compiles a LaTeX document or snippet and writes it as PDF, EPS or PNG.
use clap::{ArgAction, Parser, ValueEnum};
use std::error::Error;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use textonic::{
    is_error_line, prepare_source, ClipboardError, ClipboardKind, ClipboardPayload, ClipboardSink,
    Engine, Event, OutputFormat, Settings, SystemClipboard, Worker,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Pdf,
    Eps,
    Png,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Pdf => OutputFormat::Pdf,
            Format::Eps => OutputFormat::Eps,
            Format::Png => OutputFormat::Png,
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "textonic")]
#[command(about = "Render LaTeX to PDF, EPS or PNG", long_about = None)]
struct Args {
    /// LaTeX file to render, `-` or nothing for stdin
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Output format (defaults to the saved setting)
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Output file path (defaults to output.<format>)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// PNG resolution in dpi
    #[arg(short, long, value_name = "DPI")]
    resolution: Option<u32>,

    /// Keep fonts as fonts in EPS/PDF output
    #[arg(long)]
    no_outline: bool,

    /// LaTeX executable
    #[arg(long, value_name = "PROG")]
    latex: Option<PathBuf>,

    /// Ghostscript executable
    #[arg(long, value_name = "PROG")]
    gs: Option<PathBuf>,

    /// Also place the result on the system clipboard
    #[arg(long)]
    clipboard: bool,

    /// Check that the external tools can be run, then exit
    #[arg(long)]
    check: bool,

    /// Persist the effective settings
    #[arg(long)]
    save_settings: bool,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// More output (-v for tool log, -vv for debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn settings_path(args: &Args) -> Result<PathBuf, textonic::SettingsError> {
    match &args.settings {
        Some(path) => Ok(path.clone()),
        None => Settings::default_path(),
    }
}

fn load_settings(args: &Args) -> Settings {
    let loaded = settings_path(args).and_then(|path| Settings::load_from(&path));
    match loaded {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("{}; using default settings", e);
            Settings::default()
        }
    }
}

/// Command-line flags take precedence over saved settings.
fn apply_overrides(args: &Args, mut settings: Settings) -> Settings {
    if let Some(format) = args.format {
        settings.format = format.into();
    }
    if let Some(res) = args.resolution {
        settings.resolution = res;
    }
    if args.no_outline {
        settings.outline_fonts = false;
    }
    if let Some(latex) = &args.latex {
        settings.latex = latex.clone();
    }
    if let Some(gs) = &args.gs {
        settings.ghostscript = gs.clone();
    }
    settings
}

fn read_input(input: Option<&Path>) -> std::io::Result<String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

/// Places the artifact at `path` on `sink` in the representation of `format`.
fn copy_to_clipboard(
    path: &Path,
    format: OutputFormat,
    sink: &mut dyn ClipboardSink,
) -> Result<(), ClipboardError> {
    let payload = ClipboardPayload::from_artifact(path, ClipboardKind::for_format(format))?;
    sink.place(&payload)
}

/// Renders `source` with `settings` and copies the artifact to the output
/// path, and to `clipboard` when requested. Returns the output path.
fn run_with_args(
    args: &Args,
    settings: &Settings,
    source: &str,
    clipboard: &mut dyn ClipboardSink,
) -> Result<PathBuf, Box<dyn Error>> {
    let document = prepare_source(source)?;
    let format = settings.format;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format.artifact_name()));

    let worker = Worker::spawn(settings.engine_config())?;
    worker.submit(document, format)?;

    let mut result = Err("worker stopped without a result".to_string());
    for event in worker.events() {
        match event {
            Event::Progress(line) if is_error_line(&line) => eprintln!("{}", line),
            Event::Progress(line) => log::info!("{}", line),
            Event::Preview(path) => log::debug!("preview at {}", path.display()),
            Event::Finished(outcome) => {
                result = outcome;
                break;
            }
        }
    }
    let artifact = result?;
    fs::copy(&artifact, &output)?;
    worker.shutdown();

    if args.clipboard {
        copy_to_clipboard(&output, format, clipboard)?;
        eprintln!("✓ Copied to clipboard");
    }
    Ok(output)
}

fn check_tools(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let engine = Engine::new(settings.engine_config())?;
    let mut missing = Vec::new();
    for status in engine.check_tools() {
        match &status.outcome {
            Ok(version) => eprintln!("✓ {}: {}", status.program.display(), version),
            Err(e) => {
                eprintln!("✗ {}: {}", status.program.display(), e);
                missing.push(status.program.display().to_string());
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("unavailable: {}", missing.join(", ")).into())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::builder().filter_level(level).try_init().ok();

    let settings = apply_overrides(&args, load_settings(&args));
    if args.save_settings {
        settings.save_to(&settings_path(&args)?)?;
    }
    if args.check {
        return check_tools(&settings);
    }

    let source = read_input(args.input.as_deref())?;
    eprintln!("Rendering {}...", settings.format);
    let output = run_with_args(&args, &settings, &source, &mut SystemClipboard::new())?;
    eprintln!("✓ Saved to: {}", output.display());

    Ok(())
}
