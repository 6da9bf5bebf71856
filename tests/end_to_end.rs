/// End-to-end rendering with the real pdflatex and Ghostscript.
///
/// Ignored by default; run with `cargo test -- --ignored` on a machine with
/// a TeX distribution and Ghostscript installed.
use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use textonic::{
    prepare_source, ClipboardKind, ClipboardPayload, Engine, EngineConfig, EngineError,
    OutputFormat,
};

const FORMULA: &str = r"$\displaystyle\int_0^{\infty} e^{-x^2}\,dx = \frac{\sqrt{\pi}}{2}$";

fn engine() -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    Engine::new(EngineConfig::default()).expect("session should be created")
}

#[test]
#[ignore]
fn test_png_matches_bounding_box() {
    let mut engine = engine();
    let source = prepare_source(FORMULA).unwrap();

    let pdf = engine.run_latex(source.as_bytes(), None).unwrap();
    let bbox = engine.compute_bounds(&pdf).unwrap();
    assert!(bbox.width() > 0.0 && bbox.height() > 0.0, "{:?}", bbox);

    for res in [150, 300, 600] {
        engine.config_mut().resolution = res;
        let png = engine.render(source.as_bytes(), OutputFormat::Png, None).unwrap();
        let dims = image::image_dimensions(engine.artifact_path(&png).unwrap()).unwrap();
        assert_eq!(dims, bbox.pixel_size(res), "at {} dpi", res);
    }
}

#[test]
#[ignore]
fn test_minimal_document_is_cropped() {
    let mut engine = engine();
    let source = br"\documentclass{article}\begin{document}x\end{document}";

    let pdf = engine.run_latex(source, None).unwrap();
    let bbox = engine.compute_bounds(&pdf).unwrap();
    // Smaller than both A4 (595x842) and Letter (612x792).
    assert!(bbox.width() < 595.0, "{:?}", bbox);
    assert!(bbox.height() < 792.0, "{:?}", bbox);

    let png = engine.convert(&pdf, OutputFormat::Png, None).unwrap();
    let (w, h) = image::image_dimensions(engine.artifact_path(&png).unwrap()).unwrap();
    let (ew, eh) = bbox.pixel_size(engine.config().resolution);
    assert!(w.abs_diff(ew) <= 1 && h.abs_diff(eh) <= 1, "{}x{} vs {}x{}", w, h, ew, eh);
}

#[test]
#[ignore]
fn test_vector_outputs() {
    let mut engine = engine();
    let source = prepare_source(FORMULA).unwrap();

    let eps = engine.render(source.as_bytes(), OutputFormat::Eps, None).unwrap();
    let eps = fs::read(engine.artifact_path(&eps).unwrap()).unwrap();
    assert!(eps.starts_with(b"%!PS-Adobe"));

    let pdf = engine.render(source.as_bytes(), OutputFormat::Pdf, None).unwrap();
    let pdf = fs::read(engine.artifact_path(&pdf).unwrap()).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert!(engine.probed_eps_device().is_some());
}

#[test]
#[ignore]
fn test_latex_error_is_reported() {
    let mut engine = engine();
    let source = prepare_source(r"$\notacommand$").unwrap();

    let mut errors = Vec::new();
    let mut collect = |line: &str| {
        if textonic::is_error_line(line) {
            errors.push(line.to_string());
        }
    };
    let err = engine
        .render(source.as_bytes(), OutputFormat::Png, Some(&mut collect))
        .unwrap_err();
    assert!(matches!(err, EngineError::CompilationFailed { .. }), "{}", err);
    assert_eq!(errors.first().map(String::as_str), Some("! Undefined control sequence."));
}

#[test]
#[ignore]
fn test_png_clipboard_bitmap() {
    let mut engine = engine();
    let source = prepare_source(FORMULA).unwrap();
    let png = engine.render(source.as_bytes(), OutputFormat::Png, None).unwrap();
    let path: PathBuf = engine.artifact_path(&png).unwrap();

    let (width, height) = image::image_dimensions(&path).unwrap();
    match ClipboardPayload::from_artifact(&path, ClipboardKind::for_format(OutputFormat::Png)).unwrap() {
        ClipboardPayload::Bitmap(bitmap) => {
            assert_eq!((bitmap.width, bitmap.height), (width, height));
            assert_eq!(bitmap.rgba.len(), (width * height * 4) as usize);
        }
        other => panic!("expected a bitmap, got {:?}", other.format_name()),
    }
}
