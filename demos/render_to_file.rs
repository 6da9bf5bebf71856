/// Example rendering a few formulas to PNG, EPS and PDF files.
use std::fs;
use std::path::Path;
use textonic::{prepare_source, Engine, EngineConfig, OutputFormat};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    let mut engine = Engine::new(EngineConfig::default())?;

    let output_dir = Path::new("textonic_output");
    fs::create_dir_all(output_dir)?;
    println!("Output directory: {}", output_dir.display());

    let formulas = [
        ("einstein_mass_energy", r"$E = mc^2$"),
        ("quadratic_formula", r"$x = \frac{-b \pm \sqrt{b^2 - 4ac}}{2a}$"),
        ("gaussian_integral", r"$\int_0^{\infty} e^{-x^2}\,dx = \frac{\sqrt{\pi}}{2}$"),
        (
            "colored_euler",
            "%!\\usepackage{xcolor}\n\\textcolor{blue}{$e^{i\\pi} + 1 = 0$}",
        ),
    ];

    let mut success_count = 0;
    let mut error_count = 0;

    for (name, snippet) in &formulas {
        let source = prepare_source(snippet)?;
        for format in [OutputFormat::Png, OutputFormat::Eps, OutputFormat::Pdf] {
            let dest = output_dir.join(format!("{}.{}", name, format.extension()));
            print!("Rendering {} ... ", dest.display());

            // Only the first format of each formula runs LaTeX.
            match engine.render(source.as_bytes(), format, None) {
                Ok(artifact) => {
                    fs::copy(engine.artifact_path(&artifact)?, &dest)?;
                    println!("✓");
                    success_count += 1;
                }
                Err(e) => {
                    println!("✗ Error: {}", e);
                    error_count += 1;
                }
            }
        }
    }

    println!("\nResults: {} successful, {} errors", success_count, error_count);
    Ok(())
}
