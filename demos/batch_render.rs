/// Example rendering one formula at several resolutions on a worker thread.
///
/// PNG dimensions scale linearly with the resolution.
use std::fs;
use std::path::Path;
use textonic::{prepare_source, Event, OutputFormat, Settings, Worker};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    let output_dir = Path::new("textonic_batch");
    fs::create_dir_all(output_dir)?;

    let source = prepare_source(r"$\sum_{n=1}^{\infty} \frac{1}{n^2} = \frac{\pi^2}{6}$")?;

    for (name, resolution) in [("screen", 96), ("print", 300), ("poster", 1200)] {
        let settings = Settings {
            resolution,
            ..Settings::default()
        };
        let worker = Worker::spawn(settings.engine_config())?;
        worker.submit(source.as_bytes(), OutputFormat::Png)?;

        for event in worker.events() {
            match event {
                Event::Progress(line) => log::debug!("{}", line),
                Event::Preview(path) => {
                    let (w, h) = image::image_dimensions(&path)?;
                    let dest = output_dir.join(format!("{}.png", name));
                    fs::copy(&path, &dest)?;
                    println!("{:>7} @ {:>4} dpi: {}x{} -> {}", name, resolution, w, h, dest.display());
                }
                Event::Finished(Err(e)) => {
                    println!("{:>7} @ {:>4} dpi: ✗ {}", name, resolution, e);
                    break;
                }
                Event::Finished(Ok(_)) => break,
            }
        }
        worker.shutdown();
    }

    Ok(())
}
