//! Ghostscript command lines.
//!
//! Pure argument builders; nothing here runs a process. Arguments after the
//! device selection (`-g`, `-c ...`) must stay after it, Ghostscript applies
//! them to the selected device.

use crate::bbox::BoundingBox;
use std::path::Path;

/// Name of the `bbox` measuring device.
pub const BBOX_DEVICE: &str = "bbox";
/// Raster device with an alpha channel used for PNG output.
pub const PNG_DEVICE: &str = "pngalpha";
/// Device used for the final PDF pass.
pub const PDF_DEVICE: &str = "pdfwrite";

/// EPS output device offered by the installed Ghostscript.
///
/// Ghostscript 9.14 replaced `epswrite` with `eps2write`; both are still
/// found in the wild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpsDevice {
    /// Current device (Ghostscript >= 9.14).
    Eps2Write,
    /// Legacy device.
    EpsWrite,
}

impl EpsDevice {
    /// Device name as passed to `-sDEVICE=`.
    pub fn name(self) -> &'static str {
        match self {
            EpsDevice::Eps2Write => "eps2write",
            EpsDevice::EpsWrite => "epswrite",
        }
    }

    /// Flag forcing glyphs to be written as paths.
    pub fn outline_flag(self) -> &'static str {
        match self {
            EpsDevice::Eps2Write => "-dNoOutputFonts",
            EpsDevice::EpsWrite => "-dNOCACHE",
        }
    }

    /// Picks the preferred device listed in `gs -h` output.
    pub fn detect(help: &str) -> Option<Self> {
        let mut has_legacy = false;
        for word in help.split_whitespace() {
            match word {
                "eps2write" => return Some(EpsDevice::Eps2Write),
                "epswrite" => has_legacy = true,
                _ => {}
            }
        }
        has_legacy.then_some(EpsDevice::EpsWrite)
    }
}

/// Leading arguments shared by every invocation: batch mode, no pause,
/// safe mode, fixed anti-aliasing, resolution.
pub fn base_args(resolution: u32) -> Vec<String> {
    vec![
        "-dBATCH".to_string(),
        "-dNOPAUSE".to_string(),
        "-dSAFER".to_string(),
        "-dTextAlphaBits=4".to_string(),
        "-dGraphicsAlphaBits=4".to_string(),
        format!("-r{}", resolution),
    ]
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Arguments listing the available devices.
pub fn help_args(resolution: u32) -> Vec<String> {
    let mut args = base_args(resolution);
    args.push("-h".to_string());
    args
}

/// Arguments measuring the ink extent of `src` with the `bbox` device.
pub fn bbox_args(src: &Path, resolution: u32) -> Vec<String> {
    let mut args = base_args(resolution);
    args.push(format!("-sDEVICE={}", BBOX_DEVICE));
    args.push(path_arg(src));
    args
}

/// Arguments rasterising `src` cropped to `bbox`.
///
/// The page origin is moved to the lower-left corner of the box and the
/// page size fixed to the box's pixel extent.
pub fn png_args(src: &Path, dest: &Path, bbox: &BoundingBox, resolution: u32) -> Vec<String> {
    let (width, height) = bbox.pixel_size(resolution);
    let mut args = base_args(resolution);
    args.extend([
        "-o".to_string(),
        path_arg(dest),
        format!("-sDEVICE={}", PNG_DEVICE),
        format!("-g{}x{}", width, height),
        "-c".to_string(),
        format!(
            "<</Install {{{:.2} {:.2} translate}}>> setpagedevice",
            -bbox.left,
            -bbox.bottom
        ),
        "-f".to_string(),
        path_arg(src),
    ]);
    args
}

/// Leading arguments of the EPS and PDF passes.
///
/// Anti-aliasing and resolution only matter for rasters, so only the first
/// three base flags are kept before enabling EPS cropping.
fn vector_args(device: EpsDevice, outline: bool) -> Vec<String> {
    let mut args: Vec<String> = base_args(0).into_iter().take(3).collect();
    args.push("-dEPSCrop".to_string());
    if outline {
        args.push(device.outline_flag().to_string());
    }
    args
}

/// Arguments converting `src` to a cropped EPS.
pub fn eps_args(src: &Path, dest: &Path, device: EpsDevice, outline: bool) -> Vec<String> {
    let mut args = vector_args(device, outline);
    args.extend([
        "-o".to_string(),
        path_arg(dest),
        format!("-sDEVICE={}", device.name()),
        "-f".to_string(),
        path_arg(src),
    ]);
    args
}

/// Arguments turning the cropped EPS `src` into a PDF.
pub fn pdf_args(src: &Path, dest: &Path, device: EpsDevice, outline: bool) -> Vec<String> {
    let mut args = vector_args(device, outline);
    args.extend([
        "-o".to_string(),
        path_arg(dest),
        format!("-sDEVICE={}", PDF_DEVICE),
        "-f".to_string(),
        path_arg(src),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detect_prefers_eps2write() {
        let help = "Available devices:\n   bbox eps2write epswrite pdfwrite pngalpha\n";
        assert_eq!(EpsDevice::detect(help), Some(EpsDevice::Eps2Write));
    }

    #[test]
    fn test_detect_falls_back_to_epswrite() {
        let help = "Available devices:\n   bbox epswrite pdfwrite\n";
        assert_eq!(EpsDevice::detect(help), Some(EpsDevice::EpsWrite));
    }

    #[test]
    fn test_detect_none() {
        assert_eq!(EpsDevice::detect("Available devices:\n bbox png16m\n"), None);
        assert_eq!(EpsDevice::detect(""), None);
    }

    #[test]
    fn test_base_args() {
        assert_eq!(
            base_args(300),
            vec![
                "-dBATCH",
                "-dNOPAUSE",
                "-dSAFER",
                "-dTextAlphaBits=4",
                "-dGraphicsAlphaBits=4",
                "-r300"
            ]
        );
    }

    #[test]
    fn test_bbox_args_use_probe_resolution() {
        let args = bbox_args(Path::new("textonic.pdf"), 1200);
        assert!(args.contains(&"-r1200".to_string()));
        assert_eq!(&args[args.len() - 2..], ["-sDEVICE=bbox", "textonic.pdf"]);
    }

    #[test]
    fn test_png_args() {
        let bbox = BoundingBox::new(133.703996, 697.463979, 150.191995, 705.725978);
        let args = png_args(
            Path::new("textonic.pdf"),
            Path::new("output.png"),
            &bbox,
            300,
        );
        assert_eq!(
            &args[6..],
            [
                "-o",
                "output.png",
                "-sDEVICE=pngalpha",
                "-g69x35",
                "-c",
                "<</Install {-133.70 -697.46 translate}>> setpagedevice",
                "-f",
                "textonic.pdf",
            ]
        );
        assert!(args.contains(&"-r300".to_string()));
    }

    #[test]
    fn test_eps_args_outline_flags() {
        let src = Path::new("textonic.pdf");
        let dest = Path::new("output.eps");
        let args = eps_args(src, dest, EpsDevice::Eps2Write, true);
        assert_eq!(
            args,
            vec![
                "-dBATCH",
                "-dNOPAUSE",
                "-dSAFER",
                "-dEPSCrop",
                "-dNoOutputFonts",
                "-o",
                "output.eps",
                "-sDEVICE=eps2write",
                "-f",
                "textonic.pdf"
            ]
        );

        let args = eps_args(src, dest, EpsDevice::EpsWrite, true);
        assert!(args.contains(&"-dNOCACHE".to_string()));
        assert!(args.contains(&"-sDEVICE=epswrite".to_string()));

        let args = eps_args(src, dest, EpsDevice::Eps2Write, false);
        assert!(!args.contains(&"-dNoOutputFonts".to_string()));
    }

    #[test]
    fn test_pdf_args_read_eps() {
        let args = pdf_args(
            Path::new("output.eps"),
            Path::new("output.pdf"),
            EpsDevice::Eps2Write,
            true,
        );
        assert_eq!(
            &args[3..],
            [
                "-dEPSCrop",
                "-dNoOutputFonts",
                "-o",
                "output.pdf",
                "-sDEVICE=pdfwrite",
                "-f",
                "output.eps",
            ]
        );
    }
}
