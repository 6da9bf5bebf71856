//! Bounding boxes reported by Ghostscript's `bbox` device.

use crate::EngineError;

/// Prefix of the high-resolution bounding box line in `bbox` diagnostics.
pub const HIRES_MARKER: &str = "%%HiResBoundingBox:";

/// Points per inch, the unit of PostScript page space.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Tight extent of the ink on a page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Lower-left x.
    pub left: f64,
    /// Lower-left y.
    pub bottom: f64,
    /// Upper-right x.
    pub right: f64,
    /// Upper-right y.
    pub top: f64,
}

impl BoundingBox {
    /// Creates a bounding box from its four edges.
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Width in points.
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Height in points.
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Pixel dimensions of a raster covering the box at `resolution` dpi.
    ///
    /// Both sides round up so no ink is clipped, and never drop below one
    /// pixel.
    pub fn pixel_size(&self, resolution: u32) -> (u32, u32) {
        let dpi = f64::from(resolution);
        let side = |points: f64| (points * dpi / POINTS_PER_INCH).ceil().max(1.0) as u32;
        (side(self.width()), side(self.height()))
    }

    /// Parses the four numbers following the marker on one line.
    fn parse_fields(rest: &str) -> Option<Self> {
        let mut nums = rest.split_whitespace().map(str::parse::<f64>);
        let left = nums.next()?.ok()?;
        let bottom = nums.next()?.ok()?;
        let right = nums.next()?.ok()?;
        let top = nums.next()?.ok()?;
        Some(Self::new(left, bottom, right, top))
    }

    /// Scans Ghostscript diagnostics for the first high-resolution
    /// bounding box line.
    ///
    /// # Errors
    ///
    /// [`EngineError::BoundingBoxFailed`] when no line carries the marker
    /// followed by four numbers.
    pub fn from_diagnostics(text: &str) -> Result<Self, EngineError> {
        text.lines()
            .filter_map(|line| line.trim_start().strip_prefix(HIRES_MARKER))
            .find_map(Self::parse_fields)
            .ok_or(EngineError::BoundingBoxFailed)
    }
}
