//! Clipboard export of conversion artifacts.
//!
//! Preparing the payload is platform-neutral and lives in
//! [`ClipboardPayload`]; placing it is the job of a [`ClipboardSink`].
//! [`SystemClipboard`] talks to the desktop: on Windows the DIB goes out as
//! `CF_DIB` and files under registered format names; elsewhere bitmaps go
//! through arboard and files under their MIME type.

use crate::OutputFormat;
use byteorder::{LittleEndian, ReadBytesExt};
use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Size of the `BITMAPFILEHEADER` preceding the DIB in a `.bmp` file.
pub const BMP_FILE_HEADER_LEN: usize = 14;

/// `"BM"` read as a little-endian `u16`.
const BMP_MAGIC: u16 = 0x4D42;

/// Clipboard-related errors
#[derive(Error, Debug)]
pub enum ClipboardError {
    /// The artifact could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The PNG could not be decoded or the bitmap encoded.
    #[error("image conversion failed: {0}")]
    Image(#[from] image::ImageError),

    /// The encoded bitmap did not start with a valid file header.
    #[error("malformed bitmap file header")]
    BadBitmapHeader,

    /// The system clipboard could not be opened or written.
    #[error("failed to access clipboard: {0}")]
    Access(String),

    /// The sink cannot carry this format.
    #[error("clipboard does not support the \"{0}\" format")]
    UnsupportedFormat(&'static str),
}

/// How an artifact should appear on the clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    /// Device-independent bitmap flattened onto white (from a PNG).
    Bitmap,
    /// PNG bytes under the registered `PNG` format.
    Png,
    /// PDF bytes under `Portable Document Format`.
    Pdf,
    /// EPS bytes under `Encapsulated PostScript`.
    Eps,
}

impl ClipboardKind {
    /// Default clipboard representation of an output format.
    pub fn for_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Png => ClipboardKind::Bitmap,
            OutputFormat::Pdf => ClipboardKind::Pdf,
            OutputFormat::Eps => ClipboardKind::Eps,
        }
    }

    /// Registered clipboard format name; `None` for the built-in bitmap.
    pub fn registered_name(self) -> Option<&'static str> {
        match self {
            ClipboardKind::Bitmap => None,
            ClipboardKind::Png => Some("PNG"),
            ClipboardKind::Pdf => Some("Portable Document Format"),
            ClipboardKind::Eps => Some("Encapsulated PostScript"),
        }
    }

    /// MIME type of the raw bytes, used where formats are not registered
    /// by name.
    pub fn mime_type(self) -> &'static str {
        match self {
            ClipboardKind::Bitmap => "image/bmp",
            ClipboardKind::Png => "image/png",
            ClipboardKind::Pdf => "application/pdf",
            ClipboardKind::Eps => "application/postscript",
        }
    }
}

/// Flattened raster ready for the clipboard.
#[derive(Debug, Clone)]
pub struct Bitmap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// BMP data without its file header.
    pub dib: Vec<u8>,
    /// The same pixels as opaque RGBA, row-major from the top.
    pub rgba: Vec<u8>,
}

/// Data to place on the clipboard.
#[derive(Debug, Clone)]
pub enum ClipboardPayload {
    /// Device-independent bitmap.
    Bitmap(Bitmap),
    /// Raw file bytes under a registered format name.
    Registered {
        /// Registered format name.
        name: &'static str,
        /// MIME type of `data`.
        mime: &'static str,
        /// File contents.
        data: Vec<u8>,
    },
}

impl ClipboardPayload {
    /// Reads the artifact at `path` and prepares it as `kind`.
    pub fn from_artifact(path: &Path, kind: ClipboardKind) -> Result<Self, ClipboardError> {
        let data = std::fs::read(path).map_err(|source| ClipboardError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match kind.registered_name() {
            Some(name) => Ok(ClipboardPayload::Registered {
                name,
                mime: kind.mime_type(),
                data,
            }),
            None => Ok(ClipboardPayload::Bitmap(bitmap_from_png(&data)?)),
        }
    }

    /// Registered format name, `None` for bitmaps.
    pub fn format_name(&self) -> Option<&'static str> {
        match self {
            ClipboardPayload::Bitmap(_) => None,
            ClipboardPayload::Registered { name, .. } => Some(*name),
        }
    }
}

/// Blends an RGBA raster onto an opaque white background.
pub fn flatten_on_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        let a = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Reads the magic and pixel-data offset of a `BITMAPFILEHEADER`.
fn read_file_header(header: &[u8]) -> std::io::Result<(u16, u32)> {
    let mut header = Cursor::new(header);
    let magic = header.read_u16::<LittleEndian>()?;
    let _file_size = header.read_u32::<LittleEndian>()?;
    let _reserved = header.read_u32::<LittleEndian>()?;
    let pixel_offset = header.read_u32::<LittleEndian>()?;
    Ok((magic, pixel_offset))
}

/// Returns the DIB part of an encoded `.bmp` file.
///
/// # Errors
///
/// [`ClipboardError::BadBitmapHeader`] if the magic bytes or the pixel
/// offset do not describe a bitmap file.
pub fn strip_file_header(bmp: &[u8]) -> Result<&[u8], ClipboardError> {
    if bmp.len() < BMP_FILE_HEADER_LEN {
        return Err(ClipboardError::BadBitmapHeader);
    }
    let (magic, pixel_offset) = read_file_header(&bmp[..BMP_FILE_HEADER_LEN])
        .map_err(|_| ClipboardError::BadBitmapHeader)?;
    let pixel_offset = pixel_offset as usize;
    if magic != BMP_MAGIC || pixel_offset < BMP_FILE_HEADER_LEN || pixel_offset > bmp.len() {
        return Err(ClipboardError::BadBitmapHeader);
    }
    Ok(&bmp[BMP_FILE_HEADER_LEN..])
}

/// Converts PNG bytes into a clipboard bitmap.
pub fn bitmap_from_png(png: &[u8]) -> Result<Bitmap, ClipboardError> {
    let rgba = image::load_from_memory_with_format(png, ImageFormat::Png)?.to_rgba8();
    let flat = flatten_on_white(&rgba);

    let mut bmp = Vec::new();
    flat.write_to(&mut Cursor::new(&mut bmp), ImageFormat::Bmp)?;
    let dib = strip_file_header(&bmp)?.to_vec();

    let rgba = image::DynamicImage::ImageRgb8(flat).to_rgba8();
    Ok(Bitmap {
        width: rgba.width(),
        height: rgba.height(),
        dib,
        rgba: rgba.into_raw(),
    })
}

/// Destination for clipboard payloads.
pub trait ClipboardSink {
    /// Replaces the clipboard contents with `payload`.
    fn place(&mut self, payload: &ClipboardPayload) -> Result<(), ClipboardError>;
}

/// The desktop clipboard.
///
/// Native clipboard handles are not `Send` on every platform, so one is
/// opened per operation.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    /// Creates a handle to the system clipboard.
    pub fn new() -> Self {
        Self
    }
}

fn access_error<E: std::fmt::Display>(e: E) -> ClipboardError {
    ClipboardError::Access(e.to_string())
}

#[cfg(windows)]
impl ClipboardSink for SystemClipboard {
    fn place(&mut self, payload: &ClipboardPayload) -> Result<(), ClipboardError> {
        use clipboard_win::{formats, raw, Clipboard};

        let _open = Clipboard::new_attempts(10).map_err(access_error)?;
        raw::empty().map_err(access_error)?;
        match payload {
            ClipboardPayload::Bitmap(bitmap) => {
                raw::set_without_clear(formats::CF_DIB, &bitmap.dib).map_err(access_error)?;
                log::debug!("placed {}x{} DIB on clipboard", bitmap.width, bitmap.height);
            }
            ClipboardPayload::Registered { name, data, .. } => {
                let format =
                    raw::register_format(name).ok_or(ClipboardError::UnsupportedFormat(*name))?;
                raw::set_without_clear(format.get(), data).map_err(access_error)?;
                log::debug!("placed {} bytes as {:?}", data.len(), name);
            }
        }
        Ok(())
    }
}

#[cfg(not(windows))]
impl ClipboardSink for SystemClipboard {
    fn place(&mut self, payload: &ClipboardPayload) -> Result<(), ClipboardError> {
        match payload {
            ClipboardPayload::Bitmap(bitmap) => {
                let mut clipboard = arboard::Clipboard::new().map_err(access_error)?;
                clipboard
                    .set_image(arboard::ImageData {
                        width: bitmap.width as usize,
                        height: bitmap.height as usize,
                        bytes: std::borrow::Cow::Borrowed(&bitmap.rgba),
                    })
                    .map_err(access_error)?;
                log::debug!("placed {}x{} bitmap on clipboard", bitmap.width, bitmap.height);
            }
            ClipboardPayload::Registered { mime, data, .. } => {
                use clipboard_rs::{Clipboard, ClipboardContext};

                let clipboard = ClipboardContext::new().map_err(access_error)?;
                clipboard
                    .set_buffer(mime, data.clone())
                    .map_err(access_error)?;
                log::debug!("placed {} bytes as {}", data.len(), mime);
            }
        }
        Ok(())
    }
}
