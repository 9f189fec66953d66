use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, ImageFormat, RgbaImage};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

/// Maximum supported image dimension in pixels (per axis).
/// Checked against the header before any pixels are decoded.
const MAX_IMAGE_DIM: u32 = 32_768;

// ============================================================================
// SAVE FORMATS
// ============================================================================

/// Formats the editor can encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            SaveFormat::Png => "image/png",
            SaveFormat::Jpeg => "image/jpeg",
        }
    }

    /// Parse a user-facing format name ("png", "jpg", "jpeg").
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            _ => None,
        }
    }

    /// The format a file of this MIME type would be re-encoded in, if any.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(SaveFormat::Png),
            "image/jpeg" | "image/jpg" => Some(SaveFormat::Jpeg),
            _ => None,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Why a file could not be turned into a raster surface.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("file is empty")]
    Empty,
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("animated {0} images are not supported")]
    Animated(&'static str),
    #[error("image is {width}x{height}, larger than the 32768px limit")]
    TooLarge { width: u32, height: u32 },
    #[error("could not decode image: {0}")]
    Malformed(#[from] ImageError),
}

#[derive(Debug, Error)]
#[error("could not encode {format:?}: {source}")]
pub struct EncodeError {
    pub format: SaveFormat,
    #[source]
    pub source: ImageError,
}

// ============================================================================
// MIME DETECTION
// ============================================================================

/// MIME type for a file extension, the way a browser would label an upload.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_lowercase().as_str() {
        "png" | "apng" => "image/png",
        "jpg" | "jpeg" | "jpe" | "jfif" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "tga" => "image/x-tga",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
}

fn mime_for_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Tga => "image/x-tga",
        ImageFormat::Avif => "image/avif",
        _ => "image/x-unknown",
    }
}

/// MIME type of the bytes based on their magic number.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(mime_for_format)
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode raw file bytes into RGBA.
///
/// Rejected before any pixel decoding happens:
/// - zero-length input
/// - a declared MIME type outside `image/*`
/// - bytes whose magic number is not a known raster format
/// - animated GIF / animated PNG
pub fn decode_image(bytes: &[u8], declared_mime: Option<&str>) -> Result<RgbaImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if let Some(mime) = declared_mime
        && !mime.is_empty()
        && !mime.starts_with("image/")
    {
        return Err(DecodeError::UnsupportedType(mime.to_string()));
    }

    let format = image::guess_format(bytes).map_err(|_| {
        DecodeError::UnsupportedType(
            declared_mime
                .filter(|m| !m.is_empty())
                .unwrap_or("unknown")
                .to_string(),
        )
    })?;

    match format {
        ImageFormat::Gif if gif_is_animated(bytes) => return Err(DecodeError::Animated("GIF")),
        ImageFormat::Png if png_is_animated(bytes) => return Err(DecodeError::Animated("PNG")),
        _ => {}
    }

    let (width, height) = image::io::Reader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    if width > MAX_IMAGE_DIM || height > MAX_IMAGE_DIM {
        return Err(DecodeError::TooLarge { width, height });
    }

    let img = image::load_from_memory_with_format(bytes, format)?;
    Ok(img.into_rgba8())
}

fn gif_is_animated(bytes: &[u8]) -> bool {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let Ok(mut decoder) = options.read_info(Cursor::new(bytes)) else {
        return false;
    };

    // Two frames are enough to know
    let mut frame_count = 0u32;
    while let Ok(Some(_)) = decoder.read_next_frame() {
        frame_count += 1;
        if frame_count > 1 {
            return true;
        }
    }
    false
}

fn png_is_animated(bytes: &[u8]) -> bool {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let Ok(reader) = decoder.read_info() else {
        return false;
    };
    reader
        .info()
        .animation_control()
        .is_some_and(|anim| anim.num_frames > 1)
}

// ============================================================================
// ENCODE
// ============================================================================

/// Encode an image into an in-memory file of the given format.
pub fn encode_image(image: &RgbaImage, format: SaveFormat, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    let result = match format {
        SaveFormat::Png => PngEncoder::new(&mut bytes).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        ),
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )
        }
    };
    result.map_err(|source| EncodeError { format, source })?;
    Ok(bytes)
}

// ============================================================================
// IMAGE SOURCES
// ============================================================================

/// A file-like object the viewer can (re-)read and, if allowed, overwrite.
///
/// Launch files (opened through the OS file association) carry write access;
/// manual uploads never do.
pub trait ImageSource: Send + Sync {
    /// Display name including extension.
    fn name(&self) -> String;

    /// Declared MIME type, if the source knows it.
    fn mime(&self) -> Option<String>;

    /// Read the current bytes. May be called again after navigation.
    fn read_bytes(&self) -> std::io::Result<Vec<u8>>;

    fn can_overwrite(&self) -> bool {
        false
    }

    /// Replace the source's content in place.
    fn write_bytes(&self, _bytes: &[u8]) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "source does not support overwriting",
        ))
    }
}

impl std::fmt::Debug for dyn ImageSource + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSource")
            .field("name", &self.name())
            .field("can_overwrite", &self.can_overwrite())
            .finish()
    }
}

/// A file on disk, opened through a launch path.
#[derive(Clone, Debug)]
pub struct FileSource {
    pub path: PathBuf,
    writable: bool,
}

impl FileSource {
    /// Writable unless the file is marked read-only.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let writable = std::fs::metadata(&path)
            .map(|m| m.is_file() && !m.permissions().readonly())
            .unwrap_or(false);
        Self { path, writable }
    }
}

impl ImageSource for FileSource {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Image".to_string())
    }

    fn mime(&self) -> Option<String> {
        mime_for_path(&self.path).map(str::to_string)
    }

    fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    fn can_overwrite(&self) -> bool {
        self.writable
    }

    fn write_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        if !self.writable {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} was opened read-only", self.path.display()),
            ));
        }
        replace_file_contents(&self.path, |out| out.write_all(bytes))
    }
}

/// Write into a temp file next to `path`, then rename it over `path`.
/// The original is untouched unless the whole write succeeds.
pub fn replace_file_contents(
    path: &Path,
    write: impl FnOnce(&mut dyn Write) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// An in-memory upload. Never grants write-back.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_for_path(Path::new(&name)).map(str::to_string);
        Self { name, mime, bytes }
    }
}

impl ImageSource for UploadedFile {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn mime(&self) -> Option<String> {
        self.mime.clone()
    }

    fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

/// All image files directly inside `dir`, sorted by name.
pub fn list_images_in_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| mime_for_path(path).is_some_and(|m| m.starts_with("image/")))
        .collect();
    files.sort();
    Ok(files)
}
