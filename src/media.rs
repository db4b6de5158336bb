use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use std::fs;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::MediaError;
use crate::naming::{generate_name, next_stamp, split_extension};
use crate::types::{MediaKind, ProcessedMedia};

/// Extensions handled as opaque video payloads
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "webm", "3gp", "flv", "wmv", "m4v",
];

/// JPEG quality used when re-encoding images
pub const JPEG_QUALITY: u8 = 85;

/// Extension of every re-encoded image
pub const IMAGE_EXTENSION: &str = "jpg";

/// Readable source of media bytes
///
/// Implementations decide where the bytes come from; the transform only
/// ever reads them.
pub trait MediaSource: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> String;

    /// File name as reported by the provider, if any
    fn display_name(&self) -> Option<String>;

    /// Declared MIME type, if any
    fn mime_type(&self) -> Option<String>;

    /// Opens a fresh stream over the source bytes
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Secondary way to reach the bytes, tried once when [`MediaSource::open`] fails
    fn open_fallback(&self) -> io::Result<Box<dyn Read + Send>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no fallback access path",
        ))
    }
}

/// Shared handle to a source, as submitted in a batch
pub type MediaHandle = Arc<dyn MediaSource>;

/// Media stored in a local file
#[derive(Debug, Clone)]
pub struct FileMedia {
    path: PathBuf,
    mime: Option<String>,
}

impl FileMedia {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn handle(self) -> MediaHandle {
        Arc::new(self)
    }
}

impl MediaSource for FileMedia {
    fn id(&self) -> String {
        self.path.display().to_string()
    }

    fn display_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    fn mime_type(&self) -> Option<String> {
        if let Some(mime) = &self.mime {
            return Some(mime.clone());
        }
        infer::get_from_path(&self.path)
            .ok()
            .flatten()
            .map(|kind| kind.mime_type().to_string())
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(&self.path)?))
    }

    fn open_fallback(&self) -> io::Result<Box<dyn Read + Send>> {
        let resolved = fs::canonicalize(&self.path)?;
        Ok(Box::new(fs::File::open(resolved)?))
    }
}

/// Media held in memory
#[derive(Debug, Clone)]
pub struct BytesMedia {
    name: Option<String>,
    mime: Option<String>,
    data: Bytes,
}

impl BytesMedia {
    pub fn new(name: Option<&str>, mime: Option<&str>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.map(str::to_string),
            mime: mime.map(str::to_string),
            data: data.into(),
        }
    }

    pub fn handle(self) -> MediaHandle {
        Arc::new(self)
    }
}

impl MediaSource for BytesMedia {
    fn id(&self) -> String {
        format!(
            "memory:{}",
            self.name.as_deref().unwrap_or("<unnamed>")
        )
    }

    fn display_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn mime_type(&self) -> Option<String> {
        self.mime.clone()
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
}

/// Per-item parameters of a transform
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub use_original_size: bool,
    pub custom_width: u32,
    pub prefix: Option<String>,
    pub is_batch: bool,
    /// Directory receiving the temporary output files
    pub work_dir: PathBuf,
}

/// Video when either the extension or the declared MIME type says so
pub fn is_video(name: &str, mime: Option<&str>) -> bool {
    let by_extension = split_extension(name)
        .1
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|video| video.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false);
    let by_mime = mime
        .map(|mime| mime.trim().to_ascii_lowercase().starts_with("video/"))
        .unwrap_or(false);
    by_extension || by_mime
}

/// Converts one source into a renamed local file ready for upload
///
/// Blocking: decodes and encodes on the calling thread.
pub fn transform(
    source: &dyn MediaSource,
    options: &TransformOptions,
) -> Result<ProcessedMedia, MediaError> {
    let original_name = source
        .display_name()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("unknown-{}", next_stamp()));
    let mime = source.mime_type();
    let kind = if is_video(&original_name, mime.as_deref()) {
        MediaKind::Video
    } else {
        MediaKind::Image
    };
    debug!(
        "Classified {:?} (mime {:?}) as {:?}",
        original_name, mime, kind
    );

    let stream = open_stream(source)?;
    fs::create_dir_all(&options.work_dir)?;

    match kind {
        MediaKind::Video => process_video(stream, original_name, options),
        MediaKind::Image => process_image(source, stream, original_name, options),
    }
}

fn open_stream(source: &dyn MediaSource) -> Result<Box<dyn Read + Send>, MediaError> {
    match source.open() {
        Ok(stream) => Ok(stream),
        Err(err) => {
            warn!(
                "Could not open {}: {:?}, trying fallback access path",
                source.id(),
                err
            );
            source.open_fallback().map_err(|fallback_err| {
                warn!(
                    "Fallback access also failed for {}: {:?}",
                    source.id(),
                    fallback_err
                );
                MediaError::StreamUnavailable {
                    handle: source.id(),
                    source: err,
                }
            })
        }
    }
}

fn process_video(
    mut stream: Box<dyn Read + Send>,
    original_name: String,
    options: &TransformOptions,
) -> Result<ProcessedMedia, MediaError> {
    let extension = split_extension(&original_name).1;
    let new_name = generate_name(
        &original_name,
        options.prefix.as_deref(),
        options.is_batch,
        MediaKind::Video,
        extension,
    );

    let mut output = temp_output(&options.work_dir, &new_name)?;
    let copied = io::copy(&mut stream, output.as_file_mut())?;
    output.as_file_mut().flush()?;

    info!(
        "Video processed: {:?} -> {:?} ({} bytes)",
        original_name, new_name, copied
    );
    Ok(ProcessedMedia {
        file: output.into_temp_path(),
        original_name,
        new_name,
        kind: MediaKind::Video,
    })
}

fn process_image(
    source: &dyn MediaSource,
    mut stream: Box<dyn Read + Send>,
    original_name: String,
    options: &TransformOptions,
) -> Result<ProcessedMedia, MediaError> {
    let mut original = Vec::new();
    stream.read_to_end(&mut original)?;

    let decoded = decode_image(&original).map_err(|reason| MediaError::Decode {
        handle: source.id(),
        reason,
    })?;
    debug!(
        "Decoded {:?}: {}x{}",
        original_name,
        decoded.width(),
        decoded.height()
    );

    let resized = if options.use_original_size {
        decoded
    } else {
        downscale(decoded, options.custom_width)
    };
    let oriented = apply_orientation(resized, read_orientation(&original));

    let new_name = generate_name(
        &original_name,
        options.prefix.as_deref(),
        options.is_batch,
        MediaKind::Image,
        Some(IMAGE_EXTENSION),
    );
    let mut output = temp_output(&options.work_dir, &new_name)?;
    {
        let mut writer = BufWriter::new(output.as_file_mut());
        encode_jpeg(&oriented, &mut writer)?;
        writer.flush()?;
    }

    info!(
        "Image processed: {:?} -> {:?} ({}x{})",
        original_name,
        new_name,
        oriented.width(),
        oriented.height()
    );
    Ok(ProcessedMedia {
        file: output.into_temp_path(),
        original_name,
        new_name,
        kind: MediaKind::Image,
    })
}

fn temp_output(work_dir: &Path, new_name: &str) -> io::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix("niscp-")
        .suffix(&format!("-{new_name}"))
        .tempfile_in(work_dir)
}

fn decode_image(bytes: &[u8]) -> Result<DynamicImage, String> {
    let image = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;
    if image.width() == 0 || image.height() == 0 {
        return Err("decoded image is empty".to_string());
    }
    Ok(image)
}

/// Shrinks `image` to `max_width` keeping the aspect ratio; never enlarges
pub fn downscale(image: DynamicImage, max_width: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if max_width == 0 || width <= max_width {
        return image;
    }
    let new_height = (f64::from(max_width) * f64::from(height) / f64::from(width)).round() as u32;
    image.resize_exact(max_width, new_height.max(1), FilterType::Lanczos3)
}

/// Reads the EXIF orientation tag from the original encoded bytes
///
/// Any read failure is treated as "no orientation".
pub fn read_orientation(original: &[u8]) -> Option<u32> {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(original)) {
        Ok(exif) => exif,
        Err(err) => {
            debug!("No usable EXIF data: {}", err);
            return None;
        }
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

/// Applies the rotation an EXIF orientation value asks for
///
/// Only the pure rotations (3, 6, 8) are corrected; mirrored variants and
/// unknown values leave the raster untouched.
pub fn apply_orientation(image: DynamicImage, orientation: Option<u32>) -> DynamicImage {
    match orientation {
        Some(3) => image.rotate180(),
        Some(6) => image.rotate90(),
        Some(8) => image.rotate270(),
        _ => image,
    }
}

fn encode_jpeg<W: Write>(image: &DynamicImage, writer: &mut W) -> Result<(), MediaError> {
    let rgb = image.to_rgb8();
    JpegEncoder::new_with_quality(writer, JPEG_QUALITY)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| MediaError::Io(io::Error::new(io::ErrorKind::Other, e)))
}
