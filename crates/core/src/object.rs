//! The binary asset being uploaded.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Media type used when the file extension is not recognized.
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Known video container extensions and their media types.
const VIDEO_EXTENSIONS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("mpg", "video/mpeg"),
    ("mpeg", "video/mpeg"),
    ("ts", "video/mp2t"),
    ("m2ts", "video/mp2t"),
    ("3gp", "video/3gpp"),
    ("ogv", "video/ogg"),
];

/// Guess a media type from the path's extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FALLBACK_MEDIA_TYPE;
    };
    let ext = ext.to_ascii_lowercase();
    VIDEO_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, media_type)| *media_type)
        .unwrap_or(FALLBACK_MEDIA_TYPE)
}

/// Where the object's bytes live.
#[derive(Debug, Clone)]
pub enum ObjectSource {
    /// Fully buffered in memory.
    Memory(Bytes),
    /// A file on disk, read one part at a time.
    File(PathBuf),
}

/// An immutable object selected for upload.
#[derive(Debug, Clone)]
pub struct InputObject {
    name: String,
    media_type: String,
    len: u64,
    source: ObjectSource,
}

impl InputObject {
    /// Wrap an in-memory buffer.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            media_type: media_type.into(),
            len: data.len() as u64,
            source: ObjectSource::Memory(data),
        }
    }

    /// Reference a file on disk. The media type is guessed from the extension
    /// and the display name is the file name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            media_type: media_type_for_path(path).to_string(),
            len: metadata.len(),
            source: ObjectSource::File(path.to_path_buf()),
        })
    }

    /// Override the media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Top-level media category (`video` for `video/mp4`).
    pub fn media_category(&self) -> &str {
        self.media_type
            .split('/')
            .next()
            .unwrap_or_default()
            .trim()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn source(&self) -> &ObjectSource {
        &self.source
    }

    /// Read `len` bytes starting at `offset`.
    pub async fn read_range(&self, offset: u64, len: u64) -> std::io::Result<Bytes> {
        let end = offset.checked_add(len).filter(|end| *end <= self.len).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "range {}+{} is outside object of {} bytes",
                    offset, len, self.len
                ),
            )
        })?;

        match &self.source {
            ObjectSource::Memory(data) => Ok(data.slice(offset as usize..end as usize)),
            ObjectSource::File(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = vec![0u8; len as usize];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}
