//! Image acquisition: type validation of user-selected files and data URI encoding.
//!
//! Knows nothing about digitization. A file is either rejected up front from
//! its declared content type, or read and encoded off the interaction path and
//! handed back as a [`SourceImage`].

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;
use serde::Serialize;
use tracing::debug;

/// Shown to the user when a non-image file is selected or dropped.
pub const REJECTION_MESSAGE: &str = "Please select a valid image file";

/// Shown to the user when an accepted file cannot be read.
pub const READ_FAILURE_MESSAGE: &str = "Could not read the selected file";

const IMAGE_PREFIX: &str = "image/";
const OCTET_STREAM: &str = "application/octet-stream";

/// Which gesture produced the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    Picker,
    Drop,
}

#[derive(Debug)]
enum FileSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// A file reference as delivered by a picker dialog or a drop event.
#[derive(Debug)]
pub struct FileHandle {
    name: String,
    content_type: String,
    origin: FileOrigin,
    source: FileSource,
}

impl FileHandle {
    /// A dropped file: bytes already in memory with the type the sender declared.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            origin: FileOrigin::Drop,
            source: FileSource::Bytes(data),
        }
    }

    /// A picked file on the local filesystem. The declared type comes from
    /// the extension; the contents are only read once the file is accepted.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            name,
            content_type: declared_type_for_path(&path).to_string(),
            origin: FileOrigin::Picker,
            source: FileSource::Path(path),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn origin(&self) -> FileOrigin {
        self.origin
    }
}

/// Declared content type of a local file, derived from its extension.
pub fn declared_type_for_path(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .ok()
        .and_then(image_mime_type)
        .unwrap_or(OCTET_STREAM)
}

fn image_mime_type(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::Ico => Some("image/x-icon"),
        ImageFormat::Avif => Some("image/avif"),
        _ => None,
    }
}

/// Why a file was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("invalid type: {name} declared as '{content_type}'")]
    InvalidType { name: String, content_type: String },
}

impl Rejected {
    pub fn user_message(&self) -> &'static str {
        REJECTION_MESSAGE
    }
}

/// Failure while turning an accepted file into a [`SourceImage`].
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding task failed: {0}")]
    Encode(#[from] tokio::task::JoinError),
}

/// Check the declared type. Pure; never touches workflow state.
pub fn validate(file: &FileHandle) -> Result<(), Rejected> {
    if file.content_type.starts_with(IMAGE_PREFIX) {
        Ok(())
    } else {
        Err(Rejected::InvalidType {
            name: file.name.clone(),
            content_type: file.content_type.clone(),
        })
    }
}

/// Identifies one acquisition. Later gestures get larger tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AcquisitionTicket(pub u64);

/// A validated image, encoded as a self-describing data URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceImage {
    name: String,
    mime_type: String,
    data_uri: String,
}

impl SourceImage {
    /// Encode raw bytes as `data:<mime>;base64,<payload>`.
    pub fn encode(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        let mime_type = mime_type.into();
        let data_uri = format!("data:{};base64,{}", mime_type, BASE64.encode(bytes));
        Self {
            name: name.into(),
            mime_type,
            data_uri,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }
}

/// Read and encode an accepted file.
///
/// Path sources are read with `tokio::fs`; base64 encoding runs on the
/// blocking pool so large images never stall the event loop.
pub async fn load(file: FileHandle) -> Result<SourceImage, AcquisitionError> {
    let FileHandle {
        name,
        content_type,
        source,
        ..
    } = file;

    let bytes = match source {
        FileSource::Bytes(data) => data,
        FileSource::Path(path) => match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(source) => return Err(AcquisitionError::Read { path, source }),
        },
    };

    debug!("Encoding {} ({} bytes, {})", name, bytes.len(), content_type);
    let image =
        tokio::task::spawn_blocking(move || SourceImage::encode(name, content_type, &bytes))
            .await?;
    Ok(image)
}
