//! Converts raw result bytes into the representation the caller asked for.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Serialize, Serializer};

use crate::error::{Result, VolcError};

/// Requested representation of the produced bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Raw bytes with MIME type and file name.
    #[default]
    Binary,
    Base64,
    /// Length and format only; the bytes are dropped.
    BufferInfo,
    /// Write to this path, creating parent directories.
    File(PathBuf),
}

impl OutputMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::BufferInfo => "buffer_info",
            Self::File(_) => "file",
        }
    }
}

/// Descriptive metadata attached to assembled output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMeta {
    pub format: String,
    pub mime_type: String,
    pub file_name: String,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryAttachment {
    #[serde(serialize_with = "as_base64")]
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
    pub file_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferInfo {
    pub length: usize,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

/// Assembled payload for one result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "output_mode", rename_all = "snake_case")]
pub enum OutputPayload {
    Binary(BinaryAttachment),
    Base64 { data: String },
    BufferInfo(BufferInfo),
    File { file_path: PathBuf },
}

impl OutputPayload {
    /// Bytes carried by `Binary` output.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(attachment) => Some(&attachment.data),
            _ => None,
        }
    }
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// Build the payload for `mode`. Only `File` touches the filesystem.
pub async fn assemble(bytes: Vec<u8>, mode: &OutputMode, meta: &MediaMeta) -> Result<OutputPayload> {
    match mode {
        OutputMode::Binary => Ok(OutputPayload::Binary(BinaryAttachment {
            file_size: bytes.len(),
            data: bytes,
            mime_type: meta.mime_type.clone(),
            file_name: meta.file_name.clone(),
        })),
        OutputMode::Base64 => Ok(OutputPayload::Base64 {
            data: STANDARD.encode(&bytes),
        }),
        OutputMode::BufferInfo => Ok(OutputPayload::BufferInfo(BufferInfo {
            length: bytes.len(),
            format: meta.format.clone(),
            sample_rate: meta.sample_rate,
        })),
        OutputMode::File(path) => {
            write_file(path, &bytes).await?;
            Ok(OutputPayload::File {
                file_path: path.clone(),
            })
        }
    }
}

/// Write `bytes` to `path`, creating parent directories first.
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(VolcError::InvalidArgument(
            "Output file path cannot be empty".into(),
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// `dir/stem.ext` → `dir/stem_<index>.ext`.
pub fn numbered_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index}"),
    };
    path.with_file_name(name)
}
