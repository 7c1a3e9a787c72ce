// src/upload.rs
use std::path::{Path, PathBuf};

use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

use crate::session::Tool;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Select a tool before uploading a file.")]
    NoToolSelected,

    #[error("Invalid file type. Expected {expected} file.")]
    InvalidType { expected: String },

    #[error("Could not read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized patient sample.")]
    BadSample,

    #[error("Patient sample has no inline file data.")]
    SampleNotInline,
}

/// A file picked from disk or dropped onto the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), mime: mime.into(), bytes }
    }

    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = std::fs::read(path).map_err(|source| UploadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        log::debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Self::new(name, mime_for_path(path), bytes))
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64())
    }
}

/// In-app record dragged from the sample gallery, carried as a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSample {
    pub id: String,
    pub name: String,
    #[serde(alias = "file_type")]
    pub file_type: String,
    /// Sample content as a `data:` URL.
    pub data: String,
}

impl PatientSample {
    pub fn parse(payload: &str) -> Result<Self, UploadError> {
        let sample: Self = serde_json::from_str(payload.trim()).map_err(|e| {
            log::debug!("Rejected structured drop payload: {}", e);
            UploadError::BadSample
        })?;
        // The backend base64-decodes `image`, so a hosted URL cannot be analysed.
        if !sample.data.starts_with("data:") {
            return Err(UploadError::SampleNotInline);
        }
        Ok(sample)
    }
}

/// Content staged for analysis with the selected tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    /// Data URL (local files) or the sample's own data reference.
    pub data: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        major_type(&self.mime) == "image"
    }
}

impl From<&FileUpload> for Attachment {
    fn from(file: &FileUpload) -> Self {
        Attachment { name: file.name.clone(), mime: file.mime.clone(), data: file.data_url() }
    }
}

impl From<PatientSample> for Attachment {
    fn from(sample: PatientSample) -> Self {
        Attachment { name: sample.name, mime: sample.file_type, data: sample.data }
    }
}

pub fn major_type(mime: &str) -> &str {
    mime.split('/').next().unwrap_or_default()
}

/// Checks `mime` against the selected tool's accepted major type.
pub fn validate_type(tool: Option<&Tool>, mime: &str) -> Result<(), UploadError> {
    let tool = tool.ok_or(UploadError::NoToolSelected)?;
    let expected = tool.input_major_type();
    if major_type(mime) != expected {
        return Err(UploadError::InvalidType { expected: expected.to_string() });
    }
    Ok(())
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "dcm" => "application/dicom",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
