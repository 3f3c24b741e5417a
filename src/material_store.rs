use crate::errors::AppError;
use crate::models::SubmissionType;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const PDF: &str = "application/pdf";
pub const PPT: &str = "application/vnd.ms-powerpoint";
pub const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const DOC: &str = "application/msword";
pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const TEXT: &str = "text/plain";
const ZIP: &str = "application/zip";
const OCTET_STREAM: &str = "application/octet-stream";

const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OOXML_MANIFEST: &[u8] = b"[Content_Types].xml";
const TEXT_PROBE_LEN: usize = 8 * 1024;

/// Storage collaborator for uploaded material.
#[async_trait]
pub trait MaterialStore: Send + Sync {
    /// Writes the bytes under `stored_filename` and returns the stored path.
    async fn save(&self, stored_filename: &str, bytes: &[u8]) -> Result<String, AppError>;

    async fn load(&self, file_path: &str) -> Result<Vec<u8>, AppError>;

    /// Deletes a stored file. A file that is already gone is not an error.
    async fn remove(&self, file_path: &str) -> Result<(), AppError>;
}

/// Material kept on the local filesystem under one root directory.
pub struct LocalMaterialStore {
    root: PathBuf,
}

impl LocalMaterialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MaterialStore for LocalMaterialStore {
    async fn save(&self, stored_filename: &str, bytes: &[u8]) -> Result<String, AppError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            AppError::InternalError(format!(
                "Failed to create upload directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let path = self.root.join(stored_filename);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            AppError::InternalError(format!("Failed to save file {}: {}", path.display(), e))
        })?;

        tracing::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn load(&self, file_path: &str) -> Result<Vec<u8>, AppError> {
        tokio::fs::read(file_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::NotFound(format!("Material file {} not found", file_path))
            }
            _ => AppError::InternalError(format!("Failed to read {}: {}", file_path, e)),
        })
    }

    async fn remove(&self, file_path: &str) -> Result<(), AppError> {
        match tokio::fs::remove_file(file_path).await {
            Ok(()) => {
                tracing::debug!("Removed {}", file_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::InternalError(format!(
                "Failed to remove {}: {}",
                file_path, e
            ))),
        }
    }
}

/// Lowercased extension of a client filename, with the leading dot.
pub fn file_extension(original_filename: &str) -> String {
    Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// `{lead_id}_{type}_{uuid}{ext}`; the client filename never reaches the filesystem.
pub fn stored_filename(
    lead_id: i64,
    submission_type: SubmissionType,
    original_filename: &str,
) -> String {
    format!(
        "{}_{}_{}{}",
        lead_id,
        submission_type,
        Uuid::new_v4().simple(),
        file_extension(original_filename)
    )
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Detects the content type from magic bytes.
///
/// Office containers (OLE2 and OOXML zip) are told apart by their entries,
/// falling back to the filename extension.
pub fn sniff_content_type(bytes: &[u8], original_filename: &str) -> &'static str {
    let ext = file_extension(original_filename);

    if bytes.starts_with(b"%PDF-") {
        return PDF;
    }

    if bytes.starts_with(OLE2_MAGIC) {
        return if ext == ".ppt" || contains(bytes, b"P\0o\0w\0e\0r\0P\0o\0i\0n\0t") {
            PPT
        } else {
            DOC
        };
    }

    if bytes.starts_with(ZIP_MAGIC) {
        // Only OOXML packages carry a content types manifest
        if !contains(bytes, OOXML_MANIFEST) {
            return ZIP;
        }
        if contains(bytes, b"ppt/") {
            return PPTX;
        }
        if contains(bytes, b"word/") {
            return DOCX;
        }
        return match ext.as_str() {
            ".pptx" => PPTX,
            ".docx" => DOCX,
            _ => ZIP,
        };
    }

    let probe = &bytes[..bytes.len().min(TEXT_PROBE_LEN)];
    if !probe.is_empty() && !probe.contains(&0) && is_mostly_utf8(probe) {
        return TEXT;
    }

    OCTET_STREAM
}

/// A probe cut mid-character is still text.
fn is_mostly_utf8(probe: &[u8]) -> bool {
    match std::str::from_utf8(probe) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Validates an upload and returns its detected content type.
pub fn check_material(
    bytes: &[u8],
    original_filename: &str,
    max_bytes: u64,
    max_size_mb: u64,
    allowed_types: &[String],
) -> Result<&'static str, AppError> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if bytes.len() as u64 > max_bytes {
        return Err(AppError::Validation(format!(
            "File too large. Maximum size is {}MB",
            max_size_mb
        )));
    }

    let mime_type = sniff_content_type(bytes, original_filename);
    if !allowed_types.iter().any(|t| t == mime_type) {
        return Err(AppError::Validation(format!(
            "File type not allowed: {}",
            mime_type
        )));
    }

    Ok(mime_type)
}
