//! Staging and encoding of the file sent with the next question.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::EncodingError;
use crate::state::UserAttachment;

const FALLBACK_MIME: &str = "application/octet-stream";

/// The single file staged for the next submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    /// Size on disk when staged, if the file could be inspected.
    pub size_bytes: Option<u64>,
}

impl PendingAttachment {
    /// Stage any path. Only the size is looked up; nothing is read or
    /// validated until `encode`.
    pub fn select(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let mime_type = guess_mime(&path);
        let size_bytes = std::fs::metadata(&path).ok().map(|meta| meta.len());

        Self {
            path,
            file_name,
            mime_type,
            size_bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }
}

/// File content ready to send: base64 text plus its declared mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAttachment {
    pub data: String,
    pub mime_type: String,
    pub file_name: String,
    pub size_bytes: u64,
}

impl EncodedAttachment {
    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }

    /// Transcript snapshot; only images keep their payload for the preview.
    pub fn snapshot(&self) -> UserAttachment {
        UserAttachment {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
            preview: self.is_image().then(|| self.data.clone()),
        }
    }
}

pub async fn encode(pending: &PendingAttachment) -> Result<EncodedAttachment, EncodingError> {
    let bytes = fs::read(&pending.path).await.map_err(|source| EncodingError {
        path: pending.path.clone(),
        source,
    })?;

    tracing::debug!(
        file = %pending.file_name,
        mime = %pending.mime_type,
        bytes = bytes.len(),
        "encoded attachment"
    );

    Ok(EncodedAttachment {
        data: BASE64.encode(&bytes),
        mime_type: pending.mime_type.clone(),
        file_name: pending.file_name.clone(),
        size_bytes: bytes.len() as u64,
    })
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}

fn is_image_mime(mime: &str) -> bool {
    mime.starts_with("image/")
}

/// Human readable byte count for attachment chips.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_select_guesses_mime_from_extension() {
        let png = PendingAttachment::select("/tmp/bai-tap.png");
        assert_eq!(png.file_name, "bai-tap.png");
        assert_eq!(png.mime_type, "image/png");
        assert!(png.is_image());

        let pdf = PendingAttachment::select("de-thi.pdf");
        assert_eq!(pdf.mime_type, "application/pdf");
        assert!(!pdf.is_image());
    }

    #[test]
    fn test_select_records_size_once() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&[0u8; 2048]).unwrap();

        let pending = PendingAttachment::select(file.path());
        assert_eq!(pending.size_bytes, Some(2048));

        let missing = PendingAttachment::select("/khong/ton/tai.png");
        assert_eq!(missing.size_bytes, None);
    }

    #[test]
    fn test_select_unknown_extension_is_permissive() {
        let pending = PendingAttachment::select("notes.zzunknown");
        assert_eq!(pending.mime_type, FALLBACK_MIME);
        assert!(!pending.is_image());
    }

    #[tokio::test]
    async fn test_encode_reads_whole_file_as_base64() {
        let mut file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        file.write_all(b"hello").unwrap();

        let pending = PendingAttachment::select(file.path());
        let encoded = encode(&pending).await.unwrap();

        assert_eq!(encoded.data, "aGVsbG8=");
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert_eq!(encoded.size_bytes, 5);
        assert_eq!(encoded.snapshot().preview.as_deref(), Some("aGVsbG8="));
    }

    #[tokio::test]
    async fn test_encode_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingAttachment::select(dir.path().join("missing.png"));

        let err = encode(&pending).await.unwrap_err();
        assert_eq!(err.path, pending.path);
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_snapshot_drops_payload_for_documents() {
        let encoded = EncodedAttachment {
            data: "JVBERi0=".to_string(),
            mime_type: "application/pdf".to_string(),
            file_name: "de.pdf".to_string(),
            size_bytes: 5,
        };
        let snapshot = encoded.snapshot();
        assert!(snapshot.preview.is_none());
        assert!(!snapshot.is_image());
        assert_eq!(snapshot.file_name, "de.pdf");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
