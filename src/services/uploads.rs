use axum::extract::Multipart;

use crate::error::AppError;
use crate::storage::client::{validate_key, StorageClient};

const RESUME_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

/// Raster formats only: SVG can carry script.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

fn type_allowed(types: &[(&str, &str)], file: &UploadedFile) -> bool {
    let ext = extension(&file.file_name).unwrap_or_default();
    types.iter().any(|(e, mime)| {
        *e == ext
            && (file.content_type == *mime || file.content_type == "application/octet-stream")
    })
}

/// What an upload is for. Decides the accepted types and the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Resume,
    Avatar,
    Logo,
    Banner,
}

impl UploadKind {
    fn prefix(&self) -> &'static str {
        match self {
            UploadKind::Resume => "resumes",
            UploadKind::Avatar => "avatars",
            UploadKind::Logo => "logos",
            UploadKind::Banner => "banners",
        }
    }
}

/// A file read from a multipart `file` field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_lowercase())
}

/// Read the `file` field, refusing to buffer more than `max_bytes`.
pub async fn read_file_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<UploadedFile, AppError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload.bin").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "File is larger than {} MiB",
                    max_bytes / (1024 * 1024)
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }

    Err(AppError::BadRequest("No file field found in request".into()))
}

/// Check the file type against what `kind` accepts.
pub fn validate_upload(kind: UploadKind, file: &UploadedFile) -> Result<(), AppError> {
    if file.bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }

    match kind {
        UploadKind::Resume => {
            if !type_allowed(RESUME_TYPES, file) {
                return Err(AppError::BadRequest(
                    "Resume must be a PDF, DOC or DOCX file".into(),
                ));
            }
        }
        UploadKind::Avatar | UploadKind::Logo | UploadKind::Banner => {
            if !type_allowed(IMAGE_TYPES, file) {
                return Err(AppError::BadRequest(
                    "Image must be a PNG, JPEG, GIF or WebP file".into(),
                ));
            }
        }
    }
    Ok(())
}

/// `<prefix>/<owner>/<millis>_<sanitized name>`
pub fn object_key(kind: UploadKind, owner_id: &str, file_name: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let sanitized: String = file_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let name = if sanitized.is_empty() { "file" } else { sanitized };
    format!("{}/{}/{}_{}", kind.prefix(), owner_id, timestamp, name)
}

/// Validate and store an upload, returning its object key.
pub async fn store_upload(
    storage: &dyn StorageClient,
    kind: UploadKind,
    owner_id: &str,
    file: UploadedFile,
) -> Result<String, AppError> {
    validate_upload(kind, &file)?;
    let key = object_key(kind, owner_id, &file.file_name);
    validate_key(&key)?;
    storage.put_object(&key, file.bytes).await?;
    tracing::info!(%key, ?kind, "Stored upload");
    Ok(key)
}

/// Content type for serving a stored object, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    match extension(key).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: b"data".to_vec(),
        }
    }

    #[test]
    fn test_resume_types() {
        assert!(validate_upload(UploadKind::Resume, &file("cv.pdf", "application/pdf")).is_ok());
        assert!(validate_upload(
            UploadKind::Resume,
            &file(
                "CV.DOCX",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )
        )
        .is_ok());
        assert!(
            validate_upload(UploadKind::Resume, &file("cv.doc", "application/octet-stream")).is_ok()
        );
        assert!(validate_upload(UploadKind::Resume, &file("cv.png", "image/png")).is_err());
        assert!(validate_upload(UploadKind::Resume, &file("cv.pdf", "image/png")).is_err());
        assert!(validate_upload(UploadKind::Resume, &file("cv", "application/pdf")).is_err());
    }

    #[test]
    fn test_image_types() {
        assert!(validate_upload(UploadKind::Avatar, &file("me.png", "image/png")).is_ok());
        assert!(validate_upload(UploadKind::Banner, &file("b.WEBP", "image/webp")).is_ok());
        assert!(validate_upload(UploadKind::Logo, &file("logo.pdf", "application/pdf")).is_err());
        assert!(validate_upload(UploadKind::Avatar, &file("x.svg", "image/svg+xml")).is_err());
        assert!(validate_upload(UploadKind::Avatar, &file("x.svg", "image/png")).is_err());
        assert!(validate_upload(UploadKind::Avatar, &file("x.png", "text/html")).is_err());
    }

    #[test]
    fn test_empty_file_rejected() {
        let mut empty = file("cv.pdf", "application/pdf");
        empty.bytes.clear();
        assert!(validate_upload(UploadKind::Resume, &empty).is_err());
    }

    #[test]
    fn test_object_key_is_sanitized() {
        let key = object_key(UploadKind::Resume, "user-1", "../../My CV (final).pdf");
        assert!(key.starts_with("resumes/user-1/"));
        assert!(key.ends_with("_.._My_CV__final_.pdf"));
        assert_eq!(key.split('/').count(), 3);
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("resumes/u/1_cv.PDF"), "application/pdf");
        assert_eq!(content_type_for("avatars/u/1_me.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("misc/blob"), "application/octet-stream");
        assert_eq!(content_type_for("logos/u/1_x.svg"), "application/octet-stream");
    }
}
