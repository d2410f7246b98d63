//! Upload policy
//!
//! Validates presign requests against the configured per-type limits and
//! derives collision-resistant storage keys.

use super::{FileType, UploadError};
use crate::config::{FileTypePolicy, UploadConfig};
use chrono::{DateTime, Utc};

const MAX_STEM_LENGTH: usize = 64;
const MAX_SEGMENT_LENGTH: usize = 64;
const DEFAULT_CATEGORY: &str = "other";
const MIB: u64 = 1024 * 1024;

/// A presign request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedUpload {
    /// Sanitized file name, e.g. `first_dance.mp4`
    pub file_name: String,
    pub stem: String,
    pub extension: String,
    pub file_size: u64,
    pub content_type: String,
    pub file_type: FileType,
    pub category: String,
}

/// Extensions accepted for a content type, when the mapping is known
pub fn extensions_for(content_type: &str) -> Option<&'static [&'static str]> {
    let exts: &'static [&'static str] = match content_type {
        "image/jpeg" | "image/jpg" => &["jpg", "jpeg"],
        "image/png" => &["png"],
        "image/gif" => &["gif"],
        "image/webp" => &["webp"],
        "image/bmp" => &["bmp"],
        "image/tiff" => &["tiff", "tif"],
        "video/mp4" => &["mp4"],
        "video/avi" => &["avi"],
        "video/mov" | "video/quicktime" => &["mov"],
        "video/wmv" => &["wmv"],
        "video/flv" => &["flv"],
        "video/webm" => &["webm"],
        "video/mkv" => &["mkv"],
        "application/pdf" => &["pdf"],
        "application/msword" => &["doc"],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => &["docx"],
        "application/vnd.ms-excel" => &["xls"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => &["xlsx"],
        "application/vnd.ms-powerpoint" => &["ppt"],
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => &["pptx"],
        "text/plain" => &["txt"],
        "application/zip" => &["zip"],
        _ => return None,
    };
    Some(exts)
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_`
fn sanitize_chars(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitize a value used as one storage key segment
pub fn sanitize_segment(value: &str) -> String {
    let cleaned: String = sanitize_chars(value.trim())
        .trim_matches('.')
        .chars()
        .take(MAX_SEGMENT_LENGTH)
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Reduce a client file name to a safe `(stem, extension)` pair.
///
/// Directory components (either separator) are dropped and unsafe characters
/// replaced; the extension is lower-cased.
pub fn sanitize_file_name(
    file_name: &str,
    max_length: usize,
) -> Result<(String, Option<String>), UploadError> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() {
        return Err(UploadError::Validation("File name is required".into()));
    }
    if trimmed.chars().count() > max_length {
        return Err(UploadError::Validation(format!(
            "File name exceeds {} characters",
            max_length
        )));
    }

    let base = trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let sanitized = sanitize_chars(base);
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.' || c == '_') {
        return Err(UploadError::Validation(format!(
            "Invalid file name: {}",
            file_name
        )));
    }

    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            Ok((stem.to_string(), Some(ext.to_ascii_lowercase())))
        }
        _ => Ok((sanitized.trim_end_matches('.').to_string(), None)),
    }
}

/// Upload policy backed by the `upload` configuration section
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    config: UploadConfig,
}

impl UploadPolicy {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    fn type_policy(&self, file_type: FileType) -> &FileTypePolicy {
        match file_type {
            FileType::Image => &self.config.file_types.image,
            FileType::Video => &self.config.file_types.video,
            FileType::Document => &self.config.file_types.document,
        }
    }

    /// Validate a presign request
    pub fn validate(
        &self,
        file_name: &str,
        file_size: u64,
        content_type: &str,
        file_type: &str,
        category: Option<&str>,
    ) -> Result<ValidatedUpload, UploadError> {
        let file_type = FileType::parse(file_type)?;
        let type_policy = self.type_policy(file_type);

        if file_size == 0 {
            return Err(UploadError::Validation(
                "File size must be greater than 0".into(),
            ));
        }

        let limit = type_policy.max_size.min(self.config.max_file_size);
        if file_size > limit {
            return Err(UploadError::Validation(format!(
                "File size {} exceeds the {} limit of {}MB",
                file_size,
                file_type,
                limit / MIB
            )));
        }

        let content_type = content_type.trim().to_ascii_lowercase();
        if !type_policy
            .allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
        {
            return Err(UploadError::Validation(format!(
                "Unsupported content type for {}: {}",
                file_type, content_type
            )));
        }

        let (stem, extension) = sanitize_file_name(file_name, self.config.max_file_name_length)?;
        let known = extensions_for(&content_type);
        let extension = match (extension, known) {
            (Some(ext), Some(allowed)) if !allowed.contains(&ext.as_str()) => {
                return Err(UploadError::Validation(format!(
                    "File extension does not match content type: {} vs {}",
                    ext, content_type
                )));
            }
            (Some(ext), _) => ext,
            (None, Some(allowed)) => allowed[0].to_string(),
            (None, None) => "bin".to_string(),
        };

        let category = category
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .map(|c| sanitize_segment(&c))
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Ok(ValidatedUpload {
            file_name: format!("{}.{}", stem, extension),
            stem,
            extension,
            file_size,
            content_type,
            file_type,
            category,
        })
    }

    /// Clamp a requested TTL into the configured window
    pub fn ttl_seconds(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.config.default_ttl_seconds)
            .clamp(self.config.min_ttl_seconds, self.config.max_ttl_seconds)
    }

    /// `{namespace}/{type}s/{category}/{user}/{yyyymmdd}/{uuid}_{stem}.{ext}`
    pub fn storage_key(&self, user_id: &str, upload: &ValidatedUpload, now: DateTime<Utc>) -> String {
        let stem: String = upload.stem.chars().take(MAX_STEM_LENGTH).collect();
        format!(
            "{}/{}s/{}/{}/{}/{}_{}.{}",
            self.config.namespace,
            upload.file_type,
            upload.category,
            sanitize_segment(user_id),
            now.format("%Y%m%d"),
            uuid::Uuid::new_v4().simple(),
            stem,
            upload.extension
        )
    }

    /// Compare the confirmed size against the declared one
    pub fn check_size(&self, declared: u64, actual: u64) -> Result<(), UploadError> {
        let difference = declared.abs_diff(actual);
        if difference > self.config.size_tolerance_bytes {
            return Err(UploadError::Validation(format!(
                "File size mismatch: declared {} bytes, actual {} bytes (tolerance {} bytes)",
                declared, actual, self.config.size_tolerance_bytes
            )));
        }
        Ok(())
    }
}
