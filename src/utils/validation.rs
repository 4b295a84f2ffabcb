use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use utoipa::ToSchema;

/// Extensions accepted at the upload boundary (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Window in which a displaced `%PDF` marker still identifies a PDF
const PDF_MARKER_WINDOW: usize = 1024;

const MAX_FILENAME_LEN: usize = 255;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidationRules {
    pub allowed_mimes: Vec<String>,
    pub max_file_size: usize,
}

impl ValidationRules {
    pub fn from_config(config: &crate::config::ProcessingConfig) -> Self {
        Self {
            allowed_mimes: config.allowed_mimes.clone(),
            max_file_size: config.max_file_size_bytes(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File size {size} bytes exceeds maximum allowed {max} bytes ({mb} MB)", mb = .max / 1024 / 1024)]
    SizeExceeded { size: usize, max: usize },

    #[error("File extension '{0}' is not allowed. Allowed: pdf, jpg, jpeg, png")]
    DisallowedExtension(String),

    #[error("Could not determine file type from content")]
    UnknownType,

    #[error("Detected type '{0}' is not allowed")]
    DisallowedMime(String),

    #[error("File does not start with a valid PDF header")]
    InvalidPdfHeader,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::SizeExceeded { .. } => "FILE_TOO_LARGE",
            ValidationError::DisallowedExtension(_) => "DISALLOWED_EXTENSION",
            ValidationError::UnknownType => "UNKNOWN_TYPE",
            ValidationError::DisallowedMime(_) => "DISALLOWED_MIME",
            ValidationError::InvalidPdfHeader => "INVALID_PDF_HEADER",
        }
    }
}

/// Outcome of validating one uploaded buffer
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
    pub code: Option<String>,
    pub detected_type: Option<String>,
}

impl ValidationResult {
    fn valid(detected: &str) -> Self {
        Self {
            is_valid: true,
            error: None,
            code: None,
            detected_type: Some(detected.to_string()),
        }
    }

    fn invalid(err: &ValidationError, detected: Option<&str>) -> Self {
        Self {
            is_valid: false,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
            detected_type: detected.map(str::to_string),
        }
    }
}

/// One buffer submitted for batch validation
pub struct FileInput<'a> {
    pub buffer: &'a [u8],
    pub original_name: &'a str,
    pub declared_mime: Option<&'a str>,
}

/// Per-file result of a batch validation, tagged with the input name
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileValidationReport {
    pub filename: String,
    #[serde(flatten)]
    pub result: ValidationResult,
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: usize, max_size: usize) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError::SizeExceeded {
            size,
            max: max_size,
        });
    }
    Ok(())
}

/// Validates the lowercase extension of `filename` against the allowlist
pub fn validate_extension(filename: &str) -> Result<(), ValidationError> {
    let ext = file_extension(filename).unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ValidationError::DisallowedExtension(ext))
    }
}

/// Lowercased extension of the final path component, if any
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Detects the real content type from magic bytes.
///
/// Declared MIME types and extensions are never consulted. A `%PDF` marker that
/// does not sit at offset zero but appears within the first kilobyte still
/// identifies the buffer as PDF (readers tolerate leading junk), which lets the
/// structural check reject it explicitly.
pub fn sniff_mime_type(buffer: &[u8]) -> Option<&'static str> {
    if let Some(kind) = infer::get(buffer) {
        return Some(kind.mime_type());
    }

    let window = &buffer[..buffer.len().min(PDF_MARKER_WINDOW)];
    if window.windows(4).any(|w| w == b"%PDF") {
        return Some("application/pdf");
    }

    None
}

/// Validates a detected MIME type against the allowlist
pub fn validate_mime_type(detected: &str, rules: &ValidationRules) -> Result<(), ValidationError> {
    if rules.allowed_mimes.iter().any(|allowed| allowed == detected) {
        Ok(())
    } else {
        Err(ValidationError::DisallowedMime(detected.to_string()))
    }
}

/// Minimal PDF structural check: the header must literally start with `%PDF-`
pub fn verify_pdf_header(buffer: &[u8]) -> Result<(), ValidationError> {
    let header = &buffer[..buffer.len().min(8)];
    if header.starts_with(b"%PDF-") {
        Ok(())
    } else {
        Err(ValidationError::InvalidPdfHeader)
    }
}

/// Full validation pipeline for one uploaded buffer. First failure wins.
pub fn validate_file(
    buffer: &[u8],
    original_name: &str,
    declared_mime: Option<&str>,
    rules: &ValidationRules,
) -> ValidationResult {
    match run_checks(buffer, original_name, rules) {
        Ok(detected) => {
            if let Some(declared) = declared_mime {
                if !declared.eq_ignore_ascii_case(detected) {
                    tracing::debug!(
                        "Declared MIME '{}' differs from detected '{}' for {}",
                        declared,
                        detected,
                        original_name
                    );
                }
            }
            ValidationResult::valid(detected)
        }
        Err((err, detected)) => {
            tracing::warn!(
                code = err.code(),
                "Rejected upload '{}': {}",
                original_name,
                err
            );
            ValidationResult::invalid(&err, detected)
        }
    }
}

fn run_checks(
    buffer: &[u8],
    original_name: &str,
    rules: &ValidationRules,
) -> Result<&'static str, (ValidationError, Option<&'static str>)> {
    // 1. Size check
    validate_file_size(buffer.len(), rules.max_file_size).map_err(|e| (e, None))?;

    // 2. Extension allowlist
    validate_extension(original_name).map_err(|e| (e, None))?;

    // 3. Content sniffing
    let detected = sniff_mime_type(buffer).ok_or((ValidationError::UnknownType, None))?;

    // 4. MIME allowlist on the detected type
    validate_mime_type(detected, rules).map_err(|e| (e, Some(detected)))?;

    // 5. PDF structural check
    if detected == "application/pdf" {
        verify_pdf_header(buffer).map_err(|e| (e, Some(detected)))?;
    }

    Ok(detected)
}

/// Validates every file independently, preserving input order
pub fn validate_multiple_files(
    files: &[FileInput<'_>],
    rules: &ValidationRules,
) -> Vec<FileValidationReport> {
    files
        .iter()
        .map(|file| FileValidationReport {
            filename: file.original_name.to_string(),
            result: validate_file(file.buffer, file.original_name, file.declared_mime, rules),
        })
        .collect()
}

/// Restricts a filename to `[A-Za-z0-9._-]`, collapsing runs of `_`
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = String::with_capacity(filename.len());

    for c in filename.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            c
        } else {
            '_'
        };
        if c == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(c);
    }

    // Output is pure ASCII, so byte truncation is safe
    sanitized.truncate(MAX_FILENAME_LEN);
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 25 * 1024 * 1024;

    fn get_test_rules() -> ValidationRules {
        ValidationRules {
            allowed_mimes: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
            max_file_size: MAX,
        }
    }

    const PNG_HEADER: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(1024, MAX).is_ok());
        assert!(validate_file_size(MAX, MAX).is_ok());
        assert_eq!(
            validate_file_size(MAX + 1, MAX),
            Err(ValidationError::SizeExceeded {
                size: MAX + 1,
                max: MAX
            })
        );
    }

    #[test]
    fn test_validate_extension() {
        assert!(validate_extension("a.pdf").is_ok());
        assert!(validate_extension("A.PDF").is_ok());
        assert!(validate_extension("photo.JPeG").is_ok());
        assert!(validate_extension("x.png").is_ok());
        assert!(validate_extension("x.gif").is_err());
        assert!(validate_extension("noext").is_err());
        assert!(validate_extension("archive.pdf.exe").is_err());
    }

    #[test]
    fn test_sniff_mime_type() {
        assert_eq!(sniff_mime_type(b"%PDF-1.7\n"), Some("application/pdf"));
        assert_eq!(sniff_mime_type(&PNG_HEADER), Some("image/png"));
        assert_eq!(
            sniff_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]),
            Some("image/jpeg")
        );
        assert_eq!(
            sniff_mime_type(b"junk before\n%PDF-1.4"),
            Some("application/pdf")
        );
        assert_eq!(sniff_mime_type(b"Hello World"), None);
        assert_eq!(sniff_mime_type(b""), None);
    }

    #[test]
    fn test_validate_mime_type() {
        let rules = get_test_rules();
        assert!(validate_mime_type("application/pdf", &rules).is_ok());
        assert!(validate_mime_type("image/png", &rules).is_ok());
        assert!(validate_mime_type("image/gif", &rules).is_err());
        assert!(validate_mime_type("application/zip", &rules).is_err());
    }

    #[test]
    fn test_validate_file_accepts_real_pdf() {
        let rules = get_test_rules();
        let result = validate_file(b"%PDF-1.4\n%EOF", "doc.pdf", Some("application/pdf"), &rules);
        assert!(result.is_valid);
        assert_eq!(result.detected_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn test_validate_file_ignores_declared_mime() {
        let rules = get_test_rules();
        // A real PNG uploaded with a misleading declared type and a .jpg name
        let result = validate_file(&PNG_HEADER, "photo.jpg", Some("image/jpeg"), &rules);
        assert!(result.is_valid);
        assert_eq!(result.detected_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_validate_file_check_order() {
        let rules = ValidationRules {
            max_file_size: 4,
            ..get_test_rules()
        };
        // Too large and bad extension: size wins
        let result = validate_file(b"%PDF-1.4", "x.exe", None, &rules);
        assert_eq!(result.code.as_deref(), Some("FILE_TOO_LARGE"));

        let rules = get_test_rules();
        // Bad extension and unknown content: extension wins
        let result = validate_file(b"plain", "x.txt", None, &rules);
        assert_eq!(result.code.as_deref(), Some("DISALLOWED_EXTENSION"));

        let result = validate_file(b"plain text", "x.pdf", Some("application/pdf"), &rules);
        assert_eq!(result.code.as_deref(), Some("UNKNOWN_TYPE"));
    }

    #[test]
    fn test_validate_file_rejects_disguised_executable() {
        let rules = get_test_rules();
        let mut exe = vec![0x4D, 0x5A, 0x90, 0x00];
        exe.extend_from_slice(&[0u8; 128]);
        let result = validate_file(&exe, "invoice.pdf", Some("application/pdf"), &rules);
        assert!(!result.is_valid);
        assert_eq!(result.code.as_deref(), Some("DISALLOWED_MIME"));
    }

    #[test]
    fn test_validate_file_displaced_pdf_header() {
        let rules = get_test_rules();
        let result = validate_file(
            b"GARBAGE\n%PDF-1.4 trailing",
            "x.pdf",
            Some("application/pdf"),
            &rules,
        );
        assert!(!result.is_valid);
        assert_eq!(result.code.as_deref(), Some("INVALID_PDF_HEADER"));
        assert_eq!(result.detected_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn test_validate_multiple_files_preserves_order() {
        let rules = get_test_rules();
        let files = [
            FileInput {
                buffer: b"nope",
                original_name: "a.pdf",
                declared_mime: None,
            },
            FileInput {
                buffer: b"%PDF-1.5\n",
                original_name: "b.pdf",
                declared_mime: Some("application/pdf"),
            },
            FileInput {
                buffer: &PNG_HEADER,
                original_name: "c.gif",
                declared_mime: None,
            },
        ];
        let reports = validate_multiple_files(&files, &rules);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].filename, "a.pdf");
        assert!(!reports[0].result.is_valid);
        assert!(reports[1].result.is_valid);
        assert_eq!(
            reports[2].result.code.as_deref(),
            Some("DISALLOWED_EXTENSION")
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test.pdf"), "test.pdf");
        assert_eq!(sanitize_filename("my file.pdf"), "my_file.pdf");
        assert_eq!(sanitize_filename("test<script>.pdf"), "test_script_.pdf");
        assert_eq!(sanitize_filename("a   b"), "a_b");
        assert_eq!(sanitize_filename("a__b"), "a_b");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("My Résumé (2024)!.pdf"), "My_R_sum_2024_.pdf");
    }

    #[test]
    fn test_sanitize_filename_is_idempotent() {
        for name in ["My Résumé (2024)!.pdf", "日本語.png", "  spaced  .jpg", "ok-name_1.pdf"] {
            let once = sanitize_filename(name);
            assert_eq!(sanitize_filename(&once), once);
        }
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = "a".repeat(400) + ".pdf";
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), 255);
    }
}
