//! Upload text extraction. PDF goes through `pdf-extract` on the blocking pool;
//! plain text and Markdown are decoded as (lossy) UTF-8.

use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type '{0}'")]
    Unsupported(String),

    #[error("no readable text in document")]
    Empty,

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::Unsupported(kind) => AppError::UnsupportedFileType(kind),
            ExtractError::Empty => AppError::Validation(
                "We could not read any text from this file. If it is a scanned PDF, \
                 upload a text-based version."
                    .to_string(),
            ),
            ExtractError::Pdf(detail) => {
                warn!("PDF extraction failed: {detail}");
                AppError::Validation("This PDF could not be read. Try exporting it again.".to_string())
            }
        }
    }
}

/// Decides the document kind from the file extension, falling back to the content type.
pub fn detect_kind(file_name: &str, content_type: Option<&str>) -> Result<DocumentKind, ExtractError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => return Ok(DocumentKind::Pdf),
        "txt" | "md" | "markdown" | "text" => return Ok(DocumentKind::PlainText),
        _ => {}
    }

    match content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim()) {
        Some("application/pdf") => Ok(DocumentKind::Pdf),
        Some("text/plain") | Some("text/markdown") => Ok(DocumentKind::PlainText),
        _ if !extension.is_empty() => Err(ExtractError::Unsupported(extension)),
        other => Err(ExtractError::Unsupported(
            other.unwrap_or("unknown").to_string(),
        )),
    }
}

pub async fn extract_text(kind: DocumentKind, data: Bytes) -> Result<String, ExtractError> {
    let text = match kind {
        DocumentKind::PlainText => String::from_utf8_lossy(&data).into_owned(),
        DocumentKind::Pdf => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&data).map_err(|e| ExtractError::Pdf(e.to_string()))
        })
        .await
        .map_err(|e| ExtractError::Pdf(format!("extractor aborted: {e}")))??,
    };

    let normalized = normalize_whitespace(&text);
    if normalized.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(normalized)
}

/// Collapses runs of blank lines and trailing spaces left behind by PDF layout.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kind_by_extension_and_content_type() {
        assert_eq!(detect_kind("cv.PDF", None).unwrap(), DocumentKind::Pdf);
        assert_eq!(detect_kind("cv.txt", None).unwrap(), DocumentKind::PlainText);
        assert_eq!(
            detect_kind("upload", Some("application/pdf")).unwrap(),
            DocumentKind::Pdf
        );
        assert_eq!(
            detect_kind("blob", Some("text/plain; charset=utf-8")).unwrap(),
            DocumentKind::PlainText
        );
    }

    #[test]
    fn test_docx_is_unsupported() {
        let err = detect_kind("cv.docx", Some("application/octet-stream")).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(ext) if ext == "docx"));
    }

    #[tokio::test]
    async fn test_plain_text_is_normalized() {
        let data = Bytes::from_static(b"Jane Doe  \n\n\n\nRust Engineer\n");
        let text = extract_text(DocumentKind::PlainText, data).await.unwrap();
        assert_eq!(text, "Jane Doe\n\nRust Engineer");
    }

    #[tokio::test]
    async fn test_blank_text_is_empty_error() {
        let data = Bytes::from_static(b" \n\t\n ");
        let err = extract_text(DocumentKind::PlainText, data).await.unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
    }

    #[tokio::test]
    async fn test_garbage_pdf_is_an_error_not_a_panic() {
        let data = Bytes::from_static(b"definitely not a pdf");
        let err = extract_text(DocumentKind::Pdf, data).await.unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
