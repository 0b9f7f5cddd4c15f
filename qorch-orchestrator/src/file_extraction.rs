//! Text extraction for file attachments on the Planner's file-analysis
//! short-circuit. `text/*` is decoded directly; richer formats (PDF,
//! spreadsheets) are delegated to a pluggable `FileExtractor` collaborator,
//! since parsing those formats is out of this crate's scope.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qorch_core::model::Attachment;

#[async_trait]
pub trait FileExtractor: Send + Sync {
    async fn extract(&self, attachment: &Attachment) -> String;
}

/// A stand-in extractor: PDF/spreadsheet parsing is not implemented, so
/// this reports that plainly rather than fabricating content.
pub struct PlaceholderFileExtractor;

#[async_trait]
impl FileExtractor for PlaceholderFileExtractor {
    async fn extract(&self, attachment: &Attachment) -> String {
        format!(
            "[no text extractor available for attachment type '{}']",
            attachment.mime_type
        )
    }
}

fn is_spreadsheet(mime_type: &str) -> bool {
    mime_type.contains("spreadsheet") || mime_type == "text/csv" || mime_type.ends_with("excel")
}

/// Extracts the best-effort text content of `attachment`, routing by MIME
/// type: `text/*` is base64-decoded directly, PDF/spreadsheet types go
/// through `extractor`, anything else yields a diagnostic placeholder.
pub async fn extract_text(attachment: &Attachment, extractor: &dyn FileExtractor) -> String {
    if attachment.mime_type.starts_with("text/") && !is_spreadsheet(&attachment.mime_type) {
        return STANDARD
            .decode(&attachment.base64_data)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| "[failed to decode text attachment]".to_string());
    }

    if attachment.mime_type == "application/pdf" || is_spreadsheet(&attachment.mime_type) {
        return extractor.extract(attachment).await;
    }

    format!("[unsupported attachment type: {}]", attachment.mime_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qorch_core::model::AttachmentKind;

    fn attachment(mime_type: &str, text: &str) -> Attachment {
        Attachment {
            kind: AttachmentKind::File,
            mime_type: mime_type.to_string(),
            base64_data: STANDARD.encode(text),
        }
    }

    #[tokio::test]
    async fn decodes_plain_text_attachments_directly() {
        let a = attachment("text/plain", "hello world");
        let text = extract_text(&a, &PlaceholderFileExtractor).await;
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn delegates_pdf_to_extractor() {
        let a = attachment("application/pdf", "ignored");
        let text = extract_text(&a, &PlaceholderFileExtractor).await;
        assert!(text.contains("no text extractor"));
    }

    #[tokio::test]
    async fn unsupported_type_yields_diagnostic_placeholder() {
        let a = attachment("application/octet-stream", "ignored");
        let text = extract_text(&a, &PlaceholderFileExtractor).await;
        assert!(text.contains("unsupported attachment type"));
    }
}
