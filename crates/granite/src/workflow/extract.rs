use std::ffi::OsStr;
use std::path::Path;

use log::{debug, info, warn};

use crate::config::RenderConfig;
use crate::pipeline::{Stage, WorkflowError};
use crate::sanitize::redact_path;

use super::llm::{LanguageModel, Part};
use super::process::run_command;
use super::prompts;

/// Below this many characters pdftotext output is treated as a scanned PDF.
const MIN_PDF_TEXT_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image(String),
    Text,
    Unsupported(String),
}

pub fn source_kind(path: &Path) -> SourceKind {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("application", "pdf") => SourceKind::Pdf,
        ("image", _) => SourceKind::Image(mime.essence_str().to_string()),
        ("text", _) | ("application", "json") => SourceKind::Text,
        _ => SourceKind::Unsupported(mime.essence_str().to_string()),
    }
}

/// Turns the uploaded document into prompt parts.
///
/// PDFs go through `pdftotext` first; when that is unavailable or yields no
/// text the PDF itself is attached for the model to read.
pub async fn document_parts(path: &Path, render: &RenderConfig) -> Result<Vec<Part>, WorkflowError> {
    let name = redact_path(path);
    let read_bytes = || {
        std::fs::read(path).map_err(|e| {
            WorkflowError::fatal(Stage::Extraction, format!("cannot read {}: {}", name, e))
        })
    };

    match source_kind(path) {
        SourceKind::Pdf => {
            let args = [OsStr::new("-layout"), path.as_os_str(), OsStr::new("-")];
            match run_command(
                &render.pdftotext_binary,
                args,
                None,
                render.extract_timeout(),
            )
            .await
            {
                Ok(out) if out.stdout.trim().chars().count() >= MIN_PDF_TEXT_CHARS => {
                    debug!("Extracted {} chars from {}", out.stdout.len(), name);
                    return Ok(vec![Part::text(prompts::document_text(out.stdout.trim()))]);
                }
                Ok(_) => info!("{} has no text layer, sending it inline", name),
                Err(e) => warn!("pdftotext unavailable for {}: {}; sending it inline", name, e),
            }
            Ok(vec![Part::InlineData {
                mime_type: "application/pdf".to_string(),
                data: read_bytes()?,
            }])
        }
        SourceKind::Image(mime_type) => Ok(vec![
            Part::text(prompts::IMAGE_TRANSCRIPTION),
            Part::InlineData {
                mime_type,
                data: read_bytes()?,
            },
        ]),
        SourceKind::Text => {
            let bytes = read_bytes()?;
            let text = String::from_utf8_lossy(&bytes);
            Ok(vec![Part::text(prompts::document_text(text.trim()))])
        }
        SourceKind::Unsupported(mime) => Err(WorkflowError::fatal(
            Stage::Extraction,
            format!("unsupported file type {} for {}", mime, name),
        )),
    }
}

/// Produces the structured content summary the later stages work from.
pub async fn extract_content(
    description: Option<&str>,
    source_file: Option<&Path>,
    render: &RenderConfig,
    llm: &dyn LanguageModel,
) -> Result<String, WorkflowError> {
    let mut parts = vec![Part::text(prompts::extraction(
        description,
        source_file.is_some(),
    ))];
    if let Some(path) = source_file {
        parts.extend(document_parts(path, render).await?);
    }

    let summary = llm
        .generate(parts)
        .await
        .map_err(|e| WorkflowError::new(Stage::Extraction, e.to_string()))?;

    if summary.trim().is_empty() {
        return Err(WorkflowError::fatal(
            Stage::Extraction,
            "content summary is empty",
        ));
    }
    Ok(summary.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::ScriptedModel;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_source_kind() {
        assert_eq!(source_kind(Path::new("a.pdf")), SourceKind::Pdf);
        assert_eq!(
            source_kind(Path::new("a.PNG")),
            SourceKind::Image("image/png".to_string())
        );
        assert_eq!(source_kind(Path::new("notes.txt")), SourceKind::Text);
        assert_eq!(source_kind(Path::new("notes.md")), SourceKind::Text);
        assert!(matches!(
            source_kind(Path::new("archive.zip")),
            SourceKind::Unsupported(_)
        ));
    }

    #[tokio::test]
    async fn test_text_file_is_inlined_as_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Newton's law: F = ma").unwrap();

        let parts = document_parts(&path, &RenderConfig::default()).await.unwrap();
        assert_eq!(parts.len(), 1);
        assert!(matches!(&parts[0], Part::Text(t) if t.contains("F = ma")));
    }

    #[tokio::test]
    async fn test_pdf_without_pdftotext_is_sent_inline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.4 fake").unwrap();
        let render = RenderConfig {
            pdftotext_binary: "granite-missing-pdftotext".to_string(),
            ..RenderConfig::default()
        };

        let parts = document_parts(&path, &render).await.unwrap();
        assert!(matches!(
            &parts[0],
            Part::InlineData { mime_type, .. } if mime_type == "application/pdf"
        ));
    }

    #[tokio::test]
    async fn test_unsupported_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, b"PK").unwrap();

        let err = document_parts(&path, &RenderConfig::default()).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_extract_content_from_description() {
        let model = ScriptedModel::new(vec![Ok("Topic: Gravity".to_string())]);
        let summary = extract_content(Some("explain gravity"), None, &RenderConfig::default(), &model)
            .await
            .unwrap();
        assert_eq!(summary, "Topic: Gravity");

        let prompts = model.prompts();
        assert!(prompts[0].contains("explain gravity"));
    }

    #[tokio::test]
    async fn test_model_errors_are_classified() {
        let model = ScriptedModel::new(vec![Err("503 Service Unavailable".to_string())]);
        let err = extract_content(Some("x"), None, &RenderConfig::default(), &model)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.stage, Stage::Extraction);
    }
}
