use std::path::{Path, PathBuf};

use crate::pipeline::context::topic_for;

/// A request to generate one video.
///
/// At least one of `description` and `source_file` must be present.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Free-text concept, e.g. "explain gravity".
    pub description: Option<String>,
    /// Uploaded document already saved on disk.
    pub source_file: Option<PathBuf>,
    /// Name the document was uploaded under, when it differs from the
    /// stored file name.
    pub original_name: Option<String>,
}

impl GenerationRequest {
    pub fn from_description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            source_file: None,
            original_name: None,
        }
    }

    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    /// Description with surrounding whitespace removed, if any is left.
    pub fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.description().is_none() && self.source_file.is_none()
    }

    /// File name of the upload, for display.
    pub fn source_name(&self) -> Option<String> {
        self.source_file.as_ref()?;
        self.original_name.clone().or_else(|| {
            self.source_file
                .as_deref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        })
    }

    /// What the video is about: the description, else the upload's name.
    pub fn topic(&self) -> String {
        let name = self.source_name();
        topic_for(self.description(), name.as_deref().map(Path::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_description_is_empty() {
        assert!(GenerationRequest::default().is_empty());
        assert!(GenerationRequest::from_description("   ").is_empty());
        assert!(!GenerationRequest::from_description("gravity").is_empty());
    }

    #[test]
    fn test_file_only_request() {
        let request = GenerationRequest::default().with_source_file("/tmp/uploads/notes.pdf");
        assert!(!request.is_empty());
        assert_eq!(request.description(), None);
        assert_eq!(request.source_name().as_deref(), Some("notes.pdf"));
        assert_eq!(request.topic(), "notes");
    }

    #[test]
    fn test_original_name_wins_for_display() {
        let request = GenerationRequest {
            description: None,
            source_file: Some(PathBuf::from("/tmp/uploads/3f2a_Orbital_Mechanics.pdf")),
            original_name: Some("Orbital Mechanics.pdf".to_string()),
        };
        assert_eq!(request.source_name().as_deref(), Some("Orbital Mechanics.pdf"));
        assert_eq!(request.topic(), "Orbital Mechanics");

        let described = GenerationRequest {
            description: Some(" explain gravity ".to_string()),
            ..request
        };
        assert_eq!(described.topic(), "explain gravity");
    }
}
