use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub source_path: String,
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    /// Fails only when the file cannot be opened as a PDF. A page whose text
    /// cannot be decoded comes back empty so the rest of the file still loads.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| {
            IngestError::PdfParse(format!("{}: {error}", path.display()))
        })?;
        let source_path = path.to_string_lossy().to_string();

        let pages = document
            .get_pages()
            .into_keys()
            .map(|page_no| {
                let text = document.extract_text(&[page_no]).unwrap_or_else(|error| {
                    debug!(path = %path.display(), page = page_no, %error, "page text unreadable");
                    String::new()
                });
                PageText {
                    source_path: source_path.clone(),
                    number: page_no,
                    text,
                }
            })
            .collect();

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::{LopdfExtractor, PdfExtractor};
    use crate::IngestError;
    use tempfile::tempdir;

    #[test]
    fn garbage_file_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LopdfExtractor.extract_pages(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(message)) if message.contains("broken.pdf")));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = LopdfExtractor.extract_pages(std::path::Path::new("/nonexistent/none.pdf"));
        assert!(result.is_err());
    }
}
