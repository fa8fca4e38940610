use crate::{IngestError, PageText, PdfExtractor};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub pages: Vec<PageText>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Loads every PDF under `folder`. Files that fail to open are recorded in
/// [`LoadReport::skipped_files`] and the remaining files still load.
pub fn load_documents(folder: &Path, extractor: &dyn PdfExtractor) -> Result<LoadReport, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::MissingDirectory(folder.display().to_string()));
    }

    let mut report = LoadReport::default();

    for path in discover_pdf_files(folder) {
        match extractor.extract_pages(&path) {
            Ok(pages) => report.pages.extend(pages),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(report)
}
