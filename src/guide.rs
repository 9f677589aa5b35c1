//! Extraction guide: per-document prompt overrides for the vision stage.
//!
//! Operators who know a vendor's quirks can ship a CSV or JSON table mapping
//! a document (and optionally a single page) to a custom instruction block.
//! The guide is loaded once per run and consulted read-only; a document with
//! no matching entry simply gets the built-in prompt.

use crate::error::ExtractError;
use crate::normalize::slugify;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// One guide row. `page` of `None` applies to every page of the file.
#[derive(Debug, Clone, Deserialize)]
pub struct GuideEntry {
    pub file: String,
    #[serde(default)]
    pub page: Option<u32>,
    pub prompt: String,
}

/// All guide entries for a run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionGuide {
    entries: Vec<GuideEntry>,
}

impl ExtractionGuide {
    pub fn new(entries: Vec<GuideEntry>) -> Self {
        Self { entries }
    }

    /// Load a guide from a `.csv` or `.json` file.
    ///
    /// CSV needs a header row with `file`, `page`, `prompt` columns; JSON is
    /// an array of the same shape. Rows with an empty prompt are dropped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let guide_err = |detail: String| ExtractError::GuideError {
            path: path.to_path_buf(),
            detail,
        };

        let mut entries: Vec<GuideEntry> = if ext == "csv" {
            let mut reader =
                csv::Reader::from_path(path).map_err(|e| guide_err(e.to_string()))?;
            reader
                .deserialize()
                .collect::<Result<Vec<GuideEntry>, _>>()
                .map_err(|e| guide_err(e.to_string()))?
        } else {
            let text =
                std::fs::read_to_string(path).map_err(|e| guide_err(e.to_string()))?;
            serde_json::from_str(&text).map_err(|e| guide_err(e.to_string()))?
        };

        let before = entries.len();
        entries.retain(|e| !e.prompt.trim().is_empty() && !e.file.trim().is_empty());
        if entries.len() < before {
            warn!(
                "guide {}: skipped {} incomplete rows",
                path.display(),
                before - entries.len()
            );
        }
        debug!("guide {}: {} entries", path.display(), entries.len());
        Ok(Self { entries })
    }

    /// Custom prompt for `(file_name, page)`, page-specific entry first.
    ///
    /// Matching is best-effort on the slugged file stem: an exact stem match
    /// wins, otherwise an entry whose slug is contained in the document's
    /// slug (so a guide row named after the brand covers dated variants of
    /// the same list).
    pub fn prompt_for(&self, file_name: &str, page: u32) -> Option<&str> {
        let stem = slugify(
            &Path::new(file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_name.to_string()),
        );

        let matches = |entry: &GuideEntry| {
            let entry_slug = slugify(
                &Path::new(&entry.file)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| entry.file.clone()),
            );
            !entry_slug.is_empty() && (entry_slug == stem || stem.contains(&entry_slug))
        };

        self.entries
            .iter()
            .find(|e| e.page == Some(page) && matches(e))
            .or_else(|| self.entries.iter().find(|e| e.page.is_none() && matches(e)))
            .map(|e| e.prompt.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file: &str, page: Option<u32>, prompt: &str) -> GuideEntry {
        GuideEntry {
            file: file.to_string(),
            page,
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn page_entry_beats_default() {
        let guide = ExtractionGuide::new(vec![
            entry("liste.pdf", None, "all pages"),
            entry("liste.pdf", Some(3), "page three"),
        ]);
        assert_eq!(guide.prompt_for("liste.pdf", 3), Some("page three"));
        assert_eq!(guide.prompt_for("liste.pdf", 1), Some("all pages"));
        assert_eq!(guide.prompt_for("diger.pdf", 1), None);
    }

    #[test]
    fn slug_match_tolerates_decoration() {
        let guide = ExtractionGuide::new(vec![entry("Omega Motor", None, "omega rules")]);
        assert_eq!(
            guide.prompt_for("Omega_Motor_Fiyat_Listesi_2025.pdf", 1),
            Some("omega rules")
        );
    }

    #[test]
    fn json_guide_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.json");
        std::fs::write(
            &path,
            r#"[{"file": "liste.pdf", "page": 2, "prompt": "custom"},
                {"file": "liste.pdf", "prompt": ""}]"#,
        )
        .unwrap();
        let guide = ExtractionGuide::load(&path).unwrap();
        assert_eq!(guide.prompt_for("liste.pdf", 2), Some("custom"));
        assert_eq!(guide.prompt_for("liste.pdf", 1), None);
    }

    #[test]
    fn malformed_guide_reports_guide_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.json");
        std::fs::write(&path, "not json at all").unwrap();
        let err = ExtractionGuide::load(&path).unwrap_err();
        assert!(matches!(err, ExtractError::GuideError { .. }));

        let missing = ExtractionGuide::load(dir.path().join("yok.json")).unwrap_err();
        assert!(matches!(missing, ExtractError::GuideError { .. }));
    }

    #[test]
    fn csv_guide_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.csv");
        std::fs::write(&path, "file,page,prompt\nliste.pdf,,her sayfa\n").unwrap();
        let guide = ExtractionGuide::load(&path).unwrap();
        assert_eq!(guide.prompt_for("liste.pdf", 7), Some("her sayfa"));
    }
}
