//! Input resolution: normalise a path, URL, or byte buffer to a local file.
//!
//! pdfium and calamine both want a file-system path, so URL and in-memory
//! inputs are materialised into a `TempDir` that lives as long as the
//! returned [`ResolvedInput`]. PDF inputs get their `%PDF` magic bytes
//! checked here so callers see a clear error instead of a pdfium crash.

use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Where the bytes of one source document come from.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// A file on the local file system.
    Path(PathBuf),
    /// An `http://` or `https://` URL, downloaded before processing.
    Url(String),
    /// An in-memory buffer. `filename` supplies the extension and the
    /// `Kaynak_Dosya` value, since a buffer has neither.
    Bytes { data: Vec<u8>, filename: String },
}

impl SourceInput {
    /// Build a `SourceInput` from a CLI-style string, treating anything
    /// that is not a URL as a local path.
    pub fn from_str_like(input: &str) -> Self {
        if is_url(input) {
            SourceInput::Url(input.to_string())
        } else {
            SourceInput::Path(PathBuf::from(input))
        }
    }

    /// Basename the records of this source will carry.
    pub fn file_name(&self) -> String {
        match self {
            SourceInput::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            SourceInput::Url(url) => url_file_name(url),
            SourceInput::Bytes { filename, .. } => filename.clone(),
        }
    }
}

/// The resolved input: a path plus whatever temp storage keeps it alive.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was downloaded or buffered into a temp directory. The
    /// `TempDir` is held so cleanup waits for processing to finish.
    Materialised { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Materialised { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// True for the spreadsheet extensions the structured stage handles.
pub fn is_spreadsheet_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xlsx")
        || lower.ends_with(".xls")
        || lower.ends_with(".xlsm")
        || lower.ends_with(".ods")
}

/// Resolve a source to a local file path.
pub async fn resolve(input: &SourceInput, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    match input {
        SourceInput::Path(path) => resolve_local(path),
        SourceInput::Url(url) => download_url(url, timeout_secs).await,
        SourceInput::Bytes { data, filename } => materialise_bytes(data, filename),
    }
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            if path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
            {
                use std::io::Read;
                let mut magic = [0u8; 4];
                if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                    return Err(ExtractError::CorruptDocument {
                        path: path.to_path_buf(),
                        detail: format!("bad magic bytes {magic:?}"),
                    });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("resolved local input: {}", path.display());
    Ok(ResolvedInput::Local(path.to_path_buf()))
}

fn materialise_bytes(data: &[u8], filename: &str) -> Result<ResolvedInput, ExtractError> {
    if filename.trim().is_empty() {
        return Err(ExtractError::InvalidInput {
            input: "<bytes>".into(),
        });
    }
    let temp_dir = TempDir::new().map_err(|e| ExtractError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename);
    std::fs::write(&path, data)
        .map_err(|e| ExtractError::Internal(format!("temp file write: {e}")))?;
    debug!("buffered {} bytes into {}", data.len(), path.display());
    Ok(ResolvedInput::Materialised {
        path,
        _temp_dir: temp_dir,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractError> {
    info!("downloading source: {url}");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = url_file_name(url);
    let temp_dir = TempDir::new().map_err(|e| ExtractError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if filename.to_ascii_lowercase().ends_with(".pdf") && bytes.len() >= 4 && &bytes[..4] != b"%PDF"
    {
        return Err(ExtractError::CorruptDocument {
            path: file_path,
            detail: "downloaded body is not a PDF".into(),
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ExtractError::Internal(format!("temp file write: {e}")))?;

    info!("downloaded to {}", file_path.display());
    Ok(ResolvedInput::Materialised {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL, or a generic name when it has none.
fn url_file_name(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/liste.pdf"));
        assert!(is_url("http://example.com/liste.pdf"));
        assert!(!is_url("/tmp/liste.pdf"));
        assert!(!is_url("liste.xlsx"));
    }

    #[test]
    fn spreadsheet_names() {
        assert!(is_spreadsheet_name("Fiyat_2024.xlsx"));
        assert!(is_spreadsheet_name("liste.XLS"));
        assert!(is_spreadsheet_name("liste.ods"));
        assert!(!is_spreadsheet_name("liste.pdf"));
        assert!(!is_spreadsheet_name("liste"));
    }

    #[test]
    fn source_file_names() {
        let path = SourceInput::Path(PathBuf::from("/data/Bosch_2024.pdf"));
        assert_eq!(path.file_name(), "Bosch_2024.pdf");

        let url = SourceInput::Url("https://example.com/a/b/liste.xlsx?v=2".into());
        assert_eq!(url.file_name(), "liste.xlsx");

        let bytes = SourceInput::Bytes {
            data: vec![],
            filename: "inline.pdf".into(),
        };
        assert_eq!(bytes.file_name(), "inline.pdf");
    }

    #[tokio::test]
    async fn missing_local_file_is_reported() {
        let input = SourceInput::Path(PathBuf::from("/nonexistent/liste.pdf"));
        let err = resolve(&input, 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn bytes_are_materialised_under_their_filename() {
        let input = SourceInput::Bytes {
            data: b"%PDF-1.7 stub".to_vec(),
            filename: "inline.pdf".into(),
        };
        let resolved = resolve(&input, 5).await.unwrap();
        assert!(resolved.path().ends_with("inline.pdf"));
        assert!(resolved.path().exists());
    }

    #[tokio::test]
    async fn magic_bytes_are_checked_for_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        let err = resolve(&SourceInput::Path(path), 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::CorruptDocument { .. }));
    }
}
