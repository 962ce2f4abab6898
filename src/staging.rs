use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("No file selected")]
    NoFile,

    #[error("Invalid file type. Please upload Excel files only (.xlsx, .xls)")]
    BadType,

    #[error("File is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("could not stage upload: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Error code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            StageError::NoFile => "bad_params",
            StageError::BadType => "bad_file_type",
            StageError::TooLarge { .. } => "file_too_large",
            StageError::Io(_) => "stage_failed",
        }
    }
}

pub fn allowed_file(name: &str, allowed: &[String]) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    allowed.iter().any(|a| a.eq_ignore_ascii_case(ext))
}

/// Reduces an uploaded file name to a safe single path component: the
/// directory part is dropped, whitespace becomes `_`, and anything outside
/// ASCII letters, digits, `.`, `_` and `-` is removed.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned = base
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else {
                None
            }
        })
        .collect::<String>();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// Validates an upload and writes its bytes into `dir`, returning the path.
pub fn stage_upload(
    dir: &Path,
    file_name: &str,
    bytes: &[u8],
    allowed: &[String],
    max_bytes: usize,
) -> Result<PathBuf, StageError> {
    if file_name.trim().is_empty() || bytes.is_empty() {
        return Err(StageError::NoFile);
    }
    if !allowed_file(file_name, allowed) {
        return Err(StageError::BadType);
    }
    if bytes.len() > max_bytes {
        return Err(StageError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    let safe = sanitize_file_name(file_name);
    if safe.is_empty() || !allowed_file(&safe, allowed) {
        return Err(StageError::BadType);
    }
    std::fs::create_dir_all(dir)?;
    let path = dir.join(safe);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: usize,
    pub errors: Vec<String>,
}

/// Removes every regular file in `dir`. A missing directory is not an error.
pub fn clear_staging(dir: &Path) -> ClearReport {
    let mut report = ClearReport::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            report
                .errors
                .push(format!("Error reading upload folder {}: {}", dir.display(), e));
            return report;
        }
    };
    for ent in entries.flatten() {
        let p = ent.path();
        if !p.is_file() {
            continue;
        }
        match std::fs::remove_file(&p) {
            Ok(()) => report.deleted += 1,
            Err(e) => report
                .errors
                .push(format!("Error deleting file {}: {}", p.display(), e)),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{}-{}", prefix, nanos))
    }

    fn excel() -> Vec<String> {
        vec!["xlsx".to_string(), "xls".to_string()]
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(allowed_file("roster.XLSX", &excel()));
        assert!(allowed_file("old.xls", &excel()));
        assert!(!allowed_file("roster.csv", &excel()));
        assert!(!allowed_file("xlsx", &excel()));
    }

    #[test]
    fn sanitizer_drops_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\March data.xlsx"), "March_data.xlsx");
        assert_eq!(sanitize_file_name("..hidden.xlsx"), "hidden.xlsx");
        assert_eq!(sanitize_file_name("réport?.xlsx"), "rport.xlsx");
    }

    #[test]
    fn staging_enforces_type_and_size() {
        let dir = temp_dir("rosterd-stage");
        assert!(matches!(
            stage_upload(&dir, "", b"x", &excel(), 10),
            Err(StageError::NoFile)
        ));
        assert!(matches!(
            stage_upload(&dir, "a.csv", b"x", &excel(), 10),
            Err(StageError::BadType)
        ));
        let big = stage_upload(&dir, "a.xlsx", &[0u8; 11], &excel(), 10).unwrap_err();
        assert_eq!(big.code(), "file_too_large");

        let path = stage_upload(&dir, "sub/a b.xlsx", b"bytes", &excel(), 10).unwrap();
        assert_eq!(path, dir.join("a_b.xlsx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clearing_counts_removed_files() {
        let dir = temp_dir("rosterd-clear");
        assert_eq!(clear_staging(&dir), ClearReport::default());
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("a.xlsx"), b"1").unwrap();
        std::fs::write(dir.join("b.xls"), b"2").unwrap();
        let report = clear_staging(&dir);
        assert_eq!(report.deleted, 2);
        assert!(report.errors.is_empty());
        assert!(dir.join("nested").is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
