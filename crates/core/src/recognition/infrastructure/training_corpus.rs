use std::path::{Path, PathBuf};

use crate::capture::infrastructure::image_sequence_device::has_image_extension;
use crate::recognition::domain::recognition_model::TrainingError;

/// One labeled sample file; the label is the file stem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorpusEntry {
    pub path: PathBuf,
    pub label: String,
}

/// Result of scanning a corpus directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorpusScan {
    /// Image files, sorted by path.
    pub entries: Vec<CorpusEntry>,
    /// Regular files that are not images.
    pub skipped: Vec<PathBuf>,
}

/// Flat directory of canonical face images written by the preprocessor.
pub struct TrainingCorpus {
    dir: PathBuf,
}

impl TrainingCorpus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists the corpus. Subdirectories are ignored.
    pub fn scan(&self) -> Result<CorpusScan, TrainingError> {
        let read_err = |source| TrainingError::CorpusRead {
            path: self.dir.clone(),
            source,
        };
        let mut scan = CorpusScan::default();
        for entry in std::fs::read_dir(&self.dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if !path.is_file() {
                continue;
            }
            let label = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty())
                .map(str::to_owned);
            match label {
                Some(label) if has_image_extension(&path) => {
                    scan.entries.push(CorpusEntry { path, label })
                }
                _ => scan.skipped.push(path),
            }
        }
        scan.entries.sort_by(|a, b| a.path.cmp(&b.path));
        scan.skipped.sort();
        Ok(scan)
    }
}
