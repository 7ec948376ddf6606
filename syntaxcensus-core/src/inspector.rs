//! File eligibility and language categories for analysis.

use std::path::Path;

use tokei::{Config, LanguageType};

use crate::config::AnalysisConfig;
use crate::domain::{FileEntry, UNKNOWN_CATEGORY};

/// Classifies repository files using `tokei` language detection.
pub struct FileInspector {
    extensions: Vec<String>,
    exclude_dirs: Vec<String>,
    max_file_size: u64,
    max_files: usize,
}

impl FileInspector {
    /// Build an inspector from analysis settings.
    pub fn new(analysis: &AnalysisConfig) -> Self {
        Self {
            extensions: analysis
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_dirs: analysis
                .exclude_dirs
                .iter()
                .map(|dir| dir.to_lowercase())
                .collect(),
            max_file_size: analysis.max_file_size,
            max_files: analysis.max_files,
        }
    }

    /// Eligible files sorted by path, capped at the configured count.
    ///
    /// Returns the selection and the number of eligible files left out by the cap.
    pub fn select(&self, tree: &[FileEntry]) -> (Vec<FileEntry>, usize) {
        let mut eligible: Vec<FileEntry> = tree
            .iter()
            .filter(|entry| self.is_eligible(entry))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.path.cmp(&b.path));
        let overflow = eligible.len().saturating_sub(self.max_files);
        eligible.truncate(self.max_files);
        (eligible, overflow)
    }

    /// Whether a single file should be analyzed.
    pub fn is_eligible(&self, entry: &FileEntry) -> bool {
        let path = Path::new(&entry.path);
        entry.size <= self.max_file_size
            && has_extension(path, &self.extensions)
            && !is_minified(path)
            && !path_components_match(path, &self.exclude_dirs)
    }
}

/// Category for a file: its lowercase `tokei` language name, or `unknown`.
pub fn category_for(path: &str) -> String {
    // Only consult tokei when there is an extension; it otherwise opens the file.
    if Path::new(path).extension().is_none() {
        return UNKNOWN_CATEGORY.to_string();
    }
    LanguageType::from_path(Path::new(path), &Config::default())
        .map(|language| language.to_string().to_lowercase())
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());
    let Some(ext) = ext else {
        return false;
    };
    extensions.iter().any(|allowed| *allowed == ext)
}

fn is_minified(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            let name = name.to_lowercase();
            name.contains(".min.") || name.ends_with(".d.ts")
        })
        .unwrap_or(false)
}

fn path_components_match(path: &Path, segments: &[String]) -> bool {
    path.components().any(|component| {
        let segment = component.as_os_str().to_string_lossy().to_lowercase();
        segments.iter().any(|target| *target == segment)
    })
}
