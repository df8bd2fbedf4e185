//! Flattens a repository's source files into a single text document for
//! upload, plus the small filesystem browsing helpers the HTTP surface
//! exposes.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::BundleError;
use crate::types::BundleOutcome;

pub const DEFAULT_MAX_BUNDLE_LINES: u64 = 1000;

const DEFAULT_EXTENSIONS: &[&str] = &["php", "js"];

const IGNORED_FOLDERS: &[&str] = &[
    "bin",
    "tmp",
    "logs",
    "vendor",
    "vendors",
    "node_modules",
    "cache",
    "temp",
    "build",
    "dist",
    "coverage",
    "tests",
    "test",
    ".git",
    ".github",
    ".idea",
    ".vscode",
    "bower_components",
    "packages",
    "composer",
    "deps",
    "dependencies",
];

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Walks a repository and concatenates matching source files into one
/// document under `<output_dir>`, capped at a global line count.
#[derive(Debug, Clone)]
pub struct SourceBundler {
    output_dir: PathBuf,
    extensions: Vec<String>,
    max_lines: u64,
}

impl SourceBundler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            max_lines: DEFAULT_MAX_BUNDLE_LINES,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_max_lines(mut self, max_lines: u64) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn bundle(&self, repo_path: &Path) -> Result<BundleOutcome, BundleError> {
        let repo_name = repo_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "repository".to_string());
        let timestamp = Utc::now().format("%Y-%m-%d_%H_%M_%S_%3f");
        let file_name = format!("{repo_name}_{timestamp}.txt");

        let mut document = String::new();
        let mut total_lines: u64 = 0;
        let mut limit_reached = false;

        let mut stack = vec![repo_path.to_path_buf()];
        'walk: while let Some(dir) = stack.pop() {
            let entries = sorted_entries(&dir)?;
            let mut subdirs = Vec::new();
            for entry in &entries {
                if entry.is_dir() {
                    if !skip_directory(entry) {
                        subdirs.push(entry.clone());
                    }
                    continue;
                }
                if !self.include_file(entry) {
                    continue;
                }

                let content = read_lossy(entry)?;
                let content_lines = content.lines().count() as u64;
                if total_lines + content_lines + 3 > self.max_lines {
                    limit_reached = true;
                    break 'walk;
                }

                let relative = entry
                    .strip_prefix(repo_path)
                    .unwrap_or(entry)
                    .to_string_lossy();
                let name = entry
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                document.push_str(&format!("File Path: {relative}\n"));
                document.push_str(&format!(" File Name: {name}\n"));
                document.push_str(&format!(" File Source Code: {content}\n\n"));
                total_lines += content_lines + 3;
            }
            // Depth-first in name order.
            for subdir in subdirs.into_iter().rev() {
                stack.push(subdir);
            }
        }

        fs::create_dir_all(&self.output_dir).map_err(|err| BundleError::WriteFailed {
            reason: err.to_string(),
        })?;
        let output_path = self.output_dir.join(&file_name);
        fs::write(&output_path, &document).map_err(|err| BundleError::WriteFailed {
            reason: err.to_string(),
        })?;

        Ok(BundleOutcome {
            file_name,
            path: output_path.to_string_lossy().to_string(),
            total_lines,
            limit_reached,
        })
    }

    fn include_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| *wanted == ext))
    }
}

/// Lists one directory level, the shape the file browser endpoint returns.
pub fn list_files(dir: &Path) -> Result<Vec<FileEntry>, BundleError> {
    let mut entries = Vec::new();
    for path in sorted_entries(dir)? {
        let metadata = fs::metadata(&path).map_err(|err| BundleError::Unreadable {
            path: path.to_string_lossy().to_string(),
            reason: err.to_string(),
        })?;
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        entries.push(FileEntry {
            name: path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: path.to_string_lossy().to_string(),
            is_directory: metadata.is_dir(),
            size: metadata.len(),
            last_modified,
        });
    }
    Ok(entries)
}

pub fn file_content(path: &Path) -> Result<String, BundleError> {
    read_lossy(path)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let reader = fs::read_dir(dir).map_err(|err| BundleError::Unreadable {
        path: dir.to_string_lossy().to_string(),
        reason: err.to_string(),
    })?;
    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|err| BundleError::Unreadable {
            path: dir.to_string_lossy().to_string(),
            reason: err.to_string(),
        })?;
        entries.push(entry.path());
    }
    entries.sort_by_key(|path| path.file_name().map(|name| name.to_os_string()));
    Ok(entries)
}

fn skip_directory(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
        return true;
    };
    if name.starts_with('.') {
        return true;
    }
    let lower = name.to_lowercase();
    IGNORED_FOLDERS.iter().any(|folder| lower == *folder)
        || lower.contains("vendor")
        || lower.contains("dependencies")
        || lower.contains("packages")
}

fn read_lossy(path: &Path) -> Result<String, BundleError> {
    let bytes = fs::read(path).map_err(|err| BundleError::Unreadable {
        path: path.to_string_lossy().to_string(),
        reason: err.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
