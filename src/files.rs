//! Expand ingestion arguments into a list of document files.
//!
//! Plain file arguments are taken as-is, whatever their extension.
//! Directories are walked recursively and filtered by the `[ingest]`
//! include/exclude globs, matched against the path relative to that
//! directory.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IngestConfig;

/// Resolve `inputs` to files, in argument order; each directory's files are
/// sorted for deterministic ingestion.
pub fn collect_files(inputs: &[PathBuf], config: &IngestConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            files.extend(walk_dir(input, &include_set, &exclude_set, config.follow_symlinks)?);
        } else {
            bail!("Ingest path does not exist: {}", input.display());
        }
    }
    Ok(files)
}

fn walk_dir(
    root: &Path,
    include_set: &GlobSet,
    exclude_set: &GlobSet,
    follow_symlinks: bool,
) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(follow_symlinks) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        found.push(path.to_path_buf());
    }
    found.sort();
    Ok(found)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_directory_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("sub/c.csv"), "c").unwrap();
        fs::write(dir.path().join("image.png"), "x").unwrap();
        fs::write(dir.path().join(".git/config.txt"), "x").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()], &IngestConfig::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt", "sub/c.csv"]);
    }

    #[test]
    fn test_explicit_file_bypasses_globs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("resume.rtf");
        fs::write(&file, "text").unwrap();
        let files = collect_files(&[file.clone()], &IngestConfig::default()).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_missing_path_errors() {
        let err = collect_files(&[PathBuf::from("/no/such/dir")], &IngestConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_custom_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "k").unwrap();
        fs::write(dir.path().join("draft.txt"), "d").unwrap();
        let config = IngestConfig {
            exclude_globs: vec!["draft*".to_string()],
            ..IngestConfig::default()
        };
        let files = collect_files(&[dir.path().to_path_buf()], &config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.txt"));
    }
}
