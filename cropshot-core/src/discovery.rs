//! File discovery for the batch orchestrator.
//!
//! Only the top level of a directory is scanned. Files are matched on their
//! extension, case-insensitively, and returned sorted by path.

use crate::error::{CoreError, CoreResult};

use std::path::{Path, PathBuf};

/// Extensions accepted as source videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm"];

/// Returns true if `path` has one of the accepted video extensions.
pub fn is_video_file(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Finds source videos in the top level of `input_dir`.
///
/// # Returns
///
/// * `Ok(Vec<PathBuf>)` - sorted paths of the discovered videos
/// * `Err(CoreError::Io)` - if the directory cannot be read
/// * `Err(CoreError::NoFilesFound)` - if no video files are present
///
/// # Examples
///
/// ```rust,no_run
/// use cropshot_core::find_processable_files;
/// use std::path::Path;
///
/// match find_processable_files(Path::new("/path/to/videos")) {
///     Ok(files) => println!("Found {} videos", files.len()),
///     Err(e) => eprintln!("Discovery failed: {}", e),
/// }
/// ```
pub fn find_processable_files(input_dir: &Path) -> CoreResult<Vec<PathBuf>> {
    find_files_with_extensions(input_dir, VIDEO_EXTENSIONS)
}

/// Finds the intermediate `.mp4` files produced by phase 1.
pub fn find_intermediate_files(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    find_files_with_extensions(dir, &["mp4"])
}

/// Top-level files in `input_dir` that discovery does not accept as videos.
pub fn find_skipped_files(input_dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let mut skipped: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            (path.is_file() && !is_video_file(&path)).then_some(path)
        })
        .collect();
    skipped.sort();
    Ok(skipped)
}

fn find_files_with_extensions(dir: &Path, extensions: &[&str]) -> CoreResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            (path.is_file() && has_extension(&path, extensions)).then_some(path)
        })
        .collect();

    if files.is_empty() {
        return Err(CoreError::NoFilesFound(dir.to_path_buf()));
    }

    files.sort();
    log::debug!("Discovered {} file(s) in {}", files.len(), dir.display());
    Ok(files)
}
