//! Scratch files and directories.
//!
//! Everything here is backed by the tempfile crate, so scratch data is
//! removed on drop, including when extraction bails out with an error.

use crate::config::CoreConfig;
use crate::error::CoreResult;
use std::path::Path;
use tempfile::{Builder as TempFileBuilder, NamedTempFile, TempDir};

/// Creates a temporary directory under the configured scratch base.
pub fn create_temp_dir(config: &CoreConfig, prefix: &str) -> CoreResult<TempDir> {
    let base = config.scratch_base();
    std::fs::create_dir_all(base)?;

    Ok(TempFileBuilder::new().prefix(prefix).tempdir_in(base)?)
}

/// Creates a temporary file with prefix and extension in `dir`.
pub fn create_temp_file(dir: &Path, prefix: &str, extension: &str) -> CoreResult<NamedTempFile> {
    std::fs::create_dir_all(dir)?;
    let temp_file = TempFileBuilder::new()
        .prefix(&format!("{prefix}_"))
        .suffix(&format!(".{extension}"))
        .tempfile_in(dir)?;

    Ok(temp_file)
}

/// Copies `src` to `dst` through a temporary file in `dst`'s directory.
///
/// `dst` either ends up as a complete copy or is left untouched.
pub fn copy_via_temp(src: &Path, dst: &Path) -> CoreResult<u64> {
    let dir = dst.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = create_temp_file(dir, ".cropshot_copy", "part")?;
    let mut reader = std::fs::File::open(src)?;
    let bytes = std::io::copy(&mut reader, temp.as_file_mut())?;
    temp.persist(dst).map_err(|e| e.error)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_is_removed_on_drop() -> Result<(), Box<dyn std::error::Error>> {
        let base = tempfile::tempdir()?;
        let mut config = CoreConfig::default();
        config.temp_dir = Some(base.path().join("scratch"));

        let dir = create_temp_dir(&config, "scene_")?;
        let path = dir.path().to_path_buf();
        assert!(path.starts_with(base.path().join("scratch")));
        std::fs::write(path.join("1.png"), b"x")?;
        drop(dir);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn copy_replaces_destination() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("a.mkv");
        let dst = dir.path().join("out").join("a.mp4");
        std::fs::write(&src, b"video bytes")?;
        std::fs::create_dir_all(dst.parent().unwrap())?;
        std::fs::write(&dst, b"stale")?;

        assert_eq!(copy_via_temp(&src, &dst)?, 11);
        assert_eq!(std::fs::read(&dst)?, b"video bytes");
        let leftovers = std::fs::read_dir(dst.parent().unwrap())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }
}
