//! Perceptual de-duplication of extracted frames (difference hash).

use crate::error::CoreResult;
use image::imageops::{self, FilterType};
use image::DynamicImage;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Difference hash bits, packed row-major into 64-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DHash(Vec<u64>);

impl DHash {
    pub fn bits(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Computes the dHash of an image with a `hash_size` x `hash_size` bit grid.
///
/// Bit `i` is set when a pixel is brighter than its left neighbour in the
/// `(hash_size+1) x hash_size` grayscale thumbnail.
pub fn dhash(image: &DynamicImage, hash_size: u32) -> DHash {
    let gray = image.to_luma8();
    let thumb = imageops::resize(&gray, hash_size + 1, hash_size, FilterType::Triangle);

    let total = (hash_size * hash_size) as usize;
    let mut words = vec![0u64; total.div_ceil(64)];
    let mut bit = 0usize;
    for y in 0..hash_size {
        for x in 0..hash_size {
            if thumb.get_pixel(x + 1, y)[0] > thumb.get_pixel(x, y)[0] {
                words[bit / 64] |= 1 << (bit % 64);
            }
            bit += 1;
        }
    }
    DHash(words)
}

/// Sort key of `<seq>_<ts>.png`; names without a numeric prefix sort first.
fn sequence_key(path: &Path) -> i64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.split_once('_'))
        .and_then(|(prefix, _)| prefix.parse().ok())
        .unwrap_or(-1)
}

/// Outcome of de-duplicating one frame directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupReport {
    /// Frames left on disk, in sequence order.
    pub kept: Vec<PathBuf>,
    pub removed: usize,
}

/// Deletes frames in `dir` whose hash matches an earlier frame.
///
/// Unreadable images are kept.
pub fn remove_duplicates(dir: &Path, hash_size: u32) -> CoreResult<DedupReport> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("png")))
        .collect();
    frames.sort_by_key(|p| (sequence_key(p), p.clone()));

    let hashes: Vec<Option<DHash>> = frames
        .par_iter()
        .map(|p| match image::open(p) {
            Ok(img) => Some(dhash(&img, hash_size)),
            Err(e) => {
                log::warn!("Could not read {}, keeping it: {}", p.display(), e);
                None
            }
        })
        .collect();

    let mut seen: HashMap<DHash, PathBuf> = HashMap::new();
    let mut report = DedupReport::default();
    for (path, hash) in frames.into_iter().zip(hashes) {
        let Some(hash) = hash else {
            report.kept.push(path);
            continue;
        };
        if let Some(original) = seen.get(&hash) {
            log::debug!("{} duplicates {}", path.display(), original.display());
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    log::error!("Could not delete {}: {}", path.display(), e);
                    report.kept.push(path);
                }
            }
        } else {
            seen.insert(hash, path.clone());
            report.kept.push(path);
        }
    }

    log::info!(
        "{}: kept {}, removed {} duplicate(s)",
        dir.display(),
        report.kept.len(),
        report.removed
    );
    Ok(report)
}
