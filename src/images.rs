//! Image optimization stage with a persistent content-addressed cache.
//!
//! Every raster and vector file under the image tree is fingerprinted; a
//! cache hit emits the previously optimized bytes without touching the
//! optimizer, a miss optimizes, stores and emits. The cache lives on disk
//! and survives restarts. A single malformed file is skipped with a warning
//! while the rest of the batch continues.

use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::Paths;
use crate::cache::Store;
use crate::error::ImageError;
use crate::hash::Hash32;

const EXTENSIONS: &[&str] = &["png", "jpeg", "jpg", "gif", "svg"];

const JPEG_QUALITY: u8 = 80;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub fresh: usize,
    pub cached: usize,
    pub failed: usize,
}

enum Outcome {
    Fresh,
    Cached,
}

/// Optimize every image under the source tree into the matching destination
/// subtree. Returns counts; per-file failures are reported and skipped.
pub fn build(paths: &Paths, store: &Store) -> Result<Summary, ImageError> {
    if !paths.images.exists() {
        return Ok(Summary::default());
    }

    let s = Instant::now();

    let mut files = Vec::new();
    for entry in glob::glob(paths.images.join("**/*").as_str())? {
        let path = Utf8PathBuf::try_from(entry?)?;
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }

    let bar = ProgressBar::new(files.len() as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("Error setting progress bar template")
            .progress_chars("#>-"),
    );
    bar.set_message("Optimizing images");

    let results: Vec<(&Utf8PathBuf, Result<Outcome, ImageError>)> = files
        .par_iter()
        .map(|path| {
            let result = process(paths, store, path);
            bar.inc(1);
            (path, result)
        })
        .collect();

    let mut summary = Summary::default();
    for (path, result) in results {
        match result {
            Ok(Outcome::Fresh) => summary.fresh += 1,
            Ok(Outcome::Cached) => summary.cached += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!("skipping image '{path}': {e}");
            }
        }
    }

    bar.finish_with_message(format!(
        "Optimized images: {} fresh, {} cached, {} failed {}",
        summary.fresh,
        summary.cached,
        summary.failed,
        crate::as_overhead(s),
    ));

    Ok(summary)
}

fn has_image_extension(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

fn process(paths: &Paths, store: &Store, path: &Utf8Path) -> Result<Outcome, ImageError> {
    let buffer = fs::read(path)?;
    let hash = Hash32::hash(&buffer);

    let rel = path
        .strip_prefix(&paths.images)
        .expect("image path is under the images tree");
    let dest = paths.dist_images.join(rel);
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir)?;
    }

    if let Some(bytes) = store.lookup(hash)? {
        fs::write(&dest, bytes)?;
        return Ok(Outcome::Cached);
    }

    let ext = path
        .extension()
        .expect("extension checked by the glob filter")
        .to_ascii_lowercase();
    let optimized = optimize(&buffer, &ext)?;

    store.save(hash, path, &ext, &optimized)?;
    fs::write(&dest, optimized)?;

    Ok(Outcome::Fresh)
}

/// Re-encode raster formats; vector and animated formats pass through
/// unchanged. Keeps the original bytes when the re-encode comes out larger.
fn optimize(buffer: &[u8], ext: &str) -> Result<Vec<u8>, ImageError> {
    let out = match ext {
        "png" => {
            let img = image::load_from_memory(buffer)?;
            let mut out = Vec::new();
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
            out
        }
        "jpg" | "jpeg" => {
            let img = image::load_from_memory(buffer)?;
            let mut out = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            img.write_with_encoder(encoder)?;
            out
        }
        _ => return Ok(buffer.to_vec()),
    };

    if out.len() < buffer.len() {
        Ok(out)
    } else {
        Ok(buffer.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn fixture(dir: &tempfile::TempDir) -> (Paths, Store) {
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let paths = Paths::new(root);
        fs::create_dir_all(&paths.images).unwrap();
        let store = Store::open(paths.cache.clone()).unwrap();
        (paths, store)
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([200, 10, 10, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn optimizes_and_mirrors_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, store) = fixture(&dir);

        fs::create_dir_all(paths.images.join("icons")).unwrap();
        fs::write(paths.images.join("icons/dot.png"), tiny_png()).unwrap();
        fs::write(paths.images.join("logo.svg"), b"<svg></svg>").unwrap();

        let summary = build(&paths, &store).unwrap();
        assert_eq!(summary.fresh, 2);
        assert_eq!(summary.failed, 0);

        assert!(paths.dist_images.join("icons/dot.png").exists());
        // Vector files pass through byte-identical.
        assert_eq!(
            fs::read(paths.dist_images.join("logo.svg")).unwrap(),
            b"<svg></svg>"
        );
    }

    #[test]
    fn second_run_is_served_from_cache_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, store) = fixture(&dir);

        fs::write(paths.images.join("dot.png"), tiny_png()).unwrap();

        let first = build(&paths, &store).unwrap();
        assert_eq!((first.fresh, first.cached), (1, 0));
        let bytes = fs::read(paths.dist_images.join("dot.png")).unwrap();

        let second = build(&paths, &store).unwrap();
        assert_eq!((second.fresh, second.cached), (0, 1));
        assert_eq!(fs::read(paths.dist_images.join("dot.png")).unwrap(), bytes);
    }

    #[test]
    fn malformed_image_does_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, store) = fixture(&dir);

        fs::write(paths.images.join("bad.png"), b"not a png at all").unwrap();
        fs::write(paths.images.join("good.png"), tiny_png()).unwrap();

        let summary = build(&paths, &store).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fresh, 1);
        assert!(paths.dist_images.join("good.png").exists());
        assert!(!paths.dist_images.join("bad.png").exists());
    }

    #[test]
    fn uppercase_extensions_match() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, store) = fixture(&dir);

        fs::write(paths.images.join("photo.JPG"), tiny_png()).unwrap();
        // A PNG payload under a .JPG name decodes fine, load_from_memory
        // sniffs the real format.
        let summary = build(&paths, &store).unwrap();
        assert_eq!(summary.fresh + summary.failed, 1);
        assert!(summary.fresh == 1 || summary.failed == 1);
    }

    #[test]
    fn missing_images_dir_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let paths = Paths::new(root);
        let store = Store::open(paths.cache.clone()).unwrap();

        assert_eq!(build(&paths, &store).unwrap(), Summary::default());
    }
}
