//! Output directory cleaning.

use std::fs;
use std::time::Instant;

use camino::Utf8Path;

use crate::Paths;
use crate::cache::Store;
use crate::error::CleanError;

/// Delete everything in the output directory and clear the whole
/// optimization cache.
pub fn full(paths: &Paths, store: &Store) -> Result<(), CleanError> {
    let s = Instant::now();

    remove_contents(&paths.dist, None)?;
    store.clear()?;

    tracing::info!("cleaned {} and the cache {}", paths.dist, crate::as_overhead(s));
    Ok(())
}

/// Delete everything in the output directory except the mirrored image
/// subtree, so incremental builds keep previously optimized images.
pub fn partial(paths: &Paths) -> Result<(), CleanError> {
    let keep = paths
        .dist_images
        .file_name()
        .expect("dist images dir has a name");
    remove_contents(&paths.dist, Some(keep))
}

/// Remove the contents of `dir`, sparing the top-level entry named `keep`.
/// A missing directory is a no-op, not an error.
fn remove_contents(dir: &Utf8Path, keep: Option<&str>) -> Result<(), CleanError> {
    if !dir.exists() {
        return Ok(());
    }

    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        if keep.is_some_and(|keep| entry.file_name() == keep) {
            continue;
        }

        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        result.map_err(|source| CleanError::Remove {
            path: path.to_path_buf(),
            source,
        })?;
    }

    Ok(())
}
