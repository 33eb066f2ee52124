use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Error, Result};

// Moves a raw output file into the persistent data directory, keeping its
// filename. The move never leaves zero copies behind: either the source is
// still at its original path, or the file is complete at the destination.
pub fn archive(src: &Path, data_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(data_dir).map_err(|e| archive_err(data_dir, e))?;

    let file_name = src
        .file_name()
        .ok_or_else(|| archive_err(src, "path has no filename"))?;
    let dest = data_dir.join(file_name);

    // Plain rename when source and destination share a filesystem.
    if fs::rename(src, &dest).is_ok() {
        info!("Archived {:?} -> {:?}", src, dest);
        return Ok(dest);
    }

    // Cross-device fallback: copy to a temporary name inside the data
    // directory, rename into place, only then remove the source.
    let tmp = data_dir.join(format!(".{}.partial", file_name.to_string_lossy()));
    if let Err(e) = fs::copy(src, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(archive_err(src, e));
    }
    if let Err(e) = fs::rename(&tmp, &dest) {
        let _ = fs::remove_file(&tmp);
        return Err(archive_err(src, e));
    }
    if let Err(e) = fs::remove_file(src) {
        // Both copies exist at this point; not a data-loss condition.
        warn!("Archived {:?} but could not remove the source: {}", src, e);
    }

    info!("Archived {:?} -> {:?}", src, dest);
    Ok(dest)
}

fn archive_err(path: &Path, e: impl ToString) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
