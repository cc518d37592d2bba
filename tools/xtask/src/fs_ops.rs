use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::stage::StageError;

/// Create `dir` and any missing parents. Succeeds without doing anything if it already exists.
pub fn ensure_dir(dir: &Path) -> Result<(), StageError> {
    fs::create_dir_all(dir).map_err(|error| StageError::CreateDir {
        path: dir.to_owned(),
        error,
    })
}

/// Copy everything inside `src_dir` into `dst_dir`, like `cp -a src_dir/. dst_dir/`.
///
/// * Files already in `dst_dir` are overwritten.
/// * Files in `dst_dir` that have no counterpart in `src_dir` are left alone.
/// * Dot-files are copied too.
///
/// `dst_dir` itself must already exist. Returns the number of files (not directories) copied.
pub fn copy_tree_contents(src_dir: &Path, dst_dir: &Path) -> Result<usize, StageError> {
    let mut files_copied = 0;
    for entry_result in walkdir::WalkDir::new(src_dir)
        .min_depth(1)
        .follow_links(false)
        .contents_first(false)
        .sort_by_file_name()
    {
        let entry = entry_result.map_err(|error| StageError::ReadTree {
            path: src_dir.to_owned(),
            error,
        })?;
        let Ok(relative) = entry.path().strip_prefix(src_dir) else {
            continue;
        };
        let dst = dst_dir.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            ensure_dir(&dst)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dst)?;
            files_copied += 1;
        } else {
            copy_file_with_context(entry.path(), &dst)?;
            files_copied += 1;
        }
        log::debug!("copied {}", relative.display());
    }
    Ok(files_copied)
}

/// Copy a regular file, overwriting `dst`, and carry over its permissions and timestamps.
/// Returns the number of bytes copied.
pub fn copy_file_with_context(src: &Path, dst: &Path) -> Result<u64, StageError> {
    let copy_error = |error| StageError::Copy {
        from: src.to_owned(),
        to: dst.to_owned(),
        error,
    };

    // fs::copy carries over permission bits but not timestamps.
    let bytes = match fs::copy(src, dst) {
        // A read-only file left by an earlier copy can't be opened for writing,
        // but it can be replaced.
        Err(error) if error.kind() == io::ErrorKind::PermissionDenied && is_read_only_file(dst) => {
            fs::remove_file(dst).map_err(|_| copy_error(error))?;
            fs::copy(src, dst)
        }
        result => result,
    }
    .map_err(copy_error)?;
    let metadata = fs::metadata(src).map_err(copy_error)?;
    copy_times(&metadata, dst).map_err(copy_error)?;
    Ok(bytes)
}

fn is_read_only_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().readonly())
}

fn copy_times(src_metadata: &fs::Metadata, dst: &Path) -> io::Result<()> {
    let mut times = fs::FileTimes::new().set_modified(src_metadata.modified()?);
    if let Ok(accessed) = src_metadata.accessed() {
        times = times.set_accessed(accessed);
    }

    // Owning the file is enough to set its times on Unix, even if it is read-only.
    #[cfg(unix)]
    let file = fs::File::open(dst)?;
    #[cfg(not(unix))]
    let file = fs::File::options().write(true).open(dst)?;

    file.set_times(times)
}

/// Recreate the symbolic link `src` at `dst`, replacing any non-directory already there.
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), StageError> {
    let copy_error = |error| StageError::Copy {
        from: src.to_owned(),
        to: dst.to_owned(),
        error,
    };

    let target = fs::read_link(src).map_err(copy_error)?;
    match fs::symlink_metadata(dst) {
        Ok(existing) if !existing.is_dir() => fs::remove_file(dst).map_err(copy_error)?,
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(copy_error(e)),
    }
    std::os::unix::fs::symlink(target, dst).map_err(copy_error)
}

/// Links can't be portably recreated, so copy what they point to.
#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<(), StageError> {
    copy_file_with_context(src, dst).map(|_| ())
}

/// Return a set of all paths within `search_dir`,
///
/// * with directories named before their contents
/// * excluding dot-files
/// * relative to `base_dir`
///
/// Paths under `search_dir` that are not under `base_dir` are skipped.
pub fn directory_tree_contents(
    base_dir: &Path,
    search_dir: &Path,
) -> Result<BTreeSet<PathBuf>, walkdir::Error> {
    walkdir::WalkDir::new(search_dir)
        .min_depth(1)
        .follow_links(false)
        .contents_first(false)
        .into_iter()
        .filter_entry(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry_result| match entry_result {
            Ok(entry) => entry
                .path()
                .strip_prefix(base_dir)
                .ok()
                .map(|relative| Ok(relative.to_owned())),
            Err(e) => Some(Err(e)),
        })
        .collect()
}
