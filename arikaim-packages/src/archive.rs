//! ZIP archives and directory moves

use crate::Result;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;

/// Version control metadata directories never written into backups
pub const VCS_DIRS: [&str; 3] = [".git", ".svn", ".hg"];

/// Archive the content of `source` into `dest`
///
/// Entries whose path contains a component listed in `exclude` are skipped.
pub fn create_zip(source: &Path, dest: &Path, exclude: &[&str]) -> Result<usize> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = fs::File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut count = 0;

    let walker = WalkDir::new(source).min_depth(1).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !exclude.iter().any(|e| *e == name)
    });

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = match entry.path().strip_prefix(source) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let data = fs::read(entry.path())?;
            zip.write_all(&data)?;
            count += 1;
        }
    }

    zip.finish()?;
    debug!("Archived {} files from {} into {}", count, source.display(), dest.display());
    Ok(count)
}

/// Extract an archive into `dest`
///
/// Entries that would land outside `dest` are skipped.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                warn!("Skipping unsafe archive entry {}", entry.name());
                continue;
            }
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }
    }

    Ok(())
}

/// Move a directory, falling back to copy + delete across file systems
pub fn move_dir(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Rename {} failed ({}), copying instead", source.display(), e);
            copy_dir(source, dest)?;
            fs::remove_dir_all(source)?;
            Ok(())
        }
    }
}

/// Recursively copy a directory
pub fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = match entry.path().strip_prefix(source) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Make a path writable by its owner, creating directories that do not exist yet
pub fn ensure_writable(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }

    let mut permissions = fs::metadata(path)?.permissions();
    if permissions.readonly() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() | 0o200);
        }
        #[cfg(not(unix))]
        permissions.set_readonly(false);

        fs::set_permissions(path, permissions)?;
        debug!("Made {} writable", path.display());
    }
    Ok(())
}
