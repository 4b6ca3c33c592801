//! Atomic file replacement

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{PrestepsError, Result};

/// Write `bytes` to `path` atomically
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_with(path, |writer| writer.write_all(bytes))
}

/// Stream content into a temporary file in the destination directory and
/// rename it over `path` once `write` succeeded and the data is synced.
/// On any failure the temporary file is removed and `path` is either
/// absent or still holds its previous content.
pub fn write_atomic_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> io::Result<()>,
{
    let write_error = |source| PrestepsError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp_file = NamedTempFile::new_in(parent).map_err(write_error)?;
    {
        let mut writer = BufWriter::new(temp_file.as_file());
        write(&mut writer).map_err(write_error)?;
        writer.flush().map_err(write_error)?;
    }
    temp_file.as_file().sync_all().map_err(write_error)?;

    temp_file.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}
