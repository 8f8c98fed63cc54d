use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::WriteError;

/// Write a file through a temporary sibling and rename it into place.
///
/// Readers never observe a partially written `path`: either the previous
/// content or the complete new file is visible. If `write` fails the
/// temporary file is removed and `path` is left untouched.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<PathBuf, WriteError>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), WriteError>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".astrolive-")
        .suffix(".tmp")
        .tempfile_in(&dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path)?;
    Ok(path.to_path_buf())
}
