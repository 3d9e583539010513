//! On-disk format of the vector index.
//!
//! The index lives in `<dir>/index.json`. Writes go to a sibling temp file that is renamed
//! over the previous file, so readers only ever see a complete index.

use super::types::{IndexError, IndexedChunk};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";
const TEMP_FILE: &str = "index.json.tmp";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
pub(crate) struct IndexFile {
    pub(crate) version: u32,
    pub(crate) dimension: Option<usize>,
    pub(crate) entries: Vec<IndexedChunk>,
}

pub(crate) fn index_file_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

pub(crate) fn write_index(
    dir: &Path,
    dimension: Option<usize>,
    entries: &[IndexedChunk],
) -> Result<(), IndexError> {
    fs::create_dir_all(dir).map_err(|source| IndexError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    #[derive(Serialize)]
    struct IndexFileRef<'a> {
        version: u32,
        dimension: Option<usize>,
        entries: &'a [IndexedChunk],
    }

    let bytes = serde_json::to_vec(&IndexFileRef {
        version: FORMAT_VERSION,
        dimension,
        entries,
    })?;

    let temp_path = dir.join(TEMP_FILE);
    let mut file = fs::File::create(&temp_path).map_err(io_err(&temp_path))?;
    file.write_all(&bytes).map_err(io_err(&temp_path))?;
    file.sync_all().map_err(io_err(&temp_path))?;
    drop(file);

    let final_path = index_file_path(dir);
    fs::rename(&temp_path, &final_path).map_err(io_err(&final_path))?;
    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> IndexError {
    let path = path.to_path_buf();
    move |source| IndexError::Io { path, source }
}

pub(crate) fn read_index(dir: &Path) -> Result<IndexFile, IndexError> {
    let path = index_file_path(dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(IndexError::NotFound(dir.to_path_buf()));
        }
        Err(source) => return Err(IndexError::Io { path, source }),
    };

    let file: IndexFile = serde_json::from_slice(&bytes)?;
    if file.version != FORMAT_VERSION {
        return Err(IndexError::Corrupt(format!(
            "unsupported format version {}",
            file.version
        )));
    }
    match file.dimension {
        None if !file.entries.is_empty() => {
            return Err(IndexError::Corrupt(
                "entries present without a recorded dimension".into(),
            ));
        }
        Some(dimension) => {
            if let Some(entry) = file.entries.iter().find(|e| e.vector.len() != dimension) {
                return Err(IndexError::Corrupt(format!(
                    "entry {} has {} components, expected {dimension}",
                    entry.id,
                    entry.vector.len()
                )));
            }
        }
        None => {}
    }
    Ok(file)
}

pub(crate) fn remove_index(dir: &Path) -> Result<(), IndexError> {
    for path in [index_file_path(dir), dir.join(TEMP_FILE)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(IndexError::Io { path, source }),
        }
    }
    Ok(())
}
