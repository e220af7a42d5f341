use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

#[derive(Debug)]
pub enum ArchiveError {
    Io(std::io::Error),
    Zip(zip::result::ZipError),
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::Io(e) => write!(f, "I/O error: {}", e),
            ArchiveError::Zip(e) => write!(f, "Zip error: {}", e),
        }
    }
}

impl std::error::Error for ArchiveError {}

impl From<std::io::Error> for ArchiveError {
    fn from(e: std::io::Error) -> Self {
        ArchiveError::Io(e)
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        ArchiveError::Zip(e)
    }
}

/// Read-only access to zip-structured files. Each call opens and closes the
/// archive; no handle outlives the call.
pub trait ArchiveReader {
    fn entry_names(&self, archive: &Path) -> Result<Vec<String>, ArchiveError>;

    fn read_entry(&self, archive: &Path, name: &str) -> Result<Vec<u8>, ArchiveError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveReader;

impl ArchiveReader for ZipArchiveReader {
    fn entry_names(&self, archive: &Path) -> Result<Vec<String>, ArchiveError> {
        let zip = ZipArchive::new(File::open(archive)?)?;
        Ok(zip.file_names().map(str::to_string).collect())
    }

    fn read_entry(&self, archive: &Path, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = ZipArchive::new(File::open(archive)?)?;
        let mut entry = zip.by_name(name)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
