//! Finding an `aapt2` binary the device can actually run.
//!
//! The binary ships as a fake shared library (`libaapt2*.so`) so the package
//! installer extracts it into the native library directory. When the installer
//! skipped extraction (`extractNativeLibs=false`) it is copied out of the
//! installed APKs instead.

use super::elf;
use crate::core::archive::{ArchiveError, ArchiveReader};
use std::fs;
use std::path::{Path, PathBuf};

/// ABIs the bundled toolchain is built for.
pub const WORKING_ABIS: [&str; 4] = ["arm64-v8a", "x86", "x86_64", "armeabi-v7a"];

/// Last-resort ABI folder, tried after every supported device ABI.
const LEGACY_ABI: &str = "armeabi";

pub fn supports_device(device_abis: &[String]) -> bool {
    device_abis
        .iter()
        .any(|abi| WORKING_ABIS.contains(&abi.as_str()))
}

pub struct ToolchainLocator<'a> {
    pub library_name: String,
    pub native_library_dir: PathBuf,
    /// Base APK first, then splits.
    pub code_paths: Vec<PathBuf>,
    /// Most preferred first, as reported by the device.
    pub device_abis: Vec<String>,
    /// Where an extracted copy is written.
    pub output_dir: PathBuf,
    pub archives: &'a dyn ArchiveReader,
}

impl ToolchainLocator<'_> {
    pub fn locate(&self) -> Option<PathBuf> {
        let native = self.native_library_dir.join(&self.library_name);
        if native.exists() && elf::is_runnable(&native) {
            return Some(native);
        }

        match self.extract_from_installed_apk() {
            Some(extracted) if elf::is_runnable(&extracted) => Some(extracted),
            Some(extracted) => {
                log::warn!("Extracted {} is not runnable here", extracted.display());
                None
            }
            None => None,
        }
    }

    /// Supported device ABIs in device order, then `armeabi`.
    pub fn abi_candidates(&self) -> Vec<&str> {
        let mut candidates: Vec<&str> = Vec::new();
        let preferred = self
            .device_abis
            .iter()
            .map(String::as_str)
            .filter(|abi| WORKING_ABIS.contains(abi));
        for abi in preferred.chain(std::iter::once(LEGACY_ABI)) {
            if !candidates.contains(&abi) {
                candidates.push(abi);
            }
        }
        candidates
    }

    fn extract_from_installed_apk(&self) -> Option<PathBuf> {
        let code_paths: Vec<&PathBuf> = self.code_paths.iter().filter(|p| p.exists()).collect();
        if code_paths.is_empty() {
            return None;
        }
        if let Err(e) = fs::create_dir_all(&self.output_dir) {
            log::warn!("Cannot create {}: {}", self.output_dir.display(), e);
            return None;
        }
        let output = self.output_dir.join(&self.library_name);

        for code_path in code_paths {
            match self.extract_from(code_path, &output) {
                Ok(true) => return Some(output),
                Ok(false) => {}
                Err(e) => log::debug!("Skipping {}: {}", code_path.display(), e),
            }
        }
        None
    }

    /// Copies the first ABI match in `code_path` to `output`.
    fn extract_from(&self, code_path: &Path, output: &Path) -> Result<bool, ArchiveError> {
        let names = self.archives.entry_names(code_path)?;
        for abi in self.abi_candidates() {
            let entry = format!("lib/{}/{}", abi, self.library_name);
            if !names.contains(&entry) {
                continue;
            }
            let bytes = self.archives.read_entry(code_path, &entry)?;
            fs::write(output, bytes)?;
            make_owner_executable(output)?;
            log::info!("Extracted {} from {}", entry, code_path.display());
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(unix)]
fn make_owner_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn make_owner_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
