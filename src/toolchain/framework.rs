//! Cache directories for decoded framework resources.
//!
//! A directory is keyed by the archive's declared target SDK and by the identity
//! of the toolchain binary (content hash plus `version` output), so swapping the
//! toolchain never reuses a stale framework.

use super::{dump_badging, dump_manifest_xmltree, version};
use crate::core::logging::{self, ProbeLog};
use crate::core::process::{CommandRunner, ProbeOutput, DUMP_TIMEOUT, VERSION_TIMEOUT};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const NO_HASH: &str = "nohash";
pub const NO_VERSION: &str = "noversion";

const HASH_PART_LEN: usize = 12;
const VERSION_PART_LEN: usize = 8;

fn badging_target_sdk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"targetSdkVersion:'(\d+)'").unwrap())
}

fn xmltree_target_sdk_hex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)targetSdkVersion\(0x[0-9a-f]+\)=\(type 0x10\)0x([0-9a-f]+)").unwrap()
    })
}

fn xmltree_target_sdk_dec() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)targetSdkVersion\(0x[0-9a-f]+\)=\(type 0x10\)(\d+)").unwrap()
    })
}

/// Target SDK from `dump badging` output.
pub fn parse_badging_target_sdk(output: &str) -> Option<u32> {
    badging_target_sdk()
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

/// Target SDK from `dump xmltree` output, hex form first, then decimal.
pub fn parse_xmltree_target_sdk(output: &str) -> Option<u32> {
    xmltree_target_sdk_hex()
        .captures(output)
        .and_then(|caps| u32::from_str_radix(&caps[1], 16).ok())
        .or_else(|| {
            xmltree_target_sdk_dec()
                .captures(output)
                .and_then(|caps| caps[1].parse().ok())
        })
}

/// Lower-cases `tag` and replaces anything outside `[a-z0-9._-]` with `_`.
pub fn sanitize_tag(tag: &str) -> String {
    tag.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheKey {
    /// Already sanitized.
    pub runtime_tag: String,
    pub target_sdk: u32,
    pub binary_hash: String,
    pub version_hash: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "framework_{}_sdk{}_{}_{}",
            self.runtime_tag, self.target_sdk, self.binary_hash, self.version_hash
        )
    }
}

pub struct FrameworkCacheResolver<'a> {
    runner: &'a dyn CommandRunner,
    log: Option<&'a dyn ProbeLog>,
}

impl<'a> FrameworkCacheResolver<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner, log: None }
    }

    pub fn with_log(mut self, log: &'a dyn ProbeLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Creates (if needed) and returns the absolute cache directory for this
    /// archive/toolchain pair. Only directory creation can fail.
    pub fn resolve(
        &self,
        base_dir: &Path,
        runtime_tag: &str,
        archive: &Path,
        toolchain: &Path,
    ) -> io::Result<PathBuf> {
        let key = self.cache_key(runtime_tag, archive, toolchain);
        let resolved = std::path::absolute(base_dir.join(key.to_string()))?;
        fs::create_dir_all(&resolved)?;
        logging::info(self.log, &format!("Framework cache key: {}", key));
        Ok(resolved)
    }

    pub fn cache_key(&self, runtime_tag: &str, archive: &Path, toolchain: &Path) -> CacheKey {
        CacheKey {
            runtime_tag: sanitize_tag(runtime_tag),
            target_sdk: self.target_sdk(archive, toolchain).unwrap_or(0),
            binary_hash: self.binary_hash(toolchain),
            version_hash: self.version_hash(toolchain),
        }
    }

    /// The archive's declared target SDK: `dump badging` first, `dump xmltree` second.
    pub fn target_sdk(&self, archive: &Path, toolchain: &Path) -> Option<u32> {
        self.dump(toolchain, dump_badging(archive))
            .and_then(|output| parse_badging_target_sdk(&output))
            .or_else(|| {
                self.dump(toolchain, dump_manifest_xmltree(archive))
                    .and_then(|output| parse_xmltree_target_sdk(&output))
            })
    }

    fn binary_hash(&self, toolchain: &Path) -> String {
        match sha256_file(toolchain) {
            Ok(hex) => hex[..HASH_PART_LEN].to_string(),
            Err(e) => {
                log::debug!("Cannot hash {}: {}", toolchain.display(), e);
                NO_HASH.to_string()
            }
        }
    }

    fn version_hash(&self, toolchain: &Path) -> String {
        let output = self.runner.run(toolchain, &version(), VERSION_TIMEOUT);
        match output.into_text().map(|text| text.trim().to_string()) {
            Some(text) if !text.is_empty() => {
                sha256_hex(text.as_bytes())[..VERSION_PART_LEN].to_string()
            }
            _ => NO_VERSION.to_string(),
        }
    }

    fn dump(&self, toolchain: &Path, args: Vec<String>) -> Option<String> {
        match self.runner.run(toolchain, &args, DUMP_TIMEOUT) {
            ProbeOutput::Completed(output) => Some(output),
            ProbeOutput::TimedOut => {
                logging::warn(
                    self.log,
                    &format!(
                        "Framework cache probe timed out for command: {}",
                        args.join(" ")
                    ),
                );
                None
            }
            ProbeOutput::Failed { code, .. } => {
                logging::warn(
                    self.log,
                    &format!(
                        "Framework cache probe failed: `{}` exited with {:?}",
                        args.join(" "),
                        code
                    ),
                );
                None
            }
            ProbeOutput::LaunchFailed(reason) => {
                logging::warn(self.log, &format!("Framework cache probe failed: {}", reason));
                None
            }
        }
    }
}
