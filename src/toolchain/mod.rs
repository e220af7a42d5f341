//! Picking, validating and keying the native `aapt2` toolchain.

pub mod elf;
pub mod framework;
pub mod locator;
pub mod selector;
pub mod signal;

use std::path::Path;

pub use framework::{CacheKey, FrameworkCacheResolver};
pub use locator::ToolchainLocator;
pub use selector::{Decision, SelectorOptions, ToolchainSelector, Trigger};
pub use signal::SignalOutcome;

pub const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

/// `aapt2 dump configurations <archive>`
pub fn dump_configurations(archive: &Path) -> Vec<String> {
    vec![
        "dump".to_string(),
        "configurations".to_string(),
        archive.display().to_string(),
    ]
}

/// `aapt2 dump xmltree <archive> AndroidManifest.xml`
pub fn dump_manifest_xmltree(archive: &Path) -> Vec<String> {
    vec![
        "dump".to_string(),
        "xmltree".to_string(),
        archive.display().to_string(),
        MANIFEST_ENTRY.to_string(),
    ]
}

/// `aapt2 dump badging <archive>`
pub fn dump_badging(archive: &Path) -> Vec<String> {
    vec![
        "dump".to_string(),
        "badging".to_string(),
        archive.display().to_string(),
    ]
}

pub fn version() -> Vec<String> {
    vec!["version".to_string()]
}
