//! The individual heuristics behind toolchain selection.
//!
//! Each signal is a pure function over an archive or over toolchain output. A
//! signal that could not be evaluated reports [`SignalOutcome::ProbeFailed`];
//! the decision policy treats that exactly like a miss.

use crate::core::archive::ArchiveReader;
use std::path::{Path, PathBuf};

/// Folder suffixes marking grammatical-gender resource variants.
pub const GENDER_QUALIFIERS: [&str; 3] = ["-feminine", "-masculine", "-neuter"];

/// Looser tokens looked for in `dump configurations` output.
pub const GENDER_TOKENS: [&str; 5] = [
    "feminine",
    "masculine",
    "neuter",
    "grammaticalgender",
    "grammatical-gender",
];

/// Manifest attributes and elements older toolchains cannot compile.
pub const MANIFEST_TOKENS: [&str; 11] = [
    "uri-relative-filter-group",
    "android:allow",
    "intentMatchingFlags",
    "queryadvancedpattern",
    "querypattern",
    "queryprefix",
    "querysuffix",
    "fragmentadvancedpattern",
    "fragmentpattern",
    "fragmentprefix",
    "fragmentsuffix",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalOutcome {
    Match,
    NoMatch,
    /// The input could not be read or the probe did not complete.
    ProbeFailed,
}

impl SignalOutcome {
    pub fn is_match(self) -> bool {
        self == SignalOutcome::Match
    }

    /// A match anywhere wins; otherwise a clean miss beats a failure.
    fn or(self, other: SignalOutcome) -> SignalOutcome {
        match (self, other) {
            (SignalOutcome::Match, _) | (_, SignalOutcome::Match) => SignalOutcome::Match,
            (SignalOutcome::NoMatch, _) | (_, SignalOutcome::NoMatch) => SignalOutcome::NoMatch,
            _ => SignalOutcome::ProbeFailed,
        }
    }

    fn from_bool(found: bool) -> SignalOutcome {
        if found {
            SignalOutcome::Match
        } else {
            SignalOutcome::NoMatch
        }
    }
}

/// Lower-cases and keeps only `[a-z0-9]`.
///
/// Binary manifests store strings as UTF-16, so a Latin-1 view interleaves NULs
/// between the letters; dropping everything but alphanumerics lines both views up.
pub fn normalize_for_token_scan(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Decodes one byte per character.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub fn contains_manifest_token(text: &str) -> bool {
    let normalized = normalize_for_token_scan(text);
    MANIFEST_TOKENS
        .iter()
        .map(|token| normalize_for_token_scan(token))
        .any(|token| normalized.contains(&token))
}

pub fn contains_gender_token(text: &str) -> bool {
    let lower = text.to_lowercase();
    GENDER_TOKENS.iter().any(|token| lower.contains(token))
}

/// Whether `entry` lives in a `res/values-*` folder carrying a gender qualifier.
pub fn is_gendered_values_entry(entry: &str) -> bool {
    let Some(rest) = entry.strip_prefix("res/") else {
        return false;
    };
    let folder = rest.split('/').next().unwrap_or_default();
    if !folder.starts_with("values-") {
        return false;
    }
    let lower = folder.to_lowercase();
    GENDER_QUALIFIERS
        .iter()
        .any(|qualifier| lower.contains(qualifier))
}

/// Signal 1: a gendered `values-*` folder in any archive.
pub fn scan_gendered_qualifiers(reader: &dyn ArchiveReader, archives: &[PathBuf]) -> SignalOutcome {
    scan_archives(archives, |archive| {
        let names = reader.entry_names(archive).map_err(|e| {
            log::debug!("Cannot list {}: {}", archive.display(), e);
        })?;
        Ok(names.iter().any(|name| is_gendered_values_entry(name)))
    })
}

/// Signal 2: a manifest token in any `*AndroidManifest.xml` entry.
pub fn scan_manifest_features(reader: &dyn ArchiveReader, archives: &[PathBuf]) -> SignalOutcome {
    scan_archives(archives, |archive| {
        let names = reader.entry_names(archive).map_err(|e| {
            log::debug!("Cannot list {}: {}", archive.display(), e);
        })?;
        for name in names
            .iter()
            .filter(|name| name.ends_with(super::MANIFEST_ENTRY))
        {
            let bytes = reader.read_entry(archive, name).map_err(|e| {
                log::debug!("Cannot read {} from {}: {}", name, archive.display(), e);
            })?;
            if contains_manifest_token(&latin1(&bytes)) {
                return Ok(true);
            }
        }
        Ok(false)
    })
}

fn scan_archives(
    archives: &[PathBuf],
    mut scan: impl FnMut(&Path) -> Result<bool, ()>,
) -> SignalOutcome {
    let mut outcome = SignalOutcome::ProbeFailed;
    for archive in archives {
        let result = match scan(archive) {
            Ok(found) => SignalOutcome::from_bool(found),
            Err(()) => SignalOutcome::ProbeFailed,
        };
        outcome = outcome.or(result);
        if outcome.is_match() {
            break;
        }
    }
    outcome
}
