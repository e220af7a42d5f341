//! Choosing between the primary and fallback `aapt2` binaries.
//!
//! The primary toolchain is preferred. The fallback is picked only when the
//! archive shows something the primary cannot compile: grammatical-gender
//! resource qualifiers or newer manifest intent-filter attributes. Cheap static
//! scans run first, live `dump` probes against the fallback binary after them.

use super::signal::{self, SignalOutcome};
use super::{dump_badging, dump_configurations, dump_manifest_xmltree};
use crate::core::archive::ArchiveReader;
use crate::core::logging::{self, ProbeLog};
use crate::core::process::{CommandRunner, ProbeOutput, DUMP_TIMEOUT};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Unlike the cache key's badging read, this match ignores case.
fn badging_target_sdk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)targetSdkVersion:'(\d+)'").unwrap())
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SelectorOptions {
    /// Skip every signal and use the primary binary.
    pub prefer_primary: bool,
    /// Archives declaring at least this target SDK go straight to the fallback.
    pub modern_target_sdk: Option<u32>,
}

/// The evidence that sent an archive to the fallback toolchain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Trigger {
    TargetSdk(u32),
    GenderedQualifiers,
    ManifestFeatures,
    QualifierProbe,
    ManifestProbe,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::TargetSdk(sdk) => write!(f, "targetSdk {}", sdk),
            Trigger::GenderedQualifiers => write!(f, "gendered resource qualifiers"),
            Trigger::ManifestFeatures => write!(f, "API 35 manifest features"),
            Trigger::QualifierProbe => write!(f, "qualifier probe"),
            Trigger::ManifestProbe => write!(f, "manifest probe"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrimaryReason {
    /// No distinct fallback was configured.
    NoFallback,
    /// [`SelectorOptions::prefer_primary`] was set.
    Forced,
    /// Every signal came back negative.
    NoSignal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Primary(PrimaryReason),
    Fallback(Trigger),
}

pub struct ToolchainSelector<'a> {
    runner: &'a dyn CommandRunner,
    archives: &'a dyn ArchiveReader,
    log: Option<&'a dyn ProbeLog>,
    options: SelectorOptions,
}

impl<'a> ToolchainSelector<'a> {
    pub fn new(runner: &'a dyn CommandRunner, archives: &'a dyn ArchiveReader) -> Self {
        Self {
            runner,
            archives,
            log: None,
            options: SelectorOptions::default(),
        }
    }

    pub fn with_log(mut self, log: &'a dyn ProbeLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_options(mut self, options: SelectorOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns either `primary` or `fallback`; never fails.
    pub fn select(
        &self,
        primary: &str,
        fallback: Option<&str>,
        archive: &Path,
        auxiliary: &[PathBuf],
    ) -> String {
        match (self.decide(primary, fallback, archive, auxiliary), fallback) {
            (Decision::Fallback(_), Some(fallback)) => fallback.to_string(),
            _ => primary.to_string(),
        }
    }

    pub fn decide(
        &self,
        primary: &str,
        fallback: Option<&str>,
        archive: &Path,
        auxiliary: &[PathBuf],
    ) -> Decision {
        let fallback = match fallback {
            Some(fallback) if !fallback.trim().is_empty() && fallback != primary => {
                Path::new(fallback)
            }
            _ => return Decision::Primary(PrimaryReason::NoFallback),
        };
        if self.options.prefer_primary {
            logging::info(self.log, "AAPT2: primary binary forced by override");
            return Decision::Primary(PrimaryReason::Forced);
        }

        match self.find_trigger(fallback, archive, auxiliary) {
            Some(trigger) => {
                logging::info(
                    self.log,
                    &format!("AAPT2: using fallback binary due to {}", trigger),
                );
                Decision::Fallback(trigger)
            }
            None => Decision::Primary(PrimaryReason::NoSignal),
        }
    }

    fn find_trigger(
        &self,
        fallback: &Path,
        archive: &Path,
        auxiliary: &[PathBuf],
    ) -> Option<Trigger> {
        if let Some(threshold) = self.options.modern_target_sdk {
            if let Some(sdk) = self.probe_target_sdk(fallback, archive) {
                if sdk >= threshold {
                    return Some(Trigger::TargetSdk(sdk));
                }
            }
        }

        let archives = inspected_archives(archive, auxiliary);
        if signal::scan_gendered_qualifiers(self.archives, &archives).is_match() {
            return Some(Trigger::GenderedQualifiers);
        }
        if signal::scan_manifest_features(self.archives, &archives).is_match() {
            return Some(Trigger::ManifestFeatures);
        }
        let qualifiers = self.probe(
            fallback,
            dump_configurations(archive),
            "selector",
            signal::contains_gender_token,
        );
        if qualifiers.is_match() {
            return Some(Trigger::QualifierProbe);
        }
        let manifest = self.probe(
            fallback,
            dump_manifest_xmltree(archive),
            "manifest",
            signal::contains_manifest_token,
        );
        if manifest.is_match() {
            return Some(Trigger::ManifestProbe);
        }
        None
    }

    fn probe(
        &self,
        fallback: &Path,
        args: Vec<String>,
        name: &str,
        matches: fn(&str) -> bool,
    ) -> SignalOutcome {
        match self.runner.run(fallback, &args, DUMP_TIMEOUT) {
            ProbeOutput::Completed(output) => {
                if matches(&output) {
                    SignalOutcome::Match
                } else {
                    SignalOutcome::NoMatch
                }
            }
            failure => {
                self.report_failure(name, &failure);
                SignalOutcome::ProbeFailed
            }
        }
    }

    fn probe_target_sdk(&self, fallback: &Path, archive: &Path) -> Option<u32> {
        match self.runner.run(fallback, &dump_badging(archive), DUMP_TIMEOUT) {
            ProbeOutput::Completed(output) => badging_target_sdk()
                .captures(&output)
                .and_then(|caps| caps[1].parse().ok()),
            failure => {
                self.report_failure("targetSdk", &failure);
                None
            }
        }
    }

    fn report_failure(&self, name: &str, failure: &ProbeOutput) {
        let message = match failure {
            ProbeOutput::TimedOut => format!("AAPT2 {} probe timed out", name),
            ProbeOutput::Failed { code, .. } => {
                format!("AAPT2 {} probe failed: exit status {:?}", name, code)
            }
            ProbeOutput::LaunchFailed(reason) => format!("AAPT2 {} probe failed: {}", name, reason),
            ProbeOutput::Completed(_) => return,
        };
        logging::warn(self.log, &message);
    }
}

/// The primary archive, then every auxiliary archive that exists, without duplicates.
fn inspected_archives(archive: &Path, auxiliary: &[PathBuf]) -> Vec<PathBuf> {
    let mut archives = vec![archive.to_path_buf()];
    for candidate in auxiliary.iter().filter(|path| path.exists()) {
        if !archives.contains(candidate) {
            archives.push(candidate.clone());
        }
    }
    archives
}
