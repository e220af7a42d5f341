use log::LevelFilter;

/// Log target used for every message emitted on behalf of a caller-supplied sink.
pub const LOG_TARGET: &str = "aapt_toolchain";

#[cfg(debug_assertions)]
pub const MAX_LOG_LEVEL: LevelFilter = LevelFilter::Trace;
#[cfg(not(debug_assertions))]
pub const MAX_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// A leveled sink for the human-readable progress of a probe.
///
/// Components accept `Option<&dyn ProbeLog>`; passing `None` silences them.
pub trait ProbeLog {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Forwards probe messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl ProbeLog for LogFacade {
    fn info(&self, message: &str) {
        log::info!(target: LOG_TARGET, "{}", message);
    }

    fn warn(&self, message: &str) {
        log::warn!(target: LOG_TARGET, "{}", message);
    }
}

pub(crate) fn info(sink: Option<&dyn ProbeLog>, message: &str) {
    if let Some(sink) = sink {
        sink.info(message);
    }
}

pub(crate) fn warn(sink: Option<&dyn ProbeLog>, message: &str) {
    if let Some(sink) = sink {
        sink.warn(message);
    }
}

/// Initializes the Android logger with a specific tag.
#[cfg(target_os = "android")]
pub fn init_logger(tag: &str) {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(MAX_LOG_LEVEL)
            .with_tag(tag),
    );
}

/// Initializes a stderr subscriber honoring `RUST_LOG`, defaulting to `info`.
#[cfg(not(target_os = "android"))]
pub fn init_logger(_tag: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (e.g. from tests) finds a subscriber already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
pub(crate) mod recording {
    use super::ProbeLog;
    use std::sync::Mutex;

    /// Keeps every message so tests can assert on what was reported.
    #[derive(Default)]
    pub struct RecordingLog {
        pub infos: Mutex<Vec<String>>,
        pub warnings: Mutex<Vec<String>>,
    }

    impl RecordingLog {
        pub fn infos(&self) -> Vec<String> {
            self.infos.lock().unwrap().clone()
        }

        pub fn warnings(&self) -> Vec<String> {
            self.warnings.lock().unwrap().clone()
        }
    }

    impl ProbeLog for RecordingLog {
        fn info(&self, message: &str) {
            self.infos.lock().unwrap().push(message.to_string());
        }

        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
    }
}
