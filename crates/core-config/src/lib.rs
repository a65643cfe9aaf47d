//! Configuration loading and parsing.
//!
//! Parses `fontwatch.toml` (or an override path provided by the binary) and
//! extracts the `[observer]` table:
//!
//! ```toml
//! [observer]
//! timeout_ms = 3000
//! sample_text = "BESbswy"
//! native_poll_interval_ms = 25
//! measure_poll_interval_ms = 50
//! ```
//!
//! Every field is optional. Zero durations and an empty sample text are
//! replaced by the defaults in `Config::normalize`, which logs each
//! replacement. Unknown fields are ignored so the file can grow without
//! breaking older builds. A missing or unparsable file yields the defaults.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SAMPLE_TEXT: &str = "BESbswy";
pub const DEFAULT_NATIVE_POLL_INTERVAL_MS: u64 = 25;
pub const DEFAULT_MEASURE_POLL_INTERVAL_MS: u64 = 50;

pub const CONFIG_FILE_NAME: &str = "fontwatch.toml";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    #[serde(default = "ObserverConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "ObserverConfig::default_sample_text")]
    pub sample_text: String,
    #[serde(default = "ObserverConfig::default_native_poll_interval_ms")]
    pub native_poll_interval_ms: u64,
    #[serde(default = "ObserverConfig::default_measure_poll_interval_ms")]
    pub measure_poll_interval_ms: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            sample_text: Self::default_sample_text(),
            native_poll_interval_ms: Self::default_native_poll_interval_ms(),
            measure_poll_interval_ms: Self::default_measure_poll_interval_ms(),
        }
    }
}

impl ObserverConfig {
    const fn default_timeout_ms() -> u64 {
        DEFAULT_TIMEOUT_MS
    }
    fn default_sample_text() -> String {
        DEFAULT_SAMPLE_TEXT.to_owned()
    }
    const fn default_native_poll_interval_ms() -> u64 {
        DEFAULT_NATIVE_POLL_INTERVAL_MS
    }
    const fn default_measure_poll_interval_ms() -> u64 {
        DEFAULT_MEASURE_POLL_INTERVAL_MS
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn native_poll_interval(&self) -> Duration {
        Duration::from_millis(self.native_poll_interval_ms)
    }

    pub fn measure_poll_interval(&self) -> Duration {
        Duration::from_millis(self.measure_poll_interval_ms)
    }

    /// Replace unusable values with defaults. Returns the number replaced.
    pub fn normalize(&mut self) -> usize {
        let mut replaced = 0;
        for (field, value, default) in [
            ("timeout_ms", &mut self.timeout_ms, DEFAULT_TIMEOUT_MS),
            (
                "native_poll_interval_ms",
                &mut self.native_poll_interval_ms,
                DEFAULT_NATIVE_POLL_INTERVAL_MS,
            ),
            (
                "measure_poll_interval_ms",
                &mut self.measure_poll_interval_ms,
                DEFAULT_MEASURE_POLL_INTERVAL_MS,
            ),
        ] {
            if *value == 0 {
                info!(target: "config", field, default, "observer_value_defaulted");
                *value = default;
                replaced += 1;
            }
        }
        if self.sample_text.is_empty() {
            info!(target: "config", field = "sample_text", default = DEFAULT_SAMPLE_TEXT, "observer_value_defaulted");
            self.sample_text = Self::default_sample_text();
            replaced += 1;
        }
        replaced
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub observer: ObserverConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn observer(&self) -> &ObserverConfig {
        &self.file.observer
    }

    pub fn normalize(&mut self) -> usize {
        self.file.observer.normalize()
    }
}

/// Best-effort config path: working directory first, then the platform
/// config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("fontwatch").join(CONFIG_FILE_NAME);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            let mut config = Config {
                raw: Some(content),
                file,
                path: Some(path),
            };
            config.normalize();
            Ok(config)
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), body).unwrap();
        tmp
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.observer(), &ObserverConfig::default());
        assert_eq!(cfg.observer().timeout(), Duration::from_millis(3000));
        assert_eq!(cfg.observer().sample_text, "BESbswy");
        assert!(cfg.raw.is_none());
    }

    #[test]
    fn parses_observer_table() {
        let tmp = write_config(
            "[observer]\ntimeout_ms = 500\nsample_text = \"Hamburgefonstiv\"\nmeasure_poll_interval_ms = 20\n",
        );
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.observer().timeout_ms, 500);
        assert_eq!(cfg.observer().sample_text, "Hamburgefonstiv");
        assert_eq!(cfg.observer().measure_poll_interval(), Duration::from_millis(20));
        // Omitted field keeps its default.
        assert_eq!(cfg.observer().native_poll_interval_ms, 25);
        assert_eq!(cfg.path.as_deref(), Some(tmp.path()));
    }

    #[test]
    fn unknown_fields_ignored() {
        let tmp = write_config("[observer]\ntimeout_ms = 42\nfuture_knob = true\n[other]\nx = 1\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.observer().timeout_ms, 42);
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let tmp = write_config("[observer\ntimeout_ms = ");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.observer(), &ObserverConfig::default());
    }

    #[test]
    fn zero_values_are_defaulted_with_log() {
        let tmp = write_config("[observer]\ntimeout_ms = 0\nsample_text = \"\"\n");
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let cfg = with_default(subscriber, || load_from(Some(tmp.path().to_path_buf())).unwrap());

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("INFO config:"));
        assert!(log_output.contains("observer_value_defaulted"));
        assert_eq!(cfg.observer().timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(cfg.observer().sample_text, DEFAULT_SAMPLE_TEXT);
    }

    #[test]
    fn normalize_counts_replacements() {
        let mut observer = ObserverConfig {
            timeout_ms: 0,
            sample_text: String::new(),
            native_poll_interval_ms: 0,
            measure_poll_interval_ms: 10,
        };
        assert_eq!(observer.normalize(), 3);
        assert_eq!(observer.measure_poll_interval_ms, 10);
        assert_eq!(observer.normalize(), 0);
    }
}
