//! Loads the plugin's settings from the JSON file next to the DLL.

use std::path::Path;

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::resources;

#[cfg_attr(not(all(windows, target_arch = "x86")), allow(dead_code))]
static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// How much goes into the log file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warn
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: LogLevel,

    /// Check after the city has loaded that nothing has undone the patch.
    pub verify_after_city_init: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: LogLevel::default(),
            verify_after_city_init: true,
        }
    }
}

impl Settings {
    fn load_path(path: &Path) -> eyre::Result<Settings> {
        Ok(serde_json::from_reader(std::io::BufReader::new(
            std::fs::File::open(path)?,
        ))?)
    }

    /// Loads the settings file, falling back to the defaults if it can't be read. The error is
    /// handed back so it can be logged once logging is up, since logging itself depends on the
    /// settings.
    pub fn load_or_default(path: &Path) -> (Settings, Option<eyre::Report>) {
        match Self::load_path(path) {
            Ok(settings) => (settings, None),

            // A missing file just means the user hasn't customised anything.
            Err(err)
                if err
                    .downcast_ref::<std::io::Error>()
                    .map_or(false, |err| err.kind() == std::io::ErrorKind::NotFound) =>
            {
                (Settings::default(), None)
            }

            Err(err) => (
                Settings::default(),
                Some(err.wrap_err(format!("failed to load settings from {}", path.display()))),
            ),
        }
    }

    /// Loads the shared settings if they haven't been loaded yet.
    #[cfg_attr(not(all(windows, target_arch = "x86")), allow(dead_code))]
    pub fn load_shared() -> (&'static Settings, Option<eyre::Report>) {
        let mut error = None;

        let settings = SETTINGS.get_or_init(|| {
            let (settings, err) = match resources::get_settings_path() {
                Ok(path) => Self::load_or_default(&path),
                Err(err) => (Settings::default(), Some(err)),
            };

            error = err;
            settings
        });

        (settings, error)
    }
}
