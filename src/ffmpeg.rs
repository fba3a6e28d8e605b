//! FFmpeg initialisation and console verbosity.
//!
//! FFmpeg writes to stderr through its own logger, separate from the
//! [`log`](https://crates.io/crates/log) facade `clipcast` reports through.
//! A long export can make FFmpeg emit one notice per frame, so the level is
//! exposed here.
//!
//! # Example
//!
//! ```no_run
//! use clipcast::FfmpegLogLevel;
//!
//! let level: FfmpegLogLevel = "error".parse().unwrap();
//! clipcast::set_ffmpeg_log_level(level);
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;

use crate::error::ClipError;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// How much FFmpeg itself prints while decoding and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FfmpegLogLevel {
    /// Nothing.
    Quiet,
    /// Errors only.
    Error,
    /// Errors and warnings. FFmpeg's own default.
    Warning,
    /// Stream and codec summaries.
    Info,
    /// Everything FFmpeg has to say.
    Debug,
}

impl FfmpegLogLevel {
    const NAMES: [(&'static str, FfmpegLogLevel); 5] = [
        ("quiet", FfmpegLogLevel::Quiet),
        ("error", FfmpegLogLevel::Error),
        ("warning", FfmpegLogLevel::Warning),
        ("info", FfmpegLogLevel::Info),
        ("debug", FfmpegLogLevel::Debug),
    ];

    fn as_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }

    /// Nearest variant for a raw FFmpeg level. Levels this enum does not
    /// name fold into their neighbour.
    fn from_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic | Level::Fatal | Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info | Level::Verbose => FfmpegLogLevel::Info,
            Level::Debug | Level::Trace => FfmpegLogLevel::Debug,
        }
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::NAMES
            .iter()
            .find(|(_, level)| level == self)
            .map_or("warning", |(name, _)| name);
        f.write_str(name)
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    /// Case-insensitive; `warn` is accepted for `warning`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        let lowered = if lowered == "warn" { "warning".to_string() } else { lowered };
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, level)| *level)
            .ok_or_else(|| format!("unknown FFmpeg log level `{value}`"))
    }
}

/// Initialise FFmpeg once per process and cache the outcome.
pub(crate) fn initialize() -> Result<(), ClipError> {
    INIT.get_or_init(|| {
        log::debug!("Initialising FFmpeg");
        ffmpeg_next::init().map_err(|error| error.to_string())
    })
    .clone()
    .map_err(|reason| ClipError::CannotCreateReader(format!("FFmpeg init failed: {reason}")))
}

/// Set FFmpeg's console verbosity. `clipcast`'s own `log` output is
/// unaffected.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    log::debug!("FFmpeg log level set to {level}");
    ffmpeg_next::util::log::set_level(level.as_level());
}

/// FFmpeg's current console verbosity, if it maps to a known level.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_level)
}

#[cfg(test)]
mod tests {
    use super::FfmpegLogLevel;

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("warn".parse(), Ok(FfmpegLogLevel::Warning));
        assert_eq!("WARNING".parse(), Ok(FfmpegLogLevel::Warning));
        assert_eq!(" quiet ".parse(), Ok(FfmpegLogLevel::Quiet));
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for (name, level) in FfmpegLogLevel::NAMES {
            assert_eq!(level.to_string(), name);
            assert_eq!(name.parse(), Ok(level));
        }
    }

    #[test]
    fn levels_are_ordered_by_verbosity() {
        assert!(FfmpegLogLevel::Quiet < FfmpegLogLevel::Error);
        assert!(FfmpegLogLevel::Info < FfmpegLogLevel::Debug);
    }
}
