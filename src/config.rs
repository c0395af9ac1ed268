use crate::core::space::{DEFAULT_MAX_ASPECT, Playfield};
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

pub const CONFIG_PATH: &str = "judgeline.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.load_str(&content);
        Ok(())
    }

    pub fn load_str(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section = String::new();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // [Section]
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current_section = name.trim().to_string();
                self.sections.entry(current_section.clone()).or_default();
                continue;
            }

            // key=value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                self.sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section).and_then(|s| s.get(key)).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub log_level: LogLevel,
    pub display_width: u32,
    pub display_height: u32,
    /// Wider screens are pillarboxed to this aspect ratio.
    pub max_aspect: f32,
    pub unique_speed: bool,
    /// Keep dummy notes when loading charts.
    pub dummy_notes: bool,
    /// Simulation step of the host binary, in milliseconds.
    pub frame_step_ms: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            display_width: 1920,
            display_height: 1080,
            max_aspect: DEFAULT_MAX_ASPECT,
            unique_speed: false,
            dummy_notes: true,
            frame_step_ms: 1000.0 / 60.0,
        }
    }
}

// Accepts 0/1 as well as true/false, yes/no, on/off.
fn parse_flag(v: &str) -> Option<bool> {
    let v = v.trim();
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("on") {
        Some(true)
    } else if v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no") || v.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        v.parse::<u8>().ok().map(|n| n != 0)
    }
}

/// Smallest simulation step the host binary accepts.
pub const MIN_FRAME_STEP_MS: f32 = 0.1;

/// A key that was missing or could not be used, and the default kept instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub section: &'static str,
    pub key: &'static str,
    /// `None` when the key was absent.
    pub value: Option<String>,
}

// Looks up one key, recording why the default was kept if it was.
fn read<T>(
    conf: &SimpleIni,
    issues: &mut Vec<ConfigIssue>,
    section: &'static str,
    key: &'static str,
    default: T,
    parse: impl FnOnce(&str) -> Option<T>,
) -> T {
    let raw = conf.get(section, key);
    match raw.and_then(parse) {
        Some(v) => v,
        None => {
            issues.push(ConfigIssue { section, key, value: raw.map(str::to_string) });
            default
        }
    }
}

impl EngineConfig {
    /// Reads known keys, keeping defaults for anything missing or invalid
    /// and logging a warning for each.
    pub fn from_ini(conf: &SimpleIni) -> Self {
        let (cfg, issues) = Self::from_ini_with_issues(conf);
        for issue in &issues {
            match &issue.value {
                Some(v) => warn!("Invalid value '{v}' for [{}] {}; using the default.", issue.section, issue.key),
                None => warn!("[{}] {} not set; using the default.", issue.section, issue.key),
            }
        }
        cfg
    }

    pub fn from_ini_with_issues(conf: &SimpleIni) -> (Self, Vec<ConfigIssue>) {
        let default = Self::default();
        let positive = |v: f32| v.is_finite() && v > 0.0;
        let mut issues = Vec::new();
        let i = &mut issues;

        let cfg = Self {
            log_level: read(conf, i, "Options", "LogLevel", default.log_level, |v| {
                LogLevel::from_str(v).ok()
            }),
            display_width: read(conf, i, "Display", "Width", default.display_width, |v| {
                v.parse::<u32>().ok().filter(|&w| w > 0)
            }),
            display_height: read(conf, i, "Display", "Height", default.display_height, |v| {
                v.parse::<u32>().ok().filter(|&h| h > 0)
            }),
            max_aspect: read(conf, i, "Display", "MaxAspect", default.max_aspect, |v| {
                parse_ratio(v).filter(|&a| positive(a))
            }),
            unique_speed: read(conf, i, "Playback", "UniqueSpeed", default.unique_speed, parse_flag),
            dummy_notes: read(conf, i, "Playback", "DummyNotes", default.dummy_notes, parse_flag),
            frame_step_ms: read(conf, i, "Playback", "FrameStepMs", default.frame_step_ms, |v| {
                v.parse::<f32>().ok().filter(|&s| s.is_finite() && s >= MIN_FRAME_STEP_MS)
            }),
        };
        (cfg, issues)
    }

    pub fn playfield(&self) -> Playfield {
        let mut playfield =
            Playfield::with_max_aspect(self.display_width as f32, self.display_height as f32, self.max_aspect);
        playfield.unique_speed = self.unique_speed;
        playfield
    }
}

// "16:9", "16/9" or a plain number.
fn parse_ratio(v: &str) -> Option<f32> {
    match v.split_once([':', '/']) {
        Some((w, h)) => {
            let w = w.trim().parse::<f32>().ok()?;
            let h = h.trim().parse::<f32>().ok()?;
            (h != 0.0).then(|| w / h)
        }
        None => v.trim().parse::<f32>().ok(),
    }
}

static CONFIG: std::sync::LazyLock<Mutex<EngineConfig>> =
    std::sync::LazyLock::new(|| Mutex::new(EngineConfig::default()));

/// Loads `path` into the global config. A missing or unreadable file keeps
/// the defaults.
pub fn load<P: AsRef<Path>>(path: P) {
    let path = path.as_ref();
    let mut conf = SimpleIni::new();
    let cfg = match conf.load(path) {
        Ok(()) => {
            info!("Loaded configuration from '{}'.", path.display());
            EngineConfig::from_ini(&conf)
        }
        Err(e) => {
            warn!("Could not read '{}' ({e}); using default settings.", path.display());
            EngineConfig::default()
        }
    };
    *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = cfg;
}

pub fn get() -> EngineConfig {
    *CONFIG.lock().unwrap_or_else(PoisonError::into_inner)
}
