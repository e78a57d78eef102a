//! Profile configuration.
//!
//! Profiles live in `~/.config/runlog/runlog.toml`. A missing file yields
//! the built-in default profile; rules are frozen into a [`KeywordSet`]
//! when the session starts and config edits only take effect on the next
//! run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::keywords::{KeywordRule, KeywordSet, parse_color};

/// Capacity of the channels between reader tasks and the event loop
pub const DEFAULT_CHANNEL_BUFFER: usize = 1024;
/// Default cap on retained history lines
pub const DEFAULT_MAX_LINES: usize = 10_000;
/// Default height of the output viewport, in rows
pub const DEFAULT_PANEL_HEIGHT: u16 = 20;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Name of the profile used when none is given on the command line
    pub current: String,
    pub settings: Settings,
    pub profiles: BTreeMap<String, Profile>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub panel_height: u16,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub timestamp: bool,
    pub silent: bool,
    pub log_dir: String,
    pub description: String,
    pub keywords: BTreeMap<String, KeywordEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KeywordEntry {
    pub color: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides the keyword name as the matched text
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub regex: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            panel_height: DEFAULT_PANEL_HEIGHT,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        let mut keywords = BTreeMap::new();
        for (name, color) in [("error", "red"), ("warning", "yellow"), ("fail", "red")] {
            keywords.insert(
                name.to_string(),
                KeywordEntry {
                    color: color.to_string(),
                    enabled: true,
                    pattern: None,
                    regex: false,
                },
            );
        }
        Self {
            timestamp: true,
            silent: false,
            log_dir: "~/logs".to_string(),
            description: String::new(),
            keywords,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("default".to_string(), Profile::default());
        Self {
            current: "default".to_string(),
            settings: Settings::default(),
            profiles,
        }
    }
}

impl ConfigFile {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("runlog").join("runlog.toml"))
    }

    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut file: ConfigFile =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        file.profiles
            .entry("default".to_string())
            .or_insert_with(Profile::default);
        Ok(file)
    }
}

/// Frozen per-session configuration handed to every component
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub profile: String,
    pub description: String,
    pub timestamp: bool,
    pub silent: bool,
    pub log_dir: PathBuf,
    pub panel_height: u16,
    pub max_lines: usize,
    pub keywords: KeywordSet,
}

impl SessionConfig {
    /// Resolve a profile by name (or the file's `current`) into a frozen
    /// session configuration.
    pub fn resolve(file: &ConfigFile, profile: Option<&str>) -> Result<Self> {
        let name = profile.unwrap_or(&file.current);
        let profile = file
            .profiles
            .get(name)
            .with_context(|| format!("unknown profile '{name}'"))?;

        let rules: Vec<KeywordRule> = profile
            .keywords
            .iter()
            .map(|(kw, entry)| {
                let color = parse_color(&entry.color);
                match &entry.pattern {
                    None if !entry.regex => KeywordRule::substring(kw, color, entry.enabled),
                    pattern => KeywordRule::pattern(
                        kw,
                        pattern.as_deref().unwrap_or(kw),
                        entry.regex,
                        color,
                        entry.enabled,
                    ),
                }
            })
            .collect();

        let max_lines = std::env::var("RUNLOG_MAX_LINES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_LINES);

        Ok(Self {
            profile: name.to_string(),
            description: profile.description.clone(),
            timestamp: profile.timestamp,
            silent: profile.silent,
            log_dir: expand_tilde(&profile.log_dir),
            panel_height: file.settings.panel_height.max(1),
            max_lines,
            keywords: KeywordSet::new(rules),
        })
    }
}

/// Expand a leading `~` to the user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~')
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest.trim_start_matches('/'));
    }
    PathBuf::from(path)
}
