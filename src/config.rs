use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::intro;
use crate::sequence::DelayRange;

const DEFAULT_ENV_PREFIX: &str = "MARTISOR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub intro: IntroConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_tick_rate", with = "humantime_serde")]
    pub tick_rate: Duration,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            tick_rate: default_tick_rate(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

fn default_tick_rate() -> Duration {
    Duration::from_millis(120)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetsConfig {
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            workers: default_workers(),
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_workers() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntroConfig {
    #[serde(default = "default_initial_beat", with = "humantime_serde")]
    pub initial_beat: Duration,
    #[serde(default = "default_row_delay")]
    pub row_delay: DelayRange,
    #[serde(default = "default_highlight_pause", with = "humantime_serde")]
    pub highlight_pause: Duration,
    #[serde(default = "default_open_pause", with = "humantime_serde")]
    pub open_pause: Duration,
}

impl Default for IntroConfig {
    fn default() -> Self {
        Self {
            initial_beat: default_initial_beat(),
            row_delay: default_row_delay(),
            highlight_pause: default_highlight_pause(),
            open_pause: default_open_pause(),
        }
    }
}

impl IntroConfig {
    pub fn timing(&self) -> intro::Timing {
        intro::Timing {
            initial_beat: self.initial_beat,
            row_delay: self.row_delay,
            highlight_pause: self.highlight_pause,
            open_pause: self.open_pause,
        }
    }
}

fn default_initial_beat() -> Duration {
    Duration::from_millis(900)
}

fn default_row_delay() -> DelayRange {
    DelayRange::from_millis(900, 1700)
}

fn default_highlight_pause() -> Duration {
    Duration::from_millis(600)
}

fn default_open_pause() -> Duration {
    Duration::from_millis(700)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// Multiplier applied to every scripted delay. 1.0 plays at the
    /// authored pace; 0 renders each step on the next tick.
    #[serde(default = "default_speed")]
    pub speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
        }
    }
}

fn default_speed() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }
    base.ui.tick_rate = other.ui.tick_rate;

    if !other.assets.roots.is_empty() {
        base.assets.roots = other.assets.roots;
    }
    if other.assets.workers != 0 {
        base.assets.workers = other.assets.workers;
    }

    base.intro = other.intro;
    base.playback = other.playback;

    base
}

/// Environment overrides apply on top of whatever the file set, one key
/// at a time. `MARTISOR_UI__THEME` maps to `ui.theme`.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "ui.theme" => cfg.ui.theme = value,
        "ui.tick_rate" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.tick_rate = duration;
            }
        }
        "assets.roots" => {
            cfg.assets.roots = value
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        "assets.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.assets.workers = parsed;
            }
        }
        "intro.initial_beat" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.intro.initial_beat = duration;
            }
        }
        "intro.highlight_pause" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.intro.highlight_pause = duration;
            }
        }
        "intro.open_pause" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.intro.open_pause = duration;
            }
        }
        "intro.row_delay_min" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.intro.row_delay.min = duration;
            }
        }
        "intro.row_delay_max" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.intro.row_delay.max = duration;
            }
        }
        "playback.speed" => {
            if let Ok(parsed) = value.parse::<f64>() {
                if parsed.is_finite() && parsed >= 0.0 {
                    cfg.playback.speed = parsed;
                }
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("martisor-tui").join("config.yaml"))
}
