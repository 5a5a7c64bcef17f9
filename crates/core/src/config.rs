use crate::spectrum::{validate_fft_size, SpectrumError, DEFAULT_SMOOTHING};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.1;
pub const DEFAULT_SIGNIFICANT_PAUSE_MS: u64 = 1000;
pub const DEFAULT_FRAME_RATE_HZ: u32 = 60;
pub const MAX_FRAME_RATE_HZ: u32 = 1000;
pub const ENV_FRAME_RATE_HZ: &str = "TONE_FRAME_RATE_HZ";
pub const ENV_PAUSE_COUNTING: &str = "TONE_PAUSE_COUNTING";
pub const ENV_SILENCE_THRESHOLD: &str = "TONE_SILENCE_THRESHOLD";
pub const ENV_SMOOTHING: &str = "TONE_SMOOTHING";
pub const ENV_INPUT_DEVICE: &str = "TONE_INPUT_DEVICE";

/// How a long silence is turned into significant-pause counts.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PauseCounting {
    /// Every sub-threshold frame past the pause mark counts again and accrues
    /// the whole silent stretch so far.
    EveryFrame,
    /// A contiguous silence counts once; each silent interval accrues once.
    #[default]
    OncePerEpisode,
}

impl PauseCounting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EveryFrame => "every-frame",
            Self::OncePerEpisode => "once-per-episode",
        }
    }
}

impl fmt::Display for PauseCounting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PauseCounting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every-frame" | "every_frame" => Ok(Self::EveryFrame),
            "once-per-episode" | "once_per_episode" | "once" => Ok(Self::OncePerEpisode),
            other => Err(ConfigError::InvalidPauseCounting(other.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameRate {
    pub hz: u32,
}

impl FrameRate {
    pub fn new(hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        if hz > MAX_FRAME_RATE_HZ {
            return Err(ConfigError::FrameRateTooHigh(hz));
        }
        Ok(Self { hz })
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.hz.max(1)
    }

    pub fn samples_per_frame(&self, sample_rate_hz: u32) -> usize {
        let hop = sample_rate_hz / self.hz.max(1);
        usize::try_from(hop.max(1)).unwrap_or(1)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self {
            hz: DEFAULT_FRAME_RATE_HZ,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    /// Analyser time constant: weight of the previous frame's magnitudes.
    pub smoothing: f32,
    pub history_capacity: usize,
    pub silence_threshold: f32,
    pub significant_pause: Duration,
    pub frame_rate: FrameRate,
    pub pause_counting: PauseCounting,
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_fft_size(self.fft_size)?;
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::SmoothingOutOfRange(self.smoothing));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistory);
        }
        if !(0.0..1.0).contains(&self.silence_threshold) {
            return Err(ConfigError::SilenceThresholdOutOfRange(
                self.silence_threshold,
            ));
        }
        FrameRate::new(self.frame_rate.hz)?;
        Ok(())
    }

    pub fn with_pause_counting(mut self, pause_counting: PauseCounting) -> Self {
        self.pause_counting = pause_counting;
        self
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            significant_pause: Duration::from_millis(DEFAULT_SIGNIFICANT_PAUSE_MS),
            frame_rate: FrameRate::default(),
            pause_counting: PauseCounting::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub analyzer: AnalyzerConfig,
    pub input_device: Option<String>,
}

/// Command-line values; `None` falls through to the environment, then defaults.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub frame_rate_hz: Option<u32>,
    pub pause_counting: Option<String>,
    pub silence_threshold: Option<f32>,
    pub smoothing: Option<f32>,
    pub input_device: Option<String>,
}

impl AppConfig {
    pub fn resolve(overrides: ConfigOverrides, env: &impl Env) -> Result<Self, ConfigError> {
        let defaults = AnalyzerConfig::default();

        let frame_rate_hz = resolve_parsed(overrides.frame_rate_hz, ENV_FRAME_RATE_HZ, env)?
            .unwrap_or(defaults.frame_rate.hz);
        let pause_counting = match resolve_optional_string(
            overrides.pause_counting,
            ENV_PAUSE_COUNTING,
            env,
        ) {
            Some(v) => v.parse()?,
            None => defaults.pause_counting,
        };
        let silence_threshold =
            resolve_parsed(overrides.silence_threshold, ENV_SILENCE_THRESHOLD, env)?
                .unwrap_or(defaults.silence_threshold);
        let smoothing = resolve_parsed(overrides.smoothing, ENV_SMOOTHING, env)?
            .unwrap_or(defaults.smoothing);

        let analyzer = AnalyzerConfig {
            frame_rate: FrameRate::new(frame_rate_hz)?,
            pause_counting,
            silence_threshold,
            smoothing,
            ..defaults
        };
        analyzer.validate()?;

        Ok(Self {
            analyzer,
            input_device: resolve_optional_string(overrides.input_device, ENV_INPUT_DEVICE, env),
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    FftSize(#[from] SpectrumError),
    #[error("smoothing must be in [0, 1), got {0}")]
    SmoothingOutOfRange(f32),
    #[error("history capacity must be > 0")]
    ZeroHistory,
    #[error("silence threshold must be in [0, 1), got {0}")]
    SilenceThresholdOutOfRange(f32),
    #[error("frame rate must be > 0 Hz")]
    ZeroFrameRate,
    #[error("frame rate must be <= 1000 Hz, got {0}")]
    FrameRateTooHigh(u32),
    #[error("unknown pause counting mode: {0:?} (expected every-frame or once-per-episode)")]
    InvalidPauseCounting(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_parsed<T: FromStr>(
    cli_value: Option<T>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<T>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(v)),
        None => match env.var(env_key) {
            Some(raw) => match raw.trim().parse() {
                Ok(v) => Ok(Some(v)),
                Err(_) => Err(ConfigError::InvalidValue {
                    key: env_key.to_owned(),
                    value: raw,
                }),
            },
            None => Ok(None),
        },
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}
