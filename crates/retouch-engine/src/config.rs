use image::Rgb;
use retouch_core::{ConfigError, FeatureMap, SmoothingParams, TintParams, WhitenParams};
use std::path::PathBuf;
use std::str::FromStr;

/// How enabled edits are combined into the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeMode {
    /// Each edit writes straight into the frame, one after another.
    InPlace,
    /// Each edit runs on its own copy; the copies are merged by mask over the source.
    Layered,
}

impl FromStr for ComposeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-place" | "inplace" => Ok(Self::InPlace),
            "layered" => Ok(Self::Layered),
            other => Err(format!("unknown compose mode '{other}'")),
        }
    }
}

/// Per-frame retouching configuration.
#[derive(Debug, Clone)]
pub struct RetouchConfig {
    /// Custom feature map TOML; the embedded face-mesh map when `None`.
    pub feature_map_path: Option<PathBuf>,
    pub smoothing_enabled: bool,
    pub smoothing: SmoothingParams,
    pub tint_enabled: bool,
    pub tint: TintParams,
    pub whitening_enabled: bool,
    pub whitening: WhitenParams,
    pub compose_mode: ComposeMode,
}

impl Default for RetouchConfig {
    fn default() -> Self {
        Self {
            feature_map_path: None,
            smoothing_enabled: true,
            smoothing: SmoothingParams::default(),
            tint_enabled: true,
            tint: TintParams::default(),
            whitening_enabled: true,
            whitening: WhitenParams::default(),
            compose_mode: ComposeMode::InPlace,
        }
    }
}

impl RetouchConfig {
    /// Load configuration from `RETOUCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            feature_map_path: std::env::var("RETOUCH_FEATURE_MAP").ok().map(PathBuf::from),
            smoothing_enabled: env_bool("RETOUCH_SMOOTHING", true),
            smoothing: SmoothingParams {
                diameter: env_parse("RETOUCH_SMOOTHING_DIAMETER", defaults.smoothing.diameter),
                sigma_color: env_parse("RETOUCH_SMOOTHING_SIGMA", defaults.smoothing.sigma_color),
                sigma_space: env_parse("RETOUCH_SMOOTHING_SIGMA", defaults.smoothing.sigma_space),
                blend: env_parse("RETOUCH_SMOOTHING_BLEND", defaults.smoothing.blend).clamp(0.0, 1.0),
            },
            tint_enabled: env_bool("RETOUCH_TINT", true),
            tint: TintParams {
                color: std::env::var("RETOUCH_TINT_COLOR")
                    .ok()
                    .and_then(|v| parse_color(&v))
                    .unwrap_or(defaults.tint.color),
                intensity: env_parse("RETOUCH_TINT_INTENSITY", defaults.tint.intensity),
            },
            whitening_enabled: env_bool("RETOUCH_WHITENING", true),
            whitening: WhitenParams {
                strength: env_parse("RETOUCH_WHITENING_STRENGTH", defaults.whitening.strength),
                ..defaults.whitening
            },
            compose_mode: env_parse("RETOUCH_COMPOSE_MODE", defaults.compose_mode),
        }
    }

    /// Resolve the feature map this configuration points at.
    pub fn feature_map(&self) -> Result<FeatureMap, ConfigError> {
        match &self.feature_map_path {
            Some(path) => FeatureMap::load(path),
            None => FeatureMap::face_mesh().cloned(),
        }
    }
}

/// Parse `"r,g,b"` into a colour.
pub fn parse_color(s: &str) -> Option<Rgb<u8>> {
    let parts: Vec<u8> = s
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        &[r, g, b] => Some(Rgb([r, g, b])),
        _ => None,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
