use blinkcheck_core::{ConfigError, ConfirmationSampling, LivenessConfig};
use serde::Serialize;

/// Added to a full blink window when `BLINKCHECK_SETTLE_MS` is unset.
const SETTLE_MARGIN_MS: u64 = 250;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Blink window thresholds, delays and sampling policy.
    pub liveness: LivenessConfig,
    /// How long a replay keeps running after its last frame.
    pub settle_ms: u64,
}

impl Settings {
    /// Load configuration from `BLINKCHECK_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = LivenessConfig::default();

        let sampling = match lookup("BLINKCHECK_CONFIRMATION_SAMPLING") {
            Some(v) => v.parse()?,
            None => ConfirmationSampling::default(),
        };

        let liveness = LivenessConfig {
            closed_threshold: parse_or(
                &lookup,
                "BLINKCHECK_CLOSED_THRESHOLD",
                defaults.closed_threshold,
            ),
            open_threshold: parse_or(&lookup, "BLINKCHECK_OPEN_THRESHOLD", defaults.open_threshold),
            confirm_delay_ms: parse_or(
                &lookup,
                "BLINKCHECK_CONFIRM_DELAY_MS",
                defaults.confirm_delay_ms,
            ),
            release_delay_ms: parse_or(
                &lookup,
                "BLINKCHECK_RELEASE_DELAY_MS",
                defaults.release_delay_ms,
            ),
            sampling,
        };
        liveness.validate()?;

        let settle_ms = parse_or(&lookup, "BLINKCHECK_SETTLE_MS", default_settle_ms(&liveness));
        Ok(Self {
            liveness,
            settle_ms,
        })
    }
}

/// Long enough for a window opened by the last frame to confirm and close.
fn default_settle_ms(liveness: &LivenessConfig) -> u64 {
    liveness
        .confirm_delay_ms
        .saturating_add(liveness.release_delay_ms)
        .saturating_add(SETTLE_MARGIN_MS)
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
