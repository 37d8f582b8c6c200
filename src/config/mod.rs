/// Application configuration module
use std::env;

const DEFAULT_TELEMETRY_URL: &str = "https://api.wheretheiss.at/v1/satellites/25544";

const DEFAULT_TLE_SOURCES: &[&str] = &[
    "https://celestrak.org/NORAD/elements/gp.php?CATNR=25544&FORMAT=TLE",
    "https://api.wheretheiss.at/v1/satellites/25544/tles",
    "https://tle.ivanstanojevic.me/api/tle/25544",
];

/// Longest pass search window accepted from the environment (30 days)
const MAX_LOOKAHEAD_MS: i64 = 30 * 24 * 3_600_000;

/// Process-wide configuration, built once at startup and shared read-only
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub telemetry_url: String,
    pub tle_sources: Vec<String>,
    pub fetch_intervals: FetchIntervals,
    pub history: HistoryConfig,
    pub prediction: PredictionConfig,
    pub simulation: SimulationConfig,
}

#[derive(Clone, Debug)]
pub struct FetchIntervals {
    pub telemetry_seconds: u64,
    pub tle_seconds: u64,
    pub synthetic_millis: u64,
    pub frame_millis: u64,
}

#[derive(Clone, Debug)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub min_interval_ms: i64,
    pub synthetic_sample_ms: i64,
}

/// Pass search tuning
#[derive(Clone, Debug)]
pub struct PredictionConfig {
    pub default_threshold_km: f64,
    pub min_threshold_km: f64,
    pub max_threshold_km: f64,
    pub lookahead_ms: i64,
    pub coarse_step_ms: i64,
    /// Added to the pass threshold to get the coarse detection threshold
    pub coarse_margin_km: f64,
    pub refine_window_ms: i64,
    pub fine_step_ms: i64,
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub step_ms: i64,
    /// Simulated milliseconds per real millisecond at 1x
    pub base_scale: f64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let bind_addr = env::var("BIND_ADDR").unwrap_or(defaults.bind_addr);
        let telemetry_url = env::var("TELEMETRY_URL").unwrap_or(defaults.telemetry_url);
        let tle_sources = env_list("TLE_SOURCES").unwrap_or(defaults.tle_sources);
        if tle_sources.is_empty() {
            anyhow::bail!("TLE_SOURCES must name at least one source");
        }

        let fetch_intervals = FetchIntervals {
            telemetry_seconds: env_u64("TELEMETRY_EVERY_SECONDS", 3600),
            tle_seconds: env_u64("TLE_EVERY_SECONDS", 7200),
            synthetic_millis: env_u64("SYNTHETIC_EVERY_MILLIS", 1000),
            frame_millis: env_u64("FRAME_EVERY_MILLIS", 50),
        };

        let history = HistoryConfig {
            capacity: env_u64("HISTORY_CAPACITY", 360) as usize,
            min_interval_ms: secs_to_ms(env_u64("HISTORY_MIN_INTERVAL_SECONDS", 5)),
            synthetic_sample_ms: secs_to_ms(env_u64("SYNTHETIC_SAMPLE_SECONDS", 10)),
        };

        let prediction = PredictionConfig {
            default_threshold_km: env_f64("PASS_THRESHOLD_KM", 100.0),
            min_threshold_km: env_f64("PASS_THRESHOLD_MIN_KM", 25.0),
            max_threshold_km: env_f64("PASS_THRESHOLD_MAX_KM", 500.0),
            lookahead_ms: secs_to_ms(env_u64("LOOKAHEAD_HOURS", 24).saturating_mul(3600)),
            coarse_step_ms: secs_to_ms(env_u64("COARSE_STEP_SECONDS", 30)),
            coarse_margin_km: env_f64("COARSE_MARGIN_KM", 300.0),
            refine_window_ms: secs_to_ms(env_u64("REFINE_WINDOW_SECONDS", 240)),
            fine_step_ms: secs_to_ms(env_u64("FINE_STEP_SECONDS", 1)),
        };
        if prediction.min_threshold_km > prediction.max_threshold_km {
            anyhow::bail!(
                "PASS_THRESHOLD_MIN_KM ({}) exceeds PASS_THRESHOLD_MAX_KM ({})",
                prediction.min_threshold_km,
                prediction.max_threshold_km
            );
        }
        if prediction.coarse_step_ms <= 0 || prediction.fine_step_ms <= 0 {
            anyhow::bail!("pass search step sizes must be positive");
        }
        if prediction.lookahead_ms <= 0 || prediction.lookahead_ms > MAX_LOOKAHEAD_MS {
            anyhow::bail!(
                "LOOKAHEAD_HOURS must be between 1 and {}",
                MAX_LOOKAHEAD_MS / 3_600_000
            );
        }

        let simulation = SimulationConfig {
            step_ms: secs_to_ms(env_u64("SIM_STEP_SECONDS", 15)).max(1),
            base_scale: env_f64("SIM_BASE_SCALE", 120.0),
        };
        if simulation.base_scale <= 0.0 {
            anyhow::bail!(
                "SIM_BASE_SCALE must be positive, got {}",
                simulation.base_scale
            );
        }

        Ok(Self {
            bind_addr,
            telemetry_url,
            tle_sources,
            fetch_intervals,
            history,
            prediction,
            simulation,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            telemetry_url: DEFAULT_TELEMETRY_URL.to_string(),
            tle_sources: DEFAULT_TLE_SOURCES.iter().map(|s| s.to_string()).collect(),
            fetch_intervals: FetchIntervals {
                telemetry_seconds: 3600,
                tle_seconds: 7200,
                synthetic_millis: 1000,
                frame_millis: 50,
            },
            history: HistoryConfig {
                capacity: 360,
                min_interval_ms: 5_000,
                synthetic_sample_ms: 10_000,
            },
            prediction: PredictionConfig {
                default_threshold_km: 100.0,
                min_threshold_km: 25.0,
                max_threshold_km: 500.0,
                lookahead_ms: 24 * 3600 * 1000,
                coarse_step_ms: 30_000,
                coarse_margin_km: 300.0,
                refine_window_ms: 240_000,
                fine_step_ms: 1_000,
            },
            simulation: SimulationConfig {
                step_ms: 15_000,
                base_scale: 120.0,
            },
        }
    }
}

impl PredictionConfig {
    /// Clamp a slider value into the accepted threshold range
    pub fn clamp_threshold(&self, km: f64) -> f64 {
        km.clamp(self.min_threshold_km, self.max_threshold_km)
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pass_search_constants() {
        let config = AppConfig::default();
        assert_eq!(config.prediction.coarse_step_ms, 30_000);
        assert_eq!(config.prediction.fine_step_ms, 1_000);
        assert_eq!(config.prediction.refine_window_ms, 240_000);
        assert_eq!(config.prediction.lookahead_ms, 86_400_000);
        assert_eq!(config.simulation.step_ms, 15_000);
        assert_eq!(config.tle_sources.len(), 3);
    }

    #[test]
    fn test_clamp_threshold() {
        let prediction = AppConfig::default().prediction;
        assert_eq!(prediction.clamp_threshold(5.0), 25.0);
        assert_eq!(prediction.clamp_threshold(120.0), 120.0);
        assert_eq!(prediction.clamp_threshold(9000.0), 500.0);
    }

    #[test]
    fn test_env_u64_falls_back_on_garbage() {
        std::env::set_var("ISS_TRACKER_TEST_U64", "not-a-number");
        assert_eq!(env_u64("ISS_TRACKER_TEST_U64", 42), 42);
        std::env::set_var("ISS_TRACKER_TEST_U64", "7");
        assert_eq!(env_u64("ISS_TRACKER_TEST_U64", 42), 7);
    }

    #[test]
    fn test_from_env_rejects_bad_scale_and_lookahead() {
        std::env::set_var("SIM_BASE_SCALE", "0");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SIM_BASE_SCALE"), "{}", err);
        std::env::set_var("SIM_BASE_SCALE", "-5");
        assert!(AppConfig::from_env().is_err());
        std::env::remove_var("SIM_BASE_SCALE");

        // would overflow when converted to milliseconds
        std::env::set_var("LOOKAHEAD_HOURS", u64::MAX.to_string());
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("LOOKAHEAD_HOURS"), "{}", err);
        std::env::set_var("LOOKAHEAD_HOURS", "48");
        assert_eq!(
            AppConfig::from_env().unwrap().prediction.lookahead_ms,
            48 * 3_600_000
        );
        std::env::remove_var("LOOKAHEAD_HOURS");
    }

    #[test]
    fn test_secs_to_ms_saturates() {
        assert_eq!(secs_to_ms(2), 2_000);
        assert_eq!(secs_to_ms(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_env_list_trims_and_skips_empty() {
        std::env::set_var("ISS_TRACKER_TEST_LIST", " a , ,b,");
        assert_eq!(
            env_list("ISS_TRACKER_TEST_LIST"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }
}
