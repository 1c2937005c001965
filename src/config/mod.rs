//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Engine configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Minimum time between two successful deploys of one player
    pub deploy_cooldown: Duration,
    /// Time between validation and teleport (spawn timer)
    pub deploy_delay: Duration,
    /// Max random scatter around a deployment point (meters)
    pub deploy_scatter_radius: f32,

    /// Per-player cooldown between draws on the same store
    pub resupply_cooldown: Duration,
    /// Max distance from a store to draw ammo (meters)
    pub resupply_range: f32,
    /// Time a depleted store waits before refilling
    pub store_replenish: Duration,

    /// Time a lock must persist before the missile warning fires
    pub threat_warning: Duration,
    /// How long flares spoof an incoming missile
    pub flare_window: Duration,
    /// Minimum time between two flare deployments
    pub flare_cooldown: Duration,
    /// Countermeasure charges for a freshly spawned vehicle
    pub flare_charges: u32,
    /// Rate at which the host drives the threat state machine
    pub threat_tick_hz: u32,

    /// Per-player request budget (requests per second)
    pub request_rate_per_sec: u32,
    /// Fixed seed for deploy scatter (random when absent)
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            deploy_cooldown: Duration::from_secs(10),
            deploy_delay: Duration::ZERO,
            deploy_scatter_radius: 3.0,
            resupply_cooldown: Duration::from_secs(5),
            resupply_range: 15.0,
            store_replenish: Duration::from_secs(120),
            threat_warning: Duration::from_secs(3),
            flare_window: Duration::from_secs(4),
            flare_cooldown: Duration::from_secs(8),
            flare_charges: 6,
            threat_tick_hz: 10,
            request_rate_per_sec: 5,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            deploy_cooldown: secs("DEPLOY_COOLDOWN_SECS", defaults.deploy_cooldown)?,
            deploy_delay: match env::var("DEPLOY_DELAY_MS") {
                Ok(raw) => Duration::from_millis(parse("DEPLOY_DELAY_MS", &raw)?),
                Err(_) => defaults.deploy_delay,
            },
            deploy_scatter_radius: distance("DEPLOY_SCATTER_RADIUS", defaults.deploy_scatter_radius)?,

            resupply_cooldown: secs("RESUPPLY_COOLDOWN_SECS", defaults.resupply_cooldown)?,
            resupply_range: distance("RESUPPLY_RANGE", defaults.resupply_range)?,
            store_replenish: secs("STORE_REPLENISH_SECS", defaults.store_replenish)?,

            threat_warning: secs("THREAT_WARNING_SECS", defaults.threat_warning)?,
            flare_window: secs("FLARE_WINDOW_SECS", defaults.flare_window)?,
            flare_cooldown: secs("FLARE_COOLDOWN_SECS", defaults.flare_cooldown)?,
            flare_charges: var_or("FLARE_CHARGES", defaults.flare_charges)?,
            threat_tick_hz: var_or("THREAT_TICK_HZ", defaults.threat_tick_hz)?.max(1),

            request_rate_per_sec: var_or("REQUEST_RATE_PER_SEC", defaults.request_rate_per_sec)?,
            rng_seed: match env::var("RNG_SEED") {
                Ok(raw) => Some(parse("RNG_SEED", &raw)?),
                Err(_) => None,
            },
        })
    }
}

fn parse<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid(name))
}

fn var_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse(name, &raw),
        Err(_) => Ok(default),
    }
}

/// Distances must be finite and non-negative
fn distance(name: &'static str, default: f32) -> Result<f32, ConfigError> {
    let meters: f32 = var_or(name, default)?;
    if meters.is_finite() && meters >= 0.0 {
        Ok(meters)
    } else {
        Err(ConfigError::Invalid(name))
    }
}

fn secs(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse::<f64>(name, &raw).and_then(|s| {
            Duration::try_from_secs_f64(s).map_err(|_| ConfigError::Invalid(name))
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse::<u32>("FLARE_CHARGES", "lots"),
            Err(ConfigError::Invalid("FLARE_CHARGES"))
        ));
        assert_eq!(parse::<u32>("FLARE_CHARGES", " 4 ").unwrap(), 4);
    }

    #[test]
    fn non_finite_distances_are_rejected() {
        for raw in ["inf", "NaN", "-2.5"] {
            env::set_var("DEPLOY_SCATTER_RADIUS", raw);
            assert!(matches!(
                distance("DEPLOY_SCATTER_RADIUS", 3.0),
                Err(ConfigError::Invalid("DEPLOY_SCATTER_RADIUS"))
            ));
        }
        env::set_var("DEPLOY_SCATTER_RADIUS", "0");
        assert_eq!(distance("DEPLOY_SCATTER_RADIUS", 3.0).unwrap(), 0.0);
        env::remove_var("DEPLOY_SCATTER_RADIUS");

        env::set_var("RESUPPLY_RANGE", "inf");
        assert!(matches!(
            EngineConfig::from_env(),
            Err(ConfigError::Invalid("RESUPPLY_RANGE"))
        ));
        env::remove_var("RESUPPLY_RANGE");
        assert_eq!(distance("RESUPPLY_RANGE", 15.0).unwrap(), 15.0);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.deploy_cooldown, Duration::from_secs(10));
        assert_eq!(config.threat_warning, Duration::from_secs(3));
        assert_eq!(config.flare_charges, 6);
        assert!(config.rng_seed.is_none());
    }
}
