use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;

use crate::rules::{EaveGeometry, RuleConfig, RulePricing};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Progress streaming
    pub progress_channel_capacity: usize,

    // Business rules
    pub rules: RuleConfig,
}

/// Parsed value of `key`, or `default` when unset or unparseable
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10);

        // Redis
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = env_or("REDIS_CACHE_TTL_SECONDS", 3600); // 1 hour default

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let progress_channel_capacity = env_or("PROGRESS_CHANNEL_CAPACITY", 256);

        // Business rules
        let pricing_defaults = RulePricing::default();
        let geometry_defaults = EaveGeometry::default();
        let rules = RuleConfig {
            pricing: RulePricing {
                ridge_cap_per_lf: env_or("RIDGE_CAP_UNIT_PRICE", pricing_defaults.ridge_cap_per_lf),
                drip_edge_per_lf: env_or("DRIP_EDGE_UNIT_PRICE", pricing_defaults.drip_edge_per_lf),
                gutter_apron_per_lf: env_or(
                    "GUTTER_APRON_UNIT_PRICE",
                    pricing_defaults.gutter_apron_per_lf,
                ),
                ice_water_per_sf: env_or("ICE_WATER_UNIT_PRICE", pricing_defaults.ice_water_per_sf),
                starter_strip_per_lf: env_or(
                    "STARTER_STRIP_UNIT_PRICE",
                    pricing_defaults.starter_strip_per_lf,
                ),
            },
            eave_geometry: EaveGeometry {
                soffit_depth_in: env_or(
                    "ICE_WATER_SOFFIT_DEPTH_IN",
                    geometry_defaults.soffit_depth_in,
                ),
                wall_thickness_in: env_or(
                    "ICE_WATER_WALL_THICKNESS_IN",
                    geometry_defaults.wall_thickness_in,
                ),
                ..geometry_defaults
            },
        };
        validate_rules(&rules)?;

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            progress_channel_capacity,
            rules,
        })
    }
}

#[cfg(test)]
impl Settings {
    pub fn for_tests() -> Self {
        Settings {
            env: Environment::Dev,
            server_addr: "127.0.0.1:0".to_string(),
            database_url: "postgres://localhost/roof_audit_test".to_string(),
            database_max_connections: 1,
            redis_url: "redis://localhost:6379/0".to_string(),
            redis_cache_ttl_seconds: 60,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            progress_channel_capacity: 16,
            rules: RuleConfig::default(),
        }
    }
}

fn validate_rules(rules: &RuleConfig) -> Result<()> {
    let p = &rules.pricing;
    let g = &rules.eave_geometry;
    let values = [
        ("RIDGE_CAP_UNIT_PRICE", p.ridge_cap_per_lf),
        ("DRIP_EDGE_UNIT_PRICE", p.drip_edge_per_lf),
        ("GUTTER_APRON_UNIT_PRICE", p.gutter_apron_per_lf),
        ("ICE_WATER_UNIT_PRICE", p.ice_water_per_sf),
        ("STARTER_STRIP_UNIT_PRICE", p.starter_strip_per_lf),
        ("ICE_WATER_SOFFIT_DEPTH_IN", g.soffit_depth_in),
        ("ICE_WATER_WALL_THICKNESS_IN", g.wall_thickness_in),
    ];
    for (key, value) in values {
        if !value.is_finite() || value < 0.0 {
            bail!("{} must be a non-negative number, got {}", key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_dev() {
        assert_eq!(Environment::from_str("production"), Environment::Prod);
        assert_eq!(Environment::from_str("STAGING"), Environment::Staging);
        assert_eq!(Environment::from_str("anything"), Environment::Dev);
    }

    #[test]
    fn default_rule_config_is_valid() {
        assert!(validate_rules(&RuleConfig::default()).is_ok());
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut rules = RuleConfig::default();
        rules.pricing.drip_edge_per_lf = -1.0;
        let err = validate_rules(&rules).unwrap_err();
        assert!(err.to_string().contains("DRIP_EDGE_UNIT_PRICE"));
    }
}
