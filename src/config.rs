use anyhow::Context;

use crate::overlay::BandConfig;

/// Settings resolved once at startup and handed to each command.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub band: BandConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = BandConfig::default();
        let upper = parse_multiplier(lookup("FORECAST_BAND_UPPER"), "FORECAST_BAND_UPPER")?
            .unwrap_or(defaults.upper);
        let lower = parse_multiplier(lookup("FORECAST_BAND_LOWER"), "FORECAST_BAND_LOWER")?
            .unwrap_or(defaults.lower);
        if lower > upper {
            anyhow::bail!(
                "FORECAST_BAND_LOWER ({lower}) must not exceed FORECAST_BAND_UPPER ({upper})"
            );
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            band: BandConfig { upper, lower },
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance for session storage")
    }
}

fn parse_multiplier(raw: Option<String>, key: &str) -> anyhow::Result<Option<f64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a number, got '{raw}'"))?;
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("{key} must be a non-negative number");
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_fifteen_percent_band() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.band, BandConfig::default());
        assert!(config.database_url.is_none());
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn reads_band_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("FORECAST_BAND_UPPER", "1.2"),
            ("FORECAST_BAND_LOWER", "0.9"),
            ("DATABASE_URL", "postgres://localhost/forecast"),
        ]))
        .unwrap();
        assert_eq!(config.band.upper, 1.2);
        assert_eq!(config.band.lower, 0.9);
        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/forecast");
    }

    #[test]
    fn rejects_inverted_or_garbage_band() {
        assert!(AppConfig::from_lookup(lookup(&[("FORECAST_BAND_LOWER", "2.0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("FORECAST_BAND_UPPER", "wide")])).is_err());
    }
}
