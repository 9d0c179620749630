//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{CondorError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Kite credentials from `KITE_*` environment variables
/// 2. Environment variables (prefixed with CONDOR_, sections split by `__`)
/// 3. Configuration file (TOML format)
/// 4. Default values
///
/// The result is not validated; call [`AppConfig::validate`] before use.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("CONDOR")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| CondorError::Configuration(e.to_string()))?;

    let mut app: AppConfig = config
        .try_deserialize()
        .map_err(|e| CondorError::Configuration(e.to_string()))?;

    apply_kite_env(&mut app);
    Ok(app)
}

/// Overlay Kite credentials from the conventional environment variables
fn apply_kite_env(app: &mut AppConfig) {
    if let Ok(key) = std::env::var("KITE_API_KEY") {
        app.kite.api_key = Some(key);
    }
    if let Ok(secret) = std::env::var("KITE_API_SECRET") {
        app.kite.api_secret = Some(secret);
    }
    if let Ok(token) = std::env::var("KITE_ACCESS_TOKEN") {
        app.kite.access_token = Some(token);
    }
    if let Ok(url) = std::env::var("KITE_BASE_URL") {
        app.kite.base_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_loads_toml_overrides() {
        let path = std::env::temp_dir().join(format!(
            "iron_condor_loader_{}.toml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[strategy]
underlying = "BANKNIFTY"
reference_instrument = "NSE:NIFTY BANK"
strike_step = 100
strike_distance = 500
protection_distance = 200

[session]
end = "15:10:00"
poll_interval_seconds = 30
"#
        )
        .unwrap();

        let config = load_config(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.strategy.underlying, "BANKNIFTY");
        assert_eq!(config.strategy.strike_step, dec!(100));
        assert_eq!(config.strategy.strike_distance, dec!(500));
        // untouched fields keep their defaults
        assert_eq!(config.strategy.lot_size, 50);
        assert_eq!(config.session.poll_interval_seconds, 30);
        assert_eq!(config.session.end.to_string(), "15:10:00");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/iron_condor.toml")).unwrap();
        assert_eq!(config.strategy.underlying, "NIFTY");
        assert_eq!(config.orders.max_attempts, 3);
    }
}
