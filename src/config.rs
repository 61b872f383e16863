use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_address")]
    pub address: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Reset the entity cache on every page request (reference data edited live)
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLite database file, or ":memory:"
    pub path: String,
    /// JSON file of products, tags and merchants loaded into an empty store
    pub seed_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DecayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Share of the weekly score kept per tick
    #[serde(default = "default_weekly_factor")]
    pub weekly_factor: f64,
    /// Share of the daily score kept per tick
    #[serde(default = "default_daily_factor")]
    pub daily_factor: f64,
    /// Decimal places kept after each tick
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// Fixed offset used to find wall-clock midnight
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Where the date of the last completed tick is persisted
    pub ledger_path: Option<String>,
    /// Upper bound on ticks replayed after downtime
    #[serde(default = "default_max_catch_up")]
    pub max_catch_up_days: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_max")]
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_web_address(),
            port: default_web_port(),
            dev_mode: false,
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weekly_factor: default_weekly_factor(),
            daily_factor: default_daily_factor(),
            precision: default_precision(),
            utc_offset_minutes: 0,
            ledger_path: None,
            max_catch_up_days: default_max_catch_up(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: default_history_max() }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_web_address() -> String { "0.0.0.0".to_string() }
fn default_web_port() -> u16 { 8090 }
fn default_weekly_factor() -> f64 { 0.9 }
fn default_daily_factor() -> f64 { 0.5 }
fn default_precision() -> u32 { 2 }
fn default_max_catch_up() -> usize { 7 }
fn default_history_max() -> usize { 90 }

/// Beyond this, `10^precision` stops being a usable f64 scale
pub const MAX_PRECISION: u32 = 15;

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config = Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path, e))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, factor) in [
            ("decay.weekly_factor", self.decay.weekly_factor),
            ("decay.daily_factor", self.decay.daily_factor),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, factor);
            }
        }
        if self.decay.precision > MAX_PRECISION {
            anyhow::bail!(
                "decay.precision must be at most {} decimal places, got {}",
                MAX_PRECISION,
                self.decay.precision
            );
        }
        if self.decay.utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!(
                "decay.utc_offset_minutes out of range: {}",
                self.decay.utc_offset_minutes
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse("[store]\npath = \":memory:\"\n").unwrap();
        assert_eq!(config.store.path, ":memory:");
        assert!(config.web.enabled);
        assert_eq!(config.web.port, 8090);
        assert_eq!(config.decay.weekly_factor, 0.9);
        assert_eq!(config.decay.daily_factor, 0.5);
        assert_eq!(config.decay.precision, 2);
        assert_eq!(config.decay.max_catch_up_days, 7);
        assert!(config.decay.ledger_path.is_none());
        assert_eq!(config.history.max_entries, 90);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_overrides() {
        let toml = r#"
            [web]
            port = 9000
            dev_mode = true

            [store]
            path = "site.db"

            [decay]
            weekly_factor = 0.8
            utc_offset_minutes = -300
            ledger_path = "decay.json"
        "#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.web.port, 9000);
        assert!(config.web.dev_mode);
        assert_eq!(config.decay.weekly_factor, 0.8);
        assert_eq!(config.decay.daily_factor, 0.5);
        assert_eq!(config.decay.utc_offset_minutes, -300);
        assert_eq!(config.decay.ledger_path.as_deref(), Some("decay.json"));
    }

    #[test]
    fn test_factor_out_of_range_rejected() {
        let toml = "[store]\npath = \"x.db\"\n[decay]\ndaily_factor = 1.5\n";
        let err = Config::parse(toml).unwrap_err();
        assert!(err.to_string().contains("daily_factor"), "got: {}", err);
    }

    #[test]
    fn test_precision_bounded() {
        let toml = "[store]\npath = \"x.db\"\n[decay]\nprecision = 400\n";
        let err = Config::parse(toml).unwrap_err();
        assert!(err.to_string().contains("decay.precision"), "got: {}", err);

        let toml = "[store]\npath = \"x.db\"\n[decay]\nprecision = 15\n";
        assert_eq!(Config::parse(toml).unwrap().decay.precision, MAX_PRECISION);
    }

    #[test]
    fn test_store_section_required() {
        assert!(Config::parse("[web]\nport = 1\n").is_err());
    }
}
