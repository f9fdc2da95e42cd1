use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub log_level: String,
    pub item_count: u32,
    pub tick_interval_ms: u64,
    pub seed: Option<u64>,
}

/// Knobs handed to the download manager.
#[derive(Debug, Clone, Copy)]
pub struct SimulationSettings {
    pub tick_interval: Duration,
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            seed: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Self::defaults()?
            // Config file (optional)
            .add_source(File::with_name("config").required(false))
            // Environment variables (e.g. REALTIME_LIST_SERVER_PORT=8080)
            .add_source(Environment::with_prefix("REALTIME_LIST"));

        builder.build()?.try_deserialize()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server_port", 3000)?
            .set_default("log_level", "info")?
            .set_default("item_count", 20)?
            .set_default("tick_interval_ms", 500)
    }

    pub fn simulation(&self) -> SimulationSettings {
        SimulationSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings: Settings = Settings::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.server_port, 3000);
        assert_eq!(settings.item_count, 20);
        assert_eq!(settings.tick_interval_ms, 500);
        assert_eq!(settings.seed, None);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "item_count = 5\ntick_interval_ms = 10\nseed = 42").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.item_count, 5);
        assert_eq!(settings.server_port, 3000);

        let sim = settings.simulation();
        assert_eq!(sim.tick_interval, Duration::from_millis(10));
        assert_eq!(sim.seed, Some(42));
    }
}
