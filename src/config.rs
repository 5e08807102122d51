use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub redis_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Timing knobs for the announcement sequencer.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub assets_dir: String,
    /// Nominal duration of one clip.
    pub clip_millis: u64,
    /// Gap between the letter clip and the number clip.
    pub gap_millis: u64,
    /// Settle delay between the game-started phrase and the first number.
    pub settle_millis: u64,
}

/// Timing knobs for the per-tenant caller loop.
#[derive(Debug, Clone, Deserialize)]
pub struct CallerConfig {
    /// Polling cadence of the loop. This is only a trigger; the store
    /// enforces the real call interval.
    pub tick_millis: u64,
    /// Safety timeout after which a stalled draw releases the in-flight
    /// guard.
    pub draw_timeout_secs: u64,
    /// Safety timeout for one announcement.
    pub speak_timeout_secs: u64,
    /// How long stop() waits for a caller task to wind down before
    /// aborting it.
    pub teardown_timeout_secs: u64,
    /// Check every player for a win after each announced draw.
    pub auto_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub audio: AudioConfig,
    pub caller: CallerConfig,
    /// Optional JSON file overriding the built-in winning patterns.
    pub patterns_file: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = env::var("RUN_ENV").unwrap_or_else(|_| "local".into());

        let builder = ::config::Config::builder()
            .add_source(config::File::with_name("config/default.toml"))
            .add_source(
                config::File::with_name(&format!("config/{}", env))
                    .required(false),
            )
            .add_source(config::File::with_name("config/local.toml").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
