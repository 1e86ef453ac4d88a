//! Configuration model loaded from external sources.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
/// Basic configuration shared across the crawlers and the session pipeline.
pub struct AppConfig {
    pub citilink_url: String,
    pub zakupki_url: String,
    pub concurrency: usize,
}

impl AppConfig {
    /// Loads configuration from an optional `config.yaml` next to the
    /// binary, overlaid with `ZM_*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("citilink_url", "https://www.citilink.ru/")?
            .set_default("zakupki_url", "https://moy-zakupki.ru/")?
            .set_default("concurrency", 5)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("ZM"))
            .build()?
            .try_deserialize()
    }
}
