use crate::error::AppError;
use config::{ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// OTLP collector endpoint; traces are only exported when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}

/// Layers `.env`, an optional `configuration.*` file and `APP__` environment
/// variables over the defaults already set on `builder`, then deserializes.
///
/// Keys listed in `list_keys` are split on commas when they come from the
/// environment.
pub fn load_layered<T: DeserializeOwned>(
    builder: ConfigBuilder<DefaultState>,
    list_keys: &[&str],
) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let mut environment = Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true);
    if !list_keys.is_empty() {
        environment = environment.list_separator(",");
        for key in list_keys {
            environment = environment.with_list_parse_key(key);
        }
    }

    let config = builder
        .add_source(File::with_name("configuration").required(false))
        .add_source(environment)
        .build()?;

    Ok(config.try_deserialize()?)
}
