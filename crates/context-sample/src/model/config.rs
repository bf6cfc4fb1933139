use context_framework::LifeCycleObserverOptions;
use serde::{Deserialize, Serialize};

use super::AppError;

/// Application configuration, bound as a JSON document under `config`.
///
/// Components read single values through property paths, e.g. `config#server.port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub name: String,
    pub greeting: String,
    pub datasource: DataSourceConfig,
    pub server: ServerConfig,
    pub life_cycle: LifeCycleObserverOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "greeter".to_string(),
            greeting: "Hello".to_string(),
            datasource: DataSourceConfig::default(),
            server: ServerConfig::default(),
            life_cycle: LifeCycleObserverOptions {
                ordered_groups: vec!["datasource".to_string(), "server".to_string()],
                parallel: false,
            },
        }
    }
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            url: "memory://greetings".to_string(),
            pool_size: 4,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl AppConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, AppError> {
        Ok(serde_json::to_value(self)?)
    }
}
