use growpromise_shared::domain::{Dependent, PlantType};
use serde::Deserialize;
use std::{env, fs, path::Path};

use crate::storage::GrowthRules;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub tenant_id: String,
    pub dependents: Vec<Dependent>,
    #[serde(default = "default_plant_types")]
    pub plant_types: Vec<PlantType>,
    pub jwt_secret: String,
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub growth: GrowthRules,
    #[serde(default = "default_sticker_image")]
    pub default_sticker_image: String,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String, // bcrypt hash
    pub role: Role,
    pub dependent_id: Option<String>, // required when role == dependent
}

pub use growpromise_shared::auth::Role;

fn default_sticker_image() -> String {
    "stickers/default.png".to_string()
}

/// A serviceable starter garden so a fresh install works before the
/// guardian customizes anything.
fn default_plant_types() -> Vec<PlantType> {
    vec![
        PlantType {
            id: "sunflower".into(),
            name: "Sunflower".into(),
            max_stage: 5,
            experience_per_stage: 100,
            image_ref: "plants/sunflower.png".into(),
        },
        PlantType {
            id: "cactus".into(),
            name: "Cactus".into(),
            max_stage: 4,
            experience_per_stage: 150,
            image_ref: "plants/cactus.png".into(),
        },
    ]
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        Ok(cfg)
    }
}
