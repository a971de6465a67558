use crate::domain::Domain;
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use serde::Deserialize;
use std::{fmt, path::Path, path::PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub auth: AuthConfig,
    pub models: ModelsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

fn default_port() -> u16 {
    5000
}

fn default_body_limit_mb() -> usize {
    16
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb * 1024 * 1024
    }
}

#[derive(Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_key: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let api_key = if self.api_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("AuthConfig")
            .field("api_key", &api_key)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_plant_dir")]
    pub plant_dir: PathBuf,
    #[serde(default = "default_animal_dir")]
    pub animal_dir: PathBuf,
    #[serde(default = "default_mushroom_dir")]
    pub mushroom_dir: PathBuf,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_model_file() -> String {
    "model.onnx".to_string()
}

fn default_model_instances() -> usize {
    1
}

fn default_plant_dir() -> PathBuf {
    PathBuf::from("PlantAndFlowersModel")
}

fn default_animal_dir() -> PathBuf {
    PathBuf::from("AnimalsModel")
}

fn default_mushroom_dir() -> PathBuf {
    PathBuf::from("MushroomsModel")
}

impl ModelsConfig {
    pub fn dir_for(&self, domain: Domain) -> PathBuf {
        let dir = match domain {
            Domain::Plant => &self.plant_dir,
            Domain::Animal => &self.animal_dir,
            Domain::Mushroom => &self.mushroom_dir,
        };
        self.root_dir.join(dir)
    }

    pub fn model_path(&self, domain: Domain) -> PathBuf {
        self.dir_for(domain).join(&self.model_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.num_instances == 0 {
            return Err("models.num_instances must be at least 1".to_string());
        }
        if self.model_file.is_empty() {
            return Err("models.model_file must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

/// The plain environment variables the service has always been deployed with.
/// They win over both the YAML files and the `SPECIES_` prefixed variables.
#[derive(Debug, Default, Clone)]
pub struct LegacyEnv {
    pub api_key: Option<String>,
    pub app_url: Option<String>,
    pub app_port: Option<String>,
}

impl LegacyEnv {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("API_KEY").ok(),
            app_url: std::env::var("APP_URL").ok(),
            app_port: std::env::var("APP_PORT").ok(),
        }
    }

    /// Fills the variables still unset from a `.env` file. Variables already
    /// present in the process environment take precedence. A missing file is
    /// not an error.
    pub fn with_dotenv(mut self, path: &Path) -> Result<Self, ConfigError> {
        let entries = match dotenv::from_path_iter(path) {
            Ok(entries) => entries,
            Err(e) if e.not_found() => return Ok(self),
            Err(e) => {
                return Err(ConfigError::Message(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                ConfigError::Message(format!("invalid entry in {}: {}", path.display(), e))
            })?;
            let slot = match key.as_str() {
                "API_KEY" => &mut self.api_key,
                "APP_URL" => &mut self.app_url,
                "APP_PORT" => &mut self.app_port,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        Ok(self)
    }

    fn apply(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let port = match self.app_port.as_deref() {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|e| {
                ConfigError::Message(format!("APP_PORT `{}` is not a valid port: {}", raw, e))
            })?),
            None => None,
        };

        builder
            .set_override_option("auth.api_key", self.api_key.clone())?
            .set_override_option("server.host", self.app_url.as_deref().map(strip_scheme))?
            .set_override_option("server.port", port.map(i64::from))
    }
}

/// `APP_URL` may carry a scheme; only the host part is bindable.
pub fn strip_scheme(url: &str) -> String {
    let host = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    host.trim_end_matches('/').to_string()
}

pub fn get_configuration() -> Result<Config, ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigError::Message)?;

    let legacy = LegacyEnv::from_env().with_dotenv(&base_path.join(".env"))?;

    load_configuration(&configuration_directory, &environment, &legacy)
}

pub fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
    legacy: &LegacyEnv,
) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("SPECIES")
                .prefix_separator("_")
                .separator("__"),
        );

    let config = legacy.apply(builder)?.build()?;
    let config: Config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.models.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BASE: &str = r#"
log_level: info
server:
  host: 127.0.0.1
  port: 5000
models:
  root_dir: /srv/models
"#;

    fn write_configuration(base: &str, local: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.yaml"), base).unwrap();
        if let Some(local) = local {
            fs::write(dir.path().join("local.yaml"), local).unwrap();
        }
        dir
    }

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("http://flyaway-flask.localhost"), "flyaway-flask.localhost");
        assert_eq!(strip_scheme("https://0.0.0.0/"), "0.0.0.0");
        assert_eq!(strip_scheme("127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn test_defaults_fill_missing_model_settings() {
        let dir = write_configuration(BASE, None);
        let config =
            load_configuration(dir.path(), &Environment::Local, &LegacyEnv::default()).unwrap();

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.server.body_limit_bytes(), 16 * 1024 * 1024);
        assert_eq!(config.models.num_instances, 1);
        assert!(config.auth.api_key.is_empty());
        assert_eq!(
            config.models.model_path(Domain::Mushroom),
            PathBuf::from("/srv/models/MushroomsModel/model.onnx")
        );
    }

    #[test]
    fn test_environment_overlay_wins_over_base() {
        let dir = write_configuration(BASE, Some("log_level: debug\nserver:\n  port: 6000\n"));
        let config =
            load_configuration(dir.path(), &Environment::Local, &LegacyEnv::default()).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_legacy_env_overrides() {
        let dir = write_configuration(BASE, None);
        let legacy = LegacyEnv {
            api_key: Some("butterflies".to_string()),
            app_url: Some("http://flyaway-flask.localhost".to_string()),
            app_port: Some("8081".to_string()),
        };
        let config = load_configuration(dir.path(), &Environment::Local, &legacy).unwrap();

        assert_eq!(config.auth.api_key, "butterflies");
        assert_eq!(config.server.get_address(), "flyaway-flask.localhost:8081");
        assert!(!format!("{:?}", config.auth).contains("butterflies"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let dir = write_configuration(BASE, None);
        let legacy = LegacyEnv {
            app_port: Some("seventy".to_string()),
            ..Default::default()
        };

        assert!(load_configuration(dir.path(), &Environment::Local, &legacy).is_err());
    }

    #[test]
    fn test_zero_instances_is_rejected() {
        let dir = write_configuration(&format!("{}  num_instances: 0\n", BASE), None);

        assert!(
            load_configuration(dir.path(), &Environment::Local, &LegacyEnv::default()).is_err()
        );
    }

    #[test]
    fn test_dotenv_fills_unset_variables() {
        let dir = tempfile::tempdir().unwrap();
        let dotenv_path = dir.path().join(".env");
        fs::write(
            &dotenv_path,
            "API_KEY=from-dotenv\nAPP_PORT=7000\nUNRELATED=1\n",
        )
        .unwrap();
        let legacy = LegacyEnv {
            app_port: Some("8081".to_string()),
            ..Default::default()
        };

        let legacy = legacy.with_dotenv(&dotenv_path).unwrap();

        assert_eq!(legacy.api_key.as_deref(), Some("from-dotenv"));
        assert_eq!(legacy.app_port.as_deref(), Some("8081"));
        assert_eq!(legacy.app_url, None);
    }

    #[test]
    fn test_missing_dotenv_is_ignored() {
        let dir = tempfile::tempdir().unwrap();

        let legacy = LegacyEnv::default()
            .with_dotenv(&dir.path().join(".env"))
            .unwrap();

        assert_eq!(legacy.api_key, None);
    }

    #[test]
    fn test_environment_names() {
        let production: Environment = "Production".to_string().try_into().unwrap();
        assert_eq!(production.as_str(), "production");
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
