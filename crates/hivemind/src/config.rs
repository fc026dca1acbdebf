//! Конфигурация реестра
//!
//! Источники в порядке приоритета:
//! 1. Переменные окружения `HIVEMIND_*`
//! 2. Файл конфигурации (TOML, JSON, YAML)
//! 3. Значения по умолчанию

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use common::LoggingConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Что делать с восстановимыми ошибками
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandlingMode {
    /// Записать в журнал и продолжить
    #[default]
    Lenient,
    /// Каждая восстановимая ошибка становится фатальной
    Strict,
}

/// Фильтр методов для `hivemind.LoggingInterceptor` по умолчанию
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingInterceptorConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub name: String,
    pub logging: LoggingConfig,
    pub error_handling: ErrorHandlingMode,
    /// Модель для точек сервисов без явной модели
    pub default_service_model: String,
    /// Полные id сервисов, строящихся при startup
    pub eager_load: Vec<String>,
    /// Значения для `${name}` в литералах
    pub symbols: BTreeMap<String, String>,
    pub logging_interceptor: LoggingInterceptorConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: "hivemind".to_string(),
            logging: LoggingConfig::default(),
            error_handling: ErrorHandlingMode::Lenient,
            default_service_model: "singleton".to_string(),
            eager_load: Vec::new(),
            symbols: BTreeMap::new(),
            logging_interceptor: LoggingInterceptorConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn with_symbol(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.symbols.insert(name.into(), value.into());
        self
    }

    pub fn strict(mut self) -> Self {
        self.error_handling = ErrorHandlingMode::Strict;
        self
    }

    /// Установить глобальный tracing subscriber по секции `[logging]`.
    /// Журналы `TracingLogFactory` пишутся через него.
    pub fn init_logging(&self) -> Result<()> {
        common::init_structured_logging(self.logging.clone())
    }
}

/// Результат проверки конфигурации
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Загрузчик конфигурации реестра
pub struct ConfigurationLoader {
    search_paths: Vec<PathBuf>,
    env_prefix: String,
    validate_on_load: bool,
}

impl Default for ConfigurationLoader {
    fn default() -> Self {
        Self::new()
    }
}

const FILE_NAMES: [&str; 4] = ["hivemind.toml", "hivemind.json", "hivemind.yaml", "hivemind.yml"];

const KNOWN_MODELS: [&str; 4] = ["singleton", "primitive", "pooled", "threaded"];

impl ConfigurationLoader {
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("hivemind"));
        }
        search_paths.push(PathBuf::from("."));
        search_paths.push(PathBuf::from("/etc/hivemind"));

        Self {
            search_paths,
            env_prefix: "HIVEMIND".to_string(),
            validate_on_load: true,
        }
    }

    /// Загрузчик только с указанными путями поиска
    pub fn with_search_paths<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self {
            search_paths: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            ..Self::new()
        }
    }

    pub fn add_search_path<P: AsRef<Path>>(&mut self, path: P) -> &mut Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn env_prefix<S: Into<String>>(&mut self, prefix: S) -> &mut Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn validate(&mut self, enabled: bool) -> &mut Self {
        self.validate_on_load = enabled;
        self
    }

    /// Найти файл, применить переменные окружения и проверить результат
    pub fn load(&self) -> Result<RegistryConfig> {
        let mut config = match self.find_configuration_file() {
            Some(path) => self.load_from_file(&path)?,
            None => RegistryConfig::default(),
        };

        let prefix = format!("{}_", self.env_prefix);
        let vars: Vec<(String, String)> = env::vars()
            .filter_map(|(key, value)| key.strip_prefix(&prefix).map(|k| (k.to_string(), value)))
            .collect();
        self.apply_overrides(&mut config, vars)?;

        self.finish(config)
    }

    /// Загрузить из конкретного файла, без поиска и без переменных окружения
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<RegistryConfig> {
        let config = self.load_from_file(path)?;
        self.finish(config)
    }

    fn finish(&self, config: RegistryConfig) -> Result<RegistryConfig> {
        if self.validate_on_load {
            let report = self.validate_config(&config);
            if !report.is_valid() {
                return Err(anyhow!("Configuration validation failed: {}", report.errors.join("; ")));
            }
            for warning in &report.warnings {
                warn!("Config warning: {}", warning);
            }
        }
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<RegistryConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        debug!("Loading registry configuration from {}", path.display());

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            _ => Err(anyhow!("Unsupported configuration file format: {:?}", path.extension())),
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, config: &RegistryConfig, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::to_string_pretty(config)?,
            Some("json") => serde_json::to_string_pretty(config)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(config)?,
            _ => return Err(anyhow!("Unsupported file format: {:?}", path.extension())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    fn find_configuration_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    /// Применить переопределения (ключи без префикса `HIVEMIND_`)
    pub fn apply_overrides<I>(&self, config: &mut RegistryConfig, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.to_uppercase().as_str() {
                "NAME" => config.name = value,
                "LOG_LEVEL" => config.logging.level = value.to_lowercase(),
                "LOG_JSON" => config.logging.json_output = value.parse()?,
                "ERROR_HANDLING" => {
                    config.error_handling = match value.to_lowercase().as_str() {
                        "strict" => ErrorHandlingMode::Strict,
                        "lenient" => ErrorHandlingMode::Lenient,
                        other => return Err(anyhow!("Unknown error handling mode '{}'", other)),
                    }
                }
                "DEFAULT_SERVICE_MODEL" => config.default_service_model = value,
                "EAGER_LOAD" => {
                    config.eager_load = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                }
                other => {
                    if let Some(symbol) = other.strip_prefix("SYMBOL_") {
                        config.symbols.insert(symbol.to_lowercase(), value);
                    } else {
                        debug!("Ignoring unknown override {}", other);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn validate_config(&self, config: &RegistryConfig) -> ValidationReport {
        let mut report = ValidationReport::default();

        if config.logging.level().is_err() {
            report.errors.push(format!("Unknown log level '{}'", config.logging.level));
        }
        if config.default_service_model.trim().is_empty() {
            report.errors.push("default_service_model must not be empty".to_string());
        } else if !KNOWN_MODELS.contains(&config.default_service_model.as_str()) {
            report.warnings.push(format!(
                "default service model '{}' is not built in; a module must contribute it",
                config.default_service_model
            ));
        }
        for id in &config.eager_load {
            if !id.contains('.') {
                report.errors.push(format!("eager_load id '{}' must be fully qualified", id));
            }
        }
        for pattern in config.logging_interceptor.include.iter().chain(&config.logging_interceptor.exclude) {
            if globset::Glob::new(pattern.split('(').next().unwrap_or_default()).is_err() {
                report.errors.push(format!("Invalid method pattern '{}'", pattern));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let loader = ConfigurationLoader::new();
        let report = loader.validate_config(&RegistryConfig::default());
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_round_trip_through_every_format() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let loader = ConfigurationLoader::with_search_paths(&[dir.path()]);
        let config = RegistryConfig::default()
            .with_symbol("pool.size", "5")
            .strict();

        for name in ["registry.toml", "registry.json", "registry.yaml"] {
            let path = dir.path().join(name);
            loader.save_to_file(&config, &path)?;
            let loaded = loader.load_file(&path)?;
            assert_eq!(loaded.error_handling, ErrorHandlingMode::Strict);
            assert_eq!(loaded.symbols.get("pool.size").map(String::as_str), Some("5"));
        }
        Ok(())
    }

    #[test]
    fn test_overrides() -> anyhow::Result<()> {
        let loader = ConfigurationLoader::new();
        let mut config = RegistryConfig::default();
        loader.apply_overrides(
            &mut config,
            vec![
                ("LOG_LEVEL".to_string(), "DEBUG".to_string()),
                ("ERROR_HANDLING".to_string(), "strict".to_string()),
                ("EAGER_LOAD".to_string(), "mod.A, mod.B".to_string()),
                ("SYMBOL_HOST".to_string(), "localhost".to_string()),
            ],
        )?;

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.error_handling, ErrorHandlingMode::Strict);
        assert_eq!(config.eager_load, vec!["mod.A", "mod.B"]);
        assert_eq!(config.symbols.get("host").map(String::as_str), Some("localhost"));

        let bad = loader.apply_overrides(&mut config, vec![("ERROR_HANDLING".to_string(), "maybe".to_string())]);
        assert!(bad.is_err());
        Ok(())
    }

    #[test]
    fn test_validation_rejects_unqualified_eager_ids() {
        let loader = ConfigurationLoader::new();
        let mut config = RegistryConfig::default();
        config.eager_load.push("Adder".to_string());
        config.default_service_model = "custom".to_string();

        let report = loader.validate_config(&config);
        assert!(!report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_init_logging_rejects_unknown_level() {
        let mut config = RegistryConfig::default();
        config.logging.level = "chatty".to_string();
        assert!(config.init_logging().is_err());
    }

    #[test]
    fn test_unsupported_extension() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("hivemind.ini");
        fs::write(&path, "name = x")?;
        assert!(ConfigurationLoader::new().load_from_file(&path).is_err());
        Ok(())
    }
}
