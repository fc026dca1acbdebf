//! Ошибки реестра HiveMind
//!
//! - **HiveError**: единая "валюта" ошибок реестра
//! - **ErrorHandler / ErrorLog**: приёмник для восстановимых ошибок
//!   (best-effort операции сообщают об ошибке и продолжают работу)
//!
//! Фатальные ошибки (повторный shutdown, рекурсивное построение, несовпадение
//! интерфейса) всегда возвращаются вызывающему, никогда не уходят в ErrorLog.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use classfab::{FabricationError, InvocationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::log::ServiceLog;

/// Тип исключения, под которым ошибки реестра пересекают границу ServiceObject
pub const APPLICATION_RUNTIME_EXCEPTION: &str = "ApplicationRuntimeException";

/// Место объявления (ресурс и строка) для диагностики
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Location {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            line: None,
        }
    }

    pub fn at_line(resource: impl Into<String>, line: u32) -> Self {
        Self {
            resource: resource.into(),
            line: Some(line),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}, line {}", self.resource, line),
            None => write!(f, "{}", self.resource),
        }
    }
}

/// Фаза построения сервиса, на которой произошёл сбой
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionPhase {
    ServiceModel,
    CoreImplementation,
    Interceptors,
    Proxy,
}

impl fmt::Display for ConstructionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstructionPhase::ServiceModel => "service model",
            ConstructionPhase::CoreImplementation => "core implementation",
            ConstructionPhase::Interceptors => "interceptors",
            ConstructionPhase::Proxy => "proxy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone)]
pub enum HiveError {
    #[error("Service point {id} does not exist")]
    ServicePointNotFound { id: String },

    #[error("Service id '{id}' is ambiguous; candidates: {}", candidates.join(", "))]
    AmbiguousServiceId { id: String, candidates: Vec<String> },

    #[error("Service point {id} is not visible to {module}")]
    ServicePointNotVisible { id: String, module: String },

    #[error("There is no service point for interface {interface}")]
    NoServiceForInterface { interface: String },

    #[error("There are multiple service points for interface {interface}: {}", ids.join(", "))]
    MultipleServicesForInterface { interface: String, ids: Vec<String> },

    #[error("Configuration point {id} does not exist")]
    ConfigurationPointNotFound { id: String },

    #[error("Configuration id '{id}' is ambiguous; candidates: {}", candidates.join(", "))]
    AmbiguousConfigurationId { id: String, candidates: Vec<String> },

    #[error("Configuration point {id} is not visible to {module}")]
    ConfigurationPointNotVisible { id: String, module: String },

    #[error("Module {id} does not exist")]
    ModuleNotFound { id: String },

    #[error("Unknown service model '{model}' for service {service_id}")]
    UnknownServiceModel { model: String, service_id: String },

    #[error("Service point {service_id} has no implementation")]
    NoImplementation { service_id: String },

    #[error("{message}")]
    Configuration {
        message: String,
        location: Option<Location>,
    },

    #[error("Failure building service {service_id} ({phase}): {source}")]
    ConstructionFailed {
        service_id: String,
        phase: ConstructionPhase,
        #[source]
        source: Box<HiveError>,
    },

    #[error("Unable to construct service {service_id}: it depends on itself")]
    RecursiveConstruction { service_id: String },

    #[error("Service {service_id} implements interface {declared}, which is not compatible with {requested}")]
    InterfaceMismatch {
        service_id: String,
        declared: String,
        requested: String,
    },

    #[error(transparent)]
    Fabrication(#[from] FabricationError),

    #[error("Interceptor order for {service_id} contains a cycle: {cycle}")]
    InterceptorCycle { service_id: String, cycle: String },

    #[error("Unable to translate '{literal}' to {target}: {reason}")]
    Translation {
        literal: String,
        target: String,
        reason: String,
        location: Option<Location>,
    },

    #[error("The HiveMind Registry has been shutdown")]
    RegistryShutdown,

    #[error("The HiveMind Registry has already been started")]
    AlreadyStarted,

    #[error("{0}")]
    Invocation(InvocationError),
}

impl HiveError {
    pub fn configuration(message: impl Into<String>, location: Option<Location>) -> Self {
        HiveError::Configuration {
            message: message.into(),
            location,
        }
    }

    pub fn translation(
        literal: impl Into<String>,
        target: impl fmt::Display,
        reason: impl Into<String>,
        location: Option<&Location>,
    ) -> Self {
        HiveError::Translation {
            literal: literal.into(),
            target: target.to_string(),
            reason: reason.into(),
            location: location.cloned(),
        }
    }

    /// Обернуть ошибку построения; фатальные ошибки проходят без обёртки
    pub fn construction_failed(service_id: &str, phase: ConstructionPhase, source: HiveError) -> Self {
        if source.passes_through_construction() {
            return source;
        }
        HiveError::ConstructionFailed {
            service_id: service_id.to_string(),
            phase,
            source: Box::new(source),
        }
    }

    fn passes_through_construction(&self) -> bool {
        matches!(
            self,
            HiveError::RecursiveConstruction { .. }
                | HiveError::RegistryShutdown
                | HiveError::InterceptorCycle { .. }
        )
    }

    /// Место объявления, если известно
    pub fn location(&self) -> Option<&Location> {
        match self {
            HiveError::Configuration { location, .. } => location.as_ref(),
            HiveError::Translation { location, .. } => location.as_ref(),
            HiveError::ConstructionFailed { source, .. } => source.location(),
            _ => None,
        }
    }

    /// Самая внутренняя ошибка в цепочке ConstructionFailed
    pub fn root_cause(&self) -> &HiveError {
        match self {
            HiveError::ConstructionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Ошибки, которые нельзя направить в ErrorLog
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HiveError::RegistryShutdown
                | HiveError::RecursiveConstruction { .. }
                | HiveError::InterfaceMismatch { .. }
        )
    }

    /// Категория для журналов и мониторинга
    pub fn category(&self) -> &'static str {
        match self {
            HiveError::ServicePointNotFound { .. }
            | HiveError::AmbiguousServiceId { .. }
            | HiveError::ServicePointNotVisible { .. }
            | HiveError::NoServiceForInterface { .. }
            | HiveError::MultipleServicesForInterface { .. }
            | HiveError::ConfigurationPointNotFound { .. }
            | HiveError::AmbiguousConfigurationId { .. }
            | HiveError::ConfigurationPointNotVisible { .. }
            | HiveError::ModuleNotFound { .. }
            | HiveError::UnknownServiceModel { .. }
            | HiveError::NoImplementation { .. }
            | HiveError::Configuration { .. } => "configuration",
            HiveError::ConstructionFailed { .. } => "construction",
            HiveError::RecursiveConstruction { .. } => "recursion",
            HiveError::InterfaceMismatch { .. } => "interface",
            HiveError::Fabrication(_) => "fabrication",
            HiveError::InterceptorCycle { .. } => "ordering",
            HiveError::Translation { .. } => "translation",
            HiveError::RegistryShutdown | HiveError::AlreadyStarted => "lifecycle",
            HiveError::Invocation(_) => "invocation",
        }
    }
}

/// Ошибка реестра, вернувшаяся через вызов метода прокси, восстанавливается как есть
impl From<InvocationError> for HiveError {
    fn from(err: InvocationError) -> Self {
        match err.cause_as::<HiveError>() {
            Some(original) => original.clone(),
            None => HiveError::Invocation(err),
        }
    }
}

impl From<HiveError> for InvocationError {
    fn from(err: HiveError) -> Self {
        match err {
            HiveError::Invocation(inner) => inner,
            other => {
                let message = other.to_string();
                InvocationError::with_cause(APPLICATION_RUNTIME_EXCEPTION, message, other)
            }
        }
    }
}

/// Helper trait для добавления контекста при переходе к anyhow
pub trait HiveContextExt<T> {
    fn hive_context(self, message: &str) -> anyhow::Result<T>;
    fn hive_with_context<F>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> HiveContextExt<T> for Result<T, HiveError> {
    fn hive_context(self, message: &str) -> anyhow::Result<T> {
        self.map_err(anyhow::Error::from)
            .with_context(|| message.to_string())
    }

    fn hive_with_context<F>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(anyhow::Error::from).with_context(f)
    }
}

/// Обработчик восстановимых ошибок
pub trait ErrorHandler: Send + Sync {
    fn error(
        &self,
        log: &dyn ServiceLog,
        message: &str,
        location: Option<&Location>,
        cause: Option<&HiveError>,
    ) -> Result<(), HiveError>;
}

/// Записывает ошибку в журнал и продолжает работу
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn error(
        &self,
        log: &dyn ServiceLog,
        message: &str,
        location: Option<&Location>,
        cause: Option<&HiveError>,
    ) -> Result<(), HiveError> {
        let mut text = message.to_string();
        if let Some(location) = location {
            text.push_str(&format!(" [{}]", location));
        }
        if let Some(cause) = cause {
            text.push_str(&format!(": {}", cause));
        }
        log.error(&text);
        Ok(())
    }
}

/// Превращает каждую восстановимую ошибку в фатальную
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictErrorHandler;

impl ErrorHandler for StrictErrorHandler {
    fn error(
        &self,
        log: &dyn ServiceLog,
        message: &str,
        location: Option<&Location>,
        cause: Option<&HiveError>,
    ) -> Result<(), HiveError> {
        log.error(message);
        match cause {
            Some(cause) if location.is_none() => Err(cause.clone()),
            _ => Err(HiveError::configuration(message, location.cloned())),
        }
    }
}

/// ErrorHandler, привязанный к журналу
#[derive(Clone)]
pub struct ErrorLog {
    handler: Arc<dyn ErrorHandler>,
    log: Arc<dyn ServiceLog>,
}

impl ErrorLog {
    pub fn new(handler: Arc<dyn ErrorHandler>, log: Arc<dyn ServiceLog>) -> Self {
        Self { handler, log }
    }

    pub fn error(&self, message: &str, location: Option<&Location>, cause: Option<&HiveError>) -> Result<(), HiveError> {
        self.handler.error(self.log.as_ref(), message, location, cause)
    }
}

impl fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorLog").field("log", &self.log.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogFactory, LogLevel, RecordingLogFactory};

    #[test]
    fn test_construction_failed_wraps_and_reports_root_cause() {
        let inner = HiveError::configuration("bad literal", Some(Location::at_line("mod.toml", 12)));
        let error = HiveError::construction_failed("mod.Simple", ConstructionPhase::CoreImplementation, inner);

        assert_eq!(error.category(), "construction");
        assert!(error.to_string().contains("Failure building service mod.Simple"));
        assert!(matches!(error.root_cause(), HiveError::Configuration { .. }));
        assert_eq!(error.location().map(|l| l.to_string()), Some("mod.toml, line 12".to_string()));
    }

    #[test]
    fn test_fatal_errors_are_not_wrapped() {
        let error = HiveError::construction_failed(
            "mod.Simple",
            ConstructionPhase::CoreImplementation,
            HiveError::RecursiveConstruction {
                service_id: "mod.Simple".to_string(),
            },
        );
        assert!(matches!(error, HiveError::RecursiveConstruction { .. }));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_invocation_round_trip_recovers_registry_error() {
        let invocation: InvocationError = HiveError::RegistryShutdown.into();
        assert_eq!(invocation.exception_type, APPLICATION_RUNTIME_EXCEPTION);

        let recovered: HiveError = invocation.into();
        assert!(matches!(recovered, HiveError::RegistryShutdown));

        let plain: HiveError = InvocationError::runtime("boom").into();
        assert!(matches!(plain, HiveError::Invocation(_)));
    }

    #[test]
    fn test_default_handler_logs_and_continues() {
        let factory = RecordingLogFactory::new(LogLevel::Debug);
        let error_log = ErrorLog::new(Arc::new(DefaultErrorHandler), factory.get_log("hivemind.Registry"));

        let result = error_log.error(
            "Unknown interceptor",
            Some(&Location::new("mod.toml")),
            None,
        );
        assert!(result.is_ok());
        assert_eq!(
            factory.messages_for("hivemind.Registry"),
            vec!["Unknown interceptor [mod.toml]".to_string()]
        );
    }

    #[test]
    fn test_strict_handler_escalates() {
        let factory = RecordingLogFactory::new(LogLevel::Debug);
        let error_log = ErrorLog::new(Arc::new(StrictErrorHandler), factory.get_log("hivemind.Registry"));

        let err = error_log.error("Contribution rejected", None, None).unwrap_err();
        assert!(matches!(err, HiveError::Configuration { .. }));
    }

    #[test]
    fn test_context_chaining() {
        let result: Result<(), HiveError> = Err(HiveError::ModuleNotFound {
            id: "missing".to_string(),
        });
        let message = result.hive_context("During lookup").unwrap_err().to_string();
        assert!(message.contains("During lookup"));
    }
}
