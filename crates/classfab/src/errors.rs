//! Ошибки слоя фабрикации классов
//!
//! - **FabricationError**: ошибки построения и инстанцирования классов
//! - **BuildCause**: первопричина отказа при построении класса
//! - **InvocationError**: "исключение", выброшенное телом метода во время вызова
//!
//! Все ошибки построения класса сводятся к одному варианту
//! `FabricationError::UnableToBuild`, несущему имя класса и первопричину.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Тип исключения, которому соответствует любое `InvocationError` в catch-блоках.
pub const THROWABLE: &str = "Throwable";

/// Тип исключения по умолчанию для ошибок времени выполнения.
pub const RUNTIME_EXCEPTION: &str = "RuntimeException";

/// Исключения, которые конструктору не нужно объявлять
const UNCHECKED_EXCEPTIONS: &[&str] = &[
    RUNTIME_EXCEPTION,
    "IllegalArgumentException",
    "NoSuchFieldException",
    "NoSuchMethodException",
    "NullPointerException",
    "ClassCastException",
];

/// Первопричина отказа при построении класса или интерфейса
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildCause {
    #[error("superclass {superclass} is final and may not be subclassed")]
    FinalSuperclass { superclass: String },

    #[error("a class or interface named {name} already exists")]
    NameCollision { name: String },

    #[error("method {signature} is already defined")]
    DuplicateMethod { signature: String },

    #[error("method {signature} is final in {declared_by} and may not be overridden")]
    FinalMethod {
        signature: String,
        declared_by: String,
    },

    #[error("field {name} is already defined")]
    DuplicateField { name: String },

    #[error("a constructor taking ({parameters}) is already defined")]
    DuplicateConstructor { parameters: String },

    #[error("class does not implement {interface}.{method}")]
    MissingImplementation { interface: String, method: String },

    #[error("malformed body for {member}: {reason}")]
    MalformedBody { member: String, reason: String },
}

/// Основной error type для операций ClassFactory
#[derive(Debug, Error, Clone)]
pub enum FabricationError {
    /// Класс или интерфейс не удалось построить
    #[error("Unable to build class {class_name}: {cause}")]
    UnableToBuild {
        class_name: String,
        #[source]
        cause: BuildCause,
    },

    /// Экземпляр класса не удалось создать
    #[error("Unable to instantiate {class_name}: {reason}")]
    Instantiation { class_name: String, reason: String },

    /// Запрошенный тип не объявлен в фабрике
    #[error("Class or interface {name} is not defined")]
    UnknownType { name: String },
}

impl FabricationError {
    pub(crate) fn unable_to_build(class_name: impl Into<String>, cause: BuildCause) -> Self {
        FabricationError::UnableToBuild {
            class_name: class_name.into(),
            cause,
        }
    }

    /// Имя класса, к которому относится ошибка
    pub fn class_name(&self) -> &str {
        match self {
            FabricationError::UnableToBuild { class_name, .. } => class_name,
            FabricationError::Instantiation { class_name, .. } => class_name,
            FabricationError::UnknownType { name } => name,
        }
    }

    /// Первопричина отказа построения (если есть)
    pub fn build_cause(&self) -> Option<&BuildCause> {
        match self {
            FabricationError::UnableToBuild { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// Исключение, выброшенное методом фабрицированного или динамического объекта.
///
/// `exception_type` используется для сопоставления с catch-блоками и для
/// журналирования; `cause` сохраняет исходную ошибку (например, ошибку реестра)
/// чтобы её можно было восстановить по другую сторону прокси.
#[derive(Clone)]
pub struct InvocationError {
    pub exception_type: String,
    pub message: String,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl InvocationError {
    pub fn new(exception_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception_type: exception_type.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Исключение с сохранённой первопричиной
    pub fn with_cause<E>(exception_type: impl Into<String>, message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            exception_type: exception_type.into(),
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(RUNTIME_EXCEPTION, message)
    }

    pub fn no_such_method(class_name: &str, method: &str) -> Self {
        Self::new(
            "NoSuchMethodException",
            format!("{} does not implement method {}", class_name, method),
        )
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new("IllegalArgumentException", message)
    }

    /// Соответствует ли исключение catch-блоку указанного типа
    pub fn is_instance_of(&self, exception_type: &str) -> bool {
        exception_type == THROWABLE || exception_type == self.exception_type
    }

    /// Исключение времени выполнения, не требующее объявления
    pub fn is_unchecked(&self) -> bool {
        UNCHECKED_EXCEPTIONS.contains(&self.exception_type.as_str())
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Попытаться восстановить первопричину конкретного типа
    pub fn cause_as<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause.as_deref().and_then(|c| c.downcast_ref::<E>())
    }
}

impl fmt::Debug for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationError")
            .field("exception_type", &self.exception_type)
            .field("message", &self.message)
            .field("has_cause", &self.cause.is_some())
            .finish()
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception_type, self.message)
    }
}

impl StdError for InvocationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref() as &(dyn StdError + 'static)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[test]
    fn test_unable_to_build_carries_name_and_cause() {
        let error = FabricationError::unable_to_build(
            "Widget",
            BuildCause::DuplicateField {
                name: "_log".to_string(),
            },
        );

        assert_eq!(error.class_name(), "Widget");
        assert!(error.to_string().contains("Widget"));
        assert!(error.to_string().contains("_log"));
        assert!(matches!(
            error.build_cause(),
            Some(BuildCause::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_throwable_matches_everything() {
        let error = InvocationError::new("IOException", "boom");
        assert!(error.is_instance_of(THROWABLE));
        assert!(error.is_instance_of("IOException"));
        assert!(!error.is_instance_of("SQLException"));
    }

    #[test]
    fn test_cause_round_trip() {
        let error = InvocationError::with_cause(RUNTIME_EXCEPTION, "wrapped", DiskError);
        assert!(error.cause_as::<DiskError>().is_some());
        assert!(StdError::source(&error).is_some());
        assert_eq!(error.to_string(), "RuntimeException: wrapped");
    }
}
