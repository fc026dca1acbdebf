//! Модуль во время выполнения: разрешение id относительно модуля, трансляция
//! литералов, доступ к общим службам реестра

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use classfab::{ClassFactory, Value, ValueType};

use super::configuration_point::ConfigurationItem;
use super::shutdown::ShutdownCoordinator;
use super::thread_events::ThreadEventNotifier;
use crate::config::RegistryConfig;
use crate::definition::qualify_id;
use crate::errors::{ErrorLog, HiveError, Location};
use crate::log::LogFactory;
use crate::messages::ModuleMessages;
use crate::models::ServiceModelFactory;
use crate::registry::RegistryInner;
use crate::translator::{Translator, TranslatorManager};
use crate::ServiceRef;

/// Службы, общие для всех модулей и точек реестра
pub struct RegistryServices {
    pub config: RegistryConfig,
    pub class_factory: ClassFactory,
    pub log_factory: Arc<dyn LogFactory>,
    pub error_log: ErrorLog,
    pub shutdown: ShutdownCoordinator,
    pub thread_events: ThreadEventNotifier,
    pub translators: TranslatorManager,
    pub service_models: BTreeMap<String, Arc<dyn ServiceModelFactory>>,
}

impl fmt::Debug for RegistryServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryServices")
            .field("name", &self.config.name)
            .field("service_models", &self.service_models.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

pub struct ModuleImpl {
    id: String,
    registry: Weak<RegistryInner>,
    services: Arc<RegistryServices>,
    messages: Arc<ModuleMessages>,
    location: Option<Location>,
}

impl ModuleImpl {
    pub(crate) fn new(
        id: String,
        registry: Weak<RegistryInner>,
        services: Arc<RegistryServices>,
        messages: BTreeMap<String, String>,
        location: Option<Location>,
    ) -> Self {
        let messages = Arc::new(ModuleMessages::new(id.clone(), messages));
        Self {
            id,
            registry,
            services,
            messages,
            location,
        }
    }

    pub fn module_id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Полный id для id, заданного относительно этого модуля
    pub fn qualify(&self, id: &str) -> String {
        qualify_id(&self.id, id)
    }

    pub(crate) fn registry(&self) -> Result<Arc<RegistryInner>, HiveError> {
        self.registry.upgrade().ok_or(HiveError::RegistryShutdown)
    }

    pub(crate) fn services(&self) -> &Arc<RegistryServices> {
        &self.services
    }

    /// Сервис по id (видимость проверяется относительно этого модуля)
    pub fn get_service(&self, service_id: &str, interface: &str) -> Result<ServiceRef, HiveError> {
        self.registry()?.get_service(service_id, interface, Some(&self.id))
    }

    /// Сервис по id с объявленным интерфейсом точки
    pub fn get_service_untyped(&self, service_id: &str) -> Result<ServiceRef, HiveError> {
        let registry = self.registry()?;
        let point = registry.resolve_service_point(service_id, Some(&self.id))?;
        point.get_service(point.interface_name())
    }

    pub fn get_service_by_interface(&self, interface: &str) -> Result<ServiceRef, HiveError> {
        self.registry()?.get_service_by_interface(interface, Some(&self.id))
    }

    /// Есть ли ровно одна видимая точка с таким интерфейсом
    pub fn contains_service(&self, interface: &str) -> bool {
        self.registry()
            .map(|r| r.service_point_for_interface(interface, Some(&self.id)).is_ok())
            .unwrap_or(false)
    }

    pub fn get_configuration(&self, configuration_id: &str) -> Result<Arc<Vec<ConfigurationItem>>, HiveError> {
        self.registry()?.get_configuration(configuration_id, Some(&self.id))
    }

    pub fn messages(&self) -> &Arc<ModuleMessages> {
        &self.messages
    }

    pub fn class_factory(&self) -> &ClassFactory {
        &self.services.class_factory
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.services.error_log
    }

    pub fn log_factory(&self) -> &Arc<dyn LogFactory> {
        &self.services.log_factory
    }

    pub fn thread_events(&self) -> &ThreadEventNotifier {
        &self.services.thread_events
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.services.shutdown
    }

    pub fn translator(&self, spec: &str) -> Result<Arc<dyn Translator>, HiveError> {
        self.services.translators.get_translator(spec)
    }

    /// Развернуть символы и перевести литерал (префикс `name:` или smart)
    pub fn translate(&self, target: &ValueType, literal: &str, location: Option<&Location>) -> Result<Value, HiveError> {
        let expanded = self.expand_symbols(literal, location)?;
        self.services.translators.translate(self, target, &expanded, location)
    }

    /// Перевести литерал указанным транслятором (None = как `translate`)
    pub fn translate_with(
        &self,
        spec: Option<&str>,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        match spec {
            Some(spec) => {
                let expanded = self.expand_symbols(literal, location)?;
                self.translator(spec)?.translate(self, target, &expanded, location)
            }
            None => self.translate(target, literal, location),
        }
    }

    /// `${name}` из таблицы символов реестра, затем из окружения
    pub fn expand_symbols(&self, text: &str, location: Option<&Location>) -> Result<String, HiveError> {
        expand_symbols(text, &self.services.config.symbols, &self.services.error_log, location)
    }
}

impl fmt::Debug for ModuleImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleImpl")
            .field("id", &self.id)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_symbols(
    text: &str,
    symbols: &BTreeMap<String, String>,
    error_log: &ErrorLog,
    location: Option<&Location>,
) -> Result<String, HiveError> {
    if !text.contains("${") {
        return Ok(text.to_string());
    }

    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return Ok(result);
        };

        let name = &after[..end];
        match symbols.get(name).cloned().or_else(|| std::env::var(name).ok()) {
            Some(value) => result.push_str(&value),
            None => {
                error_log.error(&format!("No value available for symbol '{}'", name), location, None)?;
                result.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}
