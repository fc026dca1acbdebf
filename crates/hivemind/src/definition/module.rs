use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::configuration::{ConfigurationPointDefinition, ContributionDefinition};
use super::service::{ImplementationDefinition, InterceptorDefinition, ServicePointDefinition, Visibility};
use crate::errors::Location;
use crate::interceptors::ServiceInterceptorFactory;
use crate::models::ServiceModelFactory;
use crate::translator::Translator;

/// Реализация, предоставленная модулем для точки сервиса другого модуля
#[derive(Debug, Clone)]
pub struct ImplementationContribution {
    pub service_id: String,
    pub definition: ImplementationDefinition,
}

/// Перехватчик, добавленный модулем к точке сервиса другого модуля
#[derive(Debug, Clone)]
pub struct InterceptorContribution {
    pub service_id: String,
    pub definition: InterceptorDefinition,
}

/// Именованная фабрика перехватчиков
#[derive(Clone)]
pub struct InterceptorFactoryDefinition {
    pub id: String,
    pub visibility: Visibility,
    pub factory: Arc<dyn ServiceInterceptorFactory>,
    pub location: Option<Location>,
}

impl InterceptorFactoryDefinition {
    pub fn new(id: impl Into<String>, factory: Arc<dyn ServiceInterceptorFactory>) -> Self {
        Self {
            id: id.into(),
            visibility: Visibility::Public,
            factory,
            location: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }
}

impl fmt::Debug for InterceptorFactoryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorFactoryDefinition")
            .field("id", &self.id)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

/// Модель сервиса, добавленная модулем
#[derive(Clone)]
pub struct ServiceModelContribution {
    pub name: String,
    pub factory: Arc<dyn ServiceModelFactory>,
}

impl fmt::Debug for ServiceModelContribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceModelContribution")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Транслятор, добавленный модулем
#[derive(Clone)]
pub struct TranslatorContribution {
    pub name: String,
    pub translator: Arc<dyn Translator>,
}

impl fmt::Debug for TranslatorContribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorContribution")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Модуль: пространство имён для точек сервисов и конфигураций
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    pub id: String,
    pub service_points: Vec<ServicePointDefinition>,
    pub configuration_points: Vec<ConfigurationPointDefinition>,
    pub contributions: Vec<ContributionDefinition>,
    pub implementations: Vec<ImplementationContribution>,
    pub interceptors: Vec<InterceptorContribution>,
    pub interceptor_factories: Vec<InterceptorFactoryDefinition>,
    pub service_models: Vec<ServiceModelContribution>,
    pub translators: Vec<TranslatorContribution>,
    pub messages: BTreeMap<String, String>,
    /// Сервисы, которые строятся при `Registry::startup()`
    pub eager_load: Vec<String>,
    /// Сервисы `hivemind.Runnable`, запускаемые при `Registry::startup()`
    pub startup: Vec<String>,
    pub location: Option<Location>,
}

impl ModuleDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service_points: Vec::new(),
            configuration_points: Vec::new(),
            contributions: Vec::new(),
            implementations: Vec::new(),
            interceptors: Vec::new(),
            interceptor_factories: Vec::new(),
            service_models: Vec::new(),
            translators: Vec::new(),
            messages: BTreeMap::new(),
            eager_load: Vec::new(),
            startup: Vec::new(),
            location: None,
        }
    }

    pub fn add_service_point(mut self, point: ServicePointDefinition) -> Self {
        self.service_points.push(point);
        self
    }

    pub fn add_configuration_point(mut self, point: ConfigurationPointDefinition) -> Self {
        self.configuration_points.push(point);
        self
    }

    pub fn add_contribution(mut self, contribution: ContributionDefinition) -> Self {
        self.contributions.push(contribution);
        self
    }

    pub fn contribute_implementation(mut self, service_id: impl Into<String>, definition: ImplementationDefinition) -> Self {
        self.implementations.push(ImplementationContribution {
            service_id: service_id.into(),
            definition,
        });
        self
    }

    pub fn contribute_interceptor(mut self, service_id: impl Into<String>, definition: InterceptorDefinition) -> Self {
        self.interceptors.push(InterceptorContribution {
            service_id: service_id.into(),
            definition,
        });
        self
    }

    pub fn add_interceptor_factory(mut self, factory: InterceptorFactoryDefinition) -> Self {
        self.interceptor_factories.push(factory);
        self
    }

    pub fn add_service_model(mut self, name: impl Into<String>, factory: Arc<dyn ServiceModelFactory>) -> Self {
        self.service_models.push(ServiceModelContribution {
            name: name.into(),
            factory,
        });
        self
    }

    pub fn add_translator(mut self, name: impl Into<String>, translator: Arc<dyn Translator>) -> Self {
        self.translators.push(TranslatorContribution {
            name: name.into(),
            translator,
        });
        self
    }

    pub fn add_message(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.messages.insert(key.into(), text.into());
        self
    }

    pub fn eager_load(mut self, service_id: impl Into<String>) -> Self {
        self.eager_load.push(service_id.into());
        self
    }

    pub fn run_at_startup(mut self, service_id: impl Into<String>) -> Self {
        self.startup.push(service_id.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Полный id для id, заданного относительно модуля
    pub fn qualify(&self, id: &str) -> String {
        qualify_id(&self.id, id)
    }
}

/// Граф модулей, из которого строится реестр
#[derive(Debug, Clone, Default)]
pub struct RegistryDefinition {
    pub modules: Vec<ModuleDefinition>,
}

impl RegistryDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(mut self, module: ModuleDefinition) -> Self {
        self.modules.push(module);
        self
    }

    pub fn module(&self, id: &str) -> Option<&ModuleDefinition> {
        self.modules.iter().find(|m| m.id == id)
    }
}

/// Id без точки считается локальным для модуля; `*` не квалифицируется
pub fn qualify_id(module_id: &str, id: &str) -> String {
    if id == "*" || id.contains('.') {
        id.to_string()
    } else {
        format!("{}.{}", module_id, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_id() {
        assert_eq!(qualify_id("mod", "Simple"), "mod.Simple");
        assert_eq!(qualify_id("mod", "other.Simple"), "other.Simple");
        assert_eq!(qualify_id("mod", "*"), "*");
    }

    #[test]
    fn test_module_builder_collects_declarations() {
        let module = ModuleDefinition::new("hivemind.test")
            .add_service_point(ServicePointDefinition::new("Adder", "hivemind.test.Adder"))
            .add_message("greeting", "Hello {0}")
            .eager_load("Adder");

        assert_eq!(module.service_points.len(), 1);
        assert_eq!(module.qualify("Adder"), "hivemind.test.Adder");
        assert_eq!(module.messages.get("greeting").map(String::as_str), Some("Hello {0}"));

        let registry = RegistryDefinition::new().add_module(module);
        assert!(registry.module("hivemind.test").is_some());
    }
}
