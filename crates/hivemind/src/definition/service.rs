use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::configuration::Element;
use crate::errors::{HiveError, Location};
use crate::implementation::{ConstructionContext, ServiceImplementationFactory};
use crate::ServiceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    /// Виден только модулю-владельцу
    Private,
}

/// Как построить базовую реализацию сервиса
#[derive(Clone)]
pub struct ImplementationDefinition {
    pub factory: Arc<dyn ServiceImplementationFactory>,
    pub location: Option<Location>,
}

impl ImplementationDefinition {
    pub fn new(factory: Arc<dyn ServiceImplementationFactory>) -> Self {
        Self {
            factory,
            location: None,
        }
    }

    /// Реализация из замыкания
    pub fn from_fn<F>(factory: F) -> Self
    where
        F: Fn(&ConstructionContext<'_>) -> Result<ServiceRef, HiveError> + Send + Sync + 'static,
    {
        Self::new(Arc::new(factory))
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Debug for ImplementationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationDefinition")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Применение фабрики перехватчиков к сервису
#[derive(Debug, Clone)]
pub struct InterceptorDefinition {
    /// Id фабрики перехватчиков (полный или относительно модуля-вкладчика)
    pub factory_id: String,
    /// Имя для упорядочивания; по умолчанию совпадает с id фабрики
    pub name: Option<String>,
    /// Имена перехватчиков, которые этот должен предварять (или `*`)
    pub preceding: Vec<String>,
    /// Имена перехватчиков, за которыми этот должен следовать (или `*`)
    pub following: Vec<String>,
    pub parameters: Vec<Element>,
    pub location: Option<Location>,
}

impl InterceptorDefinition {
    pub fn new(factory_id: impl Into<String>) -> Self {
        Self {
            factory_id: factory_id.into(),
            name: None,
            preceding: Vec::new(),
            following: Vec::new(),
            parameters: Vec::new(),
            location: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn precedes(mut self, name: impl Into<String>) -> Self {
        self.preceding.push(name.into());
        self
    }

    pub fn follows(mut self, name: impl Into<String>) -> Self {
        self.following.push(name.into());
        self
    }

    pub fn with_parameter(mut self, element: Element) -> Self {
        self.parameters.push(element);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn ordering_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.factory_id)
    }
}

/// Объявление точки сервиса
#[derive(Debug, Clone)]
pub struct ServicePointDefinition {
    /// Id внутри модуля; полный id = `<module-id>.<id>`
    pub id: String,
    pub interface_name: String,
    pub visibility: Visibility,
    /// Модель сервиса; None = модель по умолчанию из конфигурации
    pub service_model: Option<String>,
    pub implementations: Vec<ImplementationDefinition>,
    pub interceptors: Vec<InterceptorDefinition>,
    pub location: Option<Location>,
}

impl ServicePointDefinition {
    pub fn new(id: impl Into<String>, interface_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            interface_name: interface_name.into(),
            visibility: Visibility::Public,
            service_model: None,
            implementations: Vec::new(),
            interceptors: Vec::new(),
            location: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn with_service_model(mut self, model: impl Into<String>) -> Self {
        self.service_model = Some(model.into());
        self
    }

    pub fn with_implementation(mut self, implementation: ImplementationDefinition) -> Self {
        self.implementations.push(implementation);
        self
    }

    pub fn with_interceptor(mut self, interceptor: InterceptorDefinition) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}
