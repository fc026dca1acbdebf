//! HiveMind: реестр сервисов и конфигураций
//!
//! Модули объявляют точки сервисов (интерфейс, модель, реализация,
//! перехватчики) и точки конфигурации. Реестр строит сервисы лениво,
//! согласно модели (`singleton`, `primitive`, `threaded`, `pooled`),
//! оборачивает их цепочкой перехватчиков и отдаёт как `ServiceRef`.

use std::sync::Arc;

use classfab::ServiceObject;

pub mod config;
pub mod definition;
pub mod errors;
pub mod implementation;
pub mod interceptors;
pub mod lifecycle;
pub mod log;
pub mod messages;
pub mod models;
pub mod order;
pub mod registry;
pub mod runtime;
pub mod translator;

/// Объект сервиса, как его видят клиенты реестра
pub type ServiceRef = Arc<dyn ServiceObject>;

pub use config::{ConfigurationLoader, ErrorHandlingMode, RegistryConfig};
pub use definition::{
    AttributeModel, ConfigurationPointDefinition, ContributionDefinition, ContributionSchema, Element,
    ImplementationDefinition, InterceptorDefinition, InterceptorFactoryDefinition, ModuleDefinition, Occurrences,
    RegistryDefinition, ServicePointDefinition, Visibility,
};
pub use errors::{ErrorHandler, ErrorLog, HiveContextExt, HiveError, Location};
pub use implementation::{BuilderFacet, BuilderFactory, ConstructionContext, ServiceImplementationFactory};
pub use interceptors::{InterceptorStack, MethodInterceptor, MethodInvocation, ServiceInterceptorFactory};
pub use log::{LogFactory, LogLevel, RecordingLogFactory, ServiceLog, TracingLogFactory};
pub use registry::{Registry, RegistryBuilder};
pub use runtime::{ConfigurationItem, ConfigurationItems, ModuleImpl, ServicePointImpl};
