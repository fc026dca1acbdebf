//! Модель определений реестра
//!
//! Неизменяемый после построения реестра граф: модули, точки сервисов и
//! конфигураций, реализации, перехватчики и вклады. Происхождение графа
//! (файлы, сканирование, код) реестру безразлично.

mod configuration;
mod module;
mod service;

pub use configuration::{
    AttributeModel, ConfigurationPointDefinition, ContributionDefinition, ContributionSchema, Element, Occurrences,
};
pub use module::{
    qualify_id, ImplementationContribution, InterceptorContribution, InterceptorFactoryDefinition, ModuleDefinition,
    RegistryDefinition, ServiceModelContribution, TranslatorContribution,
};
pub use service::{ImplementationDefinition, InterceptorDefinition, ServicePointDefinition, Visibility};
