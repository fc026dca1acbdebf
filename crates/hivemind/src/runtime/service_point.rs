//! Точка сервиса: интерфейс, модель, реализация и цепочка перехватчиков

use std::fmt;
use std::sync::{Arc, Weak};

use classfab::{ClassFactory, InterfaceDescriptor};
use once_cell::sync::OnceCell;

use super::construction::{ConstructionGate, ConstructionState, ReentrancyTracker};
use super::module::{ModuleImpl, RegistryServices};
use crate::definition::{ImplementationDefinition, InterceptorDefinition, Visibility};
use crate::errors::{ConstructionPhase, HiveError, Location};
use crate::implementation::ConstructionContext;
use crate::interceptors::{InterceptorStack, ServiceInterceptorFactory};
use crate::log::ServiceLog;
use crate::models::ServiceModel;
use crate::order::Orderer;
use crate::ServiceRef;

/// Результат построения: базовая реализация и объект после перехватчиков
#[derive(Clone)]
pub struct BuiltService {
    pub core: ServiceRef,
    pub service: ServiceRef,
}

/// Перехватчик с разрешённой фабрикой; имена уже квалифицированы
#[derive(Clone)]
pub(crate) struct ResolvedInterceptor {
    pub name: String,
    pub factory_id: String,
    pub factory: Arc<dyn ServiceInterceptorFactory>,
    pub definition: InterceptorDefinition,
    pub module: Arc<ModuleImpl>,
    pub preceding: Vec<String>,
    pub following: Vec<String>,
}

pub(crate) struct ServicePointParts {
    pub id: String,
    pub local_id: String,
    pub interface_name: String,
    pub visibility: Visibility,
    pub model_name: String,
    pub module: Arc<ModuleImpl>,
    pub implementation: Option<(ImplementationDefinition, Arc<ModuleImpl>)>,
    pub interceptors: Vec<ResolvedInterceptor>,
    pub location: Option<Location>,
}

pub struct ServicePointImpl {
    self_ref: Weak<ServicePointImpl>,
    id: String,
    local_id: String,
    interface_name: String,
    visibility: Visibility,
    model_name: String,
    module: Arc<ModuleImpl>,
    implementation: Option<(ImplementationDefinition, Arc<ModuleImpl>)>,
    interceptors: Vec<ResolvedInterceptor>,
    interface: OnceCell<Arc<InterfaceDescriptor>>,
    model: OnceCell<Arc<dyn ServiceModel>>,
    ordered: OnceCell<Vec<ResolvedInterceptor>>,
    gate: ConstructionGate<ServiceRef>,
    reentrancy: ReentrancyTracker,
    log: Arc<dyn ServiceLog>,
    location: Option<Location>,
}

impl ServicePointImpl {
    pub(crate) fn new(parts: ServicePointParts) -> Arc<Self> {
        let log = parts.module.log_factory().get_log(&parts.id);
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            gate: ConstructionGate::new(parts.id.clone()),
            reentrancy: ReentrancyTracker::new(parts.id.clone()),
            id: parts.id,
            local_id: parts.local_id,
            interface_name: parts.interface_name,
            visibility: parts.visibility,
            model_name: parts.model_name,
            module: parts.module,
            implementation: parts.implementation,
            interceptors: parts.interceptors,
            interface: OnceCell::new(),
            model: OnceCell::new(),
            ordered: OnceCell::new(),
            log,
            location: parts.location,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn module(&self) -> &Arc<ModuleImpl> {
        &self.module
    }

    pub fn log(&self) -> &Arc<dyn ServiceLog> {
        &self.log
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn class_factory(&self) -> &ClassFactory {
        self.module.class_factory()
    }

    pub(crate) fn services(&self) -> &Arc<RegistryServices> {
        self.module.services()
    }

    pub fn is_visible_to(&self, module_id: Option<&str>) -> bool {
        self.visibility == Visibility::Public || module_id == Some(self.module.module_id())
    }

    /// Состояние кэша точки (для singleton - построен ли прокси)
    pub fn construction_state(&self) -> ConstructionState {
        self.gate.state()
    }

    /// Интерфейс разрешается в ClassFactory при первом обращении
    pub fn interface(&self) -> Result<Arc<InterfaceDescriptor>, HiveError> {
        self.interface
            .get_or_try_init(|| {
                self.class_factory()
                    .require_interface(&self.interface_name)
                    .map_err(HiveError::from)
            })
            .cloned()
    }

    pub fn service_model(&self) -> Result<Arc<dyn ServiceModel>, HiveError> {
        self.model
            .get_or_try_init(|| {
                let factory = self.services().service_models.get(&self.model_name).ok_or_else(|| {
                    HiveError::UnknownServiceModel {
                        model: self.model_name.clone(),
                        service_id: self.id.clone(),
                    }
                })?;
                let this = self.self_ref.upgrade().ok_or(HiveError::RegistryShutdown)?;
                factory
                    .create_service_model(&this)
                    .map_err(|e| HiveError::construction_failed(&self.id, ConstructionPhase::ServiceModel, e))
            })
            .cloned()
    }

    /// Сервис, совместимый с запрошенным интерфейсом
    pub fn get_service(&self, requested: &str) -> Result<ServiceRef, HiveError> {
        self.services().shutdown.check()?;

        let interface = self.interface()?;
        if !interface.is_assignable_to(requested) {
            return Err(HiveError::InterfaceMismatch {
                service_id: self.id.clone(),
                declared: self.interface_name.clone(),
                requested: requested.to_string(),
            });
        }

        let model = self.service_model()?;
        if model.is_cacheable() {
            self.gate.get_or_try_init(|| model.get_service())
        } else {
            let _guard = self.reentrancy.enter()?;
            model.get_service()
        }
    }

    /// Eager load: построить реализацию, если модель это поддерживает
    pub fn force_service_instantiation(&self) -> Result<bool, HiveError> {
        let model = self.service_model()?;
        if !model.is_realizable() {
            return Ok(false);
        }
        model.instantiate_service()?;
        Ok(true)
    }

    /// Построить базовую реализацию и обернуть её перехватчиками
    pub fn construct_service_implementation(&self) -> Result<BuiltService, HiveError> {
        self.services().shutdown.check()?;

        let core = self
            .construct_core_implementation()
            .map_err(|e| HiveError::construction_failed(&self.id, ConstructionPhase::CoreImplementation, e))?;
        let service = self
            .apply_interceptors(core.clone())
            .map_err(|e| HiveError::construction_failed(&self.id, ConstructionPhase::Interceptors, e))?;

        Ok(BuiltService { core, service })
    }

    fn construct_core_implementation(&self) -> Result<ServiceRef, HiveError> {
        self.log
            .debug(&format!("Constructing core service implementation for service {}", self.id));

        let interface = self.interface()?;
        let core: ServiceRef = match &self.implementation {
            Some((definition, contributor)) => {
                let ctx = ConstructionContext::new(self, contributor, definition.location.as_ref());
                definition.factory.create_core_implementation(&ctx)?
            }
            None => {
                let class = self.class_factory().default_implementation(&interface)?;
                let object: ServiceRef = class.new_instance(&[])?;
                object
            }
        };

        if !core.implements(interface.name()) {
            return Err(HiveError::InterfaceMismatch {
                service_id: self.id.clone(),
                declared: core.class_name().to_string(),
                requested: interface.name().to_string(),
            });
        }
        Ok(core)
    }

    /// Перехватчики в отсортированном порядке; первый оказывается внешним
    fn ordered_interceptors(&self) -> Result<&[ResolvedInterceptor], HiveError> {
        self.ordered
            .get_or_try_init(|| {
                let mut orderer = Orderer::new(self.id.clone());
                for interceptor in &self.interceptors {
                    orderer.add(
                        interceptor.clone(),
                        interceptor.name.clone(),
                        &interceptor.preceding,
                        &interceptor.following,
                        interceptor.definition.location.clone(),
                    )?;
                }
                orderer.into_ordered(&self.services().error_log)
            })
            .map(Vec::as_slice)
    }

    fn apply_interceptors(&self, core: ServiceRef) -> Result<ServiceRef, HiveError> {
        let ordered = self.ordered_interceptors()?;
        if ordered.is_empty() {
            return Ok(core);
        }

        let mut stack = InterceptorStack::new(self.id.clone(), self.interface()?, self.log.clone(), core);

        for interceptor in ordered.iter().rev() {
            self.log
                .debug(&format!("Applying interceptor factory {}", interceptor.factory_id));

            let result = interceptor.factory.create_interceptor(
                &mut stack,
                &interceptor.module,
                &interceptor.definition.parameters,
            );
            if let Err(e) = result {
                if e.is_fatal() {
                    return Err(e);
                }
                self.services().error_log.error(
                    &format!(
                        "Unable to add interceptor {} to service {}",
                        interceptor.name, self.id
                    ),
                    interceptor.definition.location.as_ref(),
                    Some(&e),
                )?;
            }
        }

        Ok(stack.into_top())
    }

    /// Забыть кэшированный сервис и экземпляры модели (shutdown)
    pub(crate) fn invalidate(&self) {
        self.gate.reset();
        if let Some(model) = self.model.get() {
            model.invalidate();
        }
    }
}

impl fmt::Debug for ServicePointImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePointImpl")
            .field("id", &self.id)
            .field("interface", &self.interface_name)
            .field("model", &self.model_name)
            .field("visibility", &self.visibility)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}
