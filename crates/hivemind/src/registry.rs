//! Реестр HiveMind
//!
//! `RegistryBuilder` проверяет граф определений, сообщает о проблемах в
//! ErrorLog и строит неизменяемый набор модулей, точек сервисов и точек
//! конфигурации. Сервисы строятся лениво, при первом обращении.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use classfab::{ClassFactory, ServiceObject};
use common::OperationTimer;
use tracing::{debug, info};

use crate::config::{ErrorHandlingMode, RegistryConfig};
use crate::definition::{
    qualify_id, ConfigurationPointDefinition, ContributionDefinition, ImplementationDefinition,
    InterceptorDefinition, InterceptorFactoryDefinition, ModuleDefinition, RegistryDefinition,
    ServicePointDefinition, Visibility,
};
use crate::errors::{DefaultErrorHandler, ErrorHandler, ErrorLog, HiveError, Location, StrictErrorHandler};
use crate::interceptors::{LoggingInterceptorFactory, ServiceInterceptorFactory};
use crate::lifecycle::{declare_lifecycle_interfaces, RUN, RUNNABLE};
use crate::log::{LogFactory, ServiceLog, TracingLogFactory};
use crate::messages::ModuleMessages;
use crate::models::builtin_service_models;
use crate::runtime::{
    expand_symbols, ConfigurationItems, ConfigurationPointImpl, ConfigurationPointParts, ModuleImpl,
    RegistryServices, RegistryShutdownListener, ResolvedInterceptor, ServicePointImpl, ServicePointParts,
    ShutdownCoordinator, ThreadEventNotifier,
};
use crate::translator::{Translator, TranslatorManager};
use crate::ServiceRef;

/// Модуль со встроенными службами реестра
pub const HIVEMIND_MODULE: &str = "hivemind";

const REGISTRY_LOG: &str = "hivemind.Registry";

/// Итог поиска по id
enum Resolution<T> {
    Found(T),
    NotVisible,
    NotFound,
    Ambiguous(Vec<String>),
}

/// Полный id, затем id относительно модуля вызывающего, затем уникальный
/// локальный id среди видимых точек
fn resolve_id<T: Clone>(
    entries: &BTreeMap<String, T>,
    id: &str,
    caller: Option<&str>,
    local_id: impl Fn(&T) -> &str,
    visible: impl Fn(&T, Option<&str>) -> bool,
) -> Resolution<T> {
    if let Some(entry) = entries.get(id) {
        return if visible(entry, caller) {
            Resolution::Found(entry.clone())
        } else {
            Resolution::NotVisible
        };
    }

    if let Some(module) = caller {
        if let Some(entry) = entries.get(&qualify_id(module, id)) {
            return Resolution::Found(entry.clone());
        }
    }

    if id.contains('.') {
        return Resolution::NotFound;
    }

    let mut matches: Vec<(&String, &T)> = entries
        .iter()
        .filter(|(_, entry)| local_id(entry) == id && visible(entry, caller))
        .collect();

    match matches.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Found(matches.remove(0).1.clone()),
        _ => Resolution::Ambiguous(matches.into_iter().map(|(key, _)| key.clone()).collect()),
    }
}

/// Сервис, который нужно построить или запустить при `startup()`
#[derive(Debug, Clone)]
struct StartupEntry {
    id: String,
    module: Option<String>,
    location: Option<Location>,
}

pub(crate) struct RegistryInner {
    services: Arc<RegistryServices>,
    modules: BTreeMap<String, Arc<ModuleImpl>>,
    service_points: BTreeMap<String, Arc<ServicePointImpl>>,
    configuration_points: BTreeMap<String, Arc<ConfigurationPointImpl>>,
    eager_load: Vec<StartupEntry>,
    startup: Vec<StartupEntry>,
    started: AtomicBool,
    log: Arc<dyn ServiceLog>,
}

impl RegistryInner {
    pub(crate) fn resolve_service_point(
        &self,
        id: &str,
        caller: Option<&str>,
    ) -> Result<Arc<ServicePointImpl>, HiveError> {
        self.services.shutdown.check()?;

        match resolve_id(
            &self.service_points,
            id,
            caller,
            |p| p.local_id(),
            |p, module| p.is_visible_to(module),
        ) {
            Resolution::Found(point) => Ok(point),
            Resolution::NotVisible => Err(HiveError::ServicePointNotVisible {
                id: id.to_string(),
                module: caller.unwrap_or("the application").to_string(),
            }),
            Resolution::NotFound => Err(HiveError::ServicePointNotFound { id: id.to_string() }),
            Resolution::Ambiguous(candidates) => Err(HiveError::AmbiguousServiceId {
                id: id.to_string(),
                candidates,
            }),
        }
    }

    pub(crate) fn get_service(&self, id: &str, interface: &str, caller: Option<&str>) -> Result<ServiceRef, HiveError> {
        self.resolve_service_point(id, caller)?.get_service(interface)
    }

    /// Единственная видимая точка с указанным интерфейсом
    pub(crate) fn service_point_for_interface(
        &self,
        interface: &str,
        caller: Option<&str>,
    ) -> Result<Arc<ServicePointImpl>, HiveError> {
        self.services.shutdown.check()?;

        let mut matches: Vec<&Arc<ServicePointImpl>> = self
            .service_points
            .values()
            .filter(|p| p.interface_name() == interface && p.is_visible_to(caller))
            .collect();

        match matches.len() {
            0 => Err(HiveError::NoServiceForInterface {
                interface: interface.to_string(),
            }),
            1 => Ok(matches.remove(0).clone()),
            _ => Err(HiveError::MultipleServicesForInterface {
                interface: interface.to_string(),
                ids: matches.iter().map(|p| p.id().to_string()).collect(),
            }),
        }
    }

    pub(crate) fn get_service_by_interface(&self, interface: &str, caller: Option<&str>) -> Result<ServiceRef, HiveError> {
        self.service_point_for_interface(interface, caller)?.get_service(interface)
    }

    pub(crate) fn resolve_configuration_point(
        &self,
        id: &str,
        caller: Option<&str>,
    ) -> Result<Arc<ConfigurationPointImpl>, HiveError> {
        self.services.shutdown.check()?;

        match resolve_id(
            &self.configuration_points,
            id,
            caller,
            |p| p.local_id(),
            |p, module| p.is_visible_to(module),
        ) {
            Resolution::Found(point) => Ok(point),
            Resolution::NotVisible => Err(HiveError::ConfigurationPointNotVisible {
                id: id.to_string(),
                module: caller.unwrap_or("the application").to_string(),
            }),
            Resolution::NotFound => Err(HiveError::ConfigurationPointNotFound { id: id.to_string() }),
            Resolution::Ambiguous(candidates) => Err(HiveError::AmbiguousConfigurationId {
                id: id.to_string(),
                candidates,
            }),
        }
    }

    pub(crate) fn get_configuration(&self, id: &str, caller: Option<&str>) -> Result<ConfigurationItems, HiveError> {
        self.resolve_configuration_point(id, caller)?.get_items()
    }

    fn module(&self, id: &str) -> Result<&Arc<ModuleImpl>, HiveError> {
        self.modules
            .get(id)
            .ok_or_else(|| HiveError::ModuleNotFound { id: id.to_string() })
    }

    fn report(&self, message: &str, location: Option<&Location>, cause: &HiveError) -> Result<(), HiveError> {
        if cause.is_fatal() {
            return Err(cause.clone());
        }
        self.services.error_log.error(message, location, Some(cause))
    }

    fn eager_load(&self) -> Result<usize, HiveError> {
        let mut loaded = 0;
        for entry in &self.eager_load {
            let point = match self.resolve_service_point(&entry.id, entry.module.as_deref()) {
                Ok(point) => point,
                Err(e) => {
                    self.report(
                        &format!("Unable to eager-load service {}", entry.id),
                        entry.location.as_ref(),
                        &e,
                    )?;
                    continue;
                }
            };

            match point.force_service_instantiation() {
                Ok(true) => {
                    debug!("Eager-loaded service {}", point.id());
                    loaded += 1;
                }
                Ok(false) => self.log.warn(&format!(
                    "Service {} uses the {} service model, which does not support eager loading",
                    point.id(),
                    point.model_name()
                )),
                Err(e) => self.report(
                    &format!("Unable to eager-load service {}", point.id()),
                    entry.location.as_ref(),
                    &e,
                )?,
            }
        }
        Ok(loaded)
    }

    fn run_startup_services(&self) -> Result<usize, HiveError> {
        let mut started = 0;
        for entry in &self.startup {
            let result = self.resolve_service_point(&entry.id, entry.module.as_deref()).and_then(|point| {
                let service = point.get_service(point.interface_name())?;
                if !service.implements(RUNNABLE) {
                    return Err(HiveError::configuration(
                        format!("Service {} does not implement {}", point.id(), RUNNABLE),
                        entry.location.clone(),
                    ));
                }
                service.invoke(RUN, &[])?;
                Ok(())
            });

            match result {
                Ok(()) => started += 1,
                Err(e) => self.report(
                    &format!("Unable to run startup service {}", entry.id),
                    entry.location.as_ref(),
                    &e,
                )?,
            }
        }
        Ok(started)
    }
}

/// Построенный реестр
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Сервис по id; `interface` - запрашиваемый интерфейс (объявленный или его предок)
    pub fn get_service(&self, service_id: &str, interface: &str) -> Result<ServiceRef, HiveError> {
        self.inner.get_service(service_id, interface, None)
    }

    /// Сервис единственной публичной точки с указанным интерфейсом
    pub fn get_service_by_interface(&self, interface: &str) -> Result<ServiceRef, HiveError> {
        self.inner.get_service_by_interface(interface, None)
    }

    pub fn contains_service(&self, interface: &str) -> bool {
        self.inner.service_point_for_interface(interface, None).is_ok()
    }

    /// Id публичных точек с указанным интерфейсом
    pub fn get_service_ids(&self, interface: &str) -> Result<Vec<String>, HiveError> {
        self.inner.services.shutdown.check()?;
        Ok(self
            .inner
            .service_points
            .values()
            .filter(|p| p.interface_name() == interface && p.is_visible_to(None))
            .map(|p| p.id().to_string())
            .collect())
    }

    pub fn service_point(&self, service_id: &str) -> Result<Arc<ServicePointImpl>, HiveError> {
        self.inner.resolve_service_point(service_id, None)
    }

    pub fn get_configuration(&self, configuration_id: &str) -> Result<ConfigurationItems, HiveError> {
        self.inner.get_configuration(configuration_id, None)
    }

    pub fn get_module_messages(&self, module_id: &str) -> Result<Arc<ModuleMessages>, HiveError> {
        self.inner.services.shutdown.check()?;
        Ok(self.inner.module(module_id)?.messages().clone())
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.inner.modules.keys().cloned().collect()
    }

    pub fn translator(&self, spec: &str) -> Result<Arc<dyn Translator>, HiveError> {
        self.inner.services.shutdown.check()?;
        self.inner.services.translators.get_translator(spec)
    }

    /// Подставить `${symbol}` из таблицы символов и окружения
    pub fn expand_symbols(&self, text: &str, location: Option<&Location>) -> Result<String, HiveError> {
        self.inner.services.shutdown.check()?;
        expand_symbols(
            text,
            &self.inner.services.config.symbols,
            &self.inner.services.error_log,
            location,
        )
    }

    pub fn class_factory(&self) -> &ClassFactory {
        &self.inner.services.class_factory
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.services.config
    }

    pub fn add_shutdown_listener(&self, listener: Arc<dyn RegistryShutdownListener>) -> Result<(), HiveError> {
        self.inner.services.shutdown.add_listener(listener)
    }

    /// Eager load и запуск startup-сервисов; допускается один раз
    pub fn startup(&self) -> Result<(), HiveError> {
        self.inner.services.shutdown.check()?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(HiveError::AlreadyStarted);
        }

        let mut timer = OperationTimer::new("registry_startup");
        let result = self.inner.eager_load().and_then(|loaded| {
            let started = self.inner.run_startup_services()?;
            Ok((loaded, started))
        });
        if let Ok((loaded, started)) = &result {
            timer.add_field("eager_loaded", *loaded);
            timer.add_field("startup_services", *started);
        }
        timer.finish_with_result(&result);

        let (loaded, started) = result?;
        info!("🚀 Registry started: {} eager-loaded, {} startup services", loaded, started);
        Ok(())
    }

    /// Остановить реестр: уведомить слушателей и забыть все построенные сервисы.
    /// Повторный вызов и любые операции после него возвращают `RegistryShutdown`.
    pub fn shutdown(&self) -> Result<(), HiveError> {
        let failures = self.inner.services.shutdown.shutdown()?;

        for point in self.inner.service_points.values() {
            point.invalidate();
        }
        for point in self.inner.configuration_points.values() {
            point.invalidate();
        }

        if failures > 0 {
            self.inner
                .log
                .warn(&format!("Registry shutdown completed with {} listener failures", failures));
        } else {
            self.inner.log.info("Registry shutdown completed");
        }
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.services.shutdown.is_shut_down()
    }

    /// Очистить состояние текущего потока (threaded и pooled сервисы)
    pub fn cleanup_thread(&self) -> usize {
        self.inner.services.thread_events.fire_thread_cleanup()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.inner.services.config.name)
            .field("modules", &self.inner.modules.len())
            .field("service_points", &self.inner.service_points.len())
            .field("configuration_points", &self.inner.configuration_points.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Точка сервиса до создания модулей: модули задаются индексами
struct ServicePointPlan {
    module: usize,
    definition: ServicePointDefinition,
    id: String,
    implementations: Vec<(ImplementationDefinition, usize)>,
    interceptors: Vec<(InterceptorDefinition, usize)>,
}

struct InterceptorPlan {
    name: String,
    factory_id: String,
    factory: Arc<dyn ServiceInterceptorFactory>,
    definition: InterceptorDefinition,
    module: usize,
    preceding: Vec<String>,
    following: Vec<String>,
}

struct ConfigurationPointPlan {
    module: usize,
    definition: ConfigurationPointDefinition,
    id: String,
    contributions: Vec<(ContributionDefinition, usize)>,
}

pub struct RegistryBuilder {
    config: RegistryConfig,
    log_factory: Option<Arc<dyn LogFactory>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    class_factory: Option<ClassFactory>,
    modules: Vec<ModuleDefinition>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
            log_factory: None,
            error_handler: None,
            class_factory: None,
            modules: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_log_factory(mut self, log_factory: Arc<dyn LogFactory>) -> Self {
        self.log_factory = Some(log_factory);
        self
    }

    /// Явный обработчик имеет приоритет над `error_handling` из конфигурации
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Фабрика, в которой уже объявлены интерфейсы и классы приложения
    pub fn with_class_factory(mut self, factory: ClassFactory) -> Self {
        self.class_factory = Some(factory);
        self
    }

    pub fn add_module(mut self, module: ModuleDefinition) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_definition(mut self, definition: RegistryDefinition) -> Self {
        self.modules.extend(definition.modules);
        self
    }

    pub fn build(self) -> Result<Registry, HiveError> {
        let timer = OperationTimer::new("registry_build");
        let result = self.build_inner();
        timer.finish_with_result(&result);
        result
    }

    fn build_inner(self) -> Result<Registry, HiveError> {
        let RegistryBuilder {
            config,
            log_factory,
            error_handler,
            class_factory,
            modules: user_modules,
        } = self;

        let log_factory: Arc<dyn LogFactory> = log_factory.unwrap_or_else(|| Arc::new(TracingLogFactory));
        let handler: Arc<dyn ErrorHandler> = error_handler.unwrap_or_else(|| match config.error_handling {
            ErrorHandlingMode::Lenient => Arc::new(DefaultErrorHandler),
            ErrorHandlingMode::Strict => Arc::new(StrictErrorHandler),
        });
        let log = log_factory.get_log(REGISTRY_LOG);
        let error_log = ErrorLog::new(handler, log.clone());

        let class_factory = class_factory.unwrap_or_default();
        declare_lifecycle_interfaces(&class_factory)?;

        let mut modules = vec![builtin_module(&config)?];
        modules.extend(user_modules);

        let mut seen = BTreeMap::new();
        for module in &modules {
            if let Some(previous) = seen.insert(module.id.clone(), module.location.clone()) {
                let previous = previous.map(|l| l.to_string()).unwrap_or_else(|| "unknown location".to_string());
                return Err(HiveError::configuration(
                    format!("Module {} is defined more than once (previously at {})", module.id, previous),
                    module.location.clone(),
                ));
            }
        }

        let translators = TranslatorManager::with_builtins();
        let mut service_models = builtin_service_models();
        for module in &modules {
            for contribution in &module.translators {
                if let Err(e) = translators.register(&contribution.name, contribution.translator.clone()) {
                    error_log.error(
                        &format!("Module {} contributes translator '{}'", module.id, contribution.name),
                        module.location.as_ref(),
                        Some(&e),
                    )?;
                }
            }
            for contribution in &module.service_models {
                if service_models.contains_key(&contribution.name) {
                    error_log.error(
                        &format!(
                            "Module {} contributes service model '{}', which is already defined",
                            module.id, contribution.name
                        ),
                        module.location.as_ref(),
                        None,
                    )?;
                    continue;
                }
                service_models.insert(contribution.name.clone(), contribution.factory.clone());
            }
        }

        let planner = Planner {
            modules: &modules,
            config: &config,
            error_log: &error_log,
        };
        let service_plans = planner.plan_service_points()?;
        let configuration_plans = planner.plan_configuration_points()?;
        let (eager_load, startup) = planner.plan_startup();

        let services = Arc::new(RegistryServices {
            config,
            class_factory,
            log_factory,
            error_log,
            shutdown: ShutdownCoordinator::new(),
            thread_events: ThreadEventNotifier::new(),
            translators,
            service_models,
        });

        let inner = Arc::new_cyclic(|registry| {
            let module_impls: Vec<Arc<ModuleImpl>> = modules
                .iter()
                .map(|m| {
                    Arc::new(ModuleImpl::new(
                        m.id.clone(),
                        registry.clone(),
                        services.clone(),
                        m.messages.clone(),
                        m.location.clone(),
                    ))
                })
                .collect();

            let service_points = service_plans
                .into_iter()
                .map(|(plan, interceptors)| {
                    let point = ServicePointImpl::new(ServicePointParts {
                        local_id: plan.definition.id.clone(),
                        interface_name: plan.definition.interface_name.clone(),
                        visibility: plan.definition.visibility,
                        model_name: plan
                            .definition
                            .service_model
                            .clone()
                            .unwrap_or_else(|| services.config.default_service_model.clone()),
                        module: module_impls[plan.module].clone(),
                        implementation: plan
                            .implementations
                            .into_iter()
                            .next()
                            .map(|(definition, module)| (definition, module_impls[module].clone())),
                        interceptors: interceptors
                            .into_iter()
                            .map(|i| ResolvedInterceptor {
                                name: i.name,
                                factory_id: i.factory_id,
                                factory: i.factory,
                                definition: i.definition,
                                module: module_impls[i.module].clone(),
                                preceding: i.preceding,
                                following: i.following,
                            })
                            .collect(),
                        location: plan.definition.location.clone(),
                        id: plan.id.clone(),
                    });
                    (plan.id, point)
                })
                .collect();

            let configuration_points = configuration_plans
                .into_iter()
                .map(|plan| {
                    let point = ConfigurationPointImpl::new(ConfigurationPointParts {
                        id: plan.id.clone(),
                        local_id: plan.definition.id.clone(),
                        visibility: plan.definition.visibility,
                        occurrences: plan.definition.occurrences,
                        schema: plan.definition.schema.clone(),
                        module: module_impls[plan.module].clone(),
                        contributions: plan
                            .contributions
                            .into_iter()
                            .map(|(contribution, module)| (contribution, module_impls[module].clone()))
                            .collect(),
                        location: plan.definition.location.clone(),
                    });
                    (plan.id, Arc::new(point))
                })
                .collect();

            RegistryInner {
                services: services.clone(),
                modules: module_impls
                    .into_iter()
                    .map(|m| (m.module_id().to_string(), m))
                    .collect(),
                service_points,
                configuration_points,
                eager_load,
                startup,
                started: AtomicBool::new(false),
                log,
            }
        });

        info!(
            "Registry '{}' built: {} modules, {} service points, {} configuration points",
            inner.services.config.name,
            inner.modules.len(),
            inner.service_points.len(),
            inner.configuration_points.len()
        );
        Ok(Registry { inner })
    }
}

/// Модуль `hivemind` с фабрикой LoggingInterceptor
fn builtin_module(config: &RegistryConfig) -> Result<ModuleDefinition, HiveError> {
    let logging = LoggingInterceptorFactory::from_config(&config.logging_interceptor)?;
    Ok(ModuleDefinition::new(HIVEMIND_MODULE).add_interceptor_factory(InterceptorFactoryDefinition::new(
        "LoggingInterceptor",
        Arc::new(logging),
    )))
}

/// Проверка и связывание определений до создания модулей
struct Planner<'a> {
    modules: &'a [ModuleDefinition],
    config: &'a RegistryConfig,
    error_log: &'a ErrorLog,
}

impl Planner<'_> {
    fn plan_service_points(&self) -> Result<Vec<(ServicePointPlan, Vec<InterceptorPlan>)>, HiveError> {
        let mut plans: BTreeMap<String, ServicePointPlan> = BTreeMap::new();

        for (index, module) in self.modules.iter().enumerate() {
            for definition in &module.service_points {
                let id = qualify_id(&module.id, &definition.id);
                if plans.contains_key(&id) {
                    self.error_log.error(
                        &format!("Service point {} is defined more than once", id),
                        definition.location.as_ref(),
                        None,
                    )?;
                    continue;
                }
                plans.insert(
                    id.clone(),
                    ServicePointPlan {
                        module: index,
                        implementations: definition.implementations.iter().map(|i| (i.clone(), index)).collect(),
                        interceptors: definition.interceptors.iter().map(|i| (i.clone(), index)).collect(),
                        definition: definition.clone(),
                        id,
                    },
                );
            }
        }

        for (index, module) in self.modules.iter().enumerate() {
            for contribution in &module.implementations {
                let location = contribution.definition.location.as_ref();
                if let Some(plan) = self.contribution_target(&mut plans, index, &contribution.service_id, "implementation", location)? {
                    plan.implementations.push((contribution.definition.clone(), index));
                }
            }
            for contribution in &module.interceptors {
                let location = contribution.definition.location.as_ref();
                if let Some(plan) = self.contribution_target(&mut plans, index, &contribution.service_id, "interceptor", location)? {
                    plan.interceptors.push((contribution.definition.clone(), index));
                }
            }
        }

        let factories = self.interceptor_factories()?;

        let mut resolved = Vec::with_capacity(plans.len());
        for (_, plan) in plans {
            match plan.implementations.len() {
                0 => self.error_log.error(
                    &format!(
                        "Service point {} has no implementation; a default implementation will be used",
                        plan.id
                    ),
                    plan.definition.location.as_ref(),
                    None,
                )?,
                1 => {}
                count => self.error_log.error(
                    &format!(
                        "Service point {} has {} implementations; only the first will be used",
                        plan.id, count
                    ),
                    plan.implementations[1].0.location.as_ref(),
                    None,
                )?,
            }

            let mut interceptors = Vec::new();
            for (definition, index) in &plan.interceptors {
                if let Some(interceptor) = self.resolve_interceptor(&factories, &plan.id, definition, *index)? {
                    interceptors.push(interceptor);
                }
            }
            resolved.push((plan, interceptors));
        }
        Ok(resolved)
    }

    /// Точка, в которую модуль `index` вносит вклад; проблемы уходят в ErrorLog
    fn contribution_target<'p>(
        &self,
        plans: &'p mut BTreeMap<String, ServicePointPlan>,
        index: usize,
        service_id: &str,
        kind: &str,
        location: Option<&Location>,
    ) -> Result<Option<&'p mut ServicePointPlan>, HiveError> {
        let module = &self.modules[index];
        let id = qualify_id(&module.id, service_id);
        match plans.get_mut(&id) {
            None => {
                self.error_log.error(
                    &format!("Module {} contributes an {} to unknown service point {}", module.id, kind, id),
                    location,
                    None,
                )?;
                Ok(None)
            }
            Some(plan) if plan.definition.visibility == Visibility::Private && plan.module != index => {
                self.error_log.error(
                    &format!("Service point {} is not visible to module {}", id, module.id),
                    location,
                    None,
                )?;
                Ok(None)
            }
            Some(plan) => Ok(Some(plan)),
        }
    }

    fn interceptor_factories(&self) -> Result<BTreeMap<String, (InterceptorFactoryDefinition, usize)>, HiveError> {
        let mut factories = BTreeMap::new();
        for (index, module) in self.modules.iter().enumerate() {
            for definition in &module.interceptor_factories {
                let id = qualify_id(&module.id, &definition.id);
                if factories.contains_key(&id) {
                    self.error_log.error(
                        &format!("Interceptor factory {} is defined more than once", id),
                        definition.location.as_ref(),
                        None,
                    )?;
                    continue;
                }
                factories.insert(id, (definition.clone(), index));
            }
        }
        Ok(factories)
    }

    fn resolve_interceptor(
        &self,
        factories: &BTreeMap<String, (InterceptorFactoryDefinition, usize)>,
        service_id: &str,
        definition: &InterceptorDefinition,
        index: usize,
    ) -> Result<Option<InterceptorPlan>, HiveError> {
        let module_id = &self.modules[index].id;
        let factory_id = qualify_id(module_id, &definition.factory_id);

        let (factory, owner) = match factories.get(&factory_id) {
            Some((factory, owner)) => (factory, *owner),
            None => {
                self.error_log.error(
                    &format!("Unknown interceptor factory {} for service {}", factory_id, service_id),
                    definition.location.as_ref(),
                    None,
                )?;
                return Ok(None);
            }
        };
        if factory.visibility == Visibility::Private && owner != index {
            self.error_log.error(
                &format!("Interceptor factory {} is not visible to module {}", factory_id, module_id),
                definition.location.as_ref(),
                None,
            )?;
            return Ok(None);
        }

        let qualify_all = |names: &[String]| -> Vec<String> { names.iter().map(|n| qualify_id(module_id, n)).collect() };

        Ok(Some(InterceptorPlan {
            name: qualify_id(module_id, definition.ordering_name()),
            factory_id,
            factory: factory.factory.clone(),
            definition: definition.clone(),
            module: index,
            preceding: qualify_all(&definition.preceding),
            following: qualify_all(&definition.following),
        }))
    }

    fn plan_configuration_points(&self) -> Result<Vec<ConfigurationPointPlan>, HiveError> {
        let mut plans: BTreeMap<String, ConfigurationPointPlan> = BTreeMap::new();

        for (index, module) in self.modules.iter().enumerate() {
            for definition in &module.configuration_points {
                let id = qualify_id(&module.id, &definition.id);
                if plans.contains_key(&id) {
                    self.error_log.error(
                        &format!("Configuration point {} is defined more than once", id),
                        definition.location.as_ref(),
                        None,
                    )?;
                    continue;
                }
                plans.insert(
                    id.clone(),
                    ConfigurationPointPlan {
                        module: index,
                        definition: definition.clone(),
                        id,
                        contributions: Vec::new(),
                    },
                );
            }
        }

        for (index, module) in self.modules.iter().enumerate() {
            for contribution in &module.contributions {
                let id = qualify_id(&module.id, &contribution.configuration_id);
                match plans.get_mut(&id) {
                    None => self.error_log.error(
                        &format!("Module {} contributes to unknown configuration point {}", module.id, id),
                        contribution.location.as_ref(),
                        None,
                    )?,
                    Some(plan) if plan.definition.visibility == Visibility::Private && plan.module != index => {
                        self.error_log.error(
                            &format!("Configuration point {} is not visible to module {}", id, module.id),
                            contribution.location.as_ref(),
                            None,
                        )?
                    }
                    Some(plan) => plan.contributions.push((contribution.clone(), index)),
                }
            }
        }

        Ok(plans.into_values().collect())
    }

    fn plan_startup(&self) -> (Vec<StartupEntry>, Vec<StartupEntry>) {
        let mut eager_load: Vec<StartupEntry> = self
            .config
            .eager_load
            .iter()
            .map(|id| StartupEntry {
                id: id.clone(),
                module: None,
                location: None,
            })
            .collect();
        let mut startup = Vec::new();

        for module in self.modules {
            let entry = |id: &String| StartupEntry {
                id: qualify_id(&module.id, id),
                module: Some(module.id.clone()),
                location: module.location.clone(),
            };
            eager_load.extend(module.eager_load.iter().map(entry));
            startup.extend(module.startup.iter().map(entry));
        }
        (eager_load, startup)
    }
}
