//! Конвейер перехватчиков
//!
//! Фабрики применяются в обратном отсортированном порядке: каждая получает
//! стек, у которого на вершине текущий делегат, строит обёртку и кладёт её на
//! вершину. Первый в порядке перехватчик оказывается внешним.

use std::fmt;
use std::sync::Arc;

use classfab::InterfaceDescriptor;

use crate::definition::Element;
use crate::errors::HiveError;
use crate::log::ServiceLog;
use crate::runtime::ModuleImpl;
use crate::ServiceRef;

mod logging;
mod matcher;
mod method;

pub use logging::{LoggingInterceptorFactory, LOGGING_INTERCEPTOR};
pub use matcher::{MethodFilter, MethodPattern};
pub use method::{MethodInterceptor, MethodInterceptorFactory, MethodInterceptorProxy, MethodInvocation};

/// Стек объектов сервиса во время применения перехватчиков
pub struct InterceptorStack {
    service_id: String,
    interface: Arc<InterfaceDescriptor>,
    log: Arc<dyn ServiceLog>,
    top: ServiceRef,
    depth: usize,
}

impl InterceptorStack {
    pub fn new(
        service_id: impl Into<String>,
        interface: Arc<InterfaceDescriptor>,
        log: Arc<dyn ServiceLog>,
        core: ServiceRef,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            interface,
            log,
            top: core,
            depth: 0,
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn interface(&self) -> &Arc<InterfaceDescriptor> {
        &self.interface
    }

    pub fn service_log(&self) -> &Arc<dyn ServiceLog> {
        &self.log
    }

    /// Текущая вершина: делегат для следующей обёртки
    pub fn peek(&self) -> &ServiceRef {
        &self.top
    }

    /// Сколько перехватчиков уже положено на стек
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Положить обёртку; она обязана реализовывать интерфейс сервиса
    pub fn push(&mut self, interceptor: ServiceRef) -> Result<(), HiveError> {
        if !interceptor.implements(self.interface.name()) {
            return Err(HiveError::configuration(
                format!(
                    "Interceptor {} for service {} does not implement interface {}",
                    interceptor.class_name(),
                    self.service_id,
                    self.interface.name()
                ),
                None,
            ));
        }
        self.top = interceptor;
        self.depth += 1;
        Ok(())
    }

    pub fn into_top(self) -> ServiceRef {
        self.top
    }
}

impl fmt::Debug for InterceptorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorStack")
            .field("service_id", &self.service_id)
            .field("interface", &self.interface.name())
            .field("top", &self.top.class_name())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Фабрика перехватчиков: оборачивает вершину стека
pub trait ServiceInterceptorFactory: Send + Sync {
    /// `module` - модуль, который применил перехватчик к сервису
    fn create_interceptor(
        &self,
        stack: &mut InterceptorStack,
        module: &ModuleImpl,
        parameters: &[Element],
    ) -> Result<(), HiveError>;
}

impl<F> ServiceInterceptorFactory for F
where
    F: Fn(&mut InterceptorStack, &ModuleImpl, &[Element]) -> Result<(), HiveError> + Send + Sync,
{
    fn create_interceptor(
        &self,
        stack: &mut InterceptorStack,
        module: &ModuleImpl,
        parameters: &[Element],
    ) -> Result<(), HiveError> {
        self(stack, module, parameters)
    }
}
