//! Перехватчик журналирования вызовов
//!
//! Для каждого интерфейса (и набора правил include/exclude) фабрицируется
//! класс `$LoggingInterceptor_<interface>_<rules>` с полями `_log` и
//! `_delegate`. Выбранные методы пишут в журнал сервиса `BEGIN`, `END` и
//! `EXCEPTION`; остальные просто делегируют.

use std::sync::Arc;

use classfab::{
    ClassFactory, FabricatedClass, InterfaceDescriptor, InvocationError, MethodContext, Modifiers, Value, ValueType,
    THROWABLE,
};

use super::matcher::MethodFilter;
use super::{InterceptorStack, ServiceInterceptorFactory};
use crate::config::LoggingInterceptorConfig;
use crate::definition::Element;
use crate::errors::HiveError;
use crate::log::ServiceLog;
use crate::runtime::ModuleImpl;
use crate::ServiceRef;

/// Id встроенной фабрики
pub const LOGGING_INTERCEPTOR: &str = "hivemind.LoggingInterceptor";

const LOG_FIELD: &str = "_log";
const DELEGATE_FIELD: &str = "_delegate";

/// Правила по умолчанию берутся из конфигурации реестра; параметры
/// перехватчика проверяются раньше них
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptorFactory {
    defaults: MethodFilter,
}

impl LoggingInterceptorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggingInterceptorConfig) -> Result<Self, HiveError> {
        let mut defaults = MethodFilter::new();
        for pattern in &config.include {
            defaults = defaults.include(pattern)?;
        }
        for pattern in &config.exclude {
            defaults = defaults.exclude(pattern)?;
        }
        Ok(Self { defaults })
    }

    fn filter_for(&self, parameters: &[Element]) -> Result<MethodFilter, HiveError> {
        let mut filter = MethodFilter::from_parameters(parameters)?;
        filter.extend(&self.defaults);
        Ok(filter)
    }

    fn interceptor_class(
        &self,
        factory: &ClassFactory,
        interface: &Arc<InterfaceDescriptor>,
        filter: &MethodFilter,
    ) -> Result<Arc<FabricatedClass>, HiveError> {
        let class_name = format!("$LoggingInterceptor_{}_{}", interface.name(), filter.fingerprint());

        let class = factory.get_or_create_class(&class_name, |factory| {
            let mut builder = factory
                .new_class(class_name.clone(), None)
                .set_modifiers(Modifiers::PUBLIC | Modifiers::FINAL)
                .add_interface(interface.clone())
                .add_field(LOG_FIELD, ValueType::Any)
                .add_field(DELEGATE_FIELD, ValueType::object(interface.name()))
                .add_constructor_assigning(
                    vec![ValueType::Any, ValueType::object(interface.name())],
                    &[LOG_FIELD, DELEGATE_FIELD],
                );

            for signature in interface.all_methods() {
                if !filter.includes(&signature) {
                    builder = builder.add_delegating_method(Modifiers::PUBLIC, signature, DELEGATE_FIELD);
                    continue;
                }

                builder = builder
                    .add_method(Modifiers::PUBLIC, signature.clone(), logged_invocation)
                    .add_catch(&signature, THROWABLE, |ctx, error| {
                        let log = service_log(ctx)?;
                        if log.is_debug_enabled() {
                            log.debug(&format!("EXCEPTION {}() -- {}", ctx.method_name(), error.message));
                        }
                        Err(error)
                    });
            }
            builder.finalize()
        })?;
        Ok(class)
    }
}

fn service_log(ctx: &MethodContext<'_>) -> Result<Arc<dyn ServiceLog>, InvocationError> {
    let value = ctx.field(LOG_FIELD)?;
    value
        .downcast_opaque::<Arc<dyn ServiceLog>>()
        .cloned()
        .ok_or_else(|| InvocationError::runtime("logging interceptor has no log"))
}

fn logged_invocation(ctx: &MethodContext<'_>) -> Result<Value, InvocationError> {
    let log = service_log(ctx)?;
    let debug = log.is_debug_enabled();

    if debug {
        let args: Vec<String> = ctx.args().iter().map(|a| a.to_string()).collect();
        log.debug(&format!("BEGIN {}({})", ctx.method_name(), args.join(", ")));
    }

    let result = ctx.invoke_field(DELEGATE_FIELD, ctx.method_name(), ctx.args())?;

    if debug {
        if ctx.signature().is_void() {
            log.debug(&format!("END {}()", ctx.method_name()));
        } else {
            log.debug(&format!("END {}() [{}]", ctx.method_name(), result));
        }
    }
    Ok(result)
}

impl ServiceInterceptorFactory for LoggingInterceptorFactory {
    fn create_interceptor(
        &self,
        stack: &mut InterceptorStack,
        module: &ModuleImpl,
        parameters: &[Element],
    ) -> Result<(), HiveError> {
        let filter = self.filter_for(parameters)?;
        let class = self.interceptor_class(module.class_factory(), stack.interface(), &filter)?;

        let log = stack.service_log().clone();
        let interceptor: ServiceRef = class.new_instance(&[Value::opaque(log), Value::Object(stack.peek().clone())])?;
        stack.push(interceptor)
    }
}
