//! Перехватчики методов в стиле AOP: пользовательский `MethodInterceptor`
//! получает вызов и решает, когда (и нужно ли) передать его дальше.

use std::fmt;
use std::sync::Arc;

use classfab::{InterfaceDescriptor, InvocationError, MethodSignature, ServiceObject, Value};

use super::matcher::MethodFilter;
use super::{InterceptorStack, ServiceInterceptorFactory};
use crate::definition::Element;
use crate::errors::HiveError;
use crate::runtime::ModuleImpl;
use crate::ServiceRef;

pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, InvocationError>;
}

impl<F> MethodInterceptor for F
where
    F: Fn(&mut MethodInvocation<'_>) -> Result<Value, InvocationError> + Send + Sync,
{
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, InvocationError> {
        self(invocation)
    }
}

/// Перехваченный вызов; аргументы можно заменить до `proceed()`
pub struct MethodInvocation<'a> {
    signature: &'a MethodSignature,
    args: Vec<Value>,
    target: &'a ServiceRef,
}

impl<'a> MethodInvocation<'a> {
    pub fn method(&self) -> &MethodSignature {
        self.signature
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    pub fn target(&self) -> &ServiceRef {
        self.target
    }

    /// Передать вызов следующему объекту в цепочке
    pub fn proceed(&self) -> Result<Value, InvocationError> {
        self.target.invoke(&self.signature.name, &self.args)
    }
}

/// Динамический прокси: выбранные методы идут через перехватчик
pub struct MethodInterceptorProxy {
    class_name: String,
    interface: Arc<InterfaceDescriptor>,
    methods: Vec<(MethodSignature, bool)>,
    interceptor: Arc<dyn MethodInterceptor>,
    target: ServiceRef,
}

impl MethodInterceptorProxy {
    pub fn new(
        interface: Arc<InterfaceDescriptor>,
        interceptor: Arc<dyn MethodInterceptor>,
        filter: &MethodFilter,
        target: ServiceRef,
    ) -> Self {
        let methods = interface
            .all_methods()
            .into_iter()
            .map(|sig| {
                let intercepted = filter.includes(&sig);
                (sig, intercepted)
            })
            .collect();
        Self {
            class_name: format!("$MethodInterceptorProxy_{}", interface.name()),
            interface,
            methods,
            interceptor,
            target,
        }
    }
}

impl ServiceObject for MethodInterceptorProxy {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn implements(&self, interface: &str) -> bool {
        self.interface.is_assignable_to(interface)
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let entry = self
            .methods
            .iter()
            .find(|(sig, _)| sig.name == method && sig.accepts(args));

        match entry {
            Some((signature, true)) => {
                let mut invocation = MethodInvocation {
                    signature,
                    args: args.to_vec(),
                    target: &self.target,
                };
                self.interceptor.invoke(&mut invocation)
            }
            _ => self.target.invoke(method, args),
        }
    }
}

impl fmt::Debug for MethodInterceptorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInterceptorProxy")
            .field("interface", &self.interface.name())
            .field("target", &self.target.class_name())
            .finish()
    }
}

/// Фабрика перехватчиков поверх `MethodInterceptor`; параметры
/// `include`/`exclude` ограничивают перехватываемые методы
pub struct MethodInterceptorFactory {
    interceptor: Arc<dyn MethodInterceptor>,
}

impl MethodInterceptorFactory {
    pub fn new(interceptor: Arc<dyn MethodInterceptor>) -> Self {
        Self { interceptor }
    }
}

impl ServiceInterceptorFactory for MethodInterceptorFactory {
    fn create_interceptor(
        &self,
        stack: &mut InterceptorStack,
        _module: &ModuleImpl,
        parameters: &[Element],
    ) -> Result<(), HiveError> {
        let filter = MethodFilter::from_parameters(parameters)?;
        let proxy = MethodInterceptorProxy::new(
            stack.interface().clone(),
            self.interceptor.clone(),
            &filter,
            stack.peek().clone(),
        );
        stack.push(Arc::new(proxy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classfab::{ClassFactory, Modifiers, ValueType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn calculator(factory: &ClassFactory) -> anyhow::Result<(Arc<InterfaceDescriptor>, ServiceRef)> {
        let interface = factory
            .new_interface("test.Calculator")
            .add_method(MethodSignature::new("add", ValueType::Int, vec![ValueType::Int, ValueType::Int]))
            .add_method(MethodSignature::new("negate", ValueType::Int, vec![ValueType::Int]))
            .finalize()?;
        let class = factory
            .new_class("test.CalculatorImpl", None)
            .add_interface(interface.clone())
            .add_method(
                Modifiers::PUBLIC,
                MethodSignature::new("add", ValueType::Int, vec![ValueType::Int, ValueType::Int]),
                |ctx| Ok(Value::Int(ctx.int_arg(0)? + ctx.int_arg(1)?)),
            )
            .add_method(
                Modifiers::PUBLIC,
                MethodSignature::new("negate", ValueType::Int, vec![ValueType::Int]),
                |ctx| Ok(Value::Int(-ctx.int_arg(0)?)),
            )
            .finalize()?;
        let target: ServiceRef = class.new_instance(&[])?;
        Ok((interface, target))
    }

    #[test]
    fn test_interceptor_can_rewrite_arguments() -> anyhow::Result<()> {
        // Arrange
        let factory = ClassFactory::new();
        let (interface, target) = calculator(&factory)?;
        let doubling = |invocation: &mut MethodInvocation<'_>| -> Result<Value, InvocationError> {
            for arg in invocation.args_mut().iter_mut() {
                if let Value::Int(n) = arg {
                    *n *= 2;
                }
            }
            invocation.proceed()
        };
        let proxy = MethodInterceptorProxy::new(interface, Arc::new(doubling), &MethodFilter::new(), target);

        // Act
        let result = proxy.invoke("add", &[Value::Int(1), Value::Int(2)])?;

        // Assert
        assert_eq!(result.as_int(), Some(6));
        assert!(proxy.implements("test.Calculator"));
        Ok(())
    }

    #[test]
    fn test_excluded_methods_bypass_interceptor() -> anyhow::Result<()> {
        let factory = ClassFactory::new();
        let (interface, target) = calculator(&factory)?;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let counting = move |invocation: &mut MethodInvocation<'_>| -> Result<Value, InvocationError> {
            counter.fetch_add(1, Ordering::SeqCst);
            invocation.proceed()
        };
        let filter = MethodFilter::new().exclude("negate")?;
        let proxy = MethodInterceptorProxy::new(interface, Arc::new(counting), &filter, target);

        assert_eq!(proxy.invoke("negate", &[Value::Int(5)])?.as_int(), Some(-5));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(proxy.invoke("add", &[Value::Int(4), Value::Int(7)])?.as_int(), Some(11));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_interceptor_may_short_circuit() -> anyhow::Result<()> {
        let factory = ClassFactory::new();
        let (interface, target) = calculator(&factory)?;
        let refusing = |invocation: &mut MethodInvocation<'_>| -> Result<Value, InvocationError> {
            Err(InvocationError::new(
                "SecurityException",
                format!("{} is not allowed", invocation.method().name),
            ))
        };
        let proxy = MethodInterceptorProxy::new(interface, Arc::new(refusing), &MethodFilter::new(), target);

        let err = proxy.invoke("add", &[Value::Int(1), Value::Int(1)]).unwrap_err();
        assert_eq!(err.exception_type, "SecurityException");
        assert_eq!(err.message, "add is not allowed");
        Ok(())
    }
}
