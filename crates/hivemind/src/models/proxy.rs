//! Прокси отложенного построения
//!
//! Для каждой пары (роль, интерфейс) фабрицируется один класс
//! `$<Role>_<interface>`: единственное поле `_source`, каждый метод интерфейса
//! запрашивает у источника реальный сервис и делегирует ему вызов.

use std::sync::Arc;

use classfab::{ClassFactory, InterfaceDescriptor, InvocationError, Modifiers, Value, ValueType};

use crate::errors::HiveError;
use crate::ServiceRef;

const SOURCE_FIELD: &str = "_source";

/// Откуда прокси получает реальный сервис при каждом вызове
pub trait ServiceSource: Send + Sync {
    fn service(&self) -> Result<ServiceRef, HiveError>;
}

pub fn create_deferred_proxy(
    factory: &ClassFactory,
    role: &str,
    interface: &Arc<InterfaceDescriptor>,
    source: Arc<dyn ServiceSource>,
) -> Result<ServiceRef, HiveError> {
    let class_name = format!("${}_{}", role, interface.name());

    let class = factory.get_or_create_class(&class_name, |factory| {
        let mut builder = factory
            .new_class(class_name.clone(), None)
            .set_modifiers(Modifiers::PUBLIC | Modifiers::FINAL)
            .add_interface(interface.clone())
            .add_field(SOURCE_FIELD, ValueType::Any)
            .add_constructor_assigning(vec![ValueType::Any], &[SOURCE_FIELD]);

        for signature in interface.all_methods() {
            builder = builder.add_method(Modifiers::PUBLIC, signature, |ctx| {
                let source = ctx.field(SOURCE_FIELD)?;
                let source = source
                    .downcast_opaque::<Arc<dyn ServiceSource>>()
                    .ok_or_else(|| InvocationError::runtime("deferred proxy has no service source"))?;
                let service = source.service()?;
                service.invoke(ctx.method_name(), ctx.args())
            });
        }
        builder.finalize()
    })?;

    let proxy: ServiceRef = class.new_instance(&[Value::opaque(source)])?;
    Ok(proxy)
}
