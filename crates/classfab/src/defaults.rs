//! Реализация интерфейса "по умолчанию": каждый метод возвращает
//! значение по умолчанию своего типа (null / 0 / false) и ничего не делает.

use std::sync::Arc;

use crate::errors::FabricationError;
use crate::fabricated::FabricatedClass;
use crate::factory::ClassFactory;
use crate::interface::InterfaceDescriptor;
use crate::signature::Modifiers;
use crate::value::Value;

impl ClassFactory {
    /// Класс-заглушка для интерфейса; строится один раз на фабрику
    pub fn default_implementation(
        &self,
        interface: &Arc<InterfaceDescriptor>,
    ) -> Result<Arc<FabricatedClass>, FabricationError> {
        let name = format!("$Default_{}", interface.name());
        self.get_or_create_class(&name, |factory| {
            let mut builder = factory.new_class(name.clone(), None).add_interface(interface.clone());
            for signature in interface.all_methods() {
                let result: Value = signature.return_type.default_value();
                builder = builder.add_method(Modifiers::PUBLIC, signature, move |_| Ok(result.clone()));
            }
            builder.finalize()
        })
    }
}
