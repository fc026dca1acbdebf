//! Динамически вызываемый объект: общий знаменатель для сервисов, прокси и перехватчиков

use std::sync::Arc;

use crate::errors::InvocationError;
use crate::value::Value;

/// Объект, методы которого вызываются по имени.
///
/// Реализуется фабрицированными объектами, прокси отложенного создания,
/// перехватчиками и "нативными" реализациями сервисов.
pub trait ServiceObject: Send + Sync {
    /// Имя класса (для диагностики и журналов)
    fn class_name(&self) -> &str;

    /// Реализует ли объект указанный интерфейс (или является указанным классом)
    fn implements(&self, interface: &str) -> bool;

    /// Вызвать метод по имени
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, InvocationError>;
}

/// Сравнение объектов по идентичности
pub fn same_object(a: &Arc<dyn ServiceObject>, b: &Arc<dyn ServiceObject>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl std::fmt::Debug for dyn ServiceObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceObject")
            .field("class_name", &self.class_name())
            .finish()
    }
}
