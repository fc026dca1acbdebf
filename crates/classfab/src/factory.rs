use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::class_builder::ClassBuilder;
use crate::errors::{BuildCause, FabricationError};
use crate::fabricated::FabricatedClass;
use crate::interface::{InterfaceBuilder, InterfaceDescriptor};

static TOTAL_CREATED_CLASSES: AtomicUsize = AtomicUsize::new(0);

/// Сколько классов успешно построено всеми фабриками процесса
pub fn total_created_classes() -> usize {
    TOTAL_CREATED_CLASSES.load(Ordering::Relaxed)
}

#[derive(Clone)]
enum TypeEntry {
    Class(Arc<FabricatedClass>),
    Interface(Arc<InterfaceDescriptor>),
}

#[derive(Default)]
struct FactoryState {
    types: RwLock<HashMap<String, TypeEntry>>,
    created_classes: AtomicUsize,
    unique_counter: AtomicUsize,
}

/// Фабрика классов и интерфейсов.
///
/// Хранит пространство имён типов: имя уникально среди классов и интерфейсов.
/// Клонирование дешёвое, все клоны разделяют одно пространство имён.
#[derive(Clone, Default)]
pub struct ClassFactory {
    state: Arc<FactoryState>,
}

impl ClassFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Начать построение класса
    pub fn new_class(&self, name: impl Into<String>, superclass: Option<Arc<FabricatedClass>>) -> ClassBuilder {
        ClassBuilder::new(self.clone(), name.into(), superclass)
    }

    /// Начать построение интерфейса
    pub fn new_interface(&self, name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder::new(self.clone(), name.into())
    }

    pub fn class(&self, name: &str) -> Option<Arc<FabricatedClass>> {
        match self.state.types.read().get(name) {
            Some(TypeEntry::Class(class)) => Some(class.clone()),
            _ => None,
        }
    }

    pub fn interface(&self, name: &str) -> Option<Arc<InterfaceDescriptor>> {
        match self.state.types.read().get(name) {
            Some(TypeEntry::Interface(interface)) => Some(interface.clone()),
            _ => None,
        }
    }

    pub fn require_class(&self, name: &str) -> Result<Arc<FabricatedClass>, FabricationError> {
        self.class(name).ok_or_else(|| FabricationError::UnknownType { name: name.to_string() })
    }

    pub fn require_interface(&self, name: &str) -> Result<Arc<InterfaceDescriptor>, FabricationError> {
        self.interface(name).ok_or_else(|| FabricationError::UnknownType { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.types.read().contains_key(name)
    }

    /// Имена всех зарегистрированных типов (отсортированы)
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Количество классов, построенных этой фабрикой
    pub fn created_class_count(&self) -> usize {
        self.state.created_classes.load(Ordering::Relaxed)
    }

    /// Уникальное имя для сгенерированного класса, например `$Proxy_Adder_3`
    pub fn unique_name(&self, prefix: &str, base: &str) -> String {
        let n = self.state.unique_counter.fetch_add(1, Ordering::Relaxed);
        format!("${}_{}_{}", prefix, base, n)
    }

    /// Вернуть существующий класс или построить его.
    /// Если параллельный поток успел зарегистрировать класс раньше, возвращается его версия.
    pub fn get_or_create_class<F>(&self, name: &str, build: F) -> Result<Arc<FabricatedClass>, FabricationError>
    where
        F: FnOnce(&ClassFactory) -> Result<Arc<FabricatedClass>, FabricationError>,
    {
        if let Some(existing) = self.class(name) {
            return Ok(existing);
        }

        match build(self) {
            Ok(class) => Ok(class),
            Err(err) if matches!(err.build_cause(), Some(BuildCause::NameCollision { .. })) => {
                self.class(name).ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Вернуть существующий интерфейс или построить его
    pub fn ensure_interface<F>(&self, name: &str, build: F) -> Result<Arc<InterfaceDescriptor>, FabricationError>
    where
        F: FnOnce(&ClassFactory) -> Result<Arc<InterfaceDescriptor>, FabricationError>,
    {
        if let Some(existing) = self.interface(name) {
            return Ok(existing);
        }

        match build(self) {
            Ok(interface) => Ok(interface),
            Err(err) if matches!(err.build_cause(), Some(BuildCause::NameCollision { .. })) => {
                self.interface(name).ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) fn register_class(&self, class: Arc<FabricatedClass>) -> Result<(), BuildCause> {
        let mut types = self.state.types.write();
        if types.contains_key(class.name()) {
            return Err(BuildCause::NameCollision {
                name: class.name().to_string(),
            });
        }
        types.insert(class.name().to_string(), TypeEntry::Class(class));
        self.state.created_classes.fetch_add(1, Ordering::Relaxed);
        TOTAL_CREATED_CLASSES.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn register_interface(&self, interface: Arc<InterfaceDescriptor>) -> Result<(), BuildCause> {
        let mut types = self.state.types.write();
        if types.contains_key(interface.name()) {
            return Err(BuildCause::NameCollision {
                name: interface.name().to_string(),
            });
        }
        debug!("Registered interface {}", interface.name());
        types.insert(interface.name().to_string(), TypeEntry::Interface(interface));
        Ok(())
    }
}

impl fmt::Debug for ClassFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassFactory")
            .field("types", &self.state.types.read().len())
            .field("created_classes", &self.created_class_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::MethodSignature;
    use crate::value::ValueType;

    #[test]
    fn test_name_collision_between_class_and_interface() -> anyhow::Result<()> {
        let factory = ClassFactory::new();
        factory.new_interface("Shared").finalize()?;

        let err = factory.new_class("Shared", None).finalize().unwrap_err();
        assert!(matches!(err.build_cause(), Some(BuildCause::NameCollision { .. })));
        assert_eq!(factory.created_class_count(), 0);
        Ok(())
    }

    #[test]
    fn test_counters_increment_on_success() -> anyhow::Result<()> {
        let factory = ClassFactory::new();
        let before = total_created_classes();
        factory.new_class("One", None).finalize()?;
        factory.new_class("Two", None).finalize()?;
        assert_eq!(factory.created_class_count(), 2);
        assert!(total_created_classes() >= before + 2);
        Ok(())
    }

    #[test]
    fn test_get_or_create_reuses_existing() -> anyhow::Result<()> {
        let factory = ClassFactory::new();
        let first = factory.get_or_create_class("Cached", |f| f.new_class("Cached", None).finalize())?;
        let second = factory.get_or_create_class("Cached", |_| unreachable!("class already exists"))?;
        assert!(Arc::ptr_eq(&first, &second));
        Ok(())
    }

    #[test]
    fn test_ensure_interface() -> anyhow::Result<()> {
        let factory = ClassFactory::new();
        let build = |f: &ClassFactory| {
            f.new_interface("Greeter")
                .add_method(MethodSignature::new("greet", ValueType::Str, vec![ValueType::Str]))
                .finalize()
        };
        let a = factory.ensure_interface("Greeter", build)?;
        let b = factory.ensure_interface("Greeter", build)?;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(factory.require_interface("Missing").is_err());
        Ok(())
    }

    #[test]
    fn test_unique_names_differ() {
        let factory = ClassFactory::new();
        assert_ne!(factory.unique_name("Proxy", "Adder"), factory.unique_name("Proxy", "Adder"));
    }
}
