//! Построение базовой реализации сервиса
//!
//! - **ServiceImplementationFactory**: произвольная фабрика (замыкание или тип)
//! - **BuilderFactory**: экземпляр фабрицированного класса с аргументами
//!   конструктора, свойствами, autowiring и методом инициализации

use std::fmt;
use std::sync::Arc;

use classfab::{ClassFactory, FabricatedObject, FieldDef, InterfaceDescriptor, ServiceObject, Value, ValueType};
use tracing::debug;

use crate::errors::{HiveError, Location};
use crate::log::ServiceLog;
use crate::messages::ModuleMessages;
use crate::runtime::{ModuleImpl, ServicePointImpl};
use crate::ServiceRef;

pub trait ServiceImplementationFactory: Send + Sync {
    fn create_core_implementation(&self, ctx: &ConstructionContext<'_>) -> Result<ServiceRef, HiveError>;
}

impl<F> ServiceImplementationFactory for F
where
    F: Fn(&ConstructionContext<'_>) -> Result<ServiceRef, HiveError> + Send + Sync,
{
    fn create_core_implementation(&self, ctx: &ConstructionContext<'_>) -> Result<ServiceRef, HiveError> {
        self(ctx)
    }
}

/// Что доступно фабрике реализации: точка сервиса и модуль, который
/// предоставил реализацию (id разрешаются относительно него)
pub struct ConstructionContext<'a> {
    point: &'a ServicePointImpl,
    module: &'a ModuleImpl,
    location: Option<&'a Location>,
}

impl<'a> ConstructionContext<'a> {
    pub(crate) fn new(point: &'a ServicePointImpl, module: &'a ModuleImpl, location: Option<&'a Location>) -> Self {
        Self {
            point,
            module,
            location,
        }
    }

    pub fn service_id(&self) -> &str {
        self.point.id()
    }

    pub fn interface_name(&self) -> &str {
        self.point.interface_name()
    }

    pub fn interface(&self) -> Result<Arc<InterfaceDescriptor>, HiveError> {
        self.point.interface()
    }

    pub fn module(&self) -> &ModuleImpl {
        self.module
    }

    pub fn location(&self) -> Option<&Location> {
        self.location
    }

    /// Журнал сервиса
    pub fn log(&self) -> &Arc<dyn ServiceLog> {
        self.point.log()
    }

    pub fn class_factory(&self) -> &ClassFactory {
        self.module.class_factory()
    }

    pub fn messages(&self) -> &Arc<ModuleMessages> {
        self.module.messages()
    }

    pub fn get_service(&self, service_id: &str, interface: &str) -> Result<ServiceRef, HiveError> {
        self.module.get_service(service_id, interface)
    }

    pub fn translate(&self, target: &ValueType, literal: &str) -> Result<Value, HiveError> {
        self.module.translate(target, literal, self.location)
    }
}

/// Источник значения аргумента конструктора или свойства
#[derive(Debug, Clone)]
pub enum BuilderFacet {
    /// Литерал, переводится в тип параметра/поля
    Literal(String),
    /// Сервис по id (относительно модуля-вкладчика)
    Service(String),
    /// Элементы точки конфигурации
    Configuration(String),
    /// Полный id строящегося сервиса
    ServiceId,
    /// Журнал сервиса
    Log,
    /// Сообщения модуля-вкладчика
    Messages,
    Value(Value),
}

impl BuilderFacet {
    fn resolve(&self, ctx: &ConstructionContext<'_>, target: &ValueType) -> Result<Value, HiveError> {
        match self {
            BuilderFacet::Literal(literal) => ctx.translate(target, literal),
            BuilderFacet::Service(id) => {
                let service = match target {
                    ValueType::Object(interface) if interface != "Object" => ctx.get_service(id, interface)?,
                    _ => ctx.module().get_service_untyped(id)?,
                };
                Ok(Value::Object(service))
            }
            BuilderFacet::Configuration(id) => Ok(Value::opaque(ctx.module().get_configuration(id)?)),
            BuilderFacet::ServiceId => Ok(Value::from(ctx.service_id())),
            BuilderFacet::Log => Ok(Value::opaque(ctx.log().clone())),
            BuilderFacet::Messages => Ok(Value::opaque(ctx.messages().clone())),
            BuilderFacet::Value(value) => Ok(value.clone()),
        }
    }
}

/// Какие поля заполнять autowiring'ом
pub trait AutowirePredicate: Send + Sync {
    fn should_autowire(&self, field: &FieldDef, current: &Value) -> bool;
}

/// Объектные поля с конкретным интерфейсом, ещё не заполненные
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAutowirePredicate;

impl AutowirePredicate for DefaultAutowirePredicate {
    fn should_autowire(&self, field: &FieldDef, current: &Value) -> bool {
        matches!(&field.field_type, ValueType::Object(name) if name != "Object") && current.is_null()
    }
}

/// Реализация из фабрицированного класса
#[derive(Clone)]
pub struct BuilderFactory {
    class_name: String,
    constructor: Vec<BuilderFacet>,
    properties: Vec<(String, BuilderFacet)>,
    autowire: bool,
    predicate: Arc<dyn AutowirePredicate>,
    initialize_method: Option<String>,
    location: Option<Location>,
}

impl BuilderFactory {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            constructor: Vec::new(),
            properties: Vec::new(),
            autowire: true,
            predicate: Arc::new(DefaultAutowirePredicate),
            initialize_method: None,
            location: None,
        }
    }

    pub fn constructor_arg(mut self, facet: BuilderFacet) -> Self {
        self.constructor.push(facet);
        self
    }

    pub fn property(mut self, name: impl Into<String>, facet: BuilderFacet) -> Self {
        self.properties.push((name.into(), facet));
        self
    }

    pub fn autowire(mut self, enabled: bool) -> Self {
        self.autowire = enabled;
        self
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn AutowirePredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// Метод без аргументов, вызываемый после заполнения полей
    pub fn initialize_method(mut self, method: impl Into<String>) -> Self {
        self.initialize_method = Some(method.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Типы параметров берутся из единственного конструктора подходящей
    /// арности; иначе литералы переводятся без целевого типа
    fn constructor_types(&self, constructors: Vec<Vec<ValueType>>) -> Vec<ValueType> {
        let arity = self.constructor.len();
        let mut candidates = constructors.into_iter().filter(|params| params.len() == arity);
        match (candidates.next(), candidates.next()) {
            (Some(params), None) => params,
            _ => vec![ValueType::Any; arity],
        }
    }

    fn autowire_fields(
        &self,
        ctx: &ConstructionContext<'_>,
        object: &FabricatedObject,
        fields: &[FieldDef],
    ) -> Result<(), HiveError> {
        for field in fields {
            let current = object.get_field(&field.name)?;
            if !self.predicate.should_autowire(field, &current) {
                continue;
            }
            let ValueType::Object(interface) = &field.field_type else {
                continue;
            };
            if !ctx.module().contains_service(interface) {
                continue;
            }

            match ctx.module().get_service_by_interface(interface) {
                Ok(service) => {
                    debug!("Autowiring {}.{} with service for {}", ctx.service_id(), field.name, interface);
                    object.set_field(&field.name, Value::Object(service))?;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => ctx.module().error_log().error(
                    &format!(
                        "Unable to autowire property {} of service {}",
                        field.name,
                        ctx.service_id()
                    ),
                    self.location.as_ref(),
                    Some(&e),
                )?,
            }
        }
        Ok(())
    }
}

impl ServiceImplementationFactory for BuilderFactory {
    fn create_core_implementation(&self, ctx: &ConstructionContext<'_>) -> Result<ServiceRef, HiveError> {
        let class = ctx.class_factory().require_class(&self.class_name)?;

        let types = self.constructor_types(class.constructor_signatures());
        let args = self
            .constructor
            .iter()
            .zip(&types)
            .map(|(facet, ty)| facet.resolve(ctx, ty))
            .collect::<Result<Vec<_>, _>>()?;

        let object = class.new_instance(&args)?;

        for (name, facet) in &self.properties {
            let field = class.field(name).ok_or_else(|| {
                HiveError::configuration(
                    format!("Class {} has no property {}", self.class_name, name),
                    self.location.clone(),
                )
            })?;
            let value = facet.resolve(ctx, &field.field_type)?;
            object.set_field(name, value)?;
        }

        if self.autowire {
            self.autowire_fields(ctx, &object, class.fields())?;
        }

        if let Some(method) = &self.initialize_method {
            object.invoke(method, &[])?;
        }

        let service: ServiceRef = object;
        Ok(service)
    }
}

impl fmt::Debug for BuilderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderFactory")
            .field("class_name", &self.class_name)
            .field("constructor", &self.constructor)
            .field("properties", &self.properties)
            .field("autowire", &self.autowire)
            .field("initialize_method", &self.initialize_method)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, field_type: ValueType) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            field_type,
        }
    }

    #[test]
    fn test_default_predicate_skips_primitives_and_assigned_fields() {
        let predicate = DefaultAutowirePredicate;

        assert!(predicate.should_autowire(&field("adder", ValueType::object("mod.Adder")), &Value::Null));
        assert!(!predicate.should_autowire(&field("count", ValueType::Int), &Value::Int(0)));
        assert!(!predicate.should_autowire(&field("any", ValueType::object("Object")), &Value::Null));
        assert!(!predicate.should_autowire(&field("name", ValueType::Str), &Value::Null));
        assert!(!predicate.should_autowire(
            &field("adder", ValueType::object("mod.Adder")),
            &Value::from("already set")
        ));
    }

    #[test]
    fn test_constructor_types_from_unique_arity() {
        let factory = BuilderFactory::new("mod.Impl")
            .constructor_arg(BuilderFacet::Literal("5".to_string()))
            .constructor_arg(BuilderFacet::Literal("x".to_string()));

        let types = factory.constructor_types(vec![
            vec![],
            vec![ValueType::Int, ValueType::Str],
        ]);
        assert_eq!(types, vec![ValueType::Int, ValueType::Str]);

        let ambiguous = factory.constructor_types(vec![
            vec![ValueType::Int, ValueType::Str],
            vec![ValueType::Str, ValueType::Str],
        ]);
        assert_eq!(ambiguous, vec![ValueType::Any, ValueType::Any]);
    }
}
