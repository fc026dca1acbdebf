//! Фабрикация классов во время выполнения.
//!
//! Интерфейсы описываются сигнатурами методов, классы собираются builder'ом из
//! полей, конструкторов и тел методов (замыканий), экземпляры вызываются по
//! имени метода через `ServiceObject::invoke`.

mod class_builder;
mod defaults;
pub mod errors;
mod fabricated;
mod factory;
mod interface;
mod object;
mod signature;
mod value;

pub use class_builder::{ClassBuilder, MethodExtension};
pub use errors::{BuildCause, FabricationError, InvocationError, RUNTIME_EXCEPTION, THROWABLE};
pub use fabricated::{
    AfterBody, BeforeBody, CatchBody, ConstructorBody, ConstructorContext, FabricatedClass, FabricatedObject,
    FieldDef, MethodBody, MethodContext,
};
pub use factory::{total_created_classes, ClassFactory};
pub use interface::{InterfaceBuilder, InterfaceDescriptor};
pub use object::{same_object, ServiceObject};
pub use signature::{MethodSignature, Modifiers};
pub use value::{Value, ValueType};
