//! Значения и типы, которыми обмениваются динамически вызываемые объекты

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::object::{same_object, ServiceObject};

/// Тип параметра, поля или возвращаемого значения
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Bool,
    Int,
    Float,
    Str,
    List,
    /// Объект, реализующий указанный интерфейс (или класс)
    Object(String),
    /// Любое значение, включая непрозрачные
    Any,
}

impl ValueType {
    pub fn object(interface: impl Into<String>) -> Self {
        ValueType::Object(interface.into())
    }

    /// Примитивы не могут быть null и не участвуют в autowiring
    pub fn is_primitive(&self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Int | ValueType::Float)
    }

    /// Значение по умолчанию для поля или результата этого типа
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            _ => Value::Null,
        }
    }

    /// Может ли значение быть присвоено слоту этого типа
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Any, _) => true,
            (ValueType::Void, Value::Null) => true,
            (ValueType::Void, _) => false,
            (ty, Value::Null) => !ty.is_primitive(),
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Int, Value::Int(_)) => true,
            (ValueType::Float, Value::Float(_)) | (ValueType::Float, Value::Int(_)) => true,
            (ValueType::Str, Value::Str(_)) => true,
            (ValueType::List, Value::List(_)) => true,
            (ValueType::Object(name), Value::Object(object)) => {
                name == "Object" || object.implements(name)
            }
            (ValueType::Object(_), Value::Opaque(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => write!(f, "void"),
            ValueType::Bool => write!(f, "boolean"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "double"),
            ValueType::Str => write!(f, "String"),
            ValueType::List => write!(f, "List"),
            ValueType::Object(name) => write!(f, "{}", name),
            ValueType::Any => write!(f, "Object"),
        }
    }
}

/// Значение аргумента, поля или результата
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(Arc<dyn ServiceObject>),
    /// Непрозрачное значение (журнал, сообщения модуля и т.п.)
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn ServiceObject>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Извлечь непрозрачное значение конкретного типа
    pub fn downcast_opaque<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Краткое имя вида значения для сообщений об ошибках
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Float(_) => "double",
            Value::Str(_) => "String",
            Value::List(_) => "List",
            Value::Object(_) => "Object",
            Value::Opaque(_) => "opaque",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => same_object(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(object) => write!(f, "Object(<{}>)", object.class_name()),
            Value::Opaque(_) => write!(f, "Opaque"),
        }
    }
}

/// Форматирование для журналов: строки в кавычках, объекты по имени класса
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(object) => write!(f, "<{}>", object.class_name()),
            Value::Opaque(_) => write!(f, "<opaque>"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Arc<dyn ServiceObject>> for Value {
    fn from(value: Arc<dyn ServiceObject>) -> Self {
        Value::Object(value)
    }
}
