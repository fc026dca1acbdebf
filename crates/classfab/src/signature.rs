use std::fmt;

use bitflags::bitflags;

use crate::value::{Value, ValueType};

bitflags! {
    /// Модификаторы классов и методов
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const PUBLIC = 0b0001;
        const FINAL = 0b0010;
        const ABSTRACT = 0b0100;
        const SYNCHRONIZED = 0b1000;
    }
}

/// Сигнатура метода: имя, типы параметров, тип результата, объявленные исключения
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: String,
    pub return_type: ValueType,
    pub parameter_types: Vec<ValueType>,
    pub exception_types: Vec<String>,
}

impl MethodSignature {
    pub fn new(
        name: impl Into<String>,
        return_type: ValueType,
        parameter_types: Vec<ValueType>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameter_types,
            exception_types: Vec::new(),
        }
    }

    pub fn with_exceptions(mut self, exception_types: &[&str]) -> Self {
        self.exception_types = exception_types.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Ключ уникальности: имя и типы параметров, без типа результата
    pub fn unique_id(&self) -> String {
        let params: Vec<String> = self.parameter_types.iter().map(|t| t.to_string()).collect();
        format!("{}({})", self.name, params.join(","))
    }

    pub fn arity(&self) -> usize {
        self.parameter_types.len()
    }

    /// Совпадают ли имя и параметры (переопределение)
    pub fn overrides(&self, other: &MethodSignature) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }

    /// Подходят ли фактические аргументы к параметрам
    pub fn accepts(&self, args: &[Value]) -> bool {
        args.len() == self.parameter_types.len()
            && self
                .parameter_types
                .iter()
                .zip(args)
                .all(|(ty, arg)| ty.accepts(arg))
    }

    pub fn is_void(&self) -> bool {
        self.return_type == ValueType::Void
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.parameter_types.iter().map(|t| t.to_string()).collect();
        write!(f, "{} {}({})", self.return_type, self.name, params.join(", "))?;
        if !self.exception_types.is_empty() {
            write!(f, " throws {}", self.exception_types.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_ignores_return_type() {
        let a = MethodSignature::new("add", ValueType::Int, vec![ValueType::Int, ValueType::Int]);
        let b = MethodSignature::new("add", ValueType::Float, vec![ValueType::Int, ValueType::Int]);
        assert_eq!(a.unique_id(), "add(int,int)");
        assert_eq!(a.unique_id(), b.unique_id());
        assert!(a.overrides(&b));
    }

    #[test]
    fn test_display() {
        let sig = MethodSignature::new("read", ValueType::Str, vec![ValueType::Int])
            .with_exceptions(&["IOException"]);
        assert_eq!(sig.to_string(), "String read(int) throws IOException");
    }

    #[test]
    fn test_accepts_checks_arity_and_types() {
        let sig = MethodSignature::new("add", ValueType::Int, vec![ValueType::Int, ValueType::Int]);
        assert!(sig.accepts(&[Value::Int(1), Value::Int(2)]));
        assert!(!sig.accepts(&[Value::Int(1)]));
        assert!(!sig.accepts(&[Value::Int(1), Value::from("x")]));
    }
}
