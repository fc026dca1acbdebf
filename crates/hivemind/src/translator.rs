//! Трансляторы: преобразование литерала из определения в типизированное значение
//!
//! Транслятор задаётся спецификацией `name` или `name,key=value,...`
//! (например `int,min=1,max=10` или `enumeration,values=fast|safe`).
//! В литерале можно явно выбрать транслятор префиксом `name:`
//! (`service:Adder`, `int:42`); без префикса работает `smart`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use classfab::{Value, ValueType};
use parking_lot::RwLock;
use tracing::debug;

use crate::definition::qualify_id;
use crate::errors::{HiveError, Location};
use crate::runtime::ModuleImpl;

pub trait Translator: Send + Sync {
    fn translate(
        &self,
        module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError>;
}

type TranslatorConstructor = fn(&BTreeMap<String, String>) -> Result<Arc<dyn Translator>, String>;

/// Реестр трансляторов: встроенные (с параметрами) и добавленные модулями
pub struct TranslatorManager {
    constructors: BTreeMap<&'static str, TranslatorConstructor>,
    contributed: RwLock<BTreeMap<String, Arc<dyn Translator>>>,
    configured: RwLock<HashMap<String, Arc<dyn Translator>>>,
}

impl Default for TranslatorManager {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TranslatorManager {
    pub fn with_builtins() -> Self {
        let mut constructors: BTreeMap<&'static str, TranslatorConstructor> = BTreeMap::new();
        constructors.insert("smart", |init| Ok(Arc::new(SmartTranslator::configure(init)?)));
        constructors.insert("int", |init| Ok(Arc::new(IntTranslator::configure(init)?)));
        constructors.insert("double", |init| Ok(Arc::new(DoubleTranslator::configure(init)?)));
        constructors.insert("boolean", |init| Ok(Arc::new(BooleanTranslator::configure(init)?)));
        constructors.insert("string", |init| Ok(Arc::new(StringTranslator::configure(init))));
        constructors.insert("service", |_| Ok(Arc::new(ServiceTranslator)));
        constructors.insert("configuration", |_| Ok(Arc::new(ConfigurationTranslator)));
        constructors.insert("id-list", |_| Ok(Arc::new(IdListTranslator)));
        constructors.insert("qualified-id", |_| Ok(Arc::new(QualifiedIdTranslator)));
        constructors.insert("enumeration", |init| Ok(Arc::new(EnumerationTranslator::configure(init)?)));
        constructors.insert("instance", |_| Ok(Arc::new(InstanceTranslator)));

        Self {
            constructors,
            contributed: RwLock::new(BTreeMap::new()),
            configured: RwLock::new(HashMap::new()),
        }
    }

    /// Зарегистрировать транслятор модуля; имя не должно совпадать с существующим
    pub fn register(&self, name: &str, translator: Arc<dyn Translator>) -> Result<(), HiveError> {
        if self.is_known(name) {
            return Err(HiveError::configuration(
                format!("Translator '{}' is already defined", name),
                None,
            ));
        }
        self.contributed.write().insert(name.to_string(), translator);
        Ok(())
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.constructors.contains_key(name) || self.contributed.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().map(|k| k.to_string()).collect();
        names.extend(self.contributed.read().keys().cloned());
        names.sort();
        names
    }

    /// Получить транслятор по спецификации `name[,key=value...]`
    pub fn get_translator(&self, spec: &str) -> Result<Arc<dyn Translator>, HiveError> {
        let spec = spec.trim();
        let (name, init) = parse_spec(spec)?;

        if init.is_empty() {
            if let Some(translator) = self.contributed.read().get(name) {
                return Ok(translator.clone());
            }
        }

        if let Some(translator) = self.configured.read().get(spec) {
            return Ok(translator.clone());
        }

        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| HiveError::configuration(format!("Unknown translator '{}'", name), None))?;

        let translator = constructor(&init).map_err(|reason| {
            HiveError::configuration(format!("Invalid translator specification '{}': {}", spec, reason), None)
        })?;
        debug!("Configured translator '{}'", spec);

        Ok(self
            .configured
            .write()
            .entry(spec.to_string())
            .or_insert(translator)
            .clone())
    }

    /// Перевести литерал, учитывая префикс `name:`
    pub fn translate(
        &self,
        module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let (translator, rest) = match split_prefix(literal) {
            Some((prefix, rest)) if self.is_known(prefix) => (self.get_translator(prefix)?, rest),
            _ => (self.get_translator("smart")?, literal),
        };

        let value = translator.translate(module, target, rest, location)?;
        if !target.accepts(&value) {
            return Err(HiveError::translation(
                literal,
                target,
                format!("translated value is {}", value.kind()),
                location,
            ));
        }
        Ok(value)
    }
}

fn parse_spec(spec: &str) -> Result<(&str, BTreeMap<String, String>), HiveError> {
    let mut parts = spec.split(',');
    let name = parts.next().unwrap_or_default().trim();
    let mut init = BTreeMap::new();
    for part in parts {
        let (key, value) = part.split_once('=').ok_or_else(|| {
            HiveError::configuration(
                format!("Invalid translator parameter '{}' in '{}'", part, spec),
                None,
            )
        })?;
        init.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok((name, init))
}

fn split_prefix(literal: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = literal.split_once(':')?;
    let plausible = !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_lowercase() || c == '-');
    plausible.then_some((prefix, rest))
}

fn parse_number<T: std::str::FromStr>(init: &BTreeMap<String, String>, key: &str) -> Result<Option<T>, String> {
    match init.get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("'{}' is not a valid value for {}", raw, key)),
        None => Ok(None),
    }
}

/// Выбор преобразования по целевому типу
#[derive(Debug, Default)]
pub struct SmartTranslator {
    default: Option<String>,
}

impl SmartTranslator {
    fn configure(init: &BTreeMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            default: init.get("default").cloned(),
        })
    }
}

impl Translator for SmartTranslator {
    fn translate(
        &self,
        module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let literal = match (&self.default, literal.trim().is_empty()) {
            (Some(default), true) => default.as_str(),
            _ => literal,
        };

        match target {
            ValueType::Int => IntTranslator::default().translate(module, target, literal, location),
            ValueType::Float => DoubleTranslator::default().translate(module, target, literal, location),
            ValueType::Bool => BooleanTranslator::default().translate(module, target, literal, location),
            ValueType::Str | ValueType::Any => Ok(Value::from(literal)),
            ValueType::List => Ok(Value::List(
                literal
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Value::from)
                    .collect(),
            )),
            ValueType::Object(_) => ServiceTranslator.translate(module, target, literal, location),
            ValueType::Void => Err(HiveError::translation(literal, target, "void is not a value type", location)),
        }
    }
}

#[derive(Debug, Default)]
pub struct IntTranslator {
    min: Option<i64>,
    max: Option<i64>,
    default: i64,
}

impl IntTranslator {
    fn configure(init: &BTreeMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            min: parse_number(init, "min")?,
            max: parse_number(init, "max")?,
            default: parse_number(init, "default")?.unwrap_or(0),
        })
    }
}

impl Translator for IntTranslator {
    fn translate(
        &self,
        _module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let trimmed = literal.trim();
        if trimmed.is_empty() {
            return Ok(Value::Int(self.default));
        }
        let value: i64 = trimmed
            .parse()
            .map_err(|_| HiveError::translation(literal, target, "not an integer", location))?;
        if let Some(min) = self.min {
            if value < min {
                return Err(HiveError::translation(literal, target, format!("less than minimum {}", min), location));
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Err(HiveError::translation(literal, target, format!("greater than maximum {}", max), location));
            }
        }
        Ok(Value::Int(value))
    }
}

#[derive(Debug, Default)]
pub struct DoubleTranslator {
    min: Option<f64>,
    max: Option<f64>,
    default: f64,
}

impl DoubleTranslator {
    fn configure(init: &BTreeMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            min: parse_number(init, "min")?,
            max: parse_number(init, "max")?,
            default: parse_number(init, "default")?.unwrap_or(0.0),
        })
    }
}

impl Translator for DoubleTranslator {
    fn translate(
        &self,
        _module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let trimmed = literal.trim();
        if trimmed.is_empty() {
            return Ok(Value::Float(self.default));
        }
        let value: f64 = trimmed
            .parse()
            .map_err(|_| HiveError::translation(literal, target, "not a number", location))?;
        if self.min.map(|min| value < min).unwrap_or(false) || self.max.map(|max| value > max).unwrap_or(false) {
            return Err(HiveError::translation(literal, target, "out of range", location));
        }
        Ok(Value::Float(value))
    }
}

#[derive(Debug, Default)]
pub struct BooleanTranslator {
    default: bool,
}

impl BooleanTranslator {
    fn configure(init: &BTreeMap<String, String>) -> Result<Self, String> {
        Ok(Self {
            default: parse_number(init, "default")?.unwrap_or(false),
        })
    }
}

impl Translator for BooleanTranslator {
    fn translate(
        &self,
        _module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        match literal.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Value::Bool(self.default)),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(HiveError::translation(literal, target, "expected true or false", location)),
        }
    }
}

#[derive(Debug, Default)]
pub struct StringTranslator {
    empty: Option<String>,
}

impl StringTranslator {
    fn configure(init: &BTreeMap<String, String>) -> Self {
        Self {
            empty: init.get("empty").cloned(),
        }
    }
}

impl Translator for StringTranslator {
    fn translate(
        &self,
        _module: &ModuleImpl,
        _target: &ValueType,
        literal: &str,
        _location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        match (&self.empty, literal.is_empty()) {
            (Some(empty), true) => Ok(Value::from(empty.as_str())),
            _ => Ok(Value::from(literal)),
        }
    }
}

/// Литерал - id сервиса (относительно модуля)
#[derive(Debug, Default)]
pub struct ServiceTranslator;

impl Translator for ServiceTranslator {
    fn translate(
        &self,
        module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        _location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let service = match target {
            ValueType::Object(interface) if interface != "Object" => module.get_service(literal.trim(), interface)?,
            _ => module.get_service_untyped(literal.trim())?,
        };
        Ok(Value::Object(service))
    }
}

/// Литерал - id точки конфигурации; значение - список элементов
#[derive(Debug, Default)]
pub struct ConfigurationTranslator;

impl Translator for ConfigurationTranslator {
    fn translate(
        &self,
        module: &ModuleImpl,
        _target: &ValueType,
        literal: &str,
        _location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let items = module.get_configuration(literal.trim())?;
        Ok(Value::opaque(items))
    }
}

/// Список id через запятую, каждый квалифицируется модулем
#[derive(Debug, Default)]
pub struct IdListTranslator;

impl Translator for IdListTranslator {
    fn translate(
        &self,
        module: &ModuleImpl,
        _target: &ValueType,
        literal: &str,
        _location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        Ok(Value::List(
            literal
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|id| Value::from(qualify_id(module.module_id(), id)))
                .collect(),
        ))
    }
}

#[derive(Debug, Default)]
pub struct QualifiedIdTranslator;

impl Translator for QualifiedIdTranslator {
    fn translate(
        &self,
        module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let id = literal.trim();
        if id.is_empty() {
            return Err(HiveError::translation(literal, target, "empty id", location));
        }
        Ok(Value::from(qualify_id(module.module_id(), id)))
    }
}

/// Значение из фиксированного набора (`enumeration,values=a|b|c`)
#[derive(Debug)]
pub struct EnumerationTranslator {
    values: Vec<String>,
}

impl EnumerationTranslator {
    pub fn new(values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn configure(init: &BTreeMap<String, String>) -> Result<Self, String> {
        let values = init.get("values").ok_or("missing 'values' parameter")?;
        Ok(Self {
            values: values.split('|').map(|v| v.trim().to_string()).collect(),
        })
    }
}

impl Translator for EnumerationTranslator {
    fn translate(
        &self,
        _module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let value = literal.trim();
        if self.values.iter().any(|v| v == value) {
            Ok(Value::from(value))
        } else {
            Err(HiveError::translation(
                literal,
                target,
                format!("expected one of {}", self.values.join(", ")),
                location,
            ))
        }
    }
}

/// Литерал - имя фабрицированного класса; значение - новый экземпляр
#[derive(Debug, Default)]
pub struct InstanceTranslator;

impl Translator for InstanceTranslator {
    fn translate(
        &self,
        module: &ModuleImpl,
        target: &ValueType,
        literal: &str,
        location: Option<&Location>,
    ) -> Result<Value, HiveError> {
        let class = module
            .class_factory()
            .require_class(literal.trim())
            .map_err(|e| HiveError::translation(literal, target, e.to_string(), location))?;
        let object = class
            .new_instance(&[])
            .map_err(|e| HiveError::translation(literal, target, e.to_string(), location))?;
        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("int", "", true)]
    #[case("int,min=1,max=10", "", true)]
    #[case("enumeration,values=fast|safe", "values", true)]
    #[case("enumeration", "", false)]
    #[case("int,min=abc", "", false)]
    #[case("no-such-translator", "", false)]
    #[case("int,broken", "", false)]
    fn test_translator_specs(#[case] spec: &str, #[case] _note: &str, #[case] valid: bool) {
        let manager = TranslatorManager::with_builtins();
        assert_eq!(manager.get_translator(spec).is_ok(), valid, "spec {}", spec);
    }

    #[test]
    fn test_configured_translators_are_cached() {
        let manager = TranslatorManager::with_builtins();
        let a = manager.get_translator("int,min=1").unwrap();
        let b = manager.get_translator("int,min=1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[rstest]
    #[case("service:Adder", Some(("service", "Adder")))]
    #[case("id-list:a,b", Some(("id-list", "a,b")))]
    #[case("http://example.com", Some(("http", "//example.com")))]
    #[case("Mixed:Case", None)]
    #[case("no prefix", None)]
    fn test_split_prefix(#[case] literal: &str, #[case] expected: Option<(&str, &str)>) {
        assert_eq!(split_prefix(literal), expected);
    }

    #[test]
    fn test_names_include_builtins() {
        let manager = TranslatorManager::with_builtins();
        let names = manager.names();
        for expected in ["boolean", "double", "id-list", "instance", "smart", "string"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        assert!(manager.register("int", Arc::new(IntTranslator::default())).is_err());
    }
}
