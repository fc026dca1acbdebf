use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::service::Visibility;
use crate::errors::Location;

/// Элемент вклада в конфигурацию или параметр перехватчика
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.elements.push(child);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Допустимое количество вкладов в точку конфигурации
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Occurrences {
    #[default]
    Unbounded,
    None,
    Optional,
    Required,
    OneOrMore,
}

impl Occurrences {
    pub fn is_satisfied_by(self, count: usize) -> bool {
        match self {
            Occurrences::Unbounded => true,
            Occurrences::None => count == 0,
            Occurrences::Optional => count <= 1,
            Occurrences::Required => count == 1,
            Occurrences::OneOrMore => count >= 1,
        }
    }
}

impl fmt::Display for Occurrences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Occurrences::Unbounded => "any number of",
            Occurrences::None => "no",
            Occurrences::Optional => "at most one",
            Occurrences::Required => "exactly one",
            Occurrences::OneOrMore => "at least one",
        };
        f.write_str(text)
    }
}

/// Описание атрибута в схеме вклада
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeModel {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    /// Спецификация транслятора (`int`, `enumeration,values=a|b`); None = smart
    #[serde(default)]
    pub translator: Option<String>,
}

impl AttributeModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_translator(mut self, translator: impl Into<String>) -> Self {
        self.translator = Some(translator.into());
        self
    }
}

/// Схема элементов, принимаемых точкой конфигурации
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContributionSchema {
    pub element_name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeModel>,
    /// Транслятор для текстового содержимого; None = содержимое игнорируется
    #[serde(default)]
    pub content_translator: Option<String>,
}

impl ContributionSchema {
    pub fn new(element_name: impl Into<String>) -> Self {
        Self {
            element_name: element_name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeModel) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_content_translator(mut self, translator: impl Into<String>) -> Self {
        self.content_translator = Some(translator.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeModel> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigurationPointDefinition {
    pub id: String,
    pub visibility: Visibility,
    pub occurrences: Occurrences,
    pub schema: Option<ContributionSchema>,
    pub location: Option<Location>,
}

impl ConfigurationPointDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visibility: Visibility::Public,
            occurrences: Occurrences::Unbounded,
            schema: None,
            location: None,
        }
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn with_occurrences(mut self, occurrences: Occurrences) -> Self {
        self.occurrences = occurrences;
        self
    }

    pub fn with_schema(mut self, schema: ContributionSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Вклад модуля в точку конфигурации
#[derive(Debug, Clone)]
pub struct ContributionDefinition {
    pub configuration_id: String,
    pub elements: Vec<Element>,
    pub location: Option<Location>,
}

impl ContributionDefinition {
    pub fn new(configuration_id: impl Into<String>) -> Self {
        Self {
            configuration_id: configuration_id.into(),
            elements: Vec::new(),
            location: None,
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrences() {
        assert!(Occurrences::Unbounded.is_satisfied_by(7));
        assert!(Occurrences::None.is_satisfied_by(0));
        assert!(!Occurrences::None.is_satisfied_by(1));
        assert!(Occurrences::Optional.is_satisfied_by(0));
        assert!(!Occurrences::Optional.is_satisfied_by(2));
        assert!(!Occurrences::Required.is_satisfied_by(0));
        assert!(Occurrences::OneOrMore.is_satisfied_by(3));
    }

    #[test]
    fn test_element_deserializes_from_yaml() {
        let yaml = r#"
name: datasource
attributes:
  url: jdbc://localhost
  pool: "5"
content: primary
"#;
        let element: Element = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(element.attribute("pool"), Some("5"));
        assert_eq!(element.content, "primary");
        assert!(element.elements.is_empty());
    }

    #[test]
    fn test_occurrences_serde_names() {
        let value: Occurrences = serde_json::from_str("\"one-or-more\"").unwrap();
        assert_eq!(value, Occurrences::OneOrMore);
    }
}
