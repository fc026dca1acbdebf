//! Точка конфигурации: ленивая сборка элементов из вкладов всех модулей

use std::collections::BTreeMap;
use std::sync::Arc;

use classfab::{Value, ValueType};
use tracing::debug;

use super::construction::ConstructionGate;
use super::module::ModuleImpl;
use crate::definition::{ContributionDefinition, ContributionSchema, Element, Occurrences, Visibility};
use crate::errors::{HiveError, Location};

/// Элемент вклада после трансляции по схеме
#[derive(Debug, Clone)]
pub struct ConfigurationItem {
    pub element: Element,
    /// Значения атрибутов (по схеме - переведённые, без схемы - строки)
    pub values: BTreeMap<String, Value>,
    pub content: Option<Value>,
    pub contributing_module: String,
}

impl ConfigurationItem {
    pub fn name(&self) -> &str {
        &self.element.name
    }

    pub fn value(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    pub fn attribute(&self, attribute: &str) -> Option<&str> {
        self.element.attribute(attribute)
    }
}

pub type ConfigurationItems = Arc<Vec<ConfigurationItem>>;

pub(crate) struct ConfigurationPointParts {
    pub id: String,
    pub local_id: String,
    pub visibility: Visibility,
    pub occurrences: Occurrences,
    pub schema: Option<ContributionSchema>,
    pub module: Arc<ModuleImpl>,
    pub contributions: Vec<(ContributionDefinition, Arc<ModuleImpl>)>,
    pub location: Option<Location>,
}

pub struct ConfigurationPointImpl {
    id: String,
    local_id: String,
    visibility: Visibility,
    occurrences: Occurrences,
    schema: Option<ContributionSchema>,
    module: Arc<ModuleImpl>,
    contributions: Vec<(ContributionDefinition, Arc<ModuleImpl>)>,
    gate: ConstructionGate<ConfigurationItems>,
    location: Option<Location>,
}

impl ConfigurationPointImpl {
    pub(crate) fn new(parts: ConfigurationPointParts) -> Self {
        Self {
            gate: ConstructionGate::new(parts.id.clone()),
            id: parts.id,
            local_id: parts.local_id,
            visibility: parts.visibility,
            occurrences: parts.occurrences,
            schema: parts.schema,
            module: parts.module,
            contributions: parts.contributions,
            location: parts.location,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn module(&self) -> &Arc<ModuleImpl> {
        &self.module
    }

    pub fn is_visible_to(&self, module_id: Option<&str>) -> bool {
        self.visibility == Visibility::Public || module_id == Some(self.module.module_id())
    }

    /// Число элементов во всех вкладах
    pub fn contribution_count(&self) -> usize {
        self.contributions.iter().map(|(c, _)| c.elements.len()).sum()
    }

    /// Элементы конфигурации; строятся один раз при первом обращении
    pub fn get_items(&self) -> Result<ConfigurationItems, HiveError> {
        self.module.shutdown_coordinator().check()?;
        self.gate.get_or_try_init(|| self.construct())
    }

    pub(crate) fn invalidate(&self) {
        self.gate.reset();
    }

    fn construct(&self) -> Result<ConfigurationItems, HiveError> {
        let error_log = self.module.error_log();
        let count = self.contribution_count();

        if !self.occurrences.is_satisfied_by(count) {
            error_log.error(
                &format!(
                    "Configuration point {} contains {} contributions but expects {} contribution",
                    self.id, count, self.occurrences
                ),
                self.location.as_ref(),
                None,
            )?;
        }

        let mut items = Vec::with_capacity(count);
        for (contribution, contributor) in &self.contributions {
            for element in &contribution.elements {
                let location = element.location.as_ref().or(contribution.location.as_ref());
                match self.convert(element, contributor, location) {
                    Ok(item) => items.push(item),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => error_log.error(
                        &format!(
                            "Element {} contributed by module {} to configuration point {} is invalid",
                            element.name,
                            contributor.module_id(),
                            self.id
                        ),
                        location,
                        Some(&e),
                    )?,
                }
            }
        }

        debug!("Configuration point {} built with {} elements", self.id, items.len());
        Ok(Arc::new(items))
    }

    fn convert(
        &self,
        element: &Element,
        contributor: &ModuleImpl,
        location: Option<&Location>,
    ) -> Result<ConfigurationItem, HiveError> {
        let Some(schema) = &self.schema else {
            let values = element
                .attributes
                .iter()
                .map(|(k, v)| Ok((k.clone(), Value::from(contributor.expand_symbols(v, location)?))))
                .collect::<Result<BTreeMap<_, _>, HiveError>>()?;
            let content = (!element.content.is_empty())
                .then(|| contributor.expand_symbols(&element.content, location).map(Value::from))
                .transpose()?;
            return Ok(ConfigurationItem {
                element: element.clone(),
                values,
                content,
                contributing_module: contributor.module_id().to_string(),
            });
        };

        if element.name != schema.element_name {
            return Err(HiveError::configuration(
                format!("Element {} is not allowed here; expected {}", element.name, schema.element_name),
                location.cloned(),
            ));
        }

        if let Some(unknown) = element.attributes.keys().find(|name| schema.attribute(name).is_none()) {
            return Err(HiveError::configuration(
                format!("Attribute {} is not allowed in element {}", unknown, element.name),
                location.cloned(),
            ));
        }

        let mut values = BTreeMap::new();
        for model in &schema.attributes {
            let raw = match (element.attribute(&model.name), &model.default) {
                (Some(raw), _) => raw,
                (None, Some(default)) => default.as_str(),
                (None, None) if model.required => {
                    return Err(HiveError::configuration(
                        format!("Element {} is missing required attribute {}", element.name, model.name),
                        location.cloned(),
                    ))
                }
                (None, None) => continue,
            };
            let value = contributor.translate_with(model.translator.as_deref(), &ValueType::Any, raw, location)?;
            values.insert(model.name.clone(), value);
        }

        let content = match &schema.content_translator {
            Some(spec) => Some(contributor.translate_with(Some(spec), &ValueType::Any, &element.content, location)?),
            None => None,
        };

        Ok(ConfigurationItem {
            element: element.clone(),
            values,
            content,
            contributing_module: contributor.module_id().to_string(),
        })
    }
}
