//! Шаблоны методов для include/exclude
//!
//! Шаблон: glob по имени метода и необязательная арность в скобках,
//! например `get*`, `add(2)`, `*(0)`.

use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use classfab::MethodSignature;
use globset::{Glob, GlobMatcher};

use crate::definition::Element;
use crate::errors::HiveError;

#[derive(Debug, Clone)]
pub struct MethodPattern {
    source: String,
    matcher: GlobMatcher,
    arity: Option<usize>,
}

impl MethodPattern {
    pub fn parse(pattern: &str) -> Result<Self, HiveError> {
        let trimmed = pattern.trim();
        let (name, arity) = match trimmed.find('(') {
            Some(open) => {
                let Some(inner) = trimmed[open + 1..].strip_suffix(')') else {
                    return Err(HiveError::configuration(
                        format!("Method pattern '{}' is missing a closing parenthesis", pattern),
                        None,
                    ));
                };
                let arity = inner.trim().parse::<usize>().map_err(|_| {
                    HiveError::configuration(format!("Method pattern '{}' has an invalid parameter count", pattern), None)
                })?;
                (&trimmed[..open], Some(arity))
            }
            None => (trimmed, None),
        };

        if name.is_empty() {
            return Err(HiveError::configuration(
                format!("Method pattern '{}' has no method name", pattern),
                None,
            ));
        }

        let matcher = Glob::new(name)
            .map_err(|e| HiveError::configuration(format!("Invalid method pattern '{}': {}", pattern, e), None))?
            .compile_matcher();

        Ok(Self {
            source: trimmed.to_string(),
            matcher,
            arity,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, signature: &MethodSignature) -> bool {
        self.matcher.is_match(&signature.name) && self.arity.map_or(true, |n| n == signature.arity())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Include,
    Exclude,
}

/// Упорядоченный список правил; первое совпадение решает, по умолчанию include
#[derive(Debug, Clone, Default)]
pub struct MethodFilter {
    rules: Vec<(Rule, MethodPattern)>,
}

impl MethodFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: &str) -> Result<Self, HiveError> {
        self.rules.push((Rule::Include, MethodPattern::parse(pattern)?));
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self, HiveError> {
        self.rules.push((Rule::Exclude, MethodPattern::parse(pattern)?));
        Ok(self)
    }

    /// Из параметров перехватчика: элементы `include` / `exclude` с атрибутом `method`
    pub fn from_parameters(parameters: &[Element]) -> Result<Self, HiveError> {
        let mut filter = Self::new();
        for element in parameters {
            let rule = match element.name.as_str() {
                "include" => Rule::Include,
                "exclude" => Rule::Exclude,
                _ => continue,
            };
            let pattern = element.attributes.get("method").ok_or_else(|| {
                HiveError::configuration(
                    format!("Element <{}> requires a 'method' attribute", element.name),
                    element.location.clone(),
                )
            })?;
            let pattern = MethodPattern::parse(pattern).map_err(|e| match e {
                HiveError::Configuration { message, .. } => HiveError::configuration(message, element.location.clone()),
                other => other,
            })?;
            filter.rules.push((rule, pattern));
        }
        Ok(filter)
    }

    /// Добавить правила другого фильтра в конец (с меньшим приоритетом)
    pub fn extend(&mut self, other: &MethodFilter) {
        self.rules.extend(other.rules.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn includes(&self, signature: &MethodSignature) -> bool {
        self.rules
            .iter()
            .find(|(_, pattern)| pattern.matches(signature))
            .map_or(true, |(rule, _)| *rule == Rule::Include)
    }

    /// Отпечаток правил для имени кэшируемого класса
    pub fn fingerprint(&self) -> String {
        if self.rules.is_empty() {
            return "all".to_string();
        }
        let mut hasher = DefaultHasher::new();
        for (rule, pattern) in &self.rules {
            (*rule == Rule::Include).hash(&mut hasher);
            pattern.as_str().hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classfab::ValueType;
    use rstest::rstest;

    fn sig(name: &str, arity: usize) -> MethodSignature {
        MethodSignature::new(name, ValueType::Int, vec![ValueType::Int; arity])
    }

    #[rstest]
    #[case("add", "add", 2, true)]
    #[case("add(2)", "add", 2, true)]
    #[case("add(1)", "add", 2, false)]
    #[case("get*", "getName", 0, true)]
    #[case("get*", "setName", 1, false)]
    #[case("*(0)", "toString", 0, true)]
    #[case("*(0)", "add", 2, false)]
    fn test_pattern_matching(
        #[case] pattern: &str,
        #[case] name: &str,
        #[case] arity: usize,
        #[case] expected: bool,
    ) -> anyhow::Result<()> {
        let pattern = MethodPattern::parse(pattern)?;
        assert_eq!(pattern.matches(&sig(name, arity)), expected);
        Ok(())
    }

    #[rstest]
    #[case("")]
    #[case("add(")]
    #[case("add(x)")]
    #[case("(2)")]
    fn test_invalid_patterns(#[case] pattern: &str) {
        assert!(MethodPattern::parse(pattern).is_err());
    }

    #[test]
    fn test_first_match_wins() -> anyhow::Result<()> {
        // Arrange
        let filter = MethodFilter::new().include("getSecret(0)")?.exclude("get*")?;

        // Act & Assert
        assert!(filter.includes(&sig("getSecret", 0)));
        assert!(!filter.includes(&sig("getName", 0)));
        assert!(filter.includes(&sig("add", 2)));
        Ok(())
    }

    #[test]
    fn test_from_parameters() -> anyhow::Result<()> {
        let parameters = vec![
            Element::new("exclude").with_attribute("method", "subtract"),
            Element::new("unrelated"),
        ];
        let filter = MethodFilter::from_parameters(&parameters)?;

        assert!(!filter.includes(&sig("subtract", 2)));
        assert!(filter.includes(&sig("add", 2)));

        let missing = MethodFilter::from_parameters(&[Element::new("include")]);
        assert!(matches!(missing, Err(HiveError::Configuration { .. })));
        Ok(())
    }

    #[test]
    fn test_fingerprint_distinguishes_rules() -> anyhow::Result<()> {
        let a = MethodFilter::new().exclude("get*")?;
        let b = MethodFilter::new().include("get*")?;

        assert_eq!(MethodFilter::new().fingerprint(), "all");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), MethodFilter::new().exclude("get*")?.fingerprint());
        Ok(())
    }
}
