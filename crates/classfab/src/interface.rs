//! Интерфейсы: именованные наборы сигнатур методов с наследованием

use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{BuildCause, FabricationError};
use crate::factory::ClassFactory;
use crate::signature::MethodSignature;

/// Описание интерфейса, зарегистрированного в ClassFactory
#[derive(Debug)]
pub struct InterfaceDescriptor {
    name: String,
    methods: Vec<MethodSignature>,
    extends: Vec<Arc<InterfaceDescriptor>>,
}

impl InterfaceDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Методы, объявленные непосредственно в интерфейсе
    pub fn declared_methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    pub fn extends(&self) -> &[Arc<InterfaceDescriptor>] {
        &self.extends
    }

    /// Все методы, включая унаследованные (без дубликатов по unique_id)
    pub fn all_methods(&self) -> Vec<MethodSignature> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        self.collect_methods(&mut seen, &mut result);
        result
    }

    fn collect_methods(&self, seen: &mut HashSet<String>, out: &mut Vec<MethodSignature>) {
        for method in &self.methods {
            if seen.insert(method.unique_id()) {
                out.push(method.clone());
            }
        }
        for parent in &self.extends {
            parent.collect_methods(seen, out);
        }
    }

    pub fn find_method(&self, name: &str) -> Option<MethodSignature> {
        self.all_methods().into_iter().find(|m| m.name == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
            || self.extends.iter().any(|p| p.has_method(name))
    }

    /// Совместим ли интерфейс с запрошенным (тот же или наследник)
    pub fn is_assignable_to(&self, interface: &str) -> bool {
        self.name == interface || self.extends.iter().any(|p| p.is_assignable_to(interface))
    }

    /// Имя интерфейса и всех его предков
    pub fn ancestor_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for parent in &self.extends {
            for name in parent.ancestor_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// Builder интерфейса. Ошибки накапливаются и возвращаются из `finalize()`.
pub struct InterfaceBuilder {
    factory: ClassFactory,
    name: String,
    methods: Vec<MethodSignature>,
    extends: Vec<Arc<InterfaceDescriptor>>,
    pending: Option<BuildCause>,
}

impl InterfaceBuilder {
    pub(crate) fn new(factory: ClassFactory, name: String) -> Self {
        Self {
            factory,
            name,
            methods: Vec::new(),
            extends: Vec::new(),
            pending: None,
        }
    }

    pub fn add_method(mut self, signature: MethodSignature) -> Self {
        if self.methods.iter().any(|m| m.overrides(&signature)) {
            self.fail(BuildCause::DuplicateMethod {
                signature: signature.unique_id(),
            });
        } else {
            self.methods.push(signature);
        }
        self
    }

    pub fn extend(mut self, parent: Arc<InterfaceDescriptor>) -> Self {
        if !self.extends.iter().any(|p| p.name == parent.name) {
            self.extends.push(parent);
        }
        self
    }

    fn fail(&mut self, cause: BuildCause) {
        if self.pending.is_none() {
            self.pending = Some(cause);
        }
    }

    /// Зарегистрировать интерфейс в фабрике
    pub fn finalize(self) -> Result<Arc<InterfaceDescriptor>, FabricationError> {
        if let Some(cause) = self.pending {
            return Err(FabricationError::unable_to_build(self.name, cause));
        }

        let descriptor = Arc::new(InterfaceDescriptor {
            name: self.name.clone(),
            methods: self.methods,
            extends: self.extends,
        });

        self.factory
            .register_interface(descriptor.clone())
            .map_err(|cause| FabricationError::unable_to_build(self.name, cause))?;

        Ok(descriptor)
    }
}
