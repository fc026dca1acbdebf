use std::sync::Arc;

use tracing::debug;

use crate::errors::{BuildCause, FabricationError, InvocationError};
use crate::fabricated::{
    AfterBody, BeforeBody, CatchBody, CatchClause, ConstructorBody, ConstructorContext, ConstructorDef, FabricatedClass,
    FieldDef, MethodBody, MethodContext, MethodDef,
};
use crate::factory::ClassFactory;
use crate::interface::InterfaceDescriptor;
use crate::signature::{MethodSignature, Modifiers};
use crate::value::{Value, ValueType};

/// Дополнительная логика вокруг существующего тела метода
#[derive(Default, Clone)]
pub struct MethodExtension {
    before: Option<BeforeBody>,
    after: Option<AfterBody>,
}

impl MethodExtension {
    pub fn before<F>(body: F) -> Self
    where
        F: Fn(&MethodContext<'_>) -> Result<(), InvocationError> + Send + Sync + 'static,
    {
        Self {
            before: Some(Arc::new(body)),
            after: None,
        }
    }

    pub fn after<F>(body: F) -> Self
    where
        F: Fn(&MethodContext<'_>, Value) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        Self {
            before: None,
            after: Some(Arc::new(body)),
        }
    }

    pub fn and_after<F>(mut self, body: F) -> Self
    where
        F: Fn(&MethodContext<'_>, Value) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(body));
        self
    }

    fn wrap(self, inner: MethodBody) -> MethodBody {
        let MethodExtension { before, after } = self;
        Arc::new(move |ctx: &MethodContext<'_>| {
            if let Some(before) = &before {
                before(ctx)?;
            }
            let result = inner(ctx)?;
            match &after {
                Some(after) => after(ctx, result),
                None => Ok(result),
            }
        })
    }
}

/// Builder фабрицированного класса.
///
/// Методы цепочки принимают `self` по значению; первая ошибка запоминается
/// и возвращается из `finalize()`, остальные вызовы после неё игнорируются.
pub struct ClassBuilder {
    factory: ClassFactory,
    name: String,
    superclass: Option<Arc<FabricatedClass>>,
    modifiers: Modifiers,
    fields: Vec<FieldDef>,
    constructors: Vec<ConstructorDef>,
    methods: Vec<MethodDef>,
    interfaces: Vec<Arc<InterfaceDescriptor>>,
    pending: Option<BuildCause>,
}

impl ClassBuilder {
    pub(crate) fn new(factory: ClassFactory, name: String, superclass: Option<Arc<FabricatedClass>>) -> Self {
        let mut builder = Self {
            factory,
            name,
            superclass: None,
            modifiers: Modifiers::PUBLIC,
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            interfaces: Vec::new(),
            pending: None,
        };

        if let Some(parent) = superclass {
            if parent.is_final() {
                builder.fail(BuildCause::FinalSuperclass {
                    superclass: parent.name().to_string(),
                });
            }
            builder.superclass = Some(parent);
        }
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn add_interface(mut self, interface: Arc<InterfaceDescriptor>) -> Self {
        if !self.interfaces.iter().any(|i| i.name() == interface.name()) {
            self.interfaces.push(interface);
        }
        self
    }

    pub fn add_field(mut self, name: impl Into<String>, field_type: ValueType) -> Self {
        let name = name.into();
        let inherited = self
            .superclass
            .as_ref()
            .map(|s| s.field(&name).is_some())
            .unwrap_or(false);

        if inherited || self.fields.iter().any(|f| f.name == name) {
            self.fail(BuildCause::DuplicateField { name });
        } else {
            self.fields.push(FieldDef { name, field_type });
        }
        self
    }

    /// Конструктор с произвольным телом. Проверяемые исключения, которые тело
    /// может выбросить, перечисляются в `exception_types`.
    pub fn add_constructor<F>(self, parameter_types: Vec<ValueType>, exception_types: &[&str], body: F) -> Self
    where
        F: Fn(&mut ConstructorContext<'_>) -> Result<(), InvocationError> + Send + Sync + 'static,
    {
        self.push_constructor(parameter_types, exception_types, Arc::new(body), Vec::new())
    }

    /// Конструктор, присваивающий аргументы полям по порядку.
    /// Имена полей проверяются при `finalize()`.
    pub fn add_constructor_assigning(self, parameter_types: Vec<ValueType>, fields: &[&str]) -> Self {
        let field_refs: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        if field_refs.len() != parameter_types.len() {
            let mut builder = self;
            let params: Vec<String> = parameter_types.iter().map(|t| t.to_string()).collect();
            builder.fail(BuildCause::MalformedBody {
                member: format!("constructor({})", params.join(",")),
                reason: format!("assigns {} fields from {} parameters", field_refs.len(), parameter_types.len()),
            });
            return builder;
        }

        let assigned = field_refs.clone();
        let body = move |ctx: &mut ConstructorContext<'_>| -> Result<(), InvocationError> {
            for (index, name) in assigned.iter().enumerate() {
                let value = ctx.arg(index)?.clone();
                ctx.set_field(name, value)?;
            }
            Ok(())
        };
        self.push_constructor(parameter_types, &[], Arc::new(body), field_refs)
    }

    fn push_constructor(
        mut self,
        parameter_types: Vec<ValueType>,
        exception_types: &[&str],
        body: ConstructorBody,
        field_refs: Vec<String>,
    ) -> Self {
        if self.constructors.iter().any(|c| c.parameter_types == parameter_types) {
            let params: Vec<String> = parameter_types.iter().map(|t| t.to_string()).collect();
            self.fail(BuildCause::DuplicateConstructor {
                parameters: params.join(","),
            });
        } else {
            self.constructors.push(ConstructorDef {
                parameter_types,
                exception_types: exception_types.iter().map(|s| s.to_string()).collect(),
                body,
                field_refs,
            });
        }
        self
    }

    pub fn add_method<F>(self, modifiers: Modifiers, signature: MethodSignature, body: F) -> Self
    where
        F: Fn(&MethodContext<'_>) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        self.add_method_body(modifiers, signature, Arc::new(body))
    }

    /// Вариант `add_method` для заранее собранного тела
    pub fn add_method_body(self, modifiers: Modifiers, signature: MethodSignature, body: MethodBody) -> Self {
        self.push_method(modifiers, signature, body, Vec::new())
    }

    /// Метод, передающий вызов объекту из поля `field` (тот же метод, те же аргументы)
    pub fn add_delegating_method(self, modifiers: Modifiers, signature: MethodSignature, field: &str) -> Self {
        let target = field.to_string();
        let body: MethodBody = Arc::new(move |ctx: &MethodContext<'_>| {
            ctx.invoke_field(&target, ctx.method_name(), ctx.args())
        });
        self.push_method(modifiers, signature, body, vec![field.to_string()])
    }

    fn push_method(
        mut self,
        modifiers: Modifiers,
        signature: MethodSignature,
        body: MethodBody,
        field_refs: Vec<String>,
    ) -> Self {
        if self.methods.iter().any(|m| m.signature.overrides(&signature)) {
            self.fail(BuildCause::DuplicateMethod {
                signature: signature.unique_id(),
            });
            return self;
        }

        if let Some(inherited) = self.superclass.as_ref().and_then(|s| s.find_method(&signature)) {
            if inherited.modifiers.contains(Modifiers::FINAL) {
                let declared_by = inherited.declared_by.clone();
                self.fail(BuildCause::FinalMethod {
                    signature: signature.unique_id(),
                    declared_by,
                });
                return self;
            }
        }

        self.methods.push(MethodDef {
            signature,
            modifiers,
            body,
            catches: Vec::new(),
            declared_by: self.name.clone(),
            field_refs,
        });
        self
    }

    /// Добавить catch-блок к методу (собственному или унаследованному)
    pub fn add_catch<F>(mut self, signature: &MethodSignature, exception_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&MethodContext<'_>, InvocationError) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        let handler: CatchBody = Arc::new(handler);
        let exception_type = exception_type.into();
        match self.own_method_index(signature) {
            Some(index) => {
                self.methods[index].catches.push(CatchClause {
                    exception_type,
                    handler,
                });
            }
            None => self.fail(BuildCause::MalformedBody {
                member: signature.unique_id(),
                reason: "no method to attach the catch clause to".to_string(),
            }),
        }
        self
    }

    /// Обернуть тело уже определённого метода логикой до/после
    pub fn extend_method(mut self, signature: &MethodSignature, extension: MethodExtension) -> Self {
        match self.own_method_index(signature) {
            Some(index) => {
                let inner = self.methods[index].body.clone();
                self.methods[index].body = extension.wrap(inner);
            }
            None => self.fail(BuildCause::MalformedBody {
                member: signature.unique_id(),
                reason: "no method to extend".to_string(),
            }),
        }
        self
    }

    /// Индекс собственного метода; унаследованный метод копируется в класс
    fn own_method_index(&mut self, signature: &MethodSignature) -> Option<usize> {
        if let Some(index) = self.methods.iter().position(|m| m.signature.overrides(signature)) {
            return Some(index);
        }

        let inherited = self.superclass.as_ref()?.find_method(signature)?.clone();
        if inherited.modifiers.contains(Modifiers::FINAL) {
            return None;
        }
        self.methods.push(MethodDef {
            declared_by: self.name.clone(),
            ..inherited
        });
        Some(self.methods.len() - 1)
    }

    fn fail(&mut self, cause: BuildCause) {
        if self.pending.is_none() {
            self.pending = Some(cause);
        }
    }

    /// Проверить и зарегистрировать класс в фабрике
    pub fn finalize(self) -> Result<Arc<FabricatedClass>, FabricationError> {
        if let Some(cause) = self.pending {
            return Err(FabricationError::unable_to_build(self.name, cause));
        }

        let ClassBuilder {
            factory,
            name,
            superclass,
            modifiers,
            fields: own_fields,
            constructors: own_constructors,
            methods: own_methods,
            interfaces: own_interfaces,
            pending: _,
        } = self;

        let mut fields = Vec::new();
        let mut methods: Vec<MethodDef> = Vec::new();
        let mut interfaces: Vec<Arc<InterfaceDescriptor>> = Vec::new();
        let mut inherited_constructors = Vec::new();

        if let Some(parent) = &superclass {
            fields.extend(parent.fields.iter().cloned());
            methods.extend(parent.methods.iter().cloned());
            interfaces.extend(parent.interfaces.iter().cloned());
            inherited_constructors = parent.constructors.clone();
        }

        fields.extend(own_fields);

        let undeclared = |refs: &[String]| refs.iter().find(|r| !fields.iter().any(|f| &f.name == *r)).cloned();
        for constructor in &own_constructors {
            if let Some(field) = undeclared(&constructor.field_refs) {
                return Err(FabricationError::unable_to_build(
                    name,
                    BuildCause::MalformedBody {
                        member: constructor.describe(),
                        reason: format!("references undeclared field {}", field),
                    },
                ));
            }
        }
        for method in &own_methods {
            if let Some(field) = undeclared(&method.field_refs) {
                return Err(FabricationError::unable_to_build(
                    name,
                    BuildCause::MalformedBody {
                        member: method.signature.unique_id(),
                        reason: format!("references undeclared field {}", field),
                    },
                ));
            }
        }

        for method in own_methods {
            match methods.iter().position(|m| m.signature.overrides(&method.signature)) {
                Some(index) => methods[index] = method,
                None => methods.push(method),
            }
        }

        for interface in own_interfaces {
            if !interfaces.iter().any(|i| i.name() == interface.name()) {
                interfaces.push(interface);
            }
        }

        let constructors = if !own_constructors.is_empty() {
            own_constructors
        } else if !inherited_constructors.is_empty() {
            inherited_constructors
        } else {
            vec![ConstructorDef::implicit()]
        };

        if !modifiers.contains(Modifiers::ABSTRACT) {
            for interface in &interfaces {
                for required in interface.all_methods() {
                    if !methods.iter().any(|m| m.signature.overrides(&required)) {
                        return Err(FabricationError::unable_to_build(
                            name,
                            BuildCause::MissingImplementation {
                                interface: interface.name().to_string(),
                                method: required.unique_id(),
                            },
                        ));
                    }
                }
            }
        }

        let class = Arc::new(FabricatedClass {
            name: name.clone(),
            superclass,
            modifiers,
            fields,
            constructors,
            methods,
            interfaces,
        });

        factory
            .register_class(class.clone())
            .map_err(|cause| FabricationError::unable_to_build(name, cause))?;

        debug!("Fabricated class {} ({} methods)", class.name(), class.methods.len());
        Ok(class)
    }
}
