//! Фабрицированные классы и их экземпляры
//!
//! Класс хранит таблицу методов (поведение в виде замыканий), список полей,
//! конструкторы и реализуемые интерфейсы. Экземпляр хранит значения полей и
//! диспетчеризует вызовы `invoke()` по таблице методов класса.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::{FabricationError, InvocationError};
use crate::interface::InterfaceDescriptor;
use crate::object::ServiceObject;
use crate::signature::{MethodSignature, Modifiers};
use crate::value::{Value, ValueType};

/// Тело метода
pub type MethodBody =
    Arc<dyn Fn(&MethodContext<'_>) -> Result<Value, InvocationError> + Send + Sync>;

/// Обработчик catch-блока: получает пойманное исключение
pub type CatchBody =
    Arc<dyn Fn(&MethodContext<'_>, InvocationError) -> Result<Value, InvocationError> + Send + Sync>;

/// Логика "до" при расширении метода
pub type BeforeBody = Arc<dyn Fn(&MethodContext<'_>) -> Result<(), InvocationError> + Send + Sync>;

/// Логика "после" при расширении метода: получает результат исходного тела
pub type AfterBody =
    Arc<dyn Fn(&MethodContext<'_>, Value) -> Result<Value, InvocationError> + Send + Sync>;

/// Тело конструктора
pub type ConstructorBody =
    Arc<dyn Fn(&mut ConstructorContext<'_>) -> Result<(), InvocationError> + Send + Sync>;

/// Объявление поля
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: ValueType,
}

#[derive(Clone)]
pub(crate) struct CatchClause {
    pub exception_type: String,
    pub handler: CatchBody,
}

#[derive(Clone)]
pub(crate) struct MethodDef {
    pub signature: MethodSignature,
    pub modifiers: Modifiers,
    pub body: MethodBody,
    pub catches: Vec<CatchClause>,
    pub declared_by: String,
    /// Поля, к которым тело обращается (проверяются при finalize)
    pub field_refs: Vec<String>,
}

impl MethodDef {
    fn execute(&self, ctx: &MethodContext<'_>) -> Result<Value, InvocationError> {
        match (self.body)(ctx) {
            Ok(value) => Ok(value),
            Err(error) => match self
                .catches
                .iter()
                .find(|c| error.is_instance_of(&c.exception_type))
            {
                Some(clause) => (clause.handler)(ctx, error),
                None => Err(error),
            },
        }
    }
}

#[derive(Clone)]
pub(crate) struct ConstructorDef {
    pub parameter_types: Vec<ValueType>,
    pub exception_types: Vec<String>,
    pub body: ConstructorBody,
    pub field_refs: Vec<String>,
}

impl ConstructorDef {
    pub(crate) fn implicit() -> Self {
        Self {
            parameter_types: Vec::new(),
            exception_types: Vec::new(),
            body: Arc::new(|_| Ok(())),
            field_refs: Vec::new(),
        }
    }

    pub(crate) fn describe(&self) -> String {
        let params: Vec<String> = self.parameter_types.iter().map(|t| t.to_string()).collect();
        format!("constructor({})", params.join(","))
    }

    /// Проверяемое исключение, не перечисленное в `throws`, оборачивается
    fn check_thrown(&self, error: InvocationError) -> InvocationError {
        if error.is_unchecked() || self.exception_types.iter().any(|t| error.is_instance_of(t)) {
            return error;
        }
        InvocationError::new(
            "UndeclaredThrowableException",
            format!("{} threw undeclared {}", self.describe(), error),
        )
    }

    fn accepts(&self, args: &[Value]) -> bool {
        args.len() == self.parameter_types.len()
            && self
                .parameter_types
                .iter()
                .zip(args)
                .all(|(ty, arg)| ty.accepts(arg))
    }
}

/// Класс, построенный ClassBuilder'ом
pub struct FabricatedClass {
    pub(crate) name: String,
    pub(crate) superclass: Option<Arc<FabricatedClass>>,
    pub(crate) modifiers: Modifiers,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) constructors: Vec<ConstructorDef>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) interfaces: Vec<Arc<InterfaceDescriptor>>,
}

impl FabricatedClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&Arc<FabricatedClass>> {
        self.superclass.as_ref()
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.contains(Modifiers::FINAL)
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.contains(Modifiers::ABSTRACT)
    }

    /// Все поля, включая унаследованные
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Эффективные сигнатуры методов (с учётом переопределений)
    pub fn method_signatures(&self) -> Vec<MethodSignature> {
        self.methods.iter().map(|m| m.signature.clone()).collect()
    }

    /// Типы параметров всех конструкторов
    pub fn constructor_signatures(&self) -> Vec<Vec<ValueType>> {
        self.constructors.iter().map(|c| c.parameter_types.clone()).collect()
    }

    pub(crate) fn find_method(&self, signature: &MethodSignature) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.signature.overrides(signature))
    }

    pub fn interfaces(&self) -> &[Arc<InterfaceDescriptor>] {
        &self.interfaces
    }

    /// Является ли класс указанным классом/наследником или реализует интерфейс
    pub fn implements(&self, name: &str) -> bool {
        self.name == name
            || self.interfaces.iter().any(|i| i.is_assignable_to(name))
            || self
                .superclass
                .as_ref()
                .map(|s| s.implements(name))
                .unwrap_or(false)
    }

    /// Создать экземпляр, выбрав конструктор по фактическим аргументам
    pub fn new_instance(self: &Arc<Self>, args: &[Value]) -> Result<Arc<FabricatedObject>, FabricationError> {
        if self.is_abstract() {
            return Err(FabricationError::Instantiation {
                class_name: self.name.clone(),
                reason: "class is abstract".to_string(),
            });
        }

        let constructor = self
            .constructors
            .iter()
            .find(|c| c.accepts(args))
            .ok_or_else(|| {
                let kinds: Vec<&str> = args.iter().map(|a| a.kind()).collect();
                FabricationError::Instantiation {
                    class_name: self.name.clone(),
                    reason: format!("no constructor accepts ({})", kinds.join(", ")),
                }
            })?;

        let mut values: Vec<Value> = self.fields.iter().map(|f| f.field_type.default_value()).collect();

        {
            let mut ctx = ConstructorContext {
                class: self,
                args,
                fields: &mut values,
            };
            (constructor.body)(&mut ctx).map_err(|e| FabricationError::Instantiation {
                class_name: self.name.clone(),
                reason: constructor.check_thrown(e).to_string(),
            })?;
        }

        Ok(Arc::new(FabricatedObject {
            class: self.clone(),
            fields: RwLock::new(values),
        }))
    }
}

impl fmt::Debug for FabricatedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FabricatedClass")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name.clone()))
            .field("fields", &self.fields)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Экземпляр фабрицированного класса
pub struct FabricatedObject {
    class: Arc<FabricatedClass>,
    fields: RwLock<Vec<Value>>,
}

impl FabricatedObject {
    pub fn class(&self) -> &Arc<FabricatedClass> {
        &self.class
    }

    pub fn get_field(&self, name: &str) -> Result<Value, InvocationError> {
        let index = self.field_slot(name)?;
        Ok(self.fields.read()[index].clone())
    }

    pub fn set_field(&self, name: &str, value: Value) -> Result<(), InvocationError> {
        let index = self.field_slot(name)?;
        let field_type = &self.class.fields[index].field_type;
        if !field_type.accepts(&value) {
            return Err(InvocationError::illegal_argument(format!(
                "field {}.{} of type {} cannot hold a {} value",
                self.class.name,
                name,
                field_type,
                value.kind()
            )));
        }
        self.fields.write()[index] = value;
        Ok(())
    }

    fn field_slot(&self, name: &str) -> Result<usize, InvocationError> {
        self.class.field_index(name).ok_or_else(|| {
            InvocationError::new(
                "NoSuchFieldException",
                format!("{} has no field {}", self.class.name, name),
            )
        })
    }
}

impl ServiceObject for FabricatedObject {
    fn class_name(&self) -> &str {
        &self.class.name
    }

    fn implements(&self, interface: &str) -> bool {
        self.class.implements(interface)
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let mut candidates = self.class.methods.iter().filter(|m| m.signature.name == method).peekable();
        if candidates.peek().is_none() {
            return Err(InvocationError::no_such_method(&self.class.name, method));
        }

        let def = candidates.find(|m| m.signature.accepts(args)).ok_or_else(|| {
            let kinds: Vec<&str> = args.iter().map(|a| a.kind()).collect();
            InvocationError::illegal_argument(format!(
                "{}.{} does not accept ({})",
                self.class.name,
                method,
                kinds.join(", ")
            ))
        })?;

        let ctx = MethodContext {
            object: self,
            args,
            signature: &def.signature,
        };
        let result = def.execute(&ctx)?;

        if !def.signature.return_type.accepts(&result) {
            return Err(InvocationError::new(
                "ClassCastException",
                format!(
                    "{}.{} returned a {} value where {} was declared",
                    self.class.name,
                    method,
                    result.kind(),
                    def.signature.return_type
                ),
            ));
        }
        Ok(result)
    }
}

impl fmt::Debug for FabricatedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.class.name)
    }
}

/// Контекст выполнения тела метода
pub struct MethodContext<'a> {
    object: &'a FabricatedObject,
    args: &'a [Value],
    signature: &'a MethodSignature,
}

impl<'a> MethodContext<'a> {
    pub fn this(&self) -> &FabricatedObject {
        self.object
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Result<&Value, InvocationError> {
        self.args.get(index).ok_or_else(|| {
            InvocationError::illegal_argument(format!(
                "{} has no argument #{}",
                self.signature.unique_id(),
                index
            ))
        })
    }

    pub fn int_arg(&self, index: usize) -> Result<i64, InvocationError> {
        let value = self.arg(index)?;
        value.as_int().ok_or_else(|| {
            InvocationError::illegal_argument(format!("argument #{} is {}, not int", index, value.kind()))
        })
    }

    pub fn str_arg(&self, index: usize) -> Result<&str, InvocationError> {
        let value = self.arg(index)?;
        value.as_str().ok_or_else(|| {
            InvocationError::illegal_argument(format!("argument #{} is {}, not String", index, value.kind()))
        })
    }

    pub fn signature(&self) -> &MethodSignature {
        self.signature
    }

    pub fn method_name(&self) -> &str {
        &self.signature.name
    }

    pub fn field(&self, name: &str) -> Result<Value, InvocationError> {
        self.object.get_field(name)
    }

    pub fn set_field(&self, name: &str, value: Value) -> Result<(), InvocationError> {
        self.object.set_field(name, value)
    }

    /// Вызвать метод объекта, хранящегося в поле (делегирование)
    pub fn invoke_field(&self, field: &str, method: &str, args: &[Value]) -> Result<Value, InvocationError> {
        match self.field(field)? {
            Value::Object(target) => target.invoke(method, args),
            other => Err(InvocationError::new(
                "NullPointerException",
                format!("field {} holds {}, not an object", field, other.kind()),
            )),
        }
    }
}

/// Контекст выполнения тела конструктора
pub struct ConstructorContext<'a> {
    class: &'a FabricatedClass,
    args: &'a [Value],
    fields: &'a mut Vec<Value>,
}

impl<'a> ConstructorContext<'a> {
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Result<&Value, InvocationError> {
        self.args.get(index).ok_or_else(|| {
            InvocationError::illegal_argument(format!("constructor has no argument #{}", index))
        })
    }

    pub fn field(&self, name: &str) -> Result<&Value, InvocationError> {
        let index = self.slot(name)?;
        Ok(&self.fields[index])
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), InvocationError> {
        let index = self.slot(name)?;
        let field_type = &self.class.fields[index].field_type;
        if !field_type.accepts(&value) {
            return Err(InvocationError::illegal_argument(format!(
                "field {} of type {} cannot hold a {} value",
                name,
                field_type,
                value.kind()
            )));
        }
        self.fields[index] = value;
        Ok(())
    }

    /// Присвоить аргументы конструктора полям по порядку
    pub fn assign_args(&mut self, field_names: &[&str]) -> Result<(), InvocationError> {
        for (index, name) in field_names.iter().enumerate() {
            let value = self.arg(index)?.clone();
            self.set_field(name, value)?;
        }
        Ok(())
    }

    fn slot(&self, name: &str) -> Result<usize, InvocationError> {
        self.class.field_index(name).ok_or_else(|| {
            InvocationError::new(
                "NoSuchFieldException",
                format!("{} has no field {}", self.class.name, name),
            )
        })
    }
}
