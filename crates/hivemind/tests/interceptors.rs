use std::sync::Arc;

use classfab::{ClassFactory, InvocationError, MethodSignature, Modifiers, ServiceObject, Value, ValueType};
use hivemind::interceptors::{MethodInterceptorFactory, LOGGING_INTERCEPTOR};
use hivemind::{
    BuilderFactory, Element, HiveError, ImplementationDefinition, InterceptorDefinition, InterceptorFactoryDefinition,
    LogLevel, MethodInvocation, ModuleDefinition, RecordingLogFactory, Registry, ServicePointDefinition,
};
use parking_lot::Mutex;
use rstest::rstest;

const ADDER: &str = "hivemind.test.Adder";
const SERVICE: &str = "hivemind.test.Simple";

fn add_signature() -> MethodSignature {
    MethodSignature::new("add", ValueType::Int, vec![ValueType::Int, ValueType::Int])
}

fn fail_signature() -> MethodSignature {
    MethodSignature::new("fail", ValueType::Void, vec![])
}

/// Adder с методом `fail()`, который всегда бросает исключение
fn adder_factory() -> anyhow::Result<ClassFactory> {
    let factory = ClassFactory::new();
    let adder = factory
        .new_interface(ADDER)
        .add_method(add_signature())
        .add_method(fail_signature())
        .finalize()?;
    factory
        .new_class("hivemind.test.AdderImpl", None)
        .add_interface(adder)
        .add_method(Modifiers::PUBLIC, add_signature(), |ctx| {
            Ok(Value::Int(ctx.int_arg(0)? + ctx.int_arg(1)?))
        })
        .add_method(Modifiers::PUBLIC, fail_signature(), |_| {
            Err(InvocationError::new("RuntimeException", "boom"))
        })
        .finalize()?;
    Ok(factory)
}

fn simple_point() -> ServicePointDefinition {
    ServicePointDefinition::new("Simple", ADDER).with_implementation(ImplementationDefinition::new(Arc::new(
        BuilderFactory::new("hivemind.test.AdderImpl"),
    )))
}

/// Фабрика перехватчика, который записывает своё имя перед передачей вызова
fn tracing_factory(name: &'static str, trace: Arc<Mutex<Vec<String>>>) -> InterceptorFactoryDefinition {
    let interceptor = move |invocation: &mut MethodInvocation<'_>| -> Result<Value, InvocationError> {
        trace.lock().push(name.to_string());
        invocation.proceed()
    };
    InterceptorFactoryDefinition::new(name, Arc::new(MethodInterceptorFactory::new(Arc::new(interceptor))))
}

#[test]
fn test_logging_interceptor_logs_begin_end_and_exceptions() -> anyhow::Result<()> {
    // Arrange
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test")
                .add_service_point(simple_point().with_interceptor(InterceptorDefinition::new(LOGGING_INTERCEPTOR))),
        )
        .build()?;
    let adder = registry.get_service(SERVICE, ADDER)?;

    // Act
    let sum = adder.invoke("add", &[Value::Int(4), Value::Int(7)])?;
    let failure = adder.invoke("fail", &[]).unwrap_err();

    // Assert
    assert_eq!(sum, Value::Int(11));
    assert_eq!(failure.message, "boom");
    let messages = logs.messages_for(SERVICE);
    assert!(messages.contains(&"BEGIN add(4, 7)".to_string()), "{messages:?}");
    assert!(messages.contains(&"END add() [11]".to_string()), "{messages:?}");
    assert!(messages.contains(&"BEGIN fail()".to_string()), "{messages:?}");
    assert_eq!(logs.count_starting_with("EXCEPTION fail() -- boom"), 1);
    assert_eq!(logs.count_starting_with("END fail()"), 0);
    Ok(())
}

#[test]
fn test_logging_interceptor_is_silent_above_debug() -> anyhow::Result<()> {
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Info));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test")
                .add_service_point(simple_point().with_interceptor(InterceptorDefinition::new(LOGGING_INTERCEPTOR))),
        )
        .build()?;

    let adder = registry.get_service(SERVICE, ADDER)?;
    assert_eq!(adder.invoke("add", &[Value::Int(1), Value::Int(2)])?, Value::Int(3));

    assert_eq!(logs.count_starting_with("BEGIN"), 0);
    assert_eq!(logs.count_starting_with("END"), 0);
    Ok(())
}

#[rstest]
#[case::exclude_fail("exclude", "fail", 0, 1)]
#[case::include_only_add("include", "add(2)", 1, 1)]
#[case::exclude_by_arity("exclude", "add(2)", 1, 0)]
fn test_logging_interceptor_method_filter(
    #[case] rule: &str,
    #[case] pattern: &str,
    #[case] fail_begins: usize,
    #[case] add_begins: usize,
) -> anyhow::Result<()> {
    // Arrange - include без exclude перехватывает всё (по умолчанию include)
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(simple_point().with_interceptor(
                InterceptorDefinition::new(LOGGING_INTERCEPTOR)
                    .with_parameter(Element::new(rule).with_attribute("method", pattern)),
            )),
        )
        .build()?;
    let adder = registry.get_service(SERVICE, ADDER)?;

    // Act
    adder.invoke("add", &[Value::Int(1), Value::Int(1)])?;
    let _ = adder.invoke("fail", &[]);

    // Assert
    assert_eq!(logs.count_starting_with("BEGIN fail()"), fail_begins);
    assert_eq!(logs.count_starting_with("BEGIN add("), add_begins);
    Ok(())
}

#[test]
fn test_interceptor_ordering_follows_declared_constraints() -> anyhow::Result<()> {
    // Arrange - Fred следует за Barney, Barney следует за Wilma
    let trace = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .add_module(
            ModuleDefinition::new("hivemind.test")
                .add_interceptor_factory(tracing_factory("Fred", trace.clone()))
                .add_interceptor_factory(tracing_factory("Barney", trace.clone()))
                .add_interceptor_factory(tracing_factory("Wilma", trace.clone()))
                .add_service_point(
                    simple_point()
                        .with_interceptor(InterceptorDefinition::new("Fred").follows("Barney"))
                        .with_interceptor(InterceptorDefinition::new("Barney").follows("Wilma"))
                        .with_interceptor(InterceptorDefinition::new("Wilma")),
                ),
        )
        .build()?;
    let adder = registry.get_service(SERVICE, ADDER)?;

    // Act
    let sum = adder.invoke("add", &[Value::Int(2), Value::Int(3)])?;

    // Assert - первый в порядке перехватчик оказывается самым внешним
    assert_eq!(sum, Value::Int(5));
    assert_eq!(*trace.lock(), vec!["Wilma", "Barney", "Fred"]);
    Ok(())
}

#[test]
fn test_interceptors_from_another_module_are_qualified() -> anyhow::Result<()> {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .add_module(
            ModuleDefinition::new("hivemind.test")
                .add_interceptor_factory(tracing_factory("Inner", trace.clone()))
                .add_service_point(simple_point().with_interceptor(InterceptorDefinition::new("Inner"))),
        )
        .add_module(
            ModuleDefinition::new("hivemind.other")
                .add_interceptor_factory(tracing_factory("Outer", trace.clone()))
                .contribute_interceptor(
                    SERVICE,
                    InterceptorDefinition::new("Outer").precedes("hivemind.test.Inner"),
                ),
        )
        .build()?;

    let adder = registry.get_service(SERVICE, ADDER)?;
    adder.invoke("add", &[Value::Int(1), Value::Int(1)])?;

    assert_eq!(*trace.lock(), vec!["Outer", "Inner"]);
    Ok(())
}

#[test]
fn test_interceptor_cycle_fails_construction() -> anyhow::Result<()> {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .add_module(
            ModuleDefinition::new("hivemind.test")
                .add_interceptor_factory(tracing_factory("Fred", trace.clone()))
                .add_interceptor_factory(tracing_factory("Barney", trace.clone()))
                .add_service_point(
                    simple_point()
                        .with_interceptor(InterceptorDefinition::new("Fred").follows("Barney"))
                        .with_interceptor(InterceptorDefinition::new("Barney").follows("Fred")),
                ),
        )
        .build()?;

    let adder = registry.get_service(SERVICE, ADDER)?;
    let err = HiveError::from(adder.invoke("add", &[Value::Int(1), Value::Int(1)]).unwrap_err());

    assert!(
        matches!(&err, HiveError::InterceptorCycle { service_id, .. } if service_id == SERVICE),
        "unexpected error: {err}"
    );
    assert!(trace.lock().is_empty());
    Ok(())
}

#[test]
fn test_unknown_interceptor_factory_is_reported_and_skipped() -> anyhow::Result<()> {
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test")
                .add_service_point(simple_point().with_interceptor(InterceptorDefinition::new("Missing"))),
        )
        .build()?;

    let adder = registry.get_service(SERVICE, ADDER)?;

    assert_eq!(adder.invoke("add", &[Value::Int(2), Value::Int(2)])?, Value::Int(4));
    assert_eq!(
        logs.count_starting_with("Unknown interceptor factory hivemind.test.Missing for service hivemind.test.Simple"),
        1
    );
    Ok(())
}

#[test]
fn test_private_interceptor_factory_is_not_visible_to_other_modules() -> anyhow::Result<()> {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .with_log_factory(logs.clone())
        .add_module(ModuleDefinition::new("hivemind.test").add_service_point(simple_point()))
        .add_module(
            ModuleDefinition::new("hivemind.other")
                .add_interceptor_factory(tracing_factory("Secret", trace.clone()).private()),
        )
        .add_module(
            ModuleDefinition::new("hivemind.third")
                .contribute_interceptor(SERVICE, InterceptorDefinition::new("hivemind.other.Secret")),
        )
        .build()?;

    let adder = registry.get_service(SERVICE, ADDER)?;
    adder.invoke("add", &[Value::Int(1), Value::Int(1)])?;

    assert!(trace.lock().is_empty());
    assert_eq!(
        logs.count_starting_with("Interceptor factory hivemind.other.Secret is not visible to module hivemind.third"),
        1
    );
    Ok(())
}
