use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use classfab::{same_object, ClassFactory, InterfaceDescriptor, MethodSignature, Modifiers, Value, ValueType};
use hivemind::implementation::{BuilderFactory, ConstructionContext};
use hivemind::lifecycle::{declare_lifecycle_interfaces, DISCARDABLE, POOL_MANAGEABLE, REGISTRY_SHUTDOWN_LISTENER};
use hivemind::runtime::ConstructionState;
use hivemind::{
    HiveError, ImplementationDefinition, LogLevel, ModuleDefinition, RecordingLogFactory, Registry,
    ServicePointDefinition, ServiceRef,
};

const ADDER: &str = "hivemind.test.Adder";
const COUNTER: &str = "hivemind.test.Counter";

fn add_signature() -> MethodSignature {
    MethodSignature::new("add", ValueType::Int, vec![ValueType::Int, ValueType::Int])
}

fn next_signature() -> MethodSignature {
    MethodSignature::new("next", ValueType::Int, vec![])
}

fn void(name: &str) -> MethodSignature {
    MethodSignature::new(name, ValueType::Void, vec![])
}

/// Фабрика с интерфейсом Adder и классом AdderImpl
fn adder_factory() -> anyhow::Result<ClassFactory> {
    let factory = ClassFactory::new();
    let adder = factory.new_interface(ADDER).add_method(add_signature()).finalize()?;
    factory
        .new_class("hivemind.test.AdderImpl", None)
        .add_interface(adder)
        .add_method(Modifiers::PUBLIC, add_signature(), |ctx| {
            Ok(Value::Int(ctx.int_arg(0)? + ctx.int_arg(1)?))
        })
        .finalize()?;
    Ok(factory)
}

/// Счётчик: каждый экземпляр считает свои вызовы `next()`
fn counter_class(factory: &ClassFactory, extra: &[Arc<InterfaceDescriptor>], events: Arc<AtomicUsize>) -> anyhow::Result<()> {
    let counter = factory.ensure_interface(COUNTER, |f| f.new_interface(COUNTER).add_method(next_signature()).finalize())?;

    let mut builder = factory
        .new_class("hivemind.test.CounterImpl", None)
        .add_interface(counter)
        .add_field("count", ValueType::Int)
        .add_method(Modifiers::PUBLIC, next_signature(), |ctx| {
            let next = ctx.field("count")?.as_int().unwrap_or(0) + 1;
            ctx.set_field("count", Value::Int(next))?;
            Ok(Value::Int(next))
        });

    for interface in extra {
        builder = builder.add_interface(interface.clone());
        for signature in interface.all_methods() {
            let events = events.clone();
            builder = builder.add_method(Modifiers::PUBLIC, signature, move |_| {
                events.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            });
        }
    }
    builder.finalize()?;
    Ok(())
}

fn counter_registry(model: &str, factory: ClassFactory) -> anyhow::Result<Registry> {
    Ok(Registry::builder()
        .with_class_factory(factory)
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(
                ServicePointDefinition::new("Counter", COUNTER)
                    .with_service_model(model)
                    .with_implementation(ImplementationDefinition::new(Arc::new(BuilderFactory::new(
                        "hivemind.test.CounterImpl",
                    )))),
            ),
        )
        .build()?)
}

#[test]
fn test_simple_singleton_adds_and_is_cached() -> anyhow::Result<()> {
    // Arrange
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(
                ServicePointDefinition::new("Simple", ADDER).with_implementation(ImplementationDefinition::new(
                    Arc::new(BuilderFactory::new("hivemind.test.AdderImpl")),
                )),
            ),
        )
        .build()?;

    // Act
    let adder = registry.get_service("hivemind.test.Simple", ADDER)?;
    let again = registry.get_service("hivemind.test.Simple", ADDER)?;

    // Assert
    assert!(same_object(&adder, &again));
    assert_eq!(adder.invoke("add", &[Value::Int(4), Value::Int(7)])?, Value::Int(11));
    assert_eq!(
        logs.messages_for("hivemind.test.Simple"),
        vec![
            "Creating SingletonProxy for service hivemind.test.Simple".to_string(),
            "Constructing core service implementation for service hivemind.test.Simple".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn test_singleton_is_built_once_under_contention() -> anyhow::Result<()> {
    // Arrange - реализация считает построения
    let factory = adder_factory()?;
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();

    let registry = Registry::builder()
        .with_class_factory(factory)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(
                ServicePointDefinition::new("Simple", ADDER).with_implementation(ImplementationDefinition::from_fn(
                    move |ctx: &ConstructionContext<'_>| -> Result<ServiceRef, HiveError> {
                        counter.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(20));
                        let class = ctx.class_factory().require_class("hivemind.test.AdderImpl")?;
                        let object: ServiceRef = class.new_instance(&[])?;
                        Ok(object)
                    },
                )),
            ),
        )
        .build()?;
    let adder = registry.get_service("Simple", ADDER)?;
    let barrier = Barrier::new(8);

    // Act
    let results: Vec<Value> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let adder = adder.clone();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    adder.invoke("add", &[Value::Int(i), Value::Int(1)])
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    // Assert
    assert_eq!(results.len(), 8);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(logs.count_starting_with("Constructing core service implementation"), 1);
    Ok(())
}

#[test]
fn test_concurrent_first_lookup_returns_the_same_service() -> anyhow::Result<()> {
    // Arrange
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(
                ServicePointDefinition::new("Simple", ADDER).with_implementation(ImplementationDefinition::new(
                    Arc::new(BuilderFactory::new("hivemind.test.AdderImpl")),
                )),
            ),
        )
        .build()?;
    let barrier = Barrier::new(8);

    // Act - все потоки впервые запрашивают сервис одновременно
    let services: Vec<ServiceRef> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (registry, barrier) = (&registry, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    registry.get_service("hivemind.test.Simple", ADDER)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    // Assert
    assert_eq!(services.len(), 8);
    assert!(services.iter().all(|s| same_object(s, &services[0])));
    assert_eq!(services[0].invoke("add", &[Value::Int(2), Value::Int(3)])?, Value::Int(5));
    Ok(())
}

#[test]
fn test_primitive_builds_a_new_instance_per_lookup() -> anyhow::Result<()> {
    let factory = ClassFactory::new();
    counter_class(&factory, &[], Arc::new(AtomicUsize::new(0)))?;
    let registry = counter_registry("primitive", factory)?;

    let first = registry.get_service("hivemind.test.Counter", COUNTER)?;
    let second = registry.get_service("hivemind.test.Counter", COUNTER)?;

    assert!(!same_object(&first, &second));
    assert_eq!(first.invoke("next", &[])?, Value::Int(1));
    assert_eq!(first.invoke("next", &[])?, Value::Int(2));
    assert_eq!(second.invoke("next", &[])?, Value::Int(1));
    assert_eq!(
        registry.service_point("hivemind.test.Counter")?.construction_state(),
        ConstructionState::NotStarted
    );
    Ok(())
}

#[test]
fn test_threaded_instances_are_isolated_and_discarded() -> anyhow::Result<()> {
    // Arrange
    let factory = ClassFactory::new();
    let lifecycle = declare_lifecycle_interfaces(&factory)?;
    let discardable: Vec<_> = lifecycle.into_iter().filter(|i| i.name() == DISCARDABLE).collect();
    let discards = Arc::new(AtomicUsize::new(0));
    counter_class(&factory, &discardable, discards.clone())?;
    let registry = counter_registry("threaded", factory)?;
    let counter = registry.get_service("hivemind.test.Counter", COUNTER)?;

    // Act - свой экземпляр в каждом потоке
    assert_eq!(counter.invoke("next", &[])?, Value::Int(1));
    assert_eq!(counter.invoke("next", &[])?, Value::Int(2));

    let other = thread::scope(|scope| {
        scope
            .spawn(|| -> anyhow::Result<Value> {
                let value = counter.invoke("next", &[])?;
                registry.cleanup_thread();
                Ok(value)
            })
            .join()
            .unwrap()
    })?;

    assert_eq!(other, Value::Int(1));
    assert_eq!(discards.load(Ordering::SeqCst), 1);

    // После очистки потока строится новый экземпляр
    assert_eq!(registry.cleanup_thread(), 1);
    assert_eq!(discards.load(Ordering::SeqCst), 2);
    assert_eq!(counter.invoke("next", &[])?, Value::Int(1));
    Ok(())
}

#[test]
fn test_threaded_shutdown_listener_is_warned_once() -> anyhow::Result<()> {
    // Arrange - threaded-реализация объявляет RegistryShutdownListener
    let factory = ClassFactory::new();
    let lifecycle = declare_lifecycle_interfaces(&factory)?;
    let listener: Vec<_> = lifecycle
        .into_iter()
        .filter(|i| i.name() == REGISTRY_SHUTDOWN_LISTENER)
        .collect();
    let notifications = Arc::new(AtomicUsize::new(0));
    counter_class(&factory, &listener, notifications.clone())?;

    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(factory)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(
                ServicePointDefinition::new("Counter", COUNTER)
                    .with_service_model("threaded")
                    .with_implementation(ImplementationDefinition::new(Arc::new(BuilderFactory::new(
                        "hivemind.test.CounterImpl",
                    )))),
            ),
        )
        .build()?;
    let counter = registry.get_service("hivemind.test.Counter", COUNTER)?;

    // Act - экземпляры строятся в двух потоках
    assert_eq!(counter.invoke("next", &[])?, Value::Int(1));
    let other = thread::scope(|scope| scope.spawn(|| counter.invoke("next", &[])).join().unwrap())?;
    registry.shutdown()?;

    // Assert
    assert_eq!(other, Value::Int(1));
    assert_eq!(logs.count_starting_with("Service hivemind.test.Counter implements"), 1);
    assert_eq!(notifications.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_pooled_instances_return_to_pool() -> anyhow::Result<()> {
    // Arrange
    let factory = ClassFactory::new();
    let lifecycle = declare_lifecycle_interfaces(&factory)?;
    let manageable: Vec<_> = lifecycle.into_iter().filter(|i| i.name() == POOL_MANAGEABLE).collect();
    let events = Arc::new(AtomicUsize::new(0));
    counter_class(&factory, &manageable, events.clone())?;
    let registry = counter_registry("pooled", factory)?;
    let counter = registry.get_service("hivemind.test.Counter", COUNTER)?;

    // Act
    assert_eq!(counter.invoke("next", &[])?, Value::Int(1));
    registry.cleanup_thread();
    let reused = counter.invoke("next", &[])?;

    // Assert - activate, passivate, activate
    assert_eq!(reused, Value::Int(2));
    assert_eq!(events.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn test_recursive_construction_is_detected() -> anyhow::Result<()> {
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(
                ServicePointDefinition::new("Loop", ADDER).with_implementation(ImplementationDefinition::from_fn(
                    |ctx: &ConstructionContext<'_>| -> Result<ServiceRef, HiveError> {
                        let myself = ctx.get_service("Loop", ADDER)?;
                        myself.invoke("add", &[Value::Int(1), Value::Int(1)])?;
                        let object: ServiceRef =
                            ctx.class_factory().require_class("hivemind.test.AdderImpl")?.new_instance(&[])?;
                        Ok(object)
                    },
                )),
            ),
        )
        .build()?;

    let adder = registry.get_service("hivemind.test.Loop", ADDER)?;
    let err = HiveError::from(adder.invoke("add", &[Value::Int(1), Value::Int(2)]).unwrap_err());

    assert!(
        matches!(&err, HiveError::RecursiveConstruction { service_id } if service_id == "hivemind.test.Loop"),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn test_shutdown_notifies_listeners_once_and_is_terminal() -> anyhow::Result<()> {
    // Arrange
    let factory = ClassFactory::new();
    let lifecycle = declare_lifecycle_interfaces(&factory)?;
    let listener: Vec<_> = lifecycle
        .into_iter()
        .filter(|i| i.name() == REGISTRY_SHUTDOWN_LISTENER)
        .collect();
    let notifications = Arc::new(AtomicUsize::new(0));
    counter_class(&factory, &listener, notifications.clone())?;
    let registry = counter_registry("singleton", factory)?;

    let closures = Arc::new(AtomicUsize::new(0));
    let closure_count = closures.clone();
    registry.add_shutdown_listener(Arc::new(move || -> Result<(), HiveError> {
        closure_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))?;

    let counter = registry.get_service("hivemind.test.Counter", COUNTER)?;
    counter.invoke("next", &[])?;

    // Act
    registry.shutdown()?;
    let second = registry.shutdown();

    // Assert
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(closures.load(Ordering::SeqCst), 1);
    assert!(matches!(second, Err(HiveError::RegistryShutdown)));
    assert!(registry.is_shut_down());
    assert!(matches!(
        registry.get_service("hivemind.test.Counter", COUNTER),
        Err(HiveError::RegistryShutdown)
    ));
    let call = HiveError::from(counter.invoke("next", &[]).unwrap_err());
    assert!(matches!(call, HiveError::RegistryShutdown));
    Ok(())
}

#[test]
fn test_shutdown_listener_can_use_other_services() -> anyhow::Result<()> {
    // Arrange - слушатель обращается к другому сервису во время остановки
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .add_module(
            ModuleDefinition::new("hivemind.test").add_service_point(
                ServicePointDefinition::new("Simple", ADDER).with_implementation(ImplementationDefinition::new(
                    Arc::new(BuilderFactory::new("hivemind.test.AdderImpl")),
                )),
            ),
        )
        .build()?;
    let adder = registry.get_service("hivemind.test.Simple", ADDER)?;
    let results = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let (flusher, recorded) = (adder.clone(), results.clone());
    registry.add_shutdown_listener(Arc::new(move || -> Result<(), HiveError> {
        let sum = flusher.invoke("add", &[Value::Int(4), Value::Int(7)])?;
        recorded.lock().push(sum);
        Ok(())
    }))?;

    // Act
    registry.shutdown()?;

    // Assert - вызов прошёл, а после остановки сервис недоступен
    assert_eq!(*results.lock(), vec![Value::Int(11)]);
    let after = HiveError::from(adder.invoke("add", &[Value::Int(1), Value::Int(1)]).unwrap_err());
    assert!(matches!(after, HiveError::RegistryShutdown));
    Ok(())
}

#[test]
fn test_eager_load_and_startup_runnables() -> anyhow::Result<()> {
    // Arrange
    let factory = adder_factory()?;
    declare_lifecycle_interfaces(&factory)?;
    let runs = Arc::new(AtomicUsize::new(0));
    let run_count = runs.clone();
    let task = factory
        .new_interface("hivemind.test.Task")
        .extend(factory.require_interface(hivemind::lifecycle::RUNNABLE)?)
        .finalize()?;
    factory
        .new_class("hivemind.test.TaskImpl", None)
        .add_interface(task)
        .add_method(Modifiers::PUBLIC, void("run"), move |_| {
            run_count.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .finalize()?;

    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(factory)
        .with_log_factory(logs.clone())
        .add_module(
            ModuleDefinition::new("hivemind.test")
                .add_service_point(ServicePointDefinition::new("Simple", ADDER).with_implementation(
                    ImplementationDefinition::new(Arc::new(BuilderFactory::new("hivemind.test.AdderImpl"))),
                ))
                .add_service_point(ServicePointDefinition::new("Task", "hivemind.test.Task").with_implementation(
                    ImplementationDefinition::new(Arc::new(BuilderFactory::new("hivemind.test.TaskImpl"))),
                ))
                .eager_load("Simple")
                .run_at_startup("Task"),
        )
        .build()?;

    // Act
    registry.startup()?;

    // Assert
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        logs.count_starting_with("Constructing core service implementation for service hivemind.test.Simple"),
        1
    );
    assert!(matches!(registry.startup(), Err(HiveError::AlreadyStarted)));
    Ok(())
}

#[test]
fn test_default_implementation_when_none_is_contributed() -> anyhow::Result<()> {
    let logs = Arc::new(RecordingLogFactory::new(LogLevel::Debug));
    let registry = Registry::builder()
        .with_class_factory(adder_factory()?)
        .with_log_factory(logs.clone())
        .add_module(ModuleDefinition::new("hivemind.test").add_service_point(ServicePointDefinition::new("Empty", ADDER)))
        .build()?;

    let adder = registry.get_service("hivemind.test.Empty", ADDER)?;

    assert_eq!(adder.invoke("add", &[Value::Int(4), Value::Int(7)])?, Value::Int(0));
    assert_eq!(
        logs.count_starting_with("Service point hivemind.test.Empty has no implementation"),
        1
    );
    Ok(())
}
