use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak, mpsc};
use std::thread;
use std::time::Duration;

use dispatch_core::{
    DispatchConfig, DispatchError, Dispatcher, Event, FunctionTable, HandlerSpec, MethodTarget,
    Payload, Subscriber, UnitCatalog, WILDCARD,
};
use once_cell::sync::OnceCell;
use tempfile::TempDir;

/// Shared state the handlers bump; passed as the publish payload.
#[derive(Default)]
struct Context {
    counter: AtomicUsize,
}

fn bump(event: &Event) -> anyhow::Result<()> {
    let context = event
        .data_as::<Context>()
        .ok_or_else(|| anyhow::anyhow!("event '{}' carries no context", event.name()))?;
    context.counter.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

struct SampleClass;

impl MethodTarget for SampleClass {
    fn responds_to(&self, method: &str) -> bool {
        method == "do_stuff_class_method"
    }

    fn invoke(&self, _method: &str, event: &Event) -> anyhow::Result<()> {
        bump(event)
    }
}

struct SampleSubscriber;

impl MethodTarget for SampleSubscriber {
    fn responds_to(&self, method: &str) -> bool {
        matches!(
            method,
            "do_stuff_on_login_for_subscriber" | "do_something_else_on_login_for_subscriber"
        )
    }

    fn invoke(&self, _method: &str, event: &Event) -> anyhow::Result<()> {
        bump(event)
    }
}

impl Subscriber for SampleSubscriber {
    fn subscribe(self: Arc<Self>, dispatcher: &Dispatcher) -> dispatch_core::Result<()> {
        dispatcher.register(
            "login",
            HandlerSpec::method(self.clone(), "do_stuff_on_login_for_subscriber"),
        )?;
        dispatcher.register(
            "login",
            HandlerSpec::method(self, "do_something_else_on_login_for_subscriber"),
        )
    }
}

/// A dispatcher with a private namespace and a catalog holding one unit file.
fn dispatcher_with_unit(dir: &Path) -> (Dispatcher, std::path::PathBuf) {
    let unit = dir.join("global_function_file.unit");
    fs::write(&unit, "do_stuff_global_function").unwrap();

    let catalog = UnitCatalog::new();
    catalog
        .insert(&unit, |functions: &FunctionTable| {
            functions.define("do_stuff_global_function", bump);
        })
        .unwrap();

    let dispatcher = Dispatcher::builder()
        .functions(Arc::new(FunctionTable::new()))
        .loader(catalog)
        .build();

    (dispatcher, unit)
}

fn counter(context: &Context) -> usize {
    context.counter.load(Ordering::SeqCst)
}

#[test]
fn all_handlers_for_an_event_fire_as_they_are_registered() {
    let dir = TempDir::new().unwrap();
    let (dispatcher, unit) = dispatcher_with_unit(dir.path());
    let context = Arc::new(Context::default());
    let payload = || Some(Payload::from_arc(Arc::clone(&context)));

    dispatcher.register(WILDCARD, HandlerSpec::closure(bump)).unwrap();
    dispatcher.publish("login", payload()).unwrap();
    assert_eq!(counter(&context), 1);

    dispatcher
        .register("login", HandlerSpec::file(&unit, "do_stuff_global_function"))
        .unwrap();
    dispatcher.publish("login", payload()).unwrap();
    assert_eq!(counter(&context), 3);

    dispatcher
        .register(
            "login",
            HandlerSpec::method(Arc::new(SampleClass), "do_stuff_class_method"),
        )
        .unwrap();
    dispatcher.publish("login", payload()).unwrap();
    assert_eq!(counter(&context), 6);

    dispatcher.subscribe(Arc::new(SampleSubscriber)).unwrap();
    dispatcher.publish("login", payload()).unwrap();
    assert_eq!(counter(&context), 11);
}

#[test]
fn wildcard_fires_once_per_publish_for_any_name() {
    let dispatcher = Dispatcher::builder()
        .functions(Arc::new(FunctionTable::new()))
        .build();
    let context = Arc::new(Context::default());

    dispatcher.register(WILDCARD, HandlerSpec::closure(bump)).unwrap();

    dispatcher
        .publish("login", Some(Payload::from_arc(Arc::clone(&context))))
        .unwrap();
    assert_eq!(counter(&context), 1);

    dispatcher
        .publish("burger", Some(Payload::from_arc(Arc::clone(&context))))
        .unwrap();
    assert_eq!(counter(&context), 2);
}

#[test]
fn default_payload_is_used_when_publish_has_none() {
    let dispatcher = Dispatcher::builder()
        .functions(Arc::new(FunctionTable::new()))
        .build();
    let context = Arc::new(Context::default());

    dispatcher
        .register_with(
            "login",
            HandlerSpec::closure(bump),
            Some(Payload::from_arc(Arc::clone(&context))),
            dispatch_core::Placement::Append,
        )
        .unwrap();

    dispatcher.publish("login", None).unwrap();
    assert_eq!(counter(&context), 1);

    // A handler without any payload fails, and the error reaches the publisher
    dispatcher.register("logout", HandlerSpec::closure(bump)).unwrap();
    let err = dispatcher.publish("logout", None).unwrap_err();
    assert!(err.to_string().contains("carries no context"));
}

#[test]
fn loading_a_unit_twice_is_harmless() {
    let dir = TempDir::new().unwrap();
    let (dispatcher, unit) = dispatcher_with_unit(dir.path());

    for _ in 0..3 {
        dispatcher
            .register("login", HandlerSpec::file(&unit, "do_stuff_global_function"))
            .unwrap();
    }

    assert_eq!(dispatcher.handlers()["login"].len(), 3);
    assert!(dispatcher.functions().contains("do_stuff_global_function"));
}

#[test]
fn a_loading_unit_may_register_handlers_from_another_unit() {
    let dir = TempDir::new().unwrap();
    let outer = dir.path().join("outer.unit");
    let inner = dir.path().join("inner.unit");
    fs::write(&outer, "outer_fn").unwrap();
    fs::write(&inner, "inner_fn").unwrap();

    let slot: Arc<OnceCell<Weak<Dispatcher>>> = Arc::new(OnceCell::new());
    let catalog = UnitCatalog::new();
    catalog
        .insert(&inner, |functions: &FunctionTable| {
            functions.define("inner_fn", bump);
        })
        .unwrap();

    let owner = Arc::clone(&slot);
    let inner_path = inner.clone();
    catalog
        .insert(&outer, move |functions: &FunctionTable| {
            functions.define("outer_fn", bump);
            if let Some(dispatcher) = owner.get().and_then(Weak::upgrade) {
                dispatcher
                    .register("boot", HandlerSpec::file(&inner_path, "inner_fn"))
                    .unwrap();
            }
        })
        .unwrap();

    let dispatcher = Arc::new(
        Dispatcher::builder()
            .functions(Arc::new(FunctionTable::new()))
            .loader(catalog)
            .build(),
    );
    slot.set(Arc::downgrade(&dispatcher)).unwrap();

    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(&dispatcher);
    thread::spawn(move || {
        let result = worker.register("login", HandlerSpec::file(&outer, "outer_fn"));
        let _ = tx.send(result.is_ok());
    });

    let registered = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("nested unit registration should finish");
    assert!(registered);
    assert!(dispatcher.has_handlers("login"));
    assert!(dispatcher.has_handlers("boot"));

    let context = Arc::new(Context::default());
    dispatcher
        .publish("boot", Some(Payload::from_arc(Arc::clone(&context))))
        .unwrap();
    assert_eq!(counter(&context), 1);
}

#[test]
fn config_bindings_register_through_the_catalog() {
    let dir = TempDir::new().unwrap();
    let (dispatcher, unit) = dispatcher_with_unit(dir.path());

    let text = format!(
        r#"
[[bindings]]
event = "login"
handler = [{unit:?}, "do_stuff_global_function"]

[[bindings]]
event = "login"
handler = "do_stuff_global_function"
placement = "prepend"
"#,
        unit = unit.display().to_string()
    );

    let config = DispatchConfig::from_toml_str(&text).unwrap();
    assert_eq!(dispatcher.bind(&config.bindings).unwrap(), 2);

    let context = Arc::new(Context::default());
    dispatcher
        .publish("login", Some(Payload::from_arc(Arc::clone(&context))))
        .unwrap();
    assert_eq!(counter(&context), 2);
}

#[test]
fn failed_registration_leaves_registry_unchanged() {
    let dir = TempDir::new().unwrap();
    let (dispatcher, unit) = dispatcher_with_unit(dir.path());
    dispatcher.register("login", HandlerSpec::closure(bump)).unwrap();
    let before = dispatcher.handlers();

    let failures = [
        dispatcher.register("login", "does_not_exist"),
        dispatcher.register("login", HandlerSpec::file(dir.path().join("nope.unit"), "f")),
        dispatcher.register("login", HandlerSpec::file(&unit, "function_not_exist")),
        dispatcher.register(
            "login",
            HandlerSpec::method(Arc::new(SampleClass), "method_not_exist"),
        ),
    ];

    assert!(matches!(failures[0], Err(DispatchError::UnresolvedFunction { file: None, .. })));
    assert!(matches!(failures[1], Err(DispatchError::FileNotFound { .. })));
    assert!(matches!(failures[2], Err(DispatchError::UnresolvedFunction { file: Some(_), .. })));
    assert!(matches!(failures[3], Err(DispatchError::NotCallable { .. })));

    let after = dispatcher.handlers();
    assert_eq!(before.len(), after.len());
    assert_eq!(before["login"].len(), after["login"].len());
}

#[test]
fn global_dispatcher_is_created_once() {
    let global = Dispatcher::global();
    global.clear_all();
    assert!(global.handlers().is_empty());

    // File handlers on the global instance load through the global catalog
    let dir = TempDir::new().unwrap();
    let unit = dir.path().join("global.unit");
    fs::write(&unit, "global_unit_bump").unwrap();
    UnitCatalog::global()
        .insert(&unit, |functions: &FunctionTable| {
            functions.define("global_unit_bump", bump);
        })
        .unwrap();

    let context = Arc::new(Context::default());
    global.register(WILDCARD, HandlerSpec::closure(bump)).unwrap();
    global
        .register("login", HandlerSpec::file(&unit, "global_unit_bump"))
        .unwrap();
    global
        .publish("login", Some(Payload::from_arc(Arc::clone(&context))))
        .unwrap();
    assert_eq!(counter(&context), 2);

    // Same instance on every access
    Dispatcher::global()
        .publish("burger", Some(Payload::from_arc(Arc::clone(&context))))
        .unwrap();
    assert_eq!(counter(&context), 3);

    let late = Dispatcher::install_global(Dispatcher::builder().build());
    assert!(matches!(late, Err(DispatchError::GlobalAlreadyInitialized)));

    global.clear_all();
    assert_eq!(global.handlers().len(), 0);
}
