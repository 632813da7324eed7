use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use relive_kernel::{
    Class, Constructible, DEFAULT_EXPORT, Declaration, Export, ExportKind, Module, RuntimeConfig,
    SwapError, SwapOptions,
};
use relive_runtime::{InvalidationReason, SwapEvent};
use relive_testing::fixtures::{counter_v1, counter_v2, counter_with, greeter, strict_counter};
use relive_testing::{TestSession, assert_tracked};
use serde_json::json;

const COUNTER_MODULE: &str = "src/counter.rs";

fn counter_module(class: Class, options: Option<SwapOptions>) -> Module {
    let declaration = match options {
        Some(options) => Declaration::with_options(options, class),
        None => Declaration::new(class),
    };
    Module::new().with("Counter", declaration)
}

#[tokio::test]
async fn test_counter_keeps_mutated_state_without_reconstruct() {
    let session = TestSession::new();
    let options = SwapOptions::new().with_reconstruct(false);

    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), Some(options.clone())))
        .unwrap();
    let counter = v1.export("Counter").unwrap().construct(&[json!(5)]).unwrap();
    for _ in 0..4 {
        counter.call("increment", &[]).unwrap();
    }
    assert_eq!(counter.get_i64("count"), Some(9));

    let (update, v2) = session
        .edit(COUNTER_MODULE, counter_module(counter_v2(), Some(options)))
        .await
        .unwrap();

    assert_eq!(update.callbacks_run, 1);
    assert!(!update.invalidated());
    assert_eq!(counter.get_i64("count"), Some(9));
    assert_eq!(counter.call("increment", &[]).unwrap(), json!(18));
    assert!(Export::ptr_eq(
        &v1.export("Counter").unwrap(),
        &v2.export("Counter").unwrap()
    ));
}

#[tokio::test]
async fn test_counter_resets_state_with_reconstruct() {
    let session = TestSession::new();
    let options = SwapOptions::new().with_reconstruct(true);

    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), Some(options.clone())))
        .unwrap();
    let counter = v1.export("Counter").unwrap().construct(&[json!(5)]).unwrap();
    counter.set("count", 9);

    session
        .edit(COUNTER_MODULE, counter_module(counter_v2(), Some(options)))
        .await
        .unwrap();

    assert_eq!(counter.get_i64("count"), Some(5));
    assert_eq!(counter.call("increment", &[]).unwrap(), json!(10));
    // Fresh objects built for the copy are not tracked.
    assert_tracked!(session, COUNTER_MODULE, "Counter", 1);
}

#[tokio::test]
async fn test_options_object_defaults_to_reconstruct() {
    let session = TestSession::new();
    let v1 = session
        .evaluate(
            COUNTER_MODULE,
            &counter_module(counter_v1(), Some(SwapOptions::new())),
        )
        .unwrap();
    let counter = v1.export("Counter").unwrap().construct(&[json!(1)]).unwrap();
    counter.call("increment", &[]).unwrap();

    session
        .edit(
            COUNTER_MODULE,
            counter_module(counter_v2(), Some(SwapOptions::new())),
        )
        .await
        .unwrap();
    assert_eq!(counter.get_i64("count"), Some(1));
}

#[tokio::test]
async fn test_function_swap_switches_body() {
    let session = TestSession::new();
    let id = "src/greet.rs";

    let v1 = session
        .evaluate(id, &Module::new().with_function("greet", greeter("Hello")))
        .unwrap();
    let greet = v1.export("greet").unwrap();
    assert_eq!(greet.call(&[json!("Ada")]).unwrap(), json!("Hello, Ada"));

    session
        .edit(id, Module::new().with_function("greet", greeter("Hi")))
        .await
        .unwrap();
    assert_eq!(greet.call(&[json!("Ada")]).unwrap(), json!("Hi, Ada"));

    session
        .edit(id, Module::new().with_function("greet", greeter("Hey")))
        .await
        .unwrap();
    assert_eq!(greet.call(&[]).unwrap(), json!("Hey, world"));
    assert_eq!(session.registry(id).get("greet").unwrap().swaps(), 2);
}

#[tokio::test]
async fn test_repeated_evaluation_reuses_binding() {
    let session = TestSession::new();
    let module = counter_module(counter_v1(), None);

    let first = session.evaluate(COUNTER_MODULE, &module).unwrap();
    let _a = first.export("Counter").unwrap().construct(&[]).unwrap();
    let second = session.evaluate(COUNTER_MODULE, &module).unwrap();
    let _b = second.export("Counter").unwrap().construct(&[]).unwrap();

    assert!(Export::ptr_eq(
        &first.export("Counter").unwrap(),
        &second.export("Counter").unwrap()
    ));
    assert_eq!(session.registry(COUNTER_MODULE).len(), 1);
    assert_tracked!(session, COUNTER_MODULE, "Counter", 2);
}

#[tokio::test]
async fn test_repeated_evaluation_migrates_once_per_edit() {
    let session = TestSession::new();
    let options = SwapOptions::new().with_reconstruct(true);
    let module = counter_module(counter_v1(), Some(options.clone()));

    session.evaluate(COUNTER_MODULE, &module).unwrap();
    let evaluated = session.evaluate(COUNTER_MODULE, &module).unwrap();
    let _counter = evaluated.export("Counter").unwrap().construct(&[json!(2)]).unwrap();

    let constructions = Arc::new(AtomicUsize::new(0));
    let seen = constructions.clone();
    let counting = Class::builder("Counter")
        .constructor(move |this, args| {
            seen.fetch_add(1, Ordering::SeqCst);
            this.set("count", args.first().cloned().unwrap_or(json!(0)));
            Ok(())
        })
        .build();

    let mut events = session.registry(COUNTER_MODULE).subscribe();
    let (update, _) = session
        .edit(COUNTER_MODULE, counter_module(counting, Some(options)))
        .await
        .unwrap();

    assert_eq!(update.callbacks_run, 1);
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(
        session.registry(COUNTER_MODULE).get("Counter").unwrap().swaps(),
        1
    );
    let mut swapped = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SwapEvent::Swapped { .. }) {
            swapped += 1;
        }
    }
    assert_eq!(swapped, 1);
}

#[tokio::test]
async fn test_evaluation_before_update_uses_new_version() {
    let session = TestSession::new();
    let id = "src/greet.rs";
    let v1 = session
        .evaluate(id, &Module::new().with_function("greet", greeter("Hello")))
        .unwrap();

    // Host evaluates the new version before running the old callbacks.
    let v2 = session
        .evaluate(id, &Module::new().with_function("greet", greeter("Hi")))
        .unwrap();

    let greet = v1.export("greet").unwrap();
    assert!(Export::ptr_eq(&greet, &v2.export("greet").unwrap()));
    assert_eq!(greet.call(&[json!("x")]).unwrap(), json!("Hi, x"));
}

#[tokio::test]
async fn test_options_change_escalates_to_full_reload() {
    let session = TestSession::new();
    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), None))
        .unwrap();
    let counter = v1.export("Counter").unwrap().construct(&[json!(3)]).unwrap();

    let (update, v2) = session
        .edit(
            COUNTER_MODULE,
            counter_module(counter_v2(), Some(SwapOptions::new())),
        )
        .await
        .unwrap();

    assert_eq!(
        update.invalidations,
        vec![
            "[relive] Counter options changed ({\"reconstruct\":false} -> {\"reconstruct\":true}), invalidating..."
                .to_string()
        ]
    );
    // Old instance untouched.
    assert_eq!(counter.call("increment", &[]).unwrap(), json!(4));
    // Full reload starts a new binding.
    assert!(!Export::ptr_eq(
        &v1.export("Counter").unwrap(),
        &v2.export("Counter").unwrap()
    ));
    assert!(
        session
            .registry(COUNTER_MODULE)
            .get("Counter")
            .unwrap()
            .configuration()
            .reconstruct()
    );
}

#[tokio::test]
async fn test_kind_change_is_rejected() {
    let session = TestSession::new();
    let original = counter_v1();
    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(original.clone(), None))
        .unwrap();
    let counter = v1.export("Counter").unwrap().construct(&[json!(2)]).unwrap();

    let (update, _) = session
        .edit(
            COUNTER_MODULE,
            Module::new().with_function("Counter", greeter("Hello")),
        )
        .await
        .unwrap();

    assert_eq!(
        update.invalidations,
        vec![
            "[relive] Incompatible swap kind change for Counter (class -> function), invalidating..."
                .to_string()
        ]
    );
    assert_eq!(counter.get_i64("count"), Some(2));
    assert!(counter.is_instance_of(&original));
}

#[tokio::test]
async fn test_function_to_class_is_rejected() {
    let session = TestSession::new();
    let id = "src/make.rs";
    session
        .evaluate(id, &Module::new().with_function("make", greeter("Hello")))
        .unwrap();

    let (update, v2) = session
        .edit(id, Module::new().with_class("make", counter_v1()))
        .await
        .unwrap();

    assert!(update.invalidated());
    assert_eq!(v2.export("make").unwrap().kind(), Some(ExportKind::Class));
}

#[tokio::test]
async fn test_missing_export_invalidates() {
    let session = TestSession::new();
    session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), None))
        .unwrap();

    let (update, _) = session
        .edit(
            COUNTER_MODULE,
            Module::new().with_class("Tally", counter_v2()),
        )
        .await
        .unwrap();
    assert_eq!(
        update.invalidations,
        vec!["[relive] Counter not found in new module, invalidating...".to_string()]
    );
}

#[tokio::test]
async fn test_failed_reconstruction_leaves_instances_alone() {
    let session = TestSession::new();
    let options = SwapOptions::new();
    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), Some(options.clone())))
        .unwrap();
    let export = v1.export("Counter").unwrap();
    let good = export.construct(&[json!(1)]).unwrap();
    let bad = export.construct(&[json!("one")]).unwrap();
    good.set("count", 30);

    let (update, _) = session
        .edit(
            COUNTER_MODULE,
            counter_module(strict_counter(), Some(options)),
        )
        .await
        .unwrap();

    assert!(update.invalidated());
    assert!(update.invalidations[0].starts_with("[relive] Failed to reconstruct Counter instance"));
    assert_eq!(good.get_i64("count"), Some(30));
    assert_eq!(bad.get("count"), Some(json!("one")));
    assert_eq!(good.call("increment", &[]).unwrap(), json!(31));
}

#[tokio::test]
async fn test_unresolved_update_keeps_waiting() {
    let session = TestSession::new();
    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), None))
        .unwrap();
    let counter = v1.export("Counter").unwrap().construct(&[json!(4)]).unwrap();

    let update = session.unresolved(COUNTER_MODULE).await;
    assert!(!update.invalidated());
    assert_eq!(session.host().context(COUNTER_MODULE).pending_callbacks(), 1);

    session
        .edit(COUNTER_MODULE, counter_module(counter_v2(), None))
        .await
        .unwrap();
    assert_eq!(counter.call("increment", &[]).unwrap(), json!(8));
}

#[tokio::test]
async fn test_production_returns_raw_targets() {
    let session = TestSession::production();
    let class = counter_v1();
    let module = Module::new()
        .with_class("Counter", class.clone())
        .with("VERSION", Declaration::new(json!("1.2.0")));

    let evaluated = session.evaluate(COUNTER_MODULE, &module).unwrap();
    let counter = evaluated.export("Counter").unwrap().construct(&[]).unwrap();

    assert!(counter.is_instance_of(&class));
    assert_eq!(
        evaluated.export("VERSION").unwrap().as_value(),
        Some(&json!("1.2.0"))
    );
    assert!(session.registry(COUNTER_MODULE).is_empty());
}

#[tokio::test]
async fn test_plain_value_is_rejected_in_development() {
    let session = TestSession::new();
    let module = Module::new().with("VERSION", Declaration::new(json!("1.2.0")));
    let err = session.evaluate(COUNTER_MODULE, &module).unwrap_err();
    assert!(matches!(err, SwapError::UnsupportedKind { found: "string", .. }));
}

#[tokio::test]
async fn test_disabled_config_behaves_like_production() {
    let session = TestSession::with_config(RuntimeConfig::default().with_enabled(false));
    session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), None))
        .unwrap();
    assert_eq!(session.host().context(COUNTER_MODULE).pending_callbacks(), 0);
}

#[tokio::test]
async fn test_decorator_form() {
    let session = TestSession::new();
    let hot = session.host().hot(COUNTER_MODULE);
    let loader = session.runtime().loader(Some(hot), DEFAULT_EXPORT);

    let export = loader
        .decorator(Some(SwapOptions::new().with_reconstruct(false)))
        .apply(counter_v1())
        .unwrap();
    let counter = export.construct(&[json!(1)]).unwrap();

    let module = Module::new().with(
        DEFAULT_EXPORT,
        Declaration::with_options(SwapOptions::new().with_reconstruct(false), counter_v2()),
    );
    let update = session.host().update(COUNTER_MODULE, Some(module)).await;
    assert!(!update.invalidated());
    assert_eq!(counter.call("increment", &[]).unwrap(), json!(2));
}

#[tokio::test]
async fn test_subclass_of_handle_follows_swaps() {
    let session = TestSession::new();
    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), None))
        .unwrap();
    let base = v1.export("Counter").unwrap();
    let Some(parent) = base.as_constructible().cloned() else {
        panic!("Counter should be a class export");
    };

    let labelled = Class::builder("LabelledCounter")
        .extends_shared(parent)
        .method("label", |this, _| Ok(json!(format!("#{}", this.get_i64("count").unwrap_or(0)))))
        .build();
    let item = labelled.construct(&[json!(3)]).unwrap();
    assert_eq!(item.call("increment", &[]).unwrap(), json!(4));

    session
        .edit(COUNTER_MODULE, counter_module(counter_v2(), None))
        .await
        .unwrap();

    assert_eq!(item.call("increment", &[]).unwrap(), json!(8));
    assert_eq!(item.call("label", &[]).unwrap(), json!("#8"));
    // Subclass instances are not tracked by the base binding.
    assert_tracked!(session, COUNTER_MODULE, "Counter", 0);
}

#[tokio::test]
async fn test_swap_events() {
    let session = TestSession::new();
    let registry = session.registry(COUNTER_MODULE);
    let mut events = registry.subscribe();

    let v1 = session
        .evaluate(COUNTER_MODULE, &counter_module(counter_with(|n| n + 3), None))
        .unwrap();
    let _counter = v1.export("Counter").unwrap().construct(&[]).unwrap();
    session
        .edit(COUNTER_MODULE, counter_module(counter_v2(), None))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            SwapEvent::Bound {
                name: "Counter".to_string(),
                kind: ExportKind::Class
            },
            SwapEvent::Swapped {
                name: "Counter".to_string(),
                kind: ExportKind::Class,
                instances: 1,
                reconstructed: false
            },
            SwapEvent::TakenOver {
                name: "Counter".to_string(),
                kind: ExportKind::Class
            },
        ]
    );

    let stats = registry.stats();
    assert_eq!(stats.total_bindings, 1);
    assert_eq!(stats.total_swaps, 1);
    assert_eq!(stats.live_instances, 1);
}

#[tokio::test]
async fn test_invalidation_event_carries_reason() {
    let session = TestSession::new();
    let registry = session.registry(COUNTER_MODULE);
    let mut events = registry.subscribe();

    session
        .evaluate(COUNTER_MODULE, &counter_module(counter_v1(), None))
        .unwrap();
    session
        .edit(COUNTER_MODULE, Module::new())
        .await
        .unwrap();

    let reason = loop {
        match events.try_recv() {
            Ok(SwapEvent::Invalidated { reason, .. }) => break reason,
            Ok(_) => continue,
            Err(err) => panic!("no invalidation event: {err}"),
        }
    };
    assert_eq!(
        reason,
        InvalidationReason::MissingExport {
            name: "Counter".to_string()
        }
    );
}
