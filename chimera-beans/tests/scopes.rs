use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chimera_beans::prelude::*;
use parking_lot::Mutex;

struct Session {
    id: usize,
}

fn session_factory(scope: Arc<SimpleMapScope>) -> (DefaultBeanFactory, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let factory = DefaultBeanFactory::builder()
        .scope("session", scope)
        .build()
        .unwrap();

    let counter = created.clone();
    factory
        .register_bean_definition(
            "session",
            BeanDefinition::of(move |_| {
                Ok(Session {
                    id: counter.fetch_add(1, Ordering::SeqCst),
                })
            })
            .with_scope("session"),
        )
        .unwrap();
    (factory, created)
}

#[test]
fn test_scoped_bean_cached_by_scope() {
    let scope = Arc::new(SimpleMapScope::new("session"));
    let (factory, created) = session_factory(scope.clone());

    let a = factory.get_bean_typed::<Session>("session").unwrap();
    let b = factory.get_bean_typed::<Session>("session").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(scope.len(), 1);

    assert!(!factory.is_singleton("session").unwrap());
    assert!(!factory.is_prototype("session").unwrap());
    assert!(!factory.contains_singleton("session"));
}

#[test]
fn test_clearing_scope_starts_new_generation() {
    let scope = Arc::new(SimpleMapScope::new("session"));
    let (factory, _) = session_factory(scope.clone());

    let first = factory.get_bean_typed::<Session>("session").unwrap();
    let first_conversation = scope.conversation_id();
    scope.clear();
    let second = factory.get_bean_typed::<Session>("session").unwrap();

    assert_eq!(first.id, 0);
    assert_eq!(second.id, 1);
    assert_ne!(first_conversation, scope.conversation_id());
}

#[test]
fn test_inactive_scope() {
    let scope = Arc::new(SimpleMapScope::new("session"));
    let (factory, created) = session_factory(scope.clone());
    scope.deactivate();

    match factory.get_bean("session") {
        Err(BeanError::ScopeNotActive { name, scope, .. }) => {
            assert_eq!(name, "session");
            assert_eq!(scope, "session");
        }
        other => panic!("Expected ScopeNotActive, got {:?}", other.map(|_| ())),
    }
    assert_eq!(created.load(Ordering::SeqCst), 0);
    // 失败不会留下已创建标记
    assert!(!factory.has_been_created("session"));

    scope.activate();
    assert!(factory.get_bean("session").is_ok());
}

#[test]
fn test_scope_registered_after_definition() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition(
            "request",
            BeanDefinition::of(|_| Ok(42u64)).with_scope("request"),
        )
        .unwrap();

    let err = factory.get_bean("request").unwrap_err();
    assert!(matches!(err, BeanError::ScopeNotActive { .. }));

    factory
        .register_scope("request", Arc::new(SimpleMapScope::new("request")))
        .unwrap();
    assert_eq!(*factory.get_bean_typed::<u64>("request").unwrap(), 42);
    assert_eq!(factory.registered_scope_names(), vec!["request"]);
}

#[test]
fn test_clear_runs_destruction_callbacks() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let scope = Arc::new(SimpleMapScope::new("session"));
    let factory = DefaultBeanFactory::builder()
        .scope("session", scope.clone())
        .build()
        .unwrap();

    let recorded = events.clone();
    factory
        .register_bean_definition(
            "cart",
            BeanDefinition::of(|_| Ok(Vec::<String>::new()))
                .with_scope("session")
                .with_destroy_method("checkout", move |_| {
                    recorded.lock().push("checkout");
                    Ok(())
                }),
        )
        .unwrap();

    factory.get_bean("cart").unwrap();
    assert!(events.lock().is_empty());

    scope.clear();
    assert_eq!(*events.lock(), vec!["checkout"]);
    assert!(scope.is_empty());
}

#[test]
fn test_destroy_scoped_bean() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let scope = Arc::new(SimpleMapScope::new("session"));
    let factory = DefaultBeanFactory::builder()
        .scope("session", scope.clone())
        .build()
        .unwrap();

    let recorded = events.clone();
    factory
        .register_bean_definition(
            "cart",
            BeanDefinition::of(|_| Ok(Vec::<String>::new()))
                .with_scope("session")
                .with_destroy_method("checkout", move |_| {
                    recorded.lock().push("checkout");
                    Ok(())
                }),
        )
        .unwrap();

    let before = factory.get_bean("cart").unwrap();
    factory.destroy_scoped_bean("cart").unwrap();
    assert_eq!(*events.lock(), vec!["checkout"]);
    assert!(scope.is_empty());

    // 作用域中已没有该对象，重新获取得到新实例
    let after = factory.get_bean("cart").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));

    // 新实例的回调在清空作用域时执行
    scope.clear();
    assert_eq!(*events.lock(), vec!["checkout", "checkout"]);
}

#[test]
fn test_destroy_scoped_bean_rejects_builtin_scopes() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("single", BeanDefinition::of(|_| Ok(1u8)))
        .unwrap();
    factory
        .register_bean_definition(
            "proto",
            BeanDefinition::of(|_| Ok(2u8)).with_scope(SCOPE_PROTOTYPE),
        )
        .unwrap();

    assert!(matches!(
        factory.destroy_scoped_bean("single"),
        Err(BeanError::IllegalArgument(_))
    ));
    assert!(matches!(
        factory.destroy_scoped_bean("proto"),
        Err(BeanError::IllegalArgument(_))
    ));
}

#[test]
fn test_prototype_not_tracked_but_destroyable() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let factory = DefaultBeanFactory::new();

    let counter = destroyed.clone();
    factory
        .register_bean_definition(
            "command",
            BeanDefinition::of(|_| Ok(String::from("run")))
                .with_scope(SCOPE_PROTOTYPE)
                .with_destroy_method("close", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();

    let command = factory.resolve_bean_handle("command", None, None).unwrap();
    factory.destroy_singletons();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    factory.destroy_bean("command", command).unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_prototype_receives_explicit_args() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition(
            "greeting",
            BeanDefinition::of(|creation| {
                let name = creation
                    .arg::<String>(0)
                    .ok_or_else(|| anyhow!("missing name argument"))?;
                Ok(format!("hello, {}", name))
            })
            .with_scope(SCOPE_PROTOTYPE),
        )
        .unwrap();

    let name: BeanInstance = Arc::new(String::from("chimera"));
    let greeting = factory
        .get_bean_with_args("greeting", vec![name])
        .unwrap()
        .downcast::<String>()
        .unwrap();
    assert_eq!(greeting.as_str(), "hello, chimera");

    assert!(factory.get_bean("greeting").is_err());
}

#[test]
fn test_scoped_self_reference_rejected() {
    let scope = Arc::new(SimpleMapScope::new("session"));
    let factory = DefaultBeanFactory::builder()
        .scope("session", scope.clone())
        .build()
        .unwrap();
    factory
        .register_bean_definition(
            "cart",
            BeanDefinition::of(|creation| {
                creation.get_bean("cart")?;
                Ok(1u8)
            })
            .with_scope("session"),
        )
        .unwrap();

    let err = factory.get_bean("cart").unwrap_err();
    assert!(err.is_currently_in_creation(), "unexpected error: {}", err);
    assert_eq!(err.bean_name(), Some("cart"));
    // 失败的创建不会留在作用域中
    assert_eq!(scope.len(), 0);
}
