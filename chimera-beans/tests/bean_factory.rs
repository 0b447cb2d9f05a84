use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chimera_beans::prelude::*;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ConnectionPool {
    size: usize,
}

#[test]
fn test_child_definition_inherits_from_abstract_parent() {
    let validated = Arc::new(AtomicUsize::new(0));
    let factory = DefaultBeanFactory::new();

    let counter = validated.clone();
    factory
        .register_bean_definition(
            "basePool",
            BeanDefinition::of(|_| Ok(ConnectionPool { size: 8 }))
                .with_abstract(true)
                .with_lazy_init(true)
                .with_init_method("validate", move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "pool",
            BeanDefinition::child("basePool").with_scope(SCOPE_PROTOTYPE),
        )
        .unwrap();

    let merged = factory.merged_bean_definition("pool").unwrap();
    assert!(!merged.is_abstract());
    assert!(merged.is_prototype());
    assert!(merged.is_lazy_init());
    assert_eq!(merged.bean_type(), Some(BeanType::of::<ConnectionPool>()));
    assert!(merged.definition().init_method.is_some());
    assert!(merged.definition().parent_name.is_none());

    let a = factory.get_bean_typed::<ConnectionPool>("pool").unwrap();
    let b = factory.get_bean_typed::<ConnectionPool>("pool").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.size, 8);
    assert_eq!(validated.load(Ordering::SeqCst), 2);

    assert!(matches!(
        factory.get_bean("basePool"),
        Err(BeanError::BeanIsAbstract(name)) if name == "basePool"
    ));
}

#[test]
fn test_unresolvable_parent_definition() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("orphan", BeanDefinition::child("missing"))
        .unwrap();

    match factory.get_bean("orphan") {
        Err(BeanError::BeanDefinitionStore { name, message }) => {
            assert_eq!(name, "orphan");
            assert!(message.contains("missing"));
        }
        other => panic!("Expected BeanDefinitionStore, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_redefining_parent_remerges_children() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition(
            "base",
            BeanDefinition::of(|_| Ok(ConnectionPool { size: 1 })).with_abstract(true),
        )
        .unwrap();
    factory
        .register_bean_definition("pool", BeanDefinition::child("base"))
        .unwrap();

    assert_eq!(factory.get_bean_typed::<ConnectionPool>("pool").unwrap().size, 1);

    factory
        .register_bean_definition(
            "base",
            BeanDefinition::of(|_| Ok(ConnectionPool { size: 16 })).with_abstract(true),
        )
        .unwrap();
    // 父定义变化后子定义的单例被重置
    assert!(!factory.contains_singleton("pool"));
    assert_eq!(factory.get_bean_typed::<ConnectionPool>("pool").unwrap().size, 16);
}

#[test]
fn test_aliases() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("dataSource", BeanDefinition::of(|_| Ok(ConnectionPool::default())))
        .unwrap();
    factory.register_alias("dataSource", "ds").unwrap();
    factory.register_alias("ds", "primary").unwrap();

    assert_eq!(factory.canonical_name("primary"), "dataSource");
    let by_alias = factory.get_bean("primary").unwrap();
    let by_name = factory.get_bean("dataSource").unwrap();
    assert!(Arc::ptr_eq(&by_alias, &by_name));
    assert!(factory.contains_bean("ds"));

    let mut aliases = factory.get_aliases("dataSource");
    aliases.sort();
    assert_eq!(aliases, vec!["ds", "primary"]);

    let mut from_alias = factory.get_aliases("ds");
    from_alias.sort();
    assert_eq!(from_alias, vec!["dataSource", "primary"]);

    factory.remove_alias("primary").unwrap();
    assert!(!factory.contains_bean("primary"));
    assert!(factory.get_bean("primary").unwrap_err().is_no_such_bean_definition());
}

#[test]
fn test_depends_on_created_first() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let factory = DefaultBeanFactory::new();

    let recorded = events.clone();
    factory
        .register_bean_definition(
            "migrations",
            BeanDefinition::of(move |_| {
                recorded.lock().push("migrations");
                Ok(())
            }),
        )
        .unwrap();
    let recorded = events.clone();
    factory
        .register_bean_definition(
            "repository",
            BeanDefinition::of(move |_| {
                recorded.lock().push("repository");
                Ok(())
            })
            .with_depends_on(["migrations"]),
        )
        .unwrap();

    factory.get_bean("repository").unwrap();
    assert_eq!(*events.lock(), vec!["migrations", "repository"]);
    assert_eq!(factory.dependencies_for_bean("repository"), vec!["migrations"]);

    // 销毁被依赖的 Bean 时连带销毁依赖方
    factory.destroy_singleton("migrations");
    assert!(!factory.contains_singleton("repository"));
}

#[test]
fn test_circular_depends_on() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("a", BeanDefinition::of(|_| Ok(1u8)).with_depends_on(["b"]))
        .unwrap();
    factory
        .register_bean_definition("b", BeanDefinition::of(|_| Ok(2u8)).with_depends_on(["a"]))
        .unwrap();

    let err = factory.get_bean("a").unwrap_err();
    assert!(
        matches!(err, BeanError::CircularDependsOn { .. }),
        "unexpected error: {}",
        err
    );
    assert!(!factory.contains_singleton("a"));
    assert!(!factory.contains_singleton("b"));

    assert!(matches!(
        factory.validate_dependencies(),
        Err(BeanError::CircularDependsOn { .. })
    ));
}

#[test]
fn test_circular_depends_on_through_alias() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("a", BeanDefinition::of(|_| Ok(1u8)).with_depends_on(["bAlias"]))
        .unwrap();
    factory
        .register_bean_definition("b", BeanDefinition::of(|_| Ok(2u8)).with_depends_on(["a"]))
        .unwrap();
    factory.register_alias("b", "bAlias").unwrap();

    let err = factory.get_bean("a").unwrap_err();
    assert!(
        matches!(err, BeanError::CircularDependsOn { .. }),
        "unexpected error: {}",
        err
    );
    assert!(!factory.contains_singleton("a"));
    assert!(!factory.contains_singleton("b"));
}

#[test]
fn test_missing_depends_on() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition(
            "service",
            BeanDefinition::of(|_| Ok(1u8)).with_depends_on(["ghost"]),
        )
        .unwrap();

    match factory.get_bean("service") {
        Err(BeanError::MissingDependency { name, dependency }) => {
            assert_eq!(name, "service");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("Expected MissingDependency, got {:?}", other.map(|_| ())),
    }

    match factory.validate_dependencies() {
        Err(BeanError::MissingDependency { name, dependency }) => {
            assert_eq!(name, "service");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("Expected MissingDependency, got {:?}", other),
    }
}

#[test]
fn test_validate_dependencies_accepts_aliases() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("config", BeanDefinition::of(|_| Ok(0u8)))
        .unwrap();
    factory.register_alias("config", "settings").unwrap();
    factory
        .register_bean_definition(
            "service",
            BeanDefinition::of(|_| Ok(1u8)).with_depends_on(["settings"]),
        )
        .unwrap();

    assert!(factory.validate_dependencies().is_ok());
}

struct Counted;

struct CountedFactory;

impl FactoryBean for CountedFactory {
    fn get_object(&self) -> anyhow::Result<Option<BeanInstance>> {
        Ok(Some(Arc::new(Counted)))
    }

    fn object_type(&self) -> Option<BeanType> {
        Some(BeanType::of::<Counted>())
    }
}

fn recording(created: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> BeanDefinition {
    let created = created.clone();
    BeanDefinition::of(move |_| {
        created.lock().push(name);
        Ok(name)
    })
}

#[test]
fn test_preinstantiate_singletons() {
    let created = Arc::new(Mutex::new(Vec::new()));
    let factory = DefaultBeanFactory::new();

    factory
        .register_bean_definition("eager", recording(&created, "eager"))
        .unwrap();
    factory
        .register_bean_definition(
            "lazy",
            recording(&created, "lazy").with_lazy_init(true),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "proto",
            recording(&created, "proto").with_scope(SCOPE_PROTOTYPE),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "template",
            recording(&created, "template").with_abstract(true),
        )
        .unwrap();
    factory
        .register_bean_definition(
            "counted",
            BeanDefinition::factory_bean(|_| Ok(CountedFactory)),
        )
        .unwrap();

    factory.preinstantiate_singletons().unwrap();

    assert_eq!(*created.lock(), vec!["eager"]);
    assert!(factory.contains_singleton("eager"));
    assert!(!factory.contains_singleton("lazy"));
    assert!(factory.contains_singleton("counted"));
    assert!(factory.has_been_created("counted"));
    assert!(factory.has_bean_creation_started());

    factory.get_bean("lazy").unwrap();
    assert_eq!(*created.lock(), vec!["eager", "lazy"]);
}

#[test]
fn test_remove_bean_definition() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let factory = DefaultBeanFactory::new();

    let counter = destroyed.clone();
    factory
        .register_bean_definition(
            "temp",
            BeanDefinition::of(|_| Ok(ConnectionPool::default())).with_destroy_method(
                "close",
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            ),
        )
        .unwrap();
    factory.get_bean("temp").unwrap();

    let removed = factory.remove_bean_definition("temp").unwrap();
    assert_eq!(removed.bean_type, Some(BeanType::of::<ConnectionPool>()));
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(!factory.contains_bean("temp"));
    assert_eq!(factory.bean_definition_count(), 0);
    assert!(factory.get_bean("temp").unwrap_err().is_no_such_bean_definition());

    assert!(factory.remove_bean_definition("temp").is_err());
}

#[test]
fn test_overriding_disabled_by_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "allow_bean_definition_overriding = false").unwrap();
    writeln!(file, "[logging]").unwrap();
    writeln!(file, "level = \"warn\"").unwrap();

    let config = BeanFactoryConfig::from_file(file.path()).unwrap();
    assert_eq!(config.logging_config().level, LogLevel::Warn);

    let factory = DefaultBeanFactory::builder().config(config).build().unwrap();
    factory
        .register_bean_definition("service", BeanDefinition::of(|_| Ok(1u8)))
        .unwrap();

    let err = factory
        .register_bean_definition("service", BeanDefinition::of(|_| Ok(2u8)))
        .unwrap_err();
    assert!(matches!(err, BeanError::BeanDefinitionOverride(name) if name == "service"));
    assert_eq!(*factory.get_bean_typed::<u8>("service").unwrap(), 1);
}

#[test]
fn test_frozen_configuration() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("service", BeanDefinition::of(|_| Ok(1u8)))
        .unwrap();
    factory.freeze_configuration();
    assert!(factory.is_configuration_frozen());

    assert!(matches!(
        factory.register_bean_definition("other", BeanDefinition::of(|_| Ok(2u8))),
        Err(BeanError::IllegalState(_))
    ));
    assert!(matches!(
        factory.remove_bean_definition("service"),
        Err(BeanError::IllegalState(_))
    ));
    assert_eq!(*factory.get_bean_typed::<u8>("service").unwrap(), 1);
}

#[test]
fn test_beans_of_type() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("primary", BeanDefinition::of(|_| Ok(ConnectionPool { size: 1 })))
        .unwrap();
    factory
        .register_bean_definition("replica", BeanDefinition::of(|_| Ok(ConnectionPool { size: 2 })))
        .unwrap();
    factory
        .register_bean_definition("name", BeanDefinition::of(|_| Ok(String::from("db"))))
        .unwrap();

    let pools = factory.get_beans_of_type::<ConnectionPool>().unwrap();
    let sizes: Vec<(String, usize)> = pools.into_iter().map(|(n, p)| (n, p.size)).collect();
    assert_eq!(
        sizes,
        vec![("primary".to_string(), 1), ("replica".to_string(), 2)]
    );

    assert!(matches!(
        factory.get_bean_by_type::<ConnectionPool>(),
        Err(BeanError::IllegalState(_))
    ));
    assert_eq!(factory.get_bean_by_type::<String>().unwrap().as_str(), "db");
    assert!(factory
        .get_bean_by_type::<u64>()
        .unwrap_err()
        .is_no_such_bean_definition());
}

#[test]
fn test_parent_factory_hierarchy() {
    let parent = Arc::new(DefaultBeanFactory::new());
    parent
        .register_bean_definition(
            "basePool",
            BeanDefinition::of(|_| Ok(ConnectionPool { size: 4 })).with_abstract(true),
        )
        .unwrap();
    parent
        .register_bean_definition("shared", BeanDefinition::of(|_| Ok(String::from("shared"))))
        .unwrap();
    parent
        .register_bean_definition("service", BeanDefinition::of(|_| Ok(ConnectionPool { size: 1 })))
        .unwrap();

    let child = DefaultBeanFactory::builder()
        .parent(parent.clone())
        .build()
        .unwrap();
    child
        .register_bean_definition("pool", BeanDefinition::child("basePool"))
        .unwrap();
    // 与父容器中的定义同名，父定义从父容器解析
    child
        .register_bean_definition(
            "service",
            BeanDefinition::child("service").with_scope(SCOPE_PROTOTYPE),
        )
        .unwrap();

    assert_eq!(child.get_bean_typed::<ConnectionPool>("pool").unwrap().size, 4);

    let from_child = child.get_bean_typed::<String>("shared").unwrap();
    let from_parent = parent.get_bean_typed::<String>("shared").unwrap();
    assert!(Arc::ptr_eq(&from_child, &from_parent));
    assert!(child.contains_bean("shared"));
    assert!(!child.contains_local_bean("shared"));

    assert!(child.is_prototype("service").unwrap());
    assert!(parent.is_singleton("service").unwrap());
    assert_eq!(child.get_bean_typed::<ConnectionPool>("service").unwrap().size, 1);

    assert!(child.get_bean("nowhere").unwrap_err().is_no_such_bean_definition());
}

#[test]
fn test_register_manual_singleton() {
    let factory = DefaultBeanFactory::new();
    factory
        .register_singleton("clock", BeanHandle::new(Arc::new(42u64)))
        .unwrap();

    assert_eq!(*factory.get_bean_typed::<u64>("clock").unwrap(), 42);
    assert!(factory.contains_bean("clock"));
    assert!(!factory.contains_bean_definition("clock"));
    assert_eq!(factory.get_type("clock").unwrap(), Some(BeanType::of::<u64>()));
    assert!(factory.is_singleton("clock").unwrap());

    assert!(matches!(
        factory.register_singleton("clock", BeanHandle::new(Arc::new(7u64))),
        Err(BeanError::IllegalState(_))
    ));
}

#[test]
fn test_type_mismatch_reports_type_names() {
    let seen = Arc::new(Mutex::new(None));
    let factory = DefaultBeanFactory::new();
    factory
        .register_bean_definition("port", BeanDefinition::of(|_| Ok(8080u16)))
        .unwrap();

    let slot = seen.clone();
    factory
        .register_bean_definition(
            "server",
            BeanDefinition::of(move |creation| {
                let err = creation.get_bean_typed::<String>("port").unwrap_err();
                *slot.lock() = Some(err.to_string());
                Ok(1u8)
            }),
        )
        .unwrap();
    factory.get_bean("server").unwrap();

    let nested = seen.lock().take().unwrap();
    assert!(nested.contains("u16"), "unexpected message: {}", nested);
    assert!(!nested.contains("TypeId"), "unexpected message: {}", nested);

    let direct = factory.get_bean_typed::<String>("port").unwrap_err();
    assert!(matches!(direct, BeanError::BeanNotOfRequiredType { .. }));
    assert!(direct.to_string().contains("u16"));
    assert!(!direct.to_string().contains("TypeId"));
}
