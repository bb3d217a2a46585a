//! Sharing, cycles and concurrent materialization end to end

use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use mortise::{
    ActivationError, Catalog, CompositionContainer, ContractIdentity, ErrorKind, ExportValue,
    FactoryActivator, ImportDefinition, ImportValue, ImportValues, Instance, PartDefinition,
    TypeShape,
};

/// Holds whatever was delivered to the part's first import
struct Holder(Option<ExportValue>);

fn holder(_: &PartDefinition, imports: &ImportValues) -> Result<Instance, ActivationError> {
    let value = imports.get(0).and_then(ImportValue::single).cloned();
    Ok(Arc::new(Holder(value)) as Instance)
}

/// Keeps its lazy import and counts its own drops
struct Host {
    heavy: Option<ExportValue>,
    drops: Arc<AtomicUsize>,
}

impl Drop for Host {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn unit(_: &PartDefinition, _: &ImportValues) -> Result<Instance, ActivationError> {
    Ok(Arc::new(()) as Instance)
}

fn part(name: &str) -> PartDefinition {
    PartDefinition::new(TypeShape::named(name)).export_self()
}

fn needs(name: &str) -> ImportDefinition {
    ImportDefinition::property(name, TypeShape::named(name))
}

fn contract(name: &str) -> ContractIdentity {
    TypeShape::named(name).into()
}

fn imported(container: &CompositionContainer, name: &str) -> Instance {
    let holder = container
        .get_exported_value(&contract(name))
        .unwrap()
        .downcast::<Holder>()
        .unwrap();
    holder.0.as_ref().unwrap().get().unwrap()
}

#[test]
fn test_shared_part_delivered_once() {
    let catalog = Catalog::from_parts([
        part("Db"),
        part("A").with_import(needs("Db")),
        part("B").with_import(needs("Db")),
    ]);
    let activator = FactoryActivator::new()
        .register("Db", unit)
        .register("A", holder)
        .register("B", holder);
    let container = CompositionContainer::new(&catalog, activator).unwrap();

    let from_a = imported(&container, "A");
    let from_b = imported(&container, "B");
    assert!(Arc::ptr_eq(&from_a, &from_b));
}

#[test]
fn test_non_shared_part_delivered_per_import() {
    let catalog = Catalog::from_parts([
        part("Conn").non_shared(),
        part("A").with_import(needs("Conn")),
        part("B").with_import(needs("Conn")),
    ]);
    let activator = FactoryActivator::new()
        .register("Conn", unit)
        .register("A", holder)
        .register("B", holder);
    let container = CompositionContainer::new(&catalog, activator).unwrap();

    let from_a = imported(&container, "A");
    let from_b = imported(&container, "B");
    assert!(!Arc::ptr_eq(&from_a, &from_b));

    let direct_1 = container.get_exported_value(&contract("Conn")).unwrap();
    let direct_2 = container.get_exported_value(&contract("Conn")).unwrap();
    assert!(!Arc::ptr_eq(&direct_1, &direct_2));
}

#[test]
fn test_direct_cycle_has_no_container() {
    let catalog = Catalog::from_parts([
        part("A").with_import(needs("B")),
        part("B").with_import(needs("C")),
        part("C").with_import(needs("A")),
    ]);
    let errors = CompositionContainer::new(&catalog, FactoryActivator::new()).unwrap_err();
    assert_eq!(errors.len(), 1);
    let cycle = errors.first().unwrap();
    assert_eq!(cycle.kind(), ErrorKind::CyclicDependency);
    assert_eq!(cycle.parts().len(), 3);
}

#[test]
fn test_lazy_edge_breaks_cycle() {
    let catalog = Catalog::from_parts([
        part("A").with_import(needs("B")),
        part("B").with_import(needs("A").lazy()),
    ]);
    let activator = FactoryActivator::new()
        .register("A", holder)
        .register("B", holder);
    let container = CompositionContainer::new(&catalog, activator).unwrap();

    let a = container.get_exported_value(&contract("A")).unwrap();
    let b = imported(&container, "A").downcast::<Holder>().unwrap();
    let handle = b.0.as_ref().and_then(ExportValue::as_lazy).unwrap();
    assert!(!handle.is_forced());

    // Forcing after A exists yields the shared A
    let forced = handle.force().unwrap();
    assert!(Arc::ptr_eq(&a, &forced));
}

#[test]
fn test_dropping_container_frees_instances_holding_lazy_handles() {
    let drops = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&drops);
    let activator = FactoryActivator::new()
        .register("Heavy", unit)
        .register("Host", move |_, imports| {
            let heavy = imports.get(0).and_then(ImportValue::single).cloned();
            let drops = Arc::clone(&counter);
            Ok(Arc::new(Host { heavy, drops }) as Instance)
        });
    let catalog = Catalog::from_parts([
        part("Host").with_import(needs("Heavy").lazy()),
        part("Heavy"),
    ]);
    let container = CompositionContainer::new(&catalog, activator).unwrap();

    let host = container
        .get_exported_value(&contract("Host"))
        .unwrap()
        .downcast::<Host>()
        .unwrap();
    let handle = host
        .heavy
        .as_ref()
        .and_then(ExportValue::as_lazy)
        .cloned()
        .unwrap();
    drop(host);
    // Still cached by the container
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(container);
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    let err = handle.force().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    assert!(err.message().contains("Heavy"));
}

#[test]
fn test_forced_handle_outlives_container() {
    let catalog = Catalog::from_parts([part("Heavy")]);
    let container =
        CompositionContainer::new(&catalog, FactoryActivator::new().register("Heavy", unit))
            .unwrap();
    let handle = container.get_exports(&contract("Heavy")).unwrap().remove(0);
    let forced = handle.force().unwrap();

    drop(container);
    assert!(Arc::ptr_eq(&forced, &handle.force().unwrap()));
}

#[test]
fn test_failed_shared_construction_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let activator = FactoryActivator::new()
        .register("Db", move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err("connection refused".into());
            }
            Ok(Arc::new(()) as Instance)
        })
        .register("Repo", holder);
    let catalog = Catalog::from_parts([part("Db"), part("Repo").with_import(needs("Db"))]);
    let container = CompositionContainer::new(&catalog, activator).unwrap();

    let err = container.get_exported_value(&contract("Repo")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CreationFailed);
    assert_eq!(err.parts()[0].to_string(), "Db");
    assert!(std::error::Error::source(&err).is_some());

    container.get_exported_value(&contract("Repo")).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_first_requests_construct_once() {
    const THREADS: usize = 8;
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&constructed);
    let activator = FactoryActivator::new().register("Cache", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(Arc::new(()) as Instance)
    });
    let catalog = Catalog::from_parts([part("Cache")]);
    let container = Arc::new(CompositionContainer::new(&catalog, activator).unwrap());

    let barrier = Arc::new(Barrier::new(THREADS));
    let results = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = Arc::clone(&container);
            let barrier = Arc::clone(&barrier);
            let results = Arc::clone(&results);
            thread::spawn(move || {
                barrier.wait();
                let instance = container.get_exported_value(&contract("Cache")).unwrap();
                results.lock().push(instance);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    let results = results.lock();
    assert_eq!(results.len(), THREADS);
    assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));

    let metrics = container.metrics();
    assert_eq!(metrics.constructions_started, 1);
    assert_eq!(metrics.cache_hits as usize, THREADS - 1);
}

#[test]
fn test_panicking_construction_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let activator = FactoryActivator::new().register("Fragile", move |_, _| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first construction panics");
        }
        Ok(Arc::new(()) as Instance)
    });
    let catalog = Catalog::from_parts([part("Fragile")]);
    let container = Arc::new(CompositionContainer::new(&catalog, activator).unwrap());

    let first = {
        let container = Arc::clone(&container);
        thread::spawn(move || container.get_exported_value(&contract("Fragile")))
    };
    assert!(first.join().is_err());

    container.get_exported_value(&contract("Fragile")).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

proptest! {
    #[test]
    fn prop_closing_is_idempotent(args in prop::collection::vec("[A-Z][a-z]{0,6}", 1..6)) {
        let catalog = Catalog::from_parts([
            PartDefinition::new(TypeShape::open("Useful", 1)).export_self(),
        ]);
        let open = Arc::clone(&catalog.parts()[0]);

        for arg in &args {
            let shape = [TypeShape::named(arg.as_str())];
            let first = catalog.close_part(&open, &shape).unwrap();
            let second = catalog.close_part(&open, &shape).unwrap();
            prop_assert!(Arc::ptr_eq(&first, &second));
            prop_assert_eq!(first.type_arguments(), &shape[..]);
        }

        let mut distinct = args.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(catalog.closed_count(), distinct.len());
    }
}
