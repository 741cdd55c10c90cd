//! Registry tests

use super::*;
use crate::Runtime;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn noop() -> NativeFn {
    Arc::new(|_: &Runtime| {})
}

#[test]
fn test_module_lookup_by_exact_name() {
    let registry = ModuleRegistry::new();
    let widget = registry.register_module("Widget");
    registry.register_module("WidgetExtras");

    assert_eq!(registry.module("Widget"), Ok(widget));
    assert!(matches!(
        registry.module("widget"),
        Err(ProtocolError::UnknownModule { .. })
    ));
}

#[test]
fn test_method_registration_and_lookup() {
    let registry = ModuleRegistry::new();
    let m = registry.register_module("Widget");
    let create = registry.register_method(m, "create", noop()).unwrap();
    let show = registry.register_method(m, "Handle_show", noop()).unwrap();

    assert_ne!(create, show);
    assert_eq!(registry.method(m, "create"), Ok(create));
    assert_eq!(registry.method_name(show).as_deref(), Some("Widget.Handle_show"));
    assert_eq!(
        registry.method(m, "destroy"),
        Err(ProtocolError::UnknownMethod {
            module: "Widget".into(),
            name: "destroy".into()
        })
    );
}

#[test]
fn test_methods_are_scoped_to_their_module() {
    let registry = ModuleRegistry::new();
    let a = registry.register_module("A");
    let b = registry.register_module("B");
    registry.register_method(a, "create", noop()).unwrap();

    assert!(registry.method(b, "create").is_err());
}

#[test]
fn test_method_entry_is_callable() {
    let registry = ModuleRegistry::new();
    let m = registry.register_module("Counter");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let method = registry
        .register_method(
            m,
            "bump",
            Arc::new(move |_: &Runtime| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    let entry = registry.method_entry(method).unwrap();
    let rt = Runtime::default();
    entry(&rt);
    entry(&rt);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_handle_kinds_do_not_alias() {
    let registry = ModuleRegistry::new();
    let m = registry.register_module("Widget");
    let method = registry.register_method(m, "create", noop()).unwrap();

    assert!(ModuleRef::from_raw(method.into_raw()).is_err());
    assert!(ModuleMethodRef::from_raw(m.into_raw()).is_err());
    assert_eq!(ModuleMethodRef::from_raw(method.into_raw()), Ok(method));
    assert!(ModuleRef::from_raw(0).is_err());
}

#[test]
fn test_forged_handle_is_rejected_on_lookup() {
    let registry = ModuleRegistry::new();
    registry.register_module("Widget");

    let forged = ModuleRef::from_index(40);
    assert!(matches!(
        registry.method(forged, "create"),
        Err(ProtocolError::UnknownHandle { kind: "module", .. })
    ));
}

#[test]
fn test_interfaces_and_methods() {
    let registry = ModuleRegistry::new();
    let m = registry.register_module("Model");
    let iface = registry.register_interface(m, "ItemDelegate").unwrap();
    let paint = registry.register_interface_method(iface, "paint", None).unwrap();
    let size = registry
        .register_interface_method(iface, "sizeHint", Some(noop()))
        .unwrap();

    assert_eq!(registry.interface(m, "ItemDelegate"), Ok(iface));
    assert_eq!(registry.interface_method(iface, "paint"), Ok(paint));

    let target = registry.interface_method_target(paint).unwrap();
    assert_eq!(target.interface, "Model.ItemDelegate");
    assert_eq!(target.method, "paint");
    assert!(target.entry.is_none());
    assert!(registry.interface_method_target(size).unwrap().entry.is_some());

    assert!(matches!(
        registry.interface_method(iface, "missing"),
        Err(ProtocolError::UnknownInterfaceMethod { .. })
    ));
}

#[test]
fn test_exceptions() {
    let registry = ModuleRegistry::new();
    let m = registry.register_module("Files");
    let not_found = registry.register_exception(m, "NotFound").unwrap();

    assert_eq!(registry.exception(m, "NotFound"), Ok(not_found));
    assert_eq!(registry.exception_name(not_found).as_deref(), Some("Files.NotFound"));
    assert!(registry.exception(m, "Denied").is_err());
}

#[test]
fn test_constants_and_summaries() {
    let registry = ModuleRegistry::new();
    let widget = registry.register_module("Widget");
    let common = registry.register_module("Common");
    registry.register_method(widget, "create", noop()).unwrap();
    registry.register_constants(widget, noop()).unwrap();

    assert!(registry.constants_entry(widget).unwrap().is_some());
    assert!(registry.constants_entry(common).unwrap().is_none());

    let summaries = registry.modules();
    assert_eq!(summaries[0].name, "Common");
    assert_eq!(summaries[1].name, "Widget");
    assert_eq!(summaries[1].methods, 1);
    assert!(summaries[1].has_constants);
}

#[test]
fn test_duplicate_module_name_later_wins() {
    let registry = ModuleRegistry::new();
    let first = registry.register_module("Widget");
    let second = registry.register_module("Widget");

    assert_ne!(first, second);
    assert_eq!(registry.module("Widget"), Ok(second));
}
