//! Instance registry tests

use super::*;
use crate::error::ProtocolError;

#[derive(Debug)]
struct Widget {
    label: &'static str,
}

#[test]
fn test_instance_ref_parts() {
    let client = InstanceRef::from_parts(7, true);
    let server = InstanceRef::from_parts(7, false);

    assert_eq!(client, InstanceRef::Client(7));
    assert_eq!(server, InstanceRef::Server(7));
    assert_ne!(client, server);
    assert_eq!(client.id(), server.id());
    assert!(client.is_client_owned());
    assert!(!server.is_client_owned());
}

#[test]
fn test_server_ids_start_at_one_and_are_not_reused() {
    let registry = InstanceRegistry::new();
    let a = registry.register_server(Arc::new(Widget { label: "a" })).unwrap();
    let b = registry.register_server(Arc::new(Widget { label: "b" })).unwrap();
    assert_eq!((a, b), (1, 2));

    registry.release_server(a).unwrap();
    let c = registry.register_server(Arc::new(Widget { label: "c" })).unwrap();
    assert_eq!(c, 3);
}

#[test]
fn test_same_object_keeps_its_id() {
    let registry = InstanceRegistry::new();
    let widget = Arc::new(Widget { label: "w" });
    let first = registry.register_server(widget.clone()).unwrap();
    let second = registry.register_server(widget.clone()).unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.server_count(), 1);

    // once released, the object gets a fresh id
    registry.release_server(first).unwrap();
    assert_ne!(registry.register_server(widget).unwrap(), first);
}

#[test]
fn test_double_release_is_rejected() {
    let registry = InstanceRegistry::new();
    let id = registry.register_server(Arc::new(Widget { label: "w" })).unwrap();

    assert_eq!(registry.release_server(id), Ok(()));
    assert_eq!(
        registry.release_server(id),
        Err(ProtocolError::DoubleRelease {
            space: "server instance",
            id
        })
    );
}

#[test]
fn test_pin_downcasts_and_blocks_release() {
    let registry = InstanceRegistry::new();
    let id = registry.register_server(Arc::new(Widget { label: "pinned" })).unwrap();

    {
        let pin = registry.pin::<Widget>(id).unwrap();
        assert_eq!(pin.label, "pinned");
        assert_eq!(pin.id(), id);
        assert!(matches!(
            registry.release_server(id),
            Err(ProtocolError::InstanceInUse { pins: 1, .. })
        ));
    }

    assert_eq!(registry.release_server(id), Ok(()));
}

#[test]
fn test_pin_with_wrong_type() {
    let registry = InstanceRegistry::new();
    let id = registry.register_server(Arc::new(Widget { label: "w" })).unwrap();

    assert!(matches!(
        registry.pin::<String>(id),
        Err(ProtocolError::InstanceTypeMismatch { .. })
    ));
    // a failed pin leaves nothing pinned
    assert_eq!(registry.release_server(id), Ok(()));
}

#[test]
fn test_transients_expire_with_their_epoch() {
    let registry = InstanceRegistry::new();
    let owned = registry.register_server(Arc::new(Widget { label: "owned" })).unwrap();
    let transient = registry.register_transient(Arc::new(Widget { label: "index" }), 0).unwrap();

    assert!(registry.pin::<Widget>(transient).is_ok());
    assert_eq!(registry.expire_transients(1), 1);

    assert_eq!(
        registry.pin::<Widget>(transient).err(),
        Some(ProtocolError::StaleInstance {
            id: transient,
            issued_epoch: 0
        })
    );
    assert!(registry.pin::<Widget>(owned).is_ok());
}

#[test]
fn test_transients_from_current_epoch_survive() {
    let registry = InstanceRegistry::new();
    let id = registry.register_transient(Arc::new(Widget { label: "t" }), 3).unwrap();
    assert_eq!(registry.expire_transients(3), 0);
    assert!(registry.pin::<Widget>(id).is_ok());
}

#[test]
fn test_client_refcounts() {
    let registry = InstanceRegistry::new();
    assert_eq!(registry.retain_client(7), 1);
    assert_eq!(registry.retain_client(7), 2);

    assert_eq!(registry.release_client(7), Ok(false));
    assert_eq!(registry.release_client(7), Ok(true));
    assert!(matches!(
        registry.release_client(7),
        Err(ProtocolError::DoubleRelease { space: "client instance", id: 7 })
    ));
}

#[test]
fn test_spaces_are_independent() {
    let registry = InstanceRegistry::new();
    let server = registry.register_server(Arc::new(Widget { label: "w" })).unwrap();
    registry.retain_client(server);

    registry.release_server(server).unwrap();
    assert_eq!(registry.client_instances(), vec![(server, 1)]);
}

#[test]
fn test_snapshot_is_ordered() {
    let registry = InstanceRegistry::new();
    let a = registry.register_server(Arc::new(Widget { label: "a" })).unwrap();
    let b = registry.register_transient(Arc::new(7_u32), 0).unwrap();

    let infos = registry.server_instances();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].id, a);
    assert!(!infos[0].transient);
    assert_eq!(infos[1].id, b);
    assert!(infos[1].transient);
    assert_eq!(infos[1].type_name, "u32");
}

#[test]
fn test_retired_ids_stay_bounded() {
    let registry = InstanceRegistry::new();
    for epoch in 0..10_000_u64 {
        registry.register_transient(Arc::new(Widget { label: "index" }), epoch).unwrap();
        registry.register_transient(Arc::new(Widget { label: "index" }), epoch).unwrap();
        assert_eq!(registry.expire_transients(epoch + 1), 2);
    }

    assert_eq!(registry.server_count(), 0);
    assert_eq!(registry.retired_count(), 2 * RETIRED_HORIZON);
}

#[test]
fn test_old_retired_ids_become_unknown() {
    let registry = InstanceRegistry::new();
    let first = registry.register_transient(Arc::new(Widget { label: "t" }), 0).unwrap();
    registry.expire_transients(1);

    for epoch in 1..=RETIRED_HORIZON as u64 {
        registry.register_transient(Arc::new(7_u32), epoch).unwrap();
        registry.expire_transients(epoch + 1);
    }
    let recent = registry.register_transient(Arc::new(7_u32), 20).unwrap();
    registry.expire_transients(21);

    assert_eq!(
        registry.pin::<Widget>(first).err(),
        Some(ProtocolError::UnknownServerInstance { id: first })
    );
    assert_eq!(
        registry.pin::<u32>(recent).err(),
        Some(ProtocolError::StaleInstance {
            id: recent,
            issued_epoch: 20
        })
    );
}

#[test]
fn test_server_ids_do_not_wrap() {
    let registry = InstanceRegistry::with_next_id(i32::MAX - 1);
    let last = registry.register_server(Arc::new(Widget { label: "last" })).unwrap();
    assert_eq!(last, i32::MAX - 1);

    let exhausted = ProtocolError::IdsExhausted {
        space: "server instance",
    };
    assert_eq!(registry.register_server(Arc::new(Widget { label: "w" })), Err(exhausted.clone()));
    assert_eq!(registry.register_transient(Arc::new(7_u32), 0), Err(exhausted));
    assert_eq!(registry.server_count(), 1);
}
