//! End-to-end scenarios exercised against byte/schema fixtures, without a
//! live compositor: load a literal protocol fragment, allocate and bind
//! objects through the real registry and marshaller, and check the wire
//! shape of the resulting messages directly.

use std::ffi::CString;
use std::rc::Rc;

use waylink_client::error::ClientError;
use waylink_client::protocol::ProtocolSet;
use waylink_client::registry::{GlobalEntry, ObjectRegistry};
use waylink_client::request;
use waylink_core::{ArgValue, ObjectId};

const BASE_PROTOCOL: &str = r#"
<protocol name="wayland">
  <interface name="wl_display" version="1">
    <request name="sync">
      <arg name="callback" type="new_id" interface="wl_callback"/>
    </request>
    <request name="get_registry">
      <arg name="registry" type="new_id" interface="wl_registry"/>
    </request>
    <event name="error">
      <arg name="object_id" type="object"/>
      <arg name="code" type="uint"/>
      <arg name="message" type="string"/>
    </event>
    <event name="delete_id">
      <arg name="id" type="uint"/>
    </event>
  </interface>
  <interface name="wl_registry" version="1">
    <request name="bind">
      <arg name="name" type="uint"/>
      <arg name="id" type="new_id"/>
    </request>
    <event name="global">
      <arg name="name" type="uint"/>
      <arg name="interface" type="string"/>
      <arg name="version" type="uint"/>
    </event>
    <event name="global_remove">
      <arg name="name" type="uint"/>
    </event>
  </interface>
  <interface name="wl_callback" version="1">
    <event name="done">
      <arg name="data" type="uint"/>
    </event>
  </interface>
  <interface name="wl_compositor" version="5">
    <request name="create_surface">
      <arg name="id" type="new_id" interface="wl_surface"/>
    </request>
  </interface>
</protocol>
"#;

fn load_base() -> ProtocolSet {
    let mut set = ProtocolSet::new();
    set.load_str(BASE_PROTOCOL).expect("fixture XML must parse");
    set
}

/// Scenario: display connect. `wl_display` lives at id 1, inserted at a
/// fixed id rather than drawn from the allocator; the registry object the
/// client allocates right after it gets the next id, 2.
#[test]
fn display_connect_assigns_display_then_registry() {
    let protocols = load_base();
    let display_iface = Rc::new(protocols.interface("wl_display").unwrap().clone());
    let registry_iface = Rc::new(protocols.interface("wl_registry").unwrap().clone());

    let mut registry = ObjectRegistry::new();
    registry.insert_fixed(ObjectId::DISPLAY, display_iface.clone(), display_iface.version);
    assert!(registry.get(ObjectId::DISPLAY).is_some());

    let registry_id = registry.alloc_client_object(registry_iface, 1).unwrap();
    assert_eq!(registry_id.as_u32(), 2);
}

/// Scenario: global discovery. Two `wl_registry.global` events populate
/// the globals table, keyed by interface name; both survive in order.
#[test]
fn global_discovery_tracks_both_entries() {
    let mut registry = ObjectRegistry::new();
    registry.add_global(GlobalEntry {
        name: 1,
        interface: CString::new("wl_compositor").unwrap(),
        version: 5,
    });
    registry.add_global(GlobalEntry {
        name: 2,
        interface: CString::new("wl_shm").unwrap(),
        version: 1,
    });

    assert_eq!(registry.globals().len(), 2);
    assert_eq!(registry.find_global("wl_compositor").unwrap().name, 1);
    assert_eq!(registry.find_global("wl_shm").unwrap().name, 2);
}

/// Scenario: bind. Binding `wl_compositor` allocates a fresh client id and
/// produces a `wl_registry.bind` request whose payload is
/// `uint(name) . string(interface) . uint(version) . uint(new_id)`.
#[test]
fn bind_marshals_name_string_version_new_id() {
    let protocols = load_base();
    let registry_iface = Rc::new(protocols.interface("wl_registry").unwrap().clone());
    let compositor_iface = Rc::new(protocols.interface("wl_compositor").unwrap().clone());

    let mut registry = ObjectRegistry::new();
    let registry_id = registry.alloc_client_object(registry_iface, 1).unwrap();
    registry.add_global(GlobalEntry {
        name: 1,
        interface: CString::new("wl_compositor").unwrap(),
        version: 5,
    });

    let bound_id = registry.alloc_client_object(compositor_iface, 5).unwrap();

    let registry_obj = registry.get(registry_id).unwrap();
    let msg = request::marshal(
        registry_obj,
        "bind",
        vec![
            ArgValue::Uint(1),
            ArgValue::AnyNewId(CString::new("wl_compositor").unwrap(), 5, bound_id),
        ],
    )
    .unwrap();

    assert_eq!(msg.header.object_id, registry_id);
    assert_eq!(msg.header.opcode, 0); // bind is wl_registry's only request
    match &msg.args[0] {
        ArgValue::Uint(name) => assert_eq!(*name, 1),
        other => panic!("expected Uint, got {other:?}"),
    }
    match &msg.args[1] {
        ArgValue::AnyNewId(iface, version, id) => {
            assert_eq!(iface.to_str().unwrap(), "wl_compositor");
            assert_eq!(*version, 5);
            assert_eq!(*id, bound_id);
        }
        other => panic!("expected AnyNewId, got {other:?}"),
    }
}

/// Scenario: sync. `wl_display.sync` carries exactly one `new_id` argument
/// naming the freshly allocated `wl_callback`, at opcode 0 (its
/// declaration order in the fixture).
#[test]
fn sync_marshals_single_new_id_argument() {
    let protocols = load_base();
    let display_iface = Rc::new(protocols.interface("wl_display").unwrap().clone());
    let callback_iface = Rc::new(protocols.interface("wl_callback").unwrap().clone());

    let mut registry = ObjectRegistry::new();
    registry.insert_fixed(ObjectId::DISPLAY, display_iface, 1);
    let callback_id = registry.alloc_client_object(callback_iface, 1).unwrap();

    let display_obj = registry.get(ObjectId::DISPLAY).unwrap();
    let msg = request::marshal(display_obj, "sync", vec![ArgValue::NewId(callback_id)]).unwrap();

    assert_eq!(msg.header.object_id, ObjectId::DISPLAY);
    assert_eq!(msg.header.opcode, 0);
    assert_eq!(msg.header.size as usize, waylink_core::MessageHeader::SIZE + 4);
    match msg.args.as_slice() {
        [ArgValue::NewId(id)] => assert_eq!(*id, callback_id),
        other => panic!("expected a single NewId argument, got {other:?}"),
    }
}

/// Scenario: argument-arity mismatch writes nothing to the socket (it
/// never gets far enough to build a `Message` at all).
#[test]
fn wrong_arity_is_rejected_before_encoding() {
    let protocols = load_base();
    let display_iface = Rc::new(protocols.interface("wl_display").unwrap().clone());
    let mut registry = ObjectRegistry::new();
    registry.insert_fixed(ObjectId::DISPLAY, display_iface, 1);

    let display_obj = registry.get(ObjectId::DISPLAY).unwrap();
    let err = request::marshal(display_obj, "sync", vec![]).unwrap_err();
    assert!(matches!(err, ClientError::ArgumentArity { expected: 1, got: 0, .. }));
}

/// Scenario: id recycle. Once `delete_id` has freed an id, the next
/// allocation reuses it before the cyclic generator advances further.
#[test]
fn delete_id_makes_an_id_reusable_before_advancing() {
    let protocols = load_base();
    let callback_iface = Rc::new(protocols.interface("wl_callback").unwrap().clone());

    let mut registry = ObjectRegistry::new();
    let a = registry.alloc_client_object(callback_iface.clone(), 1).unwrap();
    let b = registry.alloc_client_object(callback_iface.clone(), 1).unwrap();
    registry.delete_id(a);
    registry.delete_id(b);

    let reused = registry.alloc_client_object(callback_iface, 1).unwrap();
    assert_eq!(reused, a, "the first id freed must be the first reused");
}
