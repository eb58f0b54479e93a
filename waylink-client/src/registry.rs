//! Object id allocation and the `wl_registry` global table.
//!
//! # Id reuse policy
//!
//! The protocol lets the compositor reuse a client-allocated id only after
//! it has confirmed the previous object is gone by sending
//! `wl_display.delete_id`. Recycling on the *send* of a destructor request
//! (rather than waiting for `delete_id`) would let the client hand out an
//! id that the compositor still considers live, racing a late event
//! against the new object's own events. This registry pins recycling
//! strictly to [`ObjectRegistry::delete_id`]; `destroy_local` only marks
//! an object dead, it never frees its id.
//!
//! IDs are handed out from a cyclic counter over `[1, ObjectId::MAX_CLIENT]`
//! with a FIFO queue of ids freed by `delete_id` consulted first: this
//! matches the freed-in-order-reused-in-order behavior of the reference
//! client, and keeps a recently-freed id from being reissued immediately
//! (which would make a stray late event from the old object indistinguish
//! able from one for the new object).

use std::collections::{HashMap, VecDeque};
use std::ffi::CString;
use std::num::NonZeroU32;
use std::rc::Rc;

use waylink_core::ObjectId;

use crate::error::RegistryError;
use crate::object::LiveObject;
use crate::protocol::InterfaceTemplate;

/// One entry of the globals table maintained from `wl_registry.global` /
/// `wl_registry.global_remove` events.
#[derive(Debug, Clone)]
pub struct GlobalEntry {
    pub name: u32,
    pub interface: CString,
    pub version: u32,
}

pub struct ObjectRegistry {
    next_id: u32,
    recycled: VecDeque<u32>,
    client_objects: HashMap<ObjectId, LiveObject>,
    server_objects: HashMap<ObjectId, LiveObject>,
    globals: Vec<GlobalEntry>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            next_id: ObjectId::DISPLAY.as_u32() + 1,
            recycled: VecDeque::new(),
            client_objects: HashMap::new(),
            server_objects: HashMap::new(),
            globals: Vec::new(),
        }
    }

    fn allocate_id(&mut self) -> Result<ObjectId, RegistryError> {
        if let Some(id) = self.recycled.pop_front() {
            return Ok(ObjectId(NonZeroU32::new(id).expect("recycled id is never 0")));
        }

        let max = ObjectId::MAX_CLIENT.as_u32();
        let start = self.next_id;
        loop {
            let candidate = self.next_id;
            self.next_id = if self.next_id >= max { 1 } else { self.next_id + 1 };

            let id = ObjectId(NonZeroU32::new(candidate).expect("counter never reaches 0"));
            if !self.client_objects.contains_key(&id) && candidate != ObjectId::DISPLAY.as_u32() {
                return Ok(id);
            }
            if self.next_id == start {
                return Err(RegistryError::IdsExhausted);
            }
        }
    }

    /// Allocates a fresh client-side id and registers a [`LiveObject`] for
    /// it bound to `interface`.
    pub fn alloc_client_object(
        &mut self,
        interface: Rc<InterfaceTemplate>,
        version: u32,
    ) -> Result<ObjectId, RegistryError> {
        let id = self.allocate_id()?;
        self.client_objects.insert(id, LiveObject::new(id, interface, version));
        Ok(id)
    }

    /// Inserts a client object at a predetermined id rather than
    /// allocating one. Used for `wl_display`, which is always object 1 and
    /// never goes through the normal allocator; exposed publicly so a
    /// caller assembling a client over a non-standard transport (a test
    /// harness, say) can reproduce the same bootstrap sequence.
    pub fn insert_fixed(&mut self, id: ObjectId, interface: Rc<InterfaceTemplate>, version: u32) {
        self.client_objects.insert(id, LiveObject::new(id, interface, version));
    }

    /// Registers an object the compositor created (a server-allocated id,
    /// e.g. from `wl_data_device.data_offer`).
    pub fn register_server_object(&mut self, id: ObjectId, interface: Rc<InterfaceTemplate>, version: u32) {
        self.server_objects.insert(id, LiveObject::new(id, interface, version));
    }

    pub fn get(&self, id: ObjectId) -> Option<&LiveObject> {
        if id.created_by_server() {
            self.server_objects.get(&id)
        } else {
            self.client_objects.get(&id)
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut LiveObject> {
        if id.created_by_server() {
            self.server_objects.get_mut(&id)
        } else {
            self.client_objects.get_mut(&id)
        }
    }

    /// Marks a client-allocated object dead without freeing its id. The id
    /// stays reserved until the matching `wl_display.delete_id` arrives.
    pub fn destroy_local(&mut self, id: ObjectId) {
        if let Some(obj) = self.client_objects.get_mut(&id) {
            obj.mark_dead();
        }
    }

    /// Handles `wl_display.delete_id`: drops the object and returns its id
    /// to the FIFO recycle queue.
    pub fn delete_id(&mut self, id: ObjectId) {
        if id.created_by_server() {
            self.server_objects.remove(&id);
        } else {
            self.client_objects.remove(&id);
            self.recycled.push_back(id.as_u32());
        }
    }

    pub fn globals(&self) -> &[GlobalEntry] {
        &self.globals
    }

    pub fn add_global(&mut self, entry: GlobalEntry) {
        self.globals.push(entry);
    }

    pub(crate) fn remove_global(&mut self, name: u32) {
        self.globals.retain(|g| g.name != name);
    }

    pub fn find_global(&self, interface: &str) -> Option<&GlobalEntry> {
        self.globals.iter().find(|g| g.interface.to_string_lossy() == interface)
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InterfaceTemplate, MessageTemplate};
    use std::collections::HashMap as StdHashMap;

    fn dummy_interface(name: &str) -> Rc<InterfaceTemplate> {
        Rc::new(InterfaceTemplate {
            name: name.to_string(),
            version: 1,
            requests: vec![MessageTemplate {
                name: "destroy".into(),
                kind: Some("destructor".into()),
                args: vec![],
                description: None,
            }],
            events: vec![],
            enums: StdHashMap::new(),
            description: None,
        })
    }

    #[test]
    fn ids_increase_monotonically_before_any_recycling() {
        let mut reg = ObjectRegistry::new();
        let a = reg.alloc_client_object(dummy_interface("wl_foo"), 1).unwrap();
        let b = reg.alloc_client_object(dummy_interface("wl_foo"), 1).unwrap();
        assert!(b.as_u32() > a.as_u32());
    }

    #[test]
    fn id_is_not_reused_until_delete_id() {
        let mut reg = ObjectRegistry::new();
        let a = reg.alloc_client_object(dummy_interface("wl_foo"), 1).unwrap();
        reg.destroy_local(a);
        let b = reg.alloc_client_object(dummy_interface("wl_foo"), 1).unwrap();
        assert_ne!(a, b, "id must stay reserved until delete_id arrives");
        assert!(!reg.get(a).unwrap().is_alive());

        reg.delete_id(a);
        assert!(reg.get(a).is_none());
    }

    #[test]
    fn delete_id_recycles_in_fifo_order() {
        let mut reg = ObjectRegistry::new();
        let a = reg.alloc_client_object(dummy_interface("wl_foo"), 1).unwrap();
        let b = reg.alloc_client_object(dummy_interface("wl_foo"), 1).unwrap();
        reg.delete_id(a);
        reg.delete_id(b);
        let c = reg.alloc_client_object(dummy_interface("wl_foo"), 1).unwrap();
        assert_eq!(c, a, "first-freed id should be the first reused");
    }

    #[test]
    fn global_table_tracks_add_and_remove() {
        let mut reg = ObjectRegistry::new();
        reg.add_global(GlobalEntry {
            name: 5,
            interface: CString::new("wl_seat").unwrap(),
            version: 7,
        });
        assert!(reg.find_global("wl_seat").is_some());
        reg.remove_global(5);
        assert!(reg.find_global("wl_seat").is_none());
    }
}
