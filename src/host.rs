//! The parts of the game's GZCOM framework that the plugin talks to, expressed as traits so the
//! lifecycle and patching code doesn't need a running game.

#[cfg(all(windows, target_arch = "x86"))]
pub mod gzcom;

use strum::{EnumIter, FromRepr};

/// Type/group/instance triple identifying a resource in the game's database files. Laid out the
/// same way as the game's `cGZPersistResourceKey`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub type_id: u32,
    pub group: u32,
    pub instance: u32,
}

impl ResourceKey {
    pub const fn new(type_id: u32, group: u32, instance: u32) -> ResourceKey {
        ResourceKey {
            type_id,
            group,
            instance,
        }
    }
}

/// Framework lifecycle states, in the order the game moves through them.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, FromRepr)]
pub enum FrameworkState {
    PreFrameWorkInit = 1,
    PreAppInit,
    PostAppInit,
    Running,
    PreAppShutdown,
    PostAppShutdown,
    PostSystemServiceShutdown,
}

/// Messages the plugin subscribes to.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromRepr, EnumIter)]
pub enum Notification {
    /// Sent before a city is loaded or created.
    PreCityInit = 0x26D31EC0,

    /// Sent once a city has finished loading.
    PostCityInit = 0x26D31EC1,
}

impl Notification {
    pub fn id(self) -> u32 {
        self as u32
    }
}

/// Type tags reported by `cIGZVariant::GetType`.
pub mod variant_type {
    pub const BOOL: u16 = 0x0001;
}

/// Result of asking a property holder for a property's value.
pub enum PropertyLookup<V> {
    /// The holder has no property with the requested ID.
    Missing,

    /// The property exists but carries no data.
    NullValue,

    Value(V),
}

/// A `cIGZVariant`.
pub trait Variant {
    fn type_tag(&self) -> u16;
    fn bool_value(&self) -> bool;
    fn set_bool_value(&mut self, value: bool);
}

/// A `cISCPropertyHolder`, typically an exemplar.
pub trait PropertyHolder {
    type Value<'a>: Variant
    where
        Self: 'a;

    fn property_value(&mut self, property_id: u32) -> PropertyLookup<Self::Value<'_>>;
}

/// A `cIGZPersistResourceManager`.
pub trait ResourceManager {
    type Holder: PropertyHolder;

    /// Loads the resource with the given key as a property holder. The game keeps loaded
    /// exemplars cached for a while, so changes made to the returned holder are seen by anything
    /// else that loads the same key.
    fn property_holder(&self, key: &ResourceKey) -> Option<Self::Holder>;
}

/// A `cIGZMessageServer2`, bound to the plugin's own message target.
pub trait MessageServer {
    fn add_notification(&self, message_type: u32) -> bool;
}

/// Everything the director needs from the game.
pub trait Host {
    type Resources: ResourceManager;
    type Messages: MessageServer;

    /// Raw `cIGZFrameWork::GetState` value.
    fn framework_state(&self) -> u32;

    /// Registers the director for framework lifecycle callbacks.
    fn add_hook(&self) -> bool;

    fn resource_manager(&self) -> Option<Self::Resources>;
    fn message_server(&self) -> Option<Self::Messages>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory stand-ins for the game's services.

    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FakeVariant {
        pub type_tag: u16,
        pub value: bool,
    }

    impl FakeVariant {
        pub fn bool(value: bool) -> FakeVariant {
            FakeVariant {
                type_tag: variant_type::BOOL,
                value,
            }
        }
    }

    impl Variant for &mut FakeVariant {
        fn type_tag(&self) -> u16 {
            self.type_tag
        }

        fn bool_value(&self) -> bool {
            self.value
        }

        fn set_bool_value(&mut self, value: bool) {
            self.value = value;
        }
    }

    /// Property values keyed by ID. `None` stands for a property whose data pointer is null.
    pub type Properties = HashMap<u32, Option<FakeVariant>>;

    /// Shared so that tests can inspect what the plugin wrote after the holder was dropped,
    /// the same way the game's exemplar cache shares one in-memory copy.
    #[derive(Clone, Default)]
    pub struct FakeExemplar(pub Rc<RefCell<Properties>>);

    impl FakeExemplar {
        pub fn with(property_id: u32, value: Option<FakeVariant>) -> FakeExemplar {
            let exemplar = FakeExemplar::default();
            exemplar.0.borrow_mut().insert(property_id, value);
            exemplar
        }

        pub fn get(&self, property_id: u32) -> Option<Option<FakeVariant>> {
            self.0.borrow().get(&property_id).copied()
        }

        pub fn set(&self, property_id: u32, value: Option<FakeVariant>) {
            self.0.borrow_mut().insert(property_id, value);
        }
    }

    pub struct FakeHolder {
        exemplar: FakeExemplar,
        scratch: Option<FakeVariant>,
        property_id: u32,
    }

    impl Drop for FakeHolder {
        fn drop(&mut self) {
            if let Some(value) = self.scratch.take() {
                self.exemplar.set(self.property_id, Some(value));
            }
        }
    }

    impl PropertyHolder for FakeHolder {
        type Value<'a> = &'a mut FakeVariant;

        fn property_value(&mut self, property_id: u32) -> PropertyLookup<Self::Value<'_>> {
            match self.exemplar.get(property_id) {
                None => PropertyLookup::Missing,
                Some(None) => PropertyLookup::NullValue,
                Some(Some(value)) => {
                    self.property_id = property_id;
                    PropertyLookup::Value(self.scratch.insert(value))
                }
            }
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeResources {
        pub exemplars: HashMap<ResourceKey, FakeExemplar>,
    }

    impl ResourceManager for FakeResources {
        type Holder = FakeHolder;

        fn property_holder(&self, key: &ResourceKey) -> Option<FakeHolder> {
            self.exemplars.get(key).map(|exemplar| FakeHolder {
                exemplar: exemplar.clone(),
                scratch: None,
                property_id: 0,
            })
        }
    }

    /// Records subscriptions; fails the subscription at index `fail_at`, if set.
    #[derive(Clone, Default)]
    pub struct FakeMessages {
        pub subscribed: Rc<RefCell<Vec<u32>>>,
        pub fail_at: Option<usize>,
    }

    impl MessageServer for FakeMessages {
        fn add_notification(&self, message_type: u32) -> bool {
            let mut subscribed = self.subscribed.borrow_mut();

            if self.fail_at == Some(subscribed.len()) {
                return false;
            }

            subscribed.push(message_type);
            true
        }
    }

    pub struct FakeHost {
        pub state: u32,
        pub hooked: Cell<bool>,
        pub resource_lookups: Cell<usize>,
        pub resources: Option<FakeResources>,
        pub messages: Option<FakeMessages>,
    }

    impl FakeHost {
        pub fn new() -> FakeHost {
            FakeHost {
                state: FrameworkState::PreFrameWorkInit as u32,
                hooked: Cell::new(false),
                resource_lookups: Cell::new(0),
                resources: Some(FakeResources::default()),
                messages: Some(FakeMessages::default()),
            }
        }

        pub fn with_exemplar(mut self, key: ResourceKey, exemplar: FakeExemplar) -> FakeHost {
            self.resources
                .get_or_insert_with(FakeResources::default)
                .exemplars
                .insert(key, exemplar);
            self
        }
    }

    impl Host for FakeHost {
        type Resources = FakeResources;
        type Messages = FakeMessages;

        fn framework_state(&self) -> u32 {
            self.state
        }

        fn add_hook(&self) -> bool {
            self.hooked.set(true);
            true
        }

        fn resource_manager(&self) -> Option<FakeResources> {
            self.resource_lookups.set(self.resource_lookups.get() + 1);
            self.resources.clone()
        }

        fn message_server(&self) -> Option<FakeMessages> {
            self.messages.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn notifications_are_subscribed_in_lifecycle_order() {
        let ids: Vec<u32> = Notification::iter().map(Notification::id).collect();
        assert_eq!(ids, vec![0x26D31EC0, 0x26D31EC1]);
    }

    #[test]
    fn unknown_message_ids_are_not_notifications() {
        assert_eq!(Notification::from_repr(0x26D31EC1), Some(Notification::PostCityInit));
        assert_eq!(Notification::from_repr(0x26D31EC2), None);
    }

    #[test]
    fn framework_states_are_ordered() {
        assert!(FrameworkState::PreFrameWorkInit < FrameworkState::PreAppInit);
        assert!(FrameworkState::Running > FrameworkState::PostAppInit);
        assert_eq!(FrameworkState::from_repr(2), Some(FrameworkState::PreAppInit));
    }
}
