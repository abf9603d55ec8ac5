//! Raw bindings for the GZCOM interfaces the plugin uses, and implementations of the host traits
//! on top of them.
//!
//! Every interface is a C++ object whose first field points at a table of `thiscall` virtual
//! functions. Only the slots we call are typed; the rest are kept as pointer-sized padding so the
//! typed slots stay at the game's indices.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use super::{Host, MessageServer, PropertyHolder, PropertyLookup, ResourceKey, ResourceManager, Variant};

/// Interface and service identifiers.
pub mod ids {
    pub const GZIID_CIGZUNKNOWN: u32 = 0x00000001;
    pub const GZIID_CIGZCOMDIRECTOR: u32 = 0xA21EB8AC;
    pub const GZIID_CIGZFRAMEWORKHOOKS: u32 = 0x03FA40BF;
    pub const GZIID_CIGZMESSAGETARGET2: u32 = 0x8A2E7D4C;

    pub const GZIID_CIGZMESSAGESERVER2: u32 = 0x652294C7;
    pub const RZSRVID_MESSAGE_SERVER2: u32 = 0x27A3D1B8;

    pub const GZIID_CIGZPERSISTRESOURCEMANAGER: u32 = 0xA56EA47E;
    pub const RZSRVID_PERSIST_RESOURCE_MANAGER: u32 = 0xC46F8F28;

    pub const GZIID_CISCPROPERTYHOLDER: u32 = 0x456B8B0E;
}

type Slot = usize;

#[repr(C)]
pub struct UnknownVtbl {
    pub query_interface:
        unsafe extern "thiscall" fn(this: *mut c_void, iid: u32, out: *mut *mut c_void) -> bool,
    pub add_ref: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
    pub release: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
}

/// Marks a vtable layout that starts with the `cIGZUnknown` slots.
///
/// # Safety
/// Implementors must be `#[repr(C)]` with an `UnknownVtbl` as their first field.
pub unsafe trait Interface {}

/// `cIGZCOM`
#[repr(C)]
pub struct ComVtbl {
    pub base: UnknownVtbl,
    _get_class_object: Slot,
    pub frame_work: unsafe extern "thiscall" fn(this: *mut c_void) -> *mut c_void,
}

/// `cIGZFrameWork`
#[repr(C)]
pub struct FrameWorkVtbl {
    pub base: UnknownVtbl,
    _add_remove_system_service: [Slot; 2],
    pub get_system_service: unsafe extern "thiscall" fn(
        this: *mut c_void,
        service_id: u32,
        iid: u32,
        out: *mut *mut c_void,
    ) -> bool,
    _enum_system_services: Slot,
    pub add_hook: unsafe extern "thiscall" fn(this: *mut c_void, hooks: *mut c_void) -> bool,
    _remove_hook: Slot,
    // Tick and idle management, quit, command line, install flag and the COM accessor.
    _tick_to_com_object: [Slot; 15],
    pub get_state: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
}

/// `cIGZMessage2`
#[repr(C)]
pub struct Message2Vtbl {
    pub base: UnknownVtbl,
    _create: Slot,
    pub get_type: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
}

/// `cIGZMessageServer2`
#[repr(C)]
pub struct MessageServer2Vtbl {
    pub base: UnknownVtbl,
    _send_post: [Slot; 2],
    pub add_notification:
        unsafe extern "thiscall" fn(this: *mut c_void, target: *mut c_void, message_type: u32) -> bool,
}

/// `cIGZPersistResourceManager`
#[repr(C)]
pub struct PersistResourceManagerVtbl {
    pub base: UnknownVtbl,
    // Init/shutdown, segment registration, factories and key queries.
    _segments_and_factories: [Slot; 18],
    pub get_resource: unsafe extern "thiscall" fn(
        this: *mut c_void,
        key: *const ResourceKey,
        iid: u32,
        out: *mut *mut c_void,
        unknown: u32,
        record: *mut c_void,
    ) -> bool,
}

/// `cISCPropertyHolder`
#[repr(C)]
pub struct PropertyHolderVtbl {
    pub base: UnknownVtbl,
    _has_property: Slot,
    _get_property_list: Slot,
    pub get_property: unsafe extern "thiscall" fn(this: *mut c_void, property_id: u32) -> *mut c_void,
}

/// `cISCProperty`
#[repr(C)]
pub struct PropertyVtbl {
    pub base: UnknownVtbl,
    _property_id: [Slot; 2],
    pub get_property_value: unsafe extern "thiscall" fn(this: *mut c_void) -> *mut c_void,
}

/// `cIGZVariant`
#[repr(C)]
pub struct VariantVtbl {
    pub base: UnknownVtbl,
    pub get_type: unsafe extern "thiscall" fn(this: *mut c_void) -> u16,
    // Count, copy and clear.
    _count_copy_clear: [Slot; 4],
    pub get_val_bool: unsafe extern "thiscall" fn(this: *mut c_void) -> bool,
    // The remaining scalar getters, then the reference accessors.
    _getters_and_refs: [Slot; 21],
    pub set_val_bool: unsafe extern "thiscall" fn(this: *mut c_void, value: bool),
}

unsafe impl Interface for ComVtbl {}
unsafe impl Interface for FrameWorkVtbl {}
unsafe impl Interface for Message2Vtbl {}
unsafe impl Interface for MessageServer2Vtbl {}
unsafe impl Interface for PersistResourceManagerVtbl {}
unsafe impl Interface for PropertyHolderVtbl {}
unsafe impl Interface for PropertyVtbl {}
unsafe impl Interface for VariantVtbl {}

/// Checks at compile time that a vtable has `len` slots and that each named slot sits at its
/// index in the game's table.
macro_rules! vtable_layout {
    ($vtbl:ty, len = $len:literal $(, $field:ident = $index:literal)* $(,)?) => {
        const _: () = {
            assert!(std::mem::size_of::<$vtbl>() == $len * std::mem::size_of::<usize>());
            $(
                assert!(std::mem::offset_of!($vtbl, $field) == $index * std::mem::size_of::<usize>());
            )*
        };
    };
}

pub(crate) use vtable_layout;

vtable_layout!(UnknownVtbl, len = 3, query_interface = 0, add_ref = 1, release = 2);
vtable_layout!(ComVtbl, len = 5, frame_work = 4);
vtable_layout!(FrameWorkVtbl, len = 25, get_system_service = 5, add_hook = 7, get_state = 24);
vtable_layout!(Message2Vtbl, len = 5, get_type = 4);
vtable_layout!(MessageServer2Vtbl, len = 6, add_notification = 5);
vtable_layout!(PersistResourceManagerVtbl, len = 22, get_resource = 21);
vtable_layout!(PropertyHolderVtbl, len = 6, get_property = 5);
vtable_layout!(PropertyVtbl, len = 6, get_property_value = 5);
vtable_layout!(VariantVtbl, len = 31, get_type = 3, get_val_bool = 8, set_val_bool = 30);

/// A C++ object as seen from outside: just its vtable pointer.
#[repr(C)]
pub struct Object<V> {
    vtbl: *const V,
}

/// A borrowed interface pointer. The game keeps the object alive for `'a`.
pub struct Borrowed<'a, V: Interface> {
    ptr: NonNull<Object<V>>,
    _marker: PhantomData<&'a Object<V>>,
}

impl<'a, V: Interface> Borrowed<'a, V> {
    /// # Safety
    /// `raw` must be null or point at a live object implementing `V` for `'a`.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Borrowed<'a, V>> {
        NonNull::new(raw.cast()).map(|ptr| Borrowed {
            ptr,
            _marker: PhantomData,
        })
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    pub fn vtbl(&self) -> &V {
        unsafe { &*(*self.ptr.as_ptr()).vtbl }
    }
}

/// An owned reference to a GZCOM object, released on drop.
pub struct GzPtr<V: Interface> {
    ptr: NonNull<Object<V>>,
}

impl<V: Interface> GzPtr<V> {
    /// Takes over a reference the game has already added for us.
    ///
    /// # Safety
    /// `raw` must be null or point at a live object implementing `V`.
    pub unsafe fn from_owned(raw: *mut c_void) -> Option<GzPtr<V>> {
        NonNull::new(raw.cast()).map(|ptr| GzPtr { ptr })
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    pub fn vtbl(&self) -> &V {
        unsafe { &*(*self.ptr.as_ptr()).vtbl }
    }

    fn unknown(&self) -> &UnknownVtbl {
        unsafe { &*((*self.ptr.as_ptr()).vtbl as *const UnknownVtbl) }
    }
}

impl<V: Interface> Drop for GzPtr<V> {
    fn drop(&mut self) {
        unsafe {
            (self.unknown().release)(self.as_raw());
        }
    }
}

/// Returns the message type of a `cIGZMessage2`.
///
/// # Safety
/// `message` must point at a live message object.
pub unsafe fn message_type(message: *mut c_void) -> Option<u32> {
    let message = Borrowed::<Message2Vtbl>::from_raw(message)?;
    Some((message.vtbl().get_type)(message.as_raw()))
}

/// Returns the framework owned by a `cIGZCOM`.
///
/// # Safety
/// `com` must point at a live COM object.
pub unsafe fn com_frame_work(com: *mut c_void) -> *mut c_void {
    match Borrowed::<ComVtbl>::from_raw(com) {
        Some(com) => (com.vtbl().frame_work)(com.as_raw()),
        None => ptr::null_mut(),
    }
}

impl Variant for Borrowed<'_, VariantVtbl> {
    fn type_tag(&self) -> u16 {
        unsafe { (self.vtbl().get_type)(self.as_raw()) }
    }

    fn bool_value(&self) -> bool {
        unsafe { (self.vtbl().get_val_bool)(self.as_raw()) }
    }

    fn set_bool_value(&mut self, value: bool) {
        unsafe { (self.vtbl().set_val_bool)(self.as_raw(), value) }
    }
}

impl PropertyHolder for GzPtr<PropertyHolderVtbl> {
    type Value<'a> = Borrowed<'a, VariantVtbl>;

    fn property_value(&mut self, property_id: u32) -> PropertyLookup<Self::Value<'_>> {
        unsafe {
            let raw_property = (self.vtbl().get_property)(self.as_raw(), property_id);

            let property = match Borrowed::<PropertyVtbl>::from_raw(raw_property) {
                Some(property) => property,
                None => return PropertyLookup::Missing,
            };

            let raw_value = (property.vtbl().get_property_value)(property.as_raw());

            match Borrowed::from_raw(raw_value) {
                Some(value) => PropertyLookup::Value(value),
                None => PropertyLookup::NullValue,
            }
        }
    }
}

impl ResourceManager for GzPtr<PersistResourceManagerVtbl> {
    type Holder = GzPtr<PropertyHolderVtbl>;

    fn property_holder(&self, key: &ResourceKey) -> Option<Self::Holder> {
        let mut out = ptr::null_mut();

        unsafe {
            let loaded = (self.vtbl().get_resource)(
                self.as_raw(),
                key,
                ids::GZIID_CISCPROPERTYHOLDER,
                &mut out,
                0,
                ptr::null_mut(),
            );

            if !loaded {
                return None;
            }

            GzPtr::from_owned(out)
        }
    }
}

/// The message server, paired with the target that subscriptions are made for.
pub struct BoundMessageServer {
    server: GzPtr<MessageServer2Vtbl>,
    target: *mut c_void,
}

impl MessageServer for BoundMessageServer {
    fn add_notification(&self, message_type: u32) -> bool {
        unsafe { (self.server.vtbl().add_notification)(self.server.as_raw(), self.target, message_type) }
    }
}

/// The game as seen through its framework, from the point of view of one director.
pub struct GzHost<'a> {
    framework: Borrowed<'a, FrameWorkVtbl>,
    hooks: *mut c_void,
    target: *mut c_void,
}

impl<'a> GzHost<'a> {
    /// # Safety
    /// `framework` must be null or the game's live framework. `hooks` and `target` must be the
    /// director's `cIGZFrameWorkHooks` and `cIGZMessageTarget2` views.
    pub unsafe fn new(
        framework: *mut c_void,
        hooks: *mut c_void,
        target: *mut c_void,
    ) -> Option<GzHost<'a>> {
        Some(GzHost {
            framework: Borrowed::from_raw(framework)?,
            hooks,
            target,
        })
    }

    fn system_service<V: Interface>(&self, service_id: u32, iid: u32) -> Option<GzPtr<V>> {
        let mut out = ptr::null_mut();

        unsafe {
            let found = (self.framework.vtbl().get_system_service)(
                self.framework.as_raw(),
                service_id,
                iid,
                &mut out,
            );

            if !found {
                return None;
            }

            GzPtr::from_owned(out)
        }
    }
}

impl Host for GzHost<'_> {
    type Resources = GzPtr<PersistResourceManagerVtbl>;
    type Messages = BoundMessageServer;

    fn framework_state(&self) -> u32 {
        unsafe { (self.framework.vtbl().get_state)(self.framework.as_raw()) }
    }

    fn add_hook(&self) -> bool {
        unsafe { (self.framework.vtbl().add_hook)(self.framework.as_raw(), self.hooks) }
    }

    fn resource_manager(&self) -> Option<Self::Resources> {
        self.system_service(
            ids::RZSRVID_PERSIST_RESOURCE_MANAGER,
            ids::GZIID_CIGZPERSISTRESOURCEMANAGER,
        )
    }

    fn message_server(&self) -> Option<Self::Messages> {
        self.system_service(ids::RZSRVID_MESSAGE_SERVER2, ids::GZIID_CIGZMESSAGESERVER2)
            .map(|server| BoundMessageServer {
                server,
                target: self.target,
            })
    }
}
