//! The director object handed to the game. It implements `cIGZCOMDirector`,
//! `cIGZFrameWorkHooks` and `cIGZMessageTarget2`, each view being a vtable pointer at its own
//! offset in the same object.

use std::ffi::c_void;
use std::mem::offset_of;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use once_cell::sync::Lazy;

use super::Director;
use crate::host::gzcom::{self, ids, vtable_layout, GzHost, UnknownVtbl};
use crate::{logging, resources, settings::Settings};

#[repr(C)]
struct ComDirectorVtbl {
    base: UnknownVtbl,
    initialize_com:
        unsafe extern "thiscall" fn(this: *mut c_void, com: *mut c_void, library_path: *const c_void) -> bool,
    on_start: unsafe extern "thiscall" fn(this: *mut c_void, com: *mut c_void) -> bool,
    enum_class_objects:
        unsafe extern "thiscall" fn(this: *mut c_void, callback: *const c_void, context: *mut c_void),
    get_class_object:
        unsafe extern "thiscall" fn(this: *mut c_void, clsid: u32, iid: u32, out: *mut *mut c_void) -> bool,
    can_unload_now: unsafe extern "thiscall" fn(this: *mut c_void) -> bool,
    on_unload: unsafe extern "thiscall" fn(this: *mut c_void) -> bool,
    ref_count: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
    remove_ref: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
    frame_work: unsafe extern "thiscall" fn(this: *mut c_void) -> *mut c_void,
    gz_com: unsafe extern "thiscall" fn(this: *mut c_void) -> *mut c_void,
    get_director_id: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
    get_library_path: unsafe extern "thiscall" fn(this: *mut c_void, out: *mut c_void) -> bool,
    get_heap_allocated_size: unsafe extern "thiscall" fn(this: *mut c_void) -> u32,
}

type HookFn = unsafe extern "thiscall" fn(this: *mut c_void) -> bool;

#[repr(C)]
struct FrameWorkHooksVtbl {
    base: UnknownVtbl,
    pre_frame_work_init: HookFn,
    pre_app_init: HookFn,
    post_app_init: HookFn,
    pre_app_shutdown: HookFn,
    post_app_shutdown: HookFn,
    post_system_service_shutdown: HookFn,
    abortive_quit: HookFn,
    on_install: HookFn,
}

#[repr(C)]
struct MessageTarget2Vtbl {
    base: UnknownVtbl,
    do_message: unsafe extern "thiscall" fn(this: *mut c_void, message: *mut c_void) -> bool,
}

vtable_layout!(
    ComDirectorVtbl,
    len = 16,
    initialize_com = 3,
    on_start = 4,
    get_director_id = 13,
    get_heap_allocated_size = 15,
);
vtable_layout!(FrameWorkHooksVtbl, len = 11, pre_frame_work_init = 3, post_app_init = 5, on_install = 10);
vtable_layout!(MessageTarget2Vtbl, len = 4, do_message = 3);

#[repr(C)]
struct ComDirector {
    director_view: &'static ComDirectorVtbl,
    hooks_view: &'static FrameWorkHooksVtbl,
    target_view: &'static MessageTarget2Vtbl,
    refs: AtomicU32,
    com: AtomicPtr<c_void>,
    framework: AtomicPtr<c_void>,
    director: Director,
}

/// Generates the three `cIGZUnknown` thunks for a view at `$field`.
macro_rules! unknown_thunks {
    ($field:ident) => {{
        unsafe extern "thiscall" fn query_interface(
            this: *mut c_void,
            iid: u32,
            out: *mut *mut c_void,
        ) -> bool {
            guard(false, || {
                ComDirector::from_view(this, offset_of!(ComDirector, $field)).query_interface(iid, out)
            })
        }

        unsafe extern "thiscall" fn add_ref(this: *mut c_void) -> u32 {
            guard(0, || ComDirector::from_view(this, offset_of!(ComDirector, $field)).add_ref())
        }

        unsafe extern "thiscall" fn release(this: *mut c_void) -> u32 {
            guard(0, || ComDirector::from_view(this, offset_of!(ComDirector, $field)).release())
        }

        UnknownVtbl {
            query_interface,
            add_ref,
            release,
        }
    }};
}

/// Runs `f`, turning a panic into `failure` so that it never unwinds into the game.
fn guard<T>(failure: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(failure)
}

static DIRECTOR_VTBL: ComDirectorVtbl = ComDirectorVtbl {
    base: unknown_thunks!(director_view),
    initialize_com: director_thunks::initialize_com,
    on_start: director_thunks::on_start,
    enum_class_objects: director_thunks::enum_class_objects,
    get_class_object: director_thunks::get_class_object,
    can_unload_now: director_thunks::can_unload_now,
    on_unload: director_thunks::on_unload,
    ref_count: director_thunks::ref_count,
    remove_ref: director_thunks::remove_ref,
    frame_work: director_thunks::frame_work,
    gz_com: director_thunks::gz_com,
    get_director_id: director_thunks::get_director_id,
    get_library_path: director_thunks::get_library_path,
    get_heap_allocated_size: director_thunks::get_heap_allocated_size,
};

static HOOKS_VTBL: FrameWorkHooksVtbl = FrameWorkHooksVtbl {
    base: unknown_thunks!(hooks_view),
    pre_frame_work_init: hook_thunks::no_op,
    pre_app_init: hook_thunks::no_op,
    post_app_init: hook_thunks::post_app_init,
    pre_app_shutdown: hook_thunks::no_op,
    post_app_shutdown: hook_thunks::no_op,
    post_system_service_shutdown: hook_thunks::no_op,
    abortive_quit: hook_thunks::no_op,
    on_install: hook_thunks::no_op,
};

static TARGET_VTBL: MessageTarget2Vtbl = MessageTarget2Vtbl {
    base: unknown_thunks!(target_view),
    do_message: target_thunks::do_message,
};

static COM_DIRECTOR: Lazy<ComDirector> = Lazy::new(ComDirector::new);

impl ComDirector {
    fn new() -> ComDirector {
        let (settings, settings_error) = Settings::load_shared();

        match resources::get_log_path() {
            Ok(path) => {
                if let Err(err) = logging::init(&path, settings.log_level.filter()) {
                    eprintln!("SC4NoKickOut: failed to start logging: {:?}", err);
                }
            }
            Err(err) => eprintln!("SC4NoKickOut: failed to find the log path: {:?}", err),
        }

        if let Some(err) = settings_error {
            log::error!("{:?}", err);
            log::info!("Using default settings instead.");
        }

        ComDirector {
            director_view: &DIRECTOR_VTBL,
            hooks_view: &HOOKS_VTBL,
            target_view: &TARGET_VTBL,
            refs: AtomicU32::new(0),
            com: AtomicPtr::new(ptr::null_mut()),
            framework: AtomicPtr::new(ptr::null_mut()),
            director: Director::new(settings),
        }
    }

    /// # Safety
    /// `this` must be one of the views of the static director, at `offset` into it.
    unsafe fn from_view<'a>(this: *mut c_void, offset: usize) -> &'a ComDirector {
        &*this.cast::<u8>().sub(offset).cast::<ComDirector>()
    }

    fn view(&self, offset: usize) -> *mut c_void {
        unsafe { (self as *const ComDirector as *mut u8).add(offset).cast() }
    }

    fn hooks_ptr(&self) -> *mut c_void {
        self.view(offset_of!(ComDirector, hooks_view))
    }

    fn target_ptr(&self) -> *mut c_void {
        self.view(offset_of!(ComDirector, target_view))
    }

    fn director_ptr(&self) -> *mut c_void {
        self.view(offset_of!(ComDirector, director_view))
    }

    fn host(&self) -> Option<GzHost<'_>> {
        let host = unsafe {
            GzHost::new(
                self.framework.load(Ordering::Acquire),
                self.hooks_ptr(),
                self.target_ptr(),
            )
        };

        if host.is_none() {
            log::error!("The framework pointer was null.");
        }

        host
    }

    fn query_interface(&self, iid: u32, out: *mut *mut c_void) -> bool {
        if out.is_null() {
            return false;
        }

        let view = match iid {
            ids::GZIID_CIGZUNKNOWN | ids::GZIID_CIGZCOMDIRECTOR => self.director_ptr(),
            ids::GZIID_CIGZFRAMEWORKHOOKS => self.hooks_ptr(),
            ids::GZIID_CIGZMESSAGETARGET2 => self.target_ptr(),
            _ => return false,
        };

        self.add_ref();

        unsafe {
            *out = view;
        }

        true
    }

    fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The object is static, so dropping to zero references doesn't free anything.
    fn release(&self) -> u32 {
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                Some(refs.saturating_sub(1))
            })
            .map_or(0, |previous| previous.saturating_sub(1))
    }
}

mod director_thunks {
    use super::*;

    fn this<'a>(this: *mut c_void) -> &'a ComDirector {
        unsafe { ComDirector::from_view(this, offset_of!(ComDirector, director_view)) }
    }

    pub unsafe extern "thiscall" fn initialize_com(
        this_ptr: *mut c_void,
        com: *mut c_void,
        _library_path: *const c_void,
    ) -> bool {
        guard(false, || {
            let director = this(this_ptr);

            if com.is_null() {
                log::error!("The game passed a null COM pointer.");
                return false;
            }

            director.com.store(com, Ordering::Release);
            director
                .framework
                .store(unsafe { gzcom::com_frame_work(com) }, Ordering::Release);

            true
        })
    }

    pub unsafe extern "thiscall" fn on_start(this_ptr: *mut c_void, _com: *mut c_void) -> bool {
        guard(false, || {
            let director = this(this_ptr);

            match director.host() {
                Some(host) => director.director.on_start(&host),
                None => false,
            }
        })
    }

    pub unsafe extern "thiscall" fn enum_class_objects(
        _this: *mut c_void,
        _callback: *const c_void,
        _context: *mut c_void,
    ) {
    }

    pub unsafe extern "thiscall" fn get_class_object(
        _this: *mut c_void,
        _clsid: u32,
        _iid: u32,
        _out: *mut *mut c_void,
    ) -> bool {
        false
    }

    pub unsafe extern "thiscall" fn can_unload_now(_this: *mut c_void) -> bool {
        false
    }

    pub unsafe extern "thiscall" fn on_unload(_this: *mut c_void) -> bool {
        true
    }

    pub unsafe extern "thiscall" fn ref_count(this_ptr: *mut c_void) -> u32 {
        guard(0, || this(this_ptr).refs.load(Ordering::Acquire))
    }

    pub unsafe extern "thiscall" fn remove_ref(this_ptr: *mut c_void) -> u32 {
        guard(0, || this(this_ptr).release())
    }

    pub unsafe extern "thiscall" fn frame_work(this_ptr: *mut c_void) -> *mut c_void {
        guard(ptr::null_mut(), || this(this_ptr).framework.load(Ordering::Acquire))
    }

    pub unsafe extern "thiscall" fn gz_com(this_ptr: *mut c_void) -> *mut c_void {
        guard(ptr::null_mut(), || this(this_ptr).com.load(Ordering::Acquire))
    }

    pub unsafe extern "thiscall" fn get_director_id(this_ptr: *mut c_void) -> u32 {
        guard(0, || this(this_ptr).director.id())
    }

    pub unsafe extern "thiscall" fn get_library_path(_this: *mut c_void, _out: *mut c_void) -> bool {
        false
    }

    pub unsafe extern "thiscall" fn get_heap_allocated_size(_this: *mut c_void) -> u32 {
        0
    }
}

mod hook_thunks {
    use super::*;

    pub unsafe extern "thiscall" fn no_op(_this: *mut c_void) -> bool {
        true
    }

    pub unsafe extern "thiscall" fn post_app_init(this_ptr: *mut c_void) -> bool {
        guard(false, || {
            let director = unsafe { ComDirector::from_view(this_ptr, offset_of!(ComDirector, hooks_view)) };

            match director.host() {
                Some(host) => director.director.post_app_init(&host),
                None => false,
            }
        })
    }
}

mod target_thunks {
    use super::*;

    pub unsafe extern "thiscall" fn do_message(this_ptr: *mut c_void, message: *mut c_void) -> bool {
        guard(true, || {
            let director =
                unsafe { ComDirector::from_view(this_ptr, offset_of!(ComDirector, target_view)) };

            let message_type = match unsafe { gzcom::message_type(message) } {
                Some(message_type) => message_type,
                None => return true,
            };

            if let Some(host) = director.host() {
                director.director.do_message(&host, message_type);
            }

            true
        })
    }
}

/// Entry point the game looks up in every plugin DLL.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn GZDllGetGZCOMDirector() -> *mut c_void {
    guard(ptr::null_mut(), || COM_DIRECTOR.director_ptr())
}
