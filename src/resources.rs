//! Finds the files the plugin keeps beside its DLL in the game's Plugins folder.

use cached::proc_macro::cached;
use eyre::{eyre, Result};
use std::path::PathBuf;

pub const LOG_FILE_NAME: &str = "SC4NoKickOut.log";
pub const SETTINGS_FILE_NAME: &str = "SC4NoKickOut.json";

#[cfg(windows)]
fn find_module_path() -> Result<PathBuf> {
    use std::os::windows::ffi::OsStringExt;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{HMODULE, MAX_PATH};
    use windows::Win32::System::LibraryLoader::{
        GetModuleFileNameW, GetModuleHandleExW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
        GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    };

    // Any address inside this DLL identifies it.
    let anchor = find_module_path as *const () as *const u16;
    let mut module = HMODULE::default();

    unsafe {
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(anchor),
            &mut module,
        )?;
    }

    let mut buffer = vec![0u16; MAX_PATH as usize];

    loop {
        let len = unsafe { GetModuleFileNameW(module, &mut buffer) } as usize;

        if len == 0 {
            return Err(windows::core::Error::from_win32().into());
        }

        // The name was truncated, so try again with more room.
        if len == buffer.len() {
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }

        return Ok(PathBuf::from(std::ffi::OsString::from_wide(&buffer[..len])));
    }
}

#[cfg(not(windows))]
fn find_module_path() -> Result<PathBuf> {
    Ok(std::env::current_exe()?)
}

/// The folder the plugin was loaded from.
#[cached(result = true)]
pub fn get_plugin_folder() -> Result<PathBuf> {
    let module_path = find_module_path()?;

    module_path
        .parent()
        .map(PathBuf::from)
        .ok_or_else(|| eyre!("module path {} has no parent", module_path.display()))
}

pub fn get_plugin_path(name: impl AsRef<std::path::Path>) -> Result<PathBuf> {
    Ok(get_plugin_folder()?.join(name))
}

pub fn get_log_path() -> Result<PathBuf> {
    get_plugin_path(LOG_FILE_NAME)
}

pub fn get_settings_path() -> Result<PathBuf> {
    get_plugin_path(SETTINGS_FILE_NAME)
}
