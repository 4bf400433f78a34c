// Vime Engine FFI
// Runtime loader for the transform engine shared library

use std::ffi::{c_char, c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use log::{info, warn};

use super::{Engine, EngineAction, EngineError, EngineOption, EngineReply, InputMethod};

/// Result buffer as the engine lays it out. The engine owns the allocation;
/// it is borrowed for decoding and handed back via `engine_free_result`.
#[repr(C)]
pub struct RawResult {
    /// UTF-32 code points of the replacement text.
    pub chars: [u32; 256],
    /// 0 = none, 1 = replace.
    pub action: u8,
    /// Characters to delete before inserting.
    pub backspace: u8,
    /// How many entries of `chars` are valid.
    pub count: u8,
    pub flags: u8,
}

/// The keystroke was consumed even if no text came back.
pub const FLAG_KEY_CONSUMED: u8 = 0x01;

type InitFn = unsafe extern "C" fn();
type VoidFn = unsafe extern "C" fn();
type FlagFn = unsafe extern "C" fn(bool);
type MethodFn = unsafe extern "C" fn(u8);
type ProcessFn = unsafe extern "C" fn(u16, bool, bool, bool) -> *mut RawResult;
type FreeFn = unsafe extern "C" fn(*mut RawResult);
type AddShortcutFn = unsafe extern "C" fn(*const c_char, *const c_char);
type RemoveShortcutFn = unsafe extern "C" fn(*const c_char);

struct Symbols {
    process: ProcessFn,
    free_result: FreeFn,
    clear: VoidFn,
    clear_all: VoidFn,
    set_enabled: FlagFn,
    set_method: MethodFn,
    set_modern_tone: FlagFn,
    set_english_auto_restore: FlagFn,
    set_auto_capitalize: FlagFn,
    set_skip_w_shortcut: FlagFn,
    set_bracket_shortcut: FlagFn,
    set_esc_restore: FlagFn,
    set_free_tone: FlagFn,
    set_foreign_consonants: FlagFn,
    add_shortcut: AddShortcutFn,
    remove_shortcut: RemoveShortcutFn,
    clear_shortcuts: VoidFn,
}

impl Symbols {
    unsafe fn resolve(handle: *mut c_void) -> Result<(InitFn, Symbols), EngineError> {
        let init: InitFn = symbol(handle, "engine_init")?;
        let symbols = Symbols {
            process: symbol(handle, "engine_process_key")?,
            free_result: symbol(handle, "engine_free_result")?,
            clear: symbol(handle, "engine_clear")?,
            clear_all: symbol(handle, "engine_clear_all")?,
            set_enabled: symbol(handle, "engine_set_enabled")?,
            set_method: symbol(handle, "engine_set_method")?,
            set_modern_tone: symbol(handle, "engine_set_modern_tone")?,
            set_english_auto_restore: symbol(handle, "engine_set_english_auto_restore")?,
            set_auto_capitalize: symbol(handle, "engine_set_auto_capitalize")?,
            set_skip_w_shortcut: symbol(handle, "engine_set_skip_w_shortcut")?,
            set_bracket_shortcut: symbol(handle, "engine_set_bracket_shortcut")?,
            set_esc_restore: symbol(handle, "engine_set_esc_restore")?,
            set_free_tone: symbol(handle, "engine_set_free_tone")?,
            set_foreign_consonants: symbol(handle, "engine_set_foreign_consonants")?,
            add_shortcut: symbol(handle, "engine_add_shortcut")?,
            remove_shortcut: symbol(handle, "engine_remove_shortcut")?,
            clear_shortcuts: symbol(handle, "engine_clear_shortcuts")?,
        };
        Ok((init, symbols))
    }
}

unsafe fn symbol<T>(handle: *mut c_void, name: &'static str) -> Result<T, EngineError> {
    let cname = CString::new(name).map_err(|_| EngineError::MissingSymbol(name))?;
    let ptr = libc::dlsym(handle, cname.as_ptr());
    if ptr.is_null() {
        return Err(EngineError::MissingSymbol(name));
    }
    Ok(std::mem::transmute_copy(&ptr))
}

fn dl_error() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "unknown dlopen error".to_string()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

/// The production engine, loaded from a shared library at startup.
pub struct FfiEngine {
    handle: *mut c_void,
    sym: Symbols,
}

impl FfiEngine {
    /// Open the library, resolve every symbol and run `engine_init`.
    ///
    /// A bare file name goes through the normal dynamic-linker search path;
    /// an absolute or relative path is used as given.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let cpath =
            CString::new(path.as_os_str().as_bytes()).map_err(|_| EngineError::LibraryLoad {
                path: path.display().to_string(),
                reason: "path contains NUL byte".to_string(),
            })?;

        let handle = unsafe { libc::dlopen(cpath.as_ptr(), libc::RTLD_NOW) };
        if handle.is_null() {
            return Err(EngineError::LibraryLoad {
                path: path.display().to_string(),
                reason: dl_error(),
            });
        }

        match unsafe { Symbols::resolve(handle) } {
            Ok((init, sym)) => {
                unsafe { init() };
                info!("Loaded engine library {}", path.display());
                Ok(Self { handle, sym })
            }
            Err(e) => {
                unsafe { libc::dlclose(handle) };
                Err(e)
            }
        }
    }
}

impl Drop for FfiEngine {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

/// Frees the engine-owned result buffer once decoding is done, on every
/// path out of `process_key`.
struct ResultGuard {
    ptr: *mut RawResult,
    free: FreeFn,
}

impl Drop for ResultGuard {
    fn drop(&mut self) {
        unsafe { (self.free)(self.ptr) };
    }
}

pub(crate) fn decode_result(raw: &RawResult) -> EngineReply {
    let count = raw.count as usize;
    let text: String = raw.chars[..count]
        .iter()
        .filter_map(|&cp| char::from_u32(cp))
        .collect();
    EngineReply {
        action: if raw.action == 1 {
            EngineAction::Replace
        } else {
            EngineAction::None
        },
        backspaces: raw.backspace,
        text,
        key_consumed: raw.flags & FLAG_KEY_CONSUMED != 0,
    }
}

impl Engine for FfiEngine {
    fn process_key(&mut self, keycode: u16, caps: bool, ctrl: bool, shift: bool) -> EngineReply {
        let ptr = unsafe { (self.sym.process)(keycode, caps, ctrl, shift) };
        if ptr.is_null() {
            return EngineReply::none();
        }
        let guard = ResultGuard {
            ptr,
            free: self.sym.free_result,
        };
        decode_result(unsafe { &*guard.ptr })
    }

    fn clear_buffer(&mut self) {
        unsafe { (self.sym.clear)() };
    }

    fn clear_all(&mut self) {
        unsafe { (self.sym.clear_all)() };
    }

    fn set_enabled(&mut self, enabled: bool) {
        unsafe { (self.sym.set_enabled)(enabled) };
    }

    fn set_method(&mut self, method: InputMethod) {
        unsafe { (self.sym.set_method)(method.as_u8()) };
    }

    fn set_option(&mut self, option: EngineOption, enabled: bool) {
        let setter = match option {
            EngineOption::ModernTone => self.sym.set_modern_tone,
            EngineOption::EnglishAutoRestore => self.sym.set_english_auto_restore,
            EngineOption::AutoCapitalize => self.sym.set_auto_capitalize,
            EngineOption::SkipWShortcut => self.sym.set_skip_w_shortcut,
            EngineOption::BracketShortcut => self.sym.set_bracket_shortcut,
            EngineOption::EscRestore => self.sym.set_esc_restore,
            EngineOption::FreeTone => self.sym.set_free_tone,
            EngineOption::ForeignConsonants => self.sym.set_foreign_consonants,
        };
        unsafe { setter(enabled) };
    }

    fn add_shortcut(&mut self, trigger: &str, replacement: &str) {
        let Ok(trigger) = CString::new(trigger) else {
            warn!("Skipping shortcut trigger with embedded NUL");
            return;
        };
        let Ok(replacement) = CString::new(replacement) else {
            warn!("Skipping shortcut replacement with embedded NUL");
            return;
        };
        unsafe { (self.sym.add_shortcut)(trigger.as_ptr(), replacement.as_ptr()) };
    }

    fn remove_shortcut(&mut self, trigger: &str) {
        let Ok(trigger) = CString::new(trigger) else {
            return;
        };
        unsafe { (self.sym.remove_shortcut)(trigger.as_ptr()) };
    }

    fn clear_shortcuts(&mut self) {
        unsafe { (self.sym.clear_shortcuts)() };
    }
}
