use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tracing::{debug, info};

use super::backend::{Backend, Native};
use super::{HookId, HookRegistry, Interceptor, PropertyCallback, ReadCallbackFn};
use crate::config::Config;
use crate::error::{Error, Result};

/// The property read entry point in bionic's libc.
pub const READ_CALLBACK_SYMBOL: &CStr = c"__system_property_read_callback";

/// The armed state of this process.
struct Armed {
    hook: HookId,
    interceptor: Interceptor,
}

/// Hook state for one process. Armed at most once, after the patch is live.
struct HookSlot {
    armed: OnceLock<Armed>,
    /// Callable original while `install` is still running.
    pending: OnceLock<ReadCallbackFn>,
    failed: AtomicBool,
}

impl HookSlot {
    const fn new() -> Self {
        Self {
            armed: OnceLock::new(),
            pending: OnceLock::new(),
            failed: AtomicBool::new(false),
        }
    }

    fn install<B: Backend>(
        &self,
        config: Config,
        target: ReadCallbackFn,
        replacement: ReadCallbackFn,
    ) -> Result<HookId> {
        if let Some(armed) = self.armed.get() {
            debug!("Property hook already installed");
            return Ok(armed.hook);
        }
        if self.failed.load(Ordering::Acquire) {
            return Err(Error::AlreadyFailed);
        }

        let hook = HookId::of(target as *const c_void);
        let original = match unsafe {
            B::attach(target, replacement, |original| {
                let _ = self.pending.set(original);
            })
        } {
            Ok(original) => original,
            Err(e) => {
                self.failed.store(true, Ordering::Release);
                return Err(e);
            }
        };

        let interceptor = Interceptor::new(config, HookRegistry::with_entry(hook, original));
        let _ = self.armed.set(Armed { hook, interceptor });
        Ok(hook)
    }

    unsafe fn dispatch(
        &self,
        pi: *const c_void,
        callback: Option<PropertyCallback>,
        cookie: *mut c_void,
    ) {
        if let Some(armed) = self.armed.get() {
            return armed.interceptor.read(armed.hook, pi, callback, cookie);
        }

        // Patched but not armed yet: only possible while `install` is running.
        if let Some(original) = self.pending.get() {
            original(pi, callback, cookie);
        }
    }

    fn interceptor(&self) -> Option<&Interceptor> {
        self.armed.get().map(|armed| &armed.interceptor)
    }
}

static SLOT: HookSlot = HookSlot::new();

/// The interceptor serving this process, once [`install`] has succeeded.
pub fn interceptor() -> Option<&'static Interceptor> {
    SLOT.interceptor()
}

/// Hook `__system_property_read_callback` so every read in this process goes
/// through an [`Interceptor`] built from `config`.
///
/// Installing again after a success is a no-op returning the same hook.
/// After a failure, later calls fail without touching the process again.
pub fn install(config: Config) -> Result<HookId> {
    let target = unsafe { libc::dlsym(libc::RTLD_DEFAULT, READ_CALLBACK_SYMBOL.as_ptr()) };
    if target.is_null() {
        return Err(Error::SymbolNotFound(READ_CALLBACK_SYMBOL));
    }

    let target = unsafe { std::mem::transmute::<*mut c_void, ReadCallbackFn>(target) };
    let hook = SLOT.install::<Native>(config, target, read_callback_detour)?;

    info!("Hooked {} at {target:p}", READ_CALLBACK_SYMBOL.to_string_lossy());
    Ok(hook)
}

unsafe extern "C" fn read_callback_detour(
    pi: *const c_void,
    callback: Option<PropertyCallback>,
    cookie: *mut c_void,
) {
    SLOT.dispatch(pi, callback, cookie);
}
