//! Interception of system property reads
//!
//! Bionic hands property values to a caller-supplied callback:
//!
//! ```c
//! void __system_property_read_callback(const prop_info* pi,
//!     void (*callback)(void* cookie, const char* name, const char* value, uint32_t serial),
//!     void* cookie);
//! ```
//!
//! The read entry point is detoured once per process (see [`hooks`]). Each read
//! swaps the caller's callback for [`on_property`], passing a stack
//! [`Continuation`] as the cookie. The continuation carries the caller's own
//! callback and cookie, so any number of concurrent readers share the one hook
//! without their replies crossing.

mod backend;
mod hooks;

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};

use tracing::info;

use crate::config::{Config, OverrideRule};
use crate::resolver;

pub use hooks::{install, interceptor, READ_CALLBACK_SYMBOL};

/// The callback a property read delivers its result to.
pub type PropertyCallback =
    unsafe extern "C" fn(cookie: *mut c_void, name: *const c_char, value: *const c_char, serial: u32);

/// `__system_property_read_callback`
pub type ReadCallbackFn = unsafe extern "C" fn(
    pi: *const c_void,
    callback: Option<PropertyCallback>,
    cookie: *mut c_void,
);

/// Identifies one installed hook. Derived from the hooked entry's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(usize);

impl HookId {
    pub fn of(target: *const c_void) -> Self {
        Self(target as usize)
    }
}

/// The original implementations displaced by installed hooks.
///
/// Filled completely at install time and never modified afterwards, so lookups
/// need no locking. A process normally holds exactly one entry.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    originals: HashMap<HookId, ReadCallbackFn>,
}

impl HookRegistry {
    pub fn with_entry(hook: HookId, original: ReadCallbackFn) -> Self {
        [(hook, original)].into_iter().collect()
    }

    pub fn get(&self, hook: HookId) -> Option<ReadCallbackFn> {
        self.originals.get(&hook).copied()
    }

    pub fn contains(&self, hook: HookId) -> bool {
        self.originals.contains_key(&hook)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }
}

impl FromIterator<(HookId, ReadCallbackFn)> for HookRegistry {
    fn from_iter<I: IntoIterator<Item = (HookId, ReadCallbackFn)>>(iter: I) -> Self {
        Self {
            originals: iter.into_iter().collect(),
        }
    }
}

/// Where a single in-flight read has to be delivered.
///
/// Lives on the stack of [`Interceptor::read`] for the duration of the
/// original read, which calls its callback synchronously.
struct Continuation<'a> {
    interceptor: &'a Interceptor,
    hook: HookId,
    callback: PropertyCallback,
    cookie: *mut c_void,
}

/// Per-process spoofing state: the config and the displaced originals.
///
/// Immutable once built; every method takes `&self` and is safe to call from
/// any number of threads at once.
#[derive(Debug)]
pub struct Interceptor {
    config: Config,
    registry: HookRegistry,
}

impl Interceptor {
    pub fn new(config: Config, registry: HookRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Run a property read through the original behind `hook`, routing the
    /// result through [`Interceptor::intercept`].
    ///
    /// # Safety
    ///
    /// Same contract as `__system_property_read_callback`: `pi` must be valid
    /// for the original, and `callback` must accept `cookie`.
    pub unsafe fn read(
        &self,
        hook: HookId,
        pi: *const c_void,
        callback: Option<PropertyCallback>,
        cookie: *mut c_void,
    ) {
        let Some(original) = self.registry.get(hook) else {
            return;
        };

        let Some(callback) = callback else {
            return original(pi, None, cookie);
        };

        let continuation = Continuation {
            interceptor: self,
            hook,
            callback,
            cookie,
        };
        original(
            pi,
            Some(on_property),
            &continuation as *const Continuation<'_> as *mut c_void,
        );
    }

    /// Deliver one property value to the caller waiting behind `cookie`,
    /// substituting it if a rule matches.
    ///
    /// Calls with a null argument, or for a hook this interceptor does not
    /// know, are dropped without forwarding. Returns whether the value was
    /// forwarded.
    ///
    /// # Safety
    ///
    /// A non-null `cookie` must point to a live [`Continuation`]. Non-null
    /// `name` and `value` must be NUL-terminated strings.
    unsafe fn intercept(
        &self,
        cookie: *mut c_void,
        name: *const c_char,
        value: *const c_char,
        serial: u32,
    ) -> bool {
        if cookie.is_null() || name.is_null() || value.is_null() {
            return false;
        }

        let continuation = &*(cookie as *const Continuation<'_>);
        if !self.registry.contains(continuation.hook) {
            return false;
        }

        let name = CStr::from_ptr(name);
        let original = CStr::from_ptr(value);
        let resolved = self.resolve(name, original);

        if self.config.verbose_logs() {
            info!(
                "Prop {}: {} -> {}",
                name.to_string_lossy(),
                original.to_string_lossy(),
                resolved.to_string_lossy()
            );
        }

        (continuation.callback)(continuation.cookie, name.as_ptr(), resolved.as_ptr(), serial);
        true
    }

    fn resolve<'a>(&'a self, name: &CStr, original: &'a CStr) -> &'a CStr {
        // Property names are ASCII; anything else cannot match a rule.
        name.to_str()
            .ok()
            .and_then(|name| resolver::lookup(name, &self.config))
            .map_or(original, OverrideRule::value)
    }
}

/// The callback every hooked read is redirected to.
unsafe extern "C" fn on_property(
    cookie: *mut c_void,
    name: *const c_char,
    value: *const c_char,
    serial: u32,
) {
    if cookie.is_null() {
        return;
    }
    let continuation = &*(cookie as *const Continuation<'_>);
    continuation.interceptor.intercept(cookie, name, value, serial);
}
