//! Inline hook backends, one per architecture family
//!
//! `retour` on x86/x86_64, Dobby on arm/aarch64 Android. Each patches the read
//! entry to jump to our replacement and hands back a callable original.

use crate::engine::ReadCallbackFn;
use crate::error::Result;

/// Patches one function entry.
pub(crate) trait Backend {
    /// Redirect `target` to `replacement`.
    ///
    /// `publish` receives the displaced original as soon as it is callable,
    /// which may be before the patch goes live. The returned value is the same
    /// original.
    ///
    /// # Safety
    ///
    /// `target` must be a function entry with the `ReadCallbackFn` signature.
    unsafe fn attach(
        target: ReadCallbackFn,
        replacement: ReadCallbackFn,
        publish: impl FnOnce(ReadCallbackFn),
    ) -> Result<ReadCallbackFn>;
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub(crate) type Native = retour_backend::Retour;

#[cfg(all(target_os = "android", any(target_arch = "arm", target_arch = "aarch64")))]
pub(crate) type Native = dobby_backend::Dobby;

#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    all(target_os = "android", any(target_arch = "arm", target_arch = "aarch64"))
)))]
pub(crate) type Native = Unsupported;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod retour_backend {
    use std::sync::OnceLock;

    use retour::GenericDetour;

    use super::Backend;
    use crate::engine::ReadCallbackFn;
    use crate::error::{Error, Result};

    struct ReadDetour(GenericDetour<ReadCallbackFn>);

    // The detour is only ever enabled once and then read.
    unsafe impl Send for ReadDetour {}
    unsafe impl Sync for ReadDetour {}

    // Dropping a GenericDetour disables it, so it lives for the process.
    static DETOUR: OnceLock<ReadDetour> = OnceLock::new();

    pub(crate) struct Retour;

    impl Backend for Retour {
        unsafe fn attach(
            target: ReadCallbackFn,
            replacement: ReadCallbackFn,
            publish: impl FnOnce(ReadCallbackFn),
        ) -> Result<ReadCallbackFn> {
            let detour = GenericDetour::<ReadCallbackFn>::new(target, replacement)
                .map_err(|e| Error::Detour(e.to_string()))?;
            let detour = DETOUR.get_or_init(move || ReadDetour(detour));

            let original: ReadCallbackFn =
                std::mem::transmute::<&(), ReadCallbackFn>(detour.0.trampoline());
            publish(original);

            detour.0.enable().map_err(|e| Error::Detour(e.to_string()))?;
            Ok(original)
        }
    }
}

#[cfg(all(target_os = "android", any(target_arch = "arm", target_arch = "aarch64")))]
mod dobby_backend {
    use std::ffi::c_void;

    use super::Backend;
    use crate::engine::ReadCallbackFn;
    use crate::error::{Error, Result};

    pub(crate) struct Dobby;

    impl Backend for Dobby {
        unsafe fn attach(
            target: ReadCallbackFn,
            replacement: ReadCallbackFn,
            publish: impl FnOnce(ReadCallbackFn),
        ) -> Result<ReadCallbackFn> {
            // Dobby patches in place, so the original only exists once the hook is live.
            let original = dobby_rs::hook(target as _, replacement as _)
                .map_err(|e| Error::Detour(format!("{e:?}")))?;

            let original = original as *const c_void;
            if original.is_null() {
                return Err(Error::Detour("no trampoline returned".to_string()));
            }

            let original = std::mem::transmute::<*const c_void, ReadCallbackFn>(original);
            publish(original);
            Ok(original)
        }
    }
}

/// No inline hook implementation for this architecture.
#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    all(target_os = "android", any(target_arch = "arm", target_arch = "aarch64"))
)))]
pub(crate) struct Unsupported;

#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    all(target_os = "android", any(target_arch = "arm", target_arch = "aarch64"))
)))]
impl Backend for Unsupported {
    unsafe fn attach(
        _target: ReadCallbackFn,
        _replacement: ReadCallbackFn,
        _publish: impl FnOnce(ReadCallbackFn),
    ) -> Result<ReadCallbackFn> {
        Err(crate::error::Error::UnsupportedTarget(std::env::consts::ARCH))
    }
}
