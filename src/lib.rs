//! System property spoofing for Android apps, loaded as a Zygisk module.
//!
//! The library is built as a `cdylib` and plays two roles:
//!
//! - In the root companion process, [`relay::zygisk_companion_entry`] reads
//!   `pif.json` / `custom.pif.json` and sends the bytes to the app.
//! - In each app process, [`module::pif_post_app_specialize`] picks the config
//!   variant for the process, fetches it from the companion, and when
//!   `spoofProps` is set detours `__system_property_read_callback` so every
//!   property read passes through the override rules.
//!
//! # Config
//!
//! ```json
//! {
//!     "spoofProps": 1,
//!     "verboseLogs": 1,
//!     "props": {
//!         "ro.product.model": "Pixel 8",
//!         "*ro.build.tags": "release-keys"
//!     }
//! }
//! ```
//!
//! An exact property name always beats a `*` prefix rule; among prefix rules the
//! first one declared wins. See [`resolver`].
//!
//! # Examples
//!
//! The pieces can be driven without Zygisk, e.g. from a test:
//!
//! ```rust,ignore
//! use propspoof::{module::SpoofModule, paths::ModulePaths, relay};
//! use std::os::unix::net::UnixStream;
//!
//! let paths = ModulePaths::new("/data/local/tmp/pif");
//! let module = SpoofModule::on_load(paths.clone());
//!
//! let (mut app, mut companion) = UnixStream::pair()?;
//! std::thread::spawn(move || relay::serve_stream(&mut companion, &paths));
//!
//! let specialization = module.post_app_specialize("com.google.android.gms.unstable", &mut app);
//! println!("hook armed: {}", specialization.hook.is_some());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod module;
pub mod paths;
pub mod relay;
pub mod resolver;
pub mod targets;

pub use config::Config;
pub use error::{Error, Result};
pub use module::{SpoofModule, Specialization};

#[ctor::ctor]
unsafe fn init_logging() {
    logging::init();
}
