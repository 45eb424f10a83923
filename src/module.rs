//! Per-process lifecycle
//!
//! Zygisk loads the module into zygote once ([`SpoofModule::on_load`]), then
//! every forked app gets [`SpoofModule::post_app_specialize`] while it is still
//! single threaded. That is the only window in which the hook is installed.

use std::ffi::{c_char, c_int, CStr};
use std::io::{Read, Write};
use std::sync::OnceLock;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{self, HookId};
use crate::paths::ModulePaths;
use crate::relay;
use crate::targets::{ConfigVariant, TargetList};

/// Where a process's config came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the relayed file
    Relayed,
    /// Nothing relayed: no file, or the companion failed
    Unavailable,
    /// Relayed bytes did not parse
    Malformed,
}

/// The outcome of preparing one app process.
#[derive(Debug)]
pub struct Specialization {
    pub variant: ConfigVariant,
    pub source: ConfigSource,
    /// The relayed config, or the defaults when nothing usable was relayed.
    pub config: Config,
    /// Set when the property hook is armed in this process.
    pub hook: Option<HookId>,
}

/// Module state that lives in zygote and is inherited by every app.
#[derive(Debug, Clone)]
pub struct SpoofModule {
    paths: ModulePaths,
    targets: TargetList,
}

impl SpoofModule {
    /// Load the target list from `paths`.
    pub fn on_load(paths: ModulePaths) -> Self {
        let targets = TargetList::load(&paths.target_list());
        Self { paths, targets }
    }

    pub fn with_targets(paths: ModulePaths, targets: TargetList) -> Self {
        Self { paths, targets }
    }

    pub fn paths(&self) -> &ModulePaths {
        &self.paths
    }

    pub fn targets(&self) -> &TargetList {
        &self.targets
    }

    /// Fetch and parse the config for `process` over the companion `channel`.
    ///
    /// Never fails: an unreachable companion or a bad file yields the defaults,
    /// with [`ConfigSource`] saying why.
    pub fn load_config<S: Read + Write>(
        &self,
        process: &str,
        channel: &mut S,
    ) -> (ConfigVariant, ConfigSource, Config) {
        let variant = self.targets.classify(process);
        debug!("{process}: requesting {variant:?} config");

        let bytes = match relay::request(channel, variant) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{process}: no config from companion: {e}");
                return (variant, ConfigSource::Unavailable, Config::default());
            }
        };
        if bytes.is_empty() {
            debug!("{process}: companion has no config");
            return (variant, ConfigSource::Unavailable, Config::default());
        }

        match Config::from_slice(&bytes) {
            Ok(config) => (variant, ConfigSource::Relayed, config),
            Err(e) => {
                warn!("{process}: JSON is discarded, not continuing: {e}");
                (variant, ConfigSource::Malformed, Config::default())
            }
        }
    }

    /// Prepare a freshly specialized app: load its config and, if it asks for
    /// property spoofing, install the hook.
    pub fn post_app_specialize<S: Read + Write>(
        &self,
        process: &str,
        channel: &mut S,
    ) -> Specialization {
        let (variant, source, config) = self.load_config(process, channel);

        let hook = if source == ConfigSource::Relayed && config.spoof_props() {
            match engine::install(config.clone()) {
                Ok(hook) => Some(hook),
                Err(e) => {
                    warn!("{process}: property spoofing disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        info!(
            "{process}: {} rules, props hook {}",
            config.rules.len(),
            if hook.is_some() { "armed" } else { "off" }
        );

        Specialization {
            variant,
            source,
            config,
            hook,
        }
    }
}

static MODULE: OnceLock<SpoofModule> = OnceLock::new();

fn module() -> &'static SpoofModule {
    MODULE.get_or_init(|| SpoofModule::on_load(ModulePaths::default()))
}

/// Called by the Zygisk glue from `onLoad`, in zygote.
#[no_mangle]
pub extern "C" fn pif_on_load() {
    let module = module();
    info!("Loaded with {} targets", module.targets().len());
}

/// Called by the Zygisk glue from `postAppSpecialize`.
///
/// `companion_fd` is the socket from `connectCompanion` and is closed before
/// this returns. Returns whether the property hook is armed.
///
/// # Safety
///
/// `nice_name` must be null or a NUL-terminated string. `companion_fd` must be
/// negative or an open socket whose ownership passes to this function: the
/// caller must not use or close it afterwards.
#[no_mangle]
pub unsafe extern "C" fn pif_post_app_specialize(nice_name: *const c_char, companion_fd: c_int) -> bool {
    if companion_fd < 0 {
        warn!("No companion connection, not continuing");
        return false;
    }
    let mut channel = match relay::connect(companion_fd) {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Companion socket unusable: {e}");
            return false;
        }
    };
    if nice_name.is_null() {
        return false;
    }

    let process = CStr::from_ptr(nice_name).to_string_lossy();
    module()
        .post_app_specialize(&process, &mut channel)
        .hook
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A channel that swallows the request and replays a canned reply.
    struct Canned {
        sent: Vec<u8>,
        reply: Cursor<Vec<u8>>,
    }

    impl Canned {
        fn frame(payload: &[u8]) -> Self {
            let mut reply = Vec::new();
            relay::write_frame(&mut reply, payload).unwrap();
            Self::raw(reply)
        }

        fn raw(reply: Vec<u8>) -> Self {
            Self {
                sent: Vec::new(),
                reply: Cursor::new(reply),
            }
        }
    }

    impl Read for Canned {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reply.read(buf)
        }
    }

    impl Write for Canned {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn module() -> SpoofModule {
        SpoofModule::with_targets(
            ModulePaths::new("/nonexistent"),
            TargetList::parse("com.foo\n"),
        )
    }

    #[test]
    fn sends_selector_for_classified_variant() {
        let module = module();

        let mut channel = Canned::frame(b"{}");
        let (variant, _, _) = module.load_config("com.foo", &mut channel);
        assert_eq!(variant, ConfigVariant::Override);
        assert_eq!(channel.sent, [ConfigVariant::Override.selector()]);

        let mut channel = Canned::frame(b"{}");
        let (variant, _, _) = module.load_config("com.bar", &mut channel);
        assert_eq!(variant, ConfigVariant::Default);
        assert_eq!(channel.sent, [ConfigVariant::Default.selector()]);
    }

    #[test]
    fn relayed_config_is_parsed() {
        let mut channel = Canned::frame(br#"{"spoofBuild": 0, "props": {"ro.a": "b"}}"#);
        let (_, source, config) = module().load_config("com.bar", &mut channel);
        assert_eq!(source, ConfigSource::Relayed);
        assert!(!config.spoof_build());
        assert_eq!(config.rules.len(), 1);
    }

    #[test]
    fn empty_relay_is_unavailable() {
        let mut channel = Canned::frame(b"");
        let (_, source, config) = module().load_config("com.bar", &mut channel);
        assert_eq!(source, ConfigSource::Unavailable);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn broken_relay_is_unavailable() {
        let mut channel = Canned::raw(vec![1, 2, 3]);
        let (_, source, config) = module().load_config("com.bar", &mut channel);
        assert_eq!(source, ConfigSource::Unavailable);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let mut channel = Canned::frame(b"{\"props\": {");
        let specialization = module().post_app_specialize("com.bar", &mut channel);
        assert_eq!(specialization.source, ConfigSource::Malformed);
        assert_eq!(specialization.config, Config::default());
        assert!(specialization.hook.is_none());
    }

    #[test]
    fn spoof_props_off_never_hooks() {
        let mut channel = Canned::frame(br#"{"spoofProps": 0, "props": {"ro.a": "b"}}"#);
        let specialization = module().post_app_specialize("com.foo", &mut channel);
        assert_eq!(specialization.source, ConfigSource::Relayed);
        assert!(specialization.hook.is_none());
    }

    #[test]
    fn negative_fd_is_rejected() {
        assert!(!unsafe { pif_post_app_specialize(c"com.foo".as_ptr(), -1) });
    }

    #[test]
    fn companion_fd_is_closed_on_return() {
        use std::os::fd::IntoRawFd;
        use std::os::unix::net::UnixStream;

        let (app, mut companion) = UnixStream::pair().unwrap();
        let fd = app.into_raw_fd();
        assert!(!unsafe { pif_post_app_specialize(std::ptr::null(), fd) });

        let mut rest = Vec::new();
        assert_eq!(companion.read_to_end(&mut rest).unwrap(), 0);
    }
}
