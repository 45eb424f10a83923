use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use propspoof::engine::{HookId, HookRegistry, Interceptor, PropertyCallback};
use propspoof::module::{ConfigSource, SpoofModule};
use propspoof::paths::ModulePaths;
use propspoof::relay;
use propspoof::targets::{ConfigVariant, TargetList};

struct Prop {
    name: CString,
    value: CString,
    serial: u32,
}

unsafe extern "C" fn system_read(
    pi: *const c_void,
    callback: Option<PropertyCallback>,
    cookie: *mut c_void,
) {
    let prop = &*(pi as *const Prop);
    if let Some(callback) = callback {
        callback(cookie, prop.name.as_ptr(), prop.value.as_ptr(), prop.serial);
    }
}

type Seen = RefCell<Vec<(String, u32)>>;

unsafe extern "C" fn consumer(
    cookie: *mut c_void,
    _name: *const c_char,
    value: *const c_char,
    serial: u32,
) {
    let seen = &*(cookie as *const Seen);
    seen.borrow_mut()
        .push((CStr::from_ptr(value).to_string_lossy().into_owned(), serial));
}

fn module_dir(name: &str) -> ModulePaths {
    let dir: PathBuf =
        std::env::temp_dir().join(format!("propspoof-e2e-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    ModulePaths::new(dir)
}

fn specialize(paths: &ModulePaths, process: &str) -> propspoof::Specialization {
    let module = SpoofModule::on_load(paths.clone());
    let (mut app, mut companion) = UnixStream::pair().unwrap();
    let server_paths = paths.clone();
    let server = std::thread::spawn(move || relay::serve_stream(&mut companion, &server_paths));

    let specialization = module.post_app_specialize(process, &mut app);
    server.join().unwrap().unwrap();
    specialization
}

#[test]
fn relayed_rules_rewrite_reads() {
    let paths = module_dir("rules");
    std::fs::write(paths.target_list(), "com.foo\n").unwrap();
    std::fs::write(
        paths.custom_config(),
        r#"{
            // per-target
            "spoofProps": 1,
            "props": { "ro.product.model": "Pixel 8", "*ro.build.tags": "release-keys" }
        }"#,
    )
    .unwrap();
    std::fs::write(paths.default_config(), r#"{"props": {"ro.product.model": "Default"}}"#)
        .unwrap();

    let specialization = specialize(&paths, "com.foo");
    assert_eq!(specialization.variant, ConfigVariant::Override);
    assert_eq!(specialization.source, ConfigSource::Relayed);

    let hook = HookId::of(system_read as *const c_void);
    let interceptor = Interceptor::new(
        specialization.config,
        HookRegistry::with_entry(hook, system_read),
    );

    let seen = Seen::default();
    let reads = [
        ("ro.product.model", "SM-X", 10),
        ("ro.build.tags.extra", "dev-keys", 11),
        ("ro.unrelated", "Z", 12),
    ];
    for (name, value, serial) in reads {
        let prop = Prop {
            name: CString::new(name).unwrap(),
            value: CString::new(value).unwrap(),
            serial,
        };
        unsafe {
            interceptor.read(
                hook,
                &prop as *const Prop as *const c_void,
                Some(consumer),
                &seen as *const Seen as *mut c_void,
            )
        };
    }

    assert_eq!(
        *seen.borrow(),
        vec![
            ("Pixel 8".to_string(), 10),
            ("release-keys".to_string(), 11),
            ("Z".to_string(), 12),
        ]
    );
}

#[test]
fn untargeted_process_gets_default_config() {
    let paths = module_dir("default");
    std::fs::write(paths.target_list(), "com.foo\n").unwrap();
    std::fs::write(paths.custom_config(), r#"{"spoofBuild": 0}"#).unwrap();
    std::fs::write(paths.default_config(), r#"{"spoofBuild": 1, "spoofSignature": 1}"#).unwrap();

    let specialization = specialize(&paths, "com.bar");
    assert_eq!(specialization.variant, ConfigVariant::Default);
    assert!(specialization.config.spoof_build());
    assert!(specialization.config.spoof_signature());
}

#[test]
fn no_files_means_defaults_and_no_hook() {
    let paths = module_dir("nothing");

    let specialization = specialize(&paths, "com.foo");
    assert_eq!(specialization.source, ConfigSource::Unavailable);
    assert_eq!(specialization.config, propspoof::Config::default());
    assert!(specialization.hook.is_none());
}

#[test]
fn target_list_is_read_at_load() {
    let paths = module_dir("targets");
    std::fs::write(paths.target_list(), "com.foo\ncom.baz\n").unwrap();

    let module = SpoofModule::on_load(paths);
    assert_eq!(module.targets(), &TargetList::parse("com.baz\ncom.foo"));
}
