fn main() {
    // Logcat lives in liblog on Android. Checked through the env var rather than
    // cfg!, since build scripts are compiled for the host.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=log");
    }
}
