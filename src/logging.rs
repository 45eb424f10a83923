//! Logging setup
//!
//! Everything logs through `tracing`. On Android events go to logcat under
//! [`TAG`]; elsewhere they go to stderr, filtered by `RUST_LOG`.

/// Logcat tag
pub const TAG: &str = "PIF/Native";

/// Install the global subscriber. Later calls do nothing.
pub fn init() {
    #[cfg(target_os = "android")]
    let result = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_writer(logcat::Logcat)
        .try_init();

    #[cfg(not(target_os = "android"))]
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    // Already initialized, e.g. by a test harness.
    let _ = result;
}

#[cfg(target_os = "android")]
mod logcat {
    use std::ffi::{c_char, c_int, CString};
    use std::io;

    use tracing::{Level, Metadata};
    use tracing_subscriber::fmt::MakeWriter;

    const ANDROID_LOG_VERBOSE: c_int = 2;
    const ANDROID_LOG_DEBUG: c_int = 3;
    const ANDROID_LOG_INFO: c_int = 4;
    const ANDROID_LOG_WARN: c_int = 5;
    const ANDROID_LOG_ERROR: c_int = 6;

    // liblog is linked by build.rs
    extern "C" {
        fn __android_log_write(prio: c_int, tag: *const c_char, text: *const c_char) -> c_int;
    }

    fn priority(level: &Level) -> c_int {
        match *level {
            Level::TRACE => ANDROID_LOG_VERBOSE,
            Level::DEBUG => ANDROID_LOG_DEBUG,
            Level::INFO => ANDROID_LOG_INFO,
            Level::WARN => ANDROID_LOG_WARN,
            Level::ERROR => ANDROID_LOG_ERROR,
        }
    }

    pub struct Logcat;

    impl<'a> MakeWriter<'a> for Logcat {
        type Writer = LogcatWriter;

        fn make_writer(&'a self) -> Self::Writer {
            LogcatWriter::new(ANDROID_LOG_INFO)
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            LogcatWriter::new(priority(meta.level()))
        }
    }

    /// Collects one formatted event and writes it as a single logcat line on drop.
    pub struct LogcatWriter {
        priority: c_int,
        buffer: Vec<u8>,
    }

    impl LogcatWriter {
        fn new(priority: c_int) -> Self {
            Self {
                priority,
                buffer: Vec::new(),
            }
        }
    }

    impl io::Write for LogcatWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for LogcatWriter {
        fn drop(&mut self) {
            while self.buffer.last() == Some(&b'\n') {
                self.buffer.pop();
            }
            if self.buffer.is_empty() {
                return;
            }

            self.buffer.retain(|&b| b != 0);
            let Ok(text) = CString::new(std::mem::take(&mut self.buffer)) else {
                return;
            };
            let Ok(tag) = CString::new(super::TAG) else {
                return;
            };
            unsafe { __android_log_write(self.priority, tag.as_ptr(), text.as_ptr()) };
        }
    }
}
