//! Config relay between the root companion and the app process
//!
//! Apps cannot read `/data/adb`, so the companion (running as root) reads the
//! config and sends it over the socket Zygisk sets up for us.
//!
//! Wire format, one exchange per connection:
//!
//! | Direction | Bytes | Meaning |
//! | --------- | ----- | ------- |
//! | app -> companion | 0 or 1 | Optional [`ConfigVariant`] selector |
//! | companion -> app | 8 | Payload length `L`, signed, native endian. 0 means no config |
//! | companion -> app | `L` | The raw file contents |
//!
//! A companion that receives no selector (EOF or timeout) serves
//! `custom.pif.json`, falling back to `pif.json`.

use std::ffi::c_int;
use std::io::{ErrorKind, Read, Write};
use std::mem::ManuallyDrop;
use std::os::fd::FromRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::paths::ModulePaths;
use crate::targets::ConfigVariant;

/// Size of the length field.
pub const LENGTH_SIZE: usize = std::mem::size_of::<i64>();

/// Largest payload a requester accepts.
pub const MAX_PAYLOAD: i64 = 1 << 20;

/// How long the app process waits for the companion before giving up.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the companion waits for a selector byte.
pub const SELECTOR_TIMEOUT: Duration = Duration::from_millis(250);

/// Read the config file a `variant` request should get, fully into memory.
///
/// `None` means the requester did not say, which gets the override file if
/// present. Missing files are not an error: nothing found is an empty payload.
pub fn load(paths: &ModulePaths, variant: Option<ConfigVariant>) -> Vec<u8> {
    let candidates = match variant {
        Some(ConfigVariant::Default) => vec![paths.default_config()],
        Some(ConfigVariant::Override) | None => {
            vec![paths.custom_config(), paths.default_config()]
        }
    };

    for path in candidates {
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!("Serving {} ({} bytes)", path.display(), bytes.len());
                return bytes;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => warn!("Failed to read {}: {e}", path.display()),
        }
    }

    Vec::new()
}

/// Write one length-prefixed frame.
pub fn write_frame<W: Write>(out: &mut W, payload: &[u8]) -> std::io::Result<()> {
    let len = payload.len() as i64;
    out.write_all(&len.to_ne_bytes())?;
    out.write_all(payload)?;
    out.flush()
}

/// Read one length-prefixed frame. An empty payload means no config is available.
pub fn read_frame<R: Read>(input: &mut R) -> Result<Vec<u8>> {
    let mut len = [0u8; LENGTH_SIZE];
    input.read_exact(&mut len)?;

    let len = i64::from_ne_bytes(len);
    if !(0..=MAX_PAYLOAD).contains(&len) {
        return Err(Error::Frame(len));
    }

    let mut payload = vec![0u8; len as usize];
    input.read_exact(&mut payload)?;
    Ok(payload)
}

/// Answer a request for `variant` on `out`. Returns the payload size.
pub fn serve<W: Write>(
    out: &mut W,
    paths: &ModulePaths,
    variant: Option<ConfigVariant>,
) -> std::io::Result<usize> {
    let payload = load(paths, variant);
    write_frame(out, &payload)?;
    Ok(payload.len())
}

/// Companion side of one connection: read the optional selector, then serve.
pub fn serve_stream(stream: &mut UnixStream, paths: &ModulePaths) -> std::io::Result<usize> {
    let variant = read_selector(stream)?;
    serve(stream, paths, variant)
}

fn read_selector(stream: &mut UnixStream) -> std::io::Result<Option<ConfigVariant>> {
    stream.set_read_timeout(Some(SELECTOR_TIMEOUT))?;

    let mut byte = [0u8; 1];
    let variant = match stream.read(&mut byte) {
        Ok(0) => None,
        Ok(_) => {
            let variant = ConfigVariant::from_selector(byte[0]);
            if variant.is_none() {
                warn!("Unknown config selector {:#04x}", byte[0]);
            }
            variant
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
        Err(e) => return Err(e),
    };

    stream.set_read_timeout(None)?;
    Ok(variant)
}

/// App side: ask for `variant` and wait for the payload.
///
/// The channel should carry a read timeout (see [`connect`]) so a stuck
/// companion cannot hang specialization.
pub fn request<S: Read + Write>(channel: &mut S, variant: ConfigVariant) -> Result<Vec<u8>> {
    channel.write_all(&[variant.selector()])?;
    channel.flush()?;
    read_frame(channel)
}

/// Take ownership of a companion socket and bound how long reads may block.
///
/// # Safety
///
/// `fd` must be an open socket that nothing else owns.
pub unsafe fn connect(fd: c_int) -> Result<UnixStream> {
    let stream = UnixStream::from_raw_fd(fd);
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    Ok(stream)
}

/// Companion entry point, called by Zygisk in the root daemon for every
/// `connectCompanion` from an app process. Zygisk closes `fd` afterwards.
#[no_mangle]
pub extern "C" fn zygisk_companion_entry(fd: c_int) {
    let mut stream = ManuallyDrop::new(unsafe { UnixStream::from_raw_fd(fd) });

    match serve_stream(&mut stream, &ModulePaths::default()) {
        Ok(len) => info!("Relayed {len} bytes of config"),
        Err(e) => error!("Failed to relay config: {e}"),
    }
}
