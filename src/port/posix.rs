//! POSIX termios backend.
//!
//! Ports are plain file descriptors driven through `termios`. Two quirks are
//! handled here so callers never see them:
//!
//! - Opening is done non-blocking (`O_NONBLOCK`) so a wedged modem line
//!   cannot hang the call, then blocking mode is restored.
//! - The native read timeout (`VTIME`) counts deciseconds in a `u8`, topping
//!   out at 25.5 s. Longer timeouts are bridged by re-arming the native
//!   slice in a monotonic-clock-bounded retry loop.

use std::ffi::CString;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use super::native::{NativePort, PurgeKind, MAX_NATIVE_IO};
use crate::config::{DataBits, Parity, PortConfig, StopBits};
use crate::error::{Result, SerialError};
use crate::list::PortList;

/// Directory scanned during enumeration.
const PORT_BASE: &str = "/dev";

/// Ceiling of a single native read slice: VTIME is a `u8` of deciseconds.
const MAX_NATIVE_TIMEOUT_MS: u32 = 25_500;

/// Device names registered by the known serial drivers, 1-3 digit unit.
static PORT_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(ttyS|ttyUSB|ttyACM|ttyAMA|rfcomm|ttyO)[0-9]{1,3}$").expect("valid pattern"));

#[derive(Debug)]
pub(crate) struct PosixPort {
    fd: RawFd,
    /// Requested timeout in milliseconds. The value armed at the `termios`
    /// level is clamped to [`MAX_NATIVE_TIMEOUT_MS`]; this field keeps the
    /// original so `read` can honor the rest.
    read_timeout_ms: u32,
}

/// Open `name` for read/write. The port blocks after this call returns.
pub(crate) fn open(name: &str) -> Result<Box<dyn NativePort>> {
    let path = CString::new(name).map_err(|_| SerialError::InvalidParam)?;

    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK) };
    if fd < 0 {
        return Err(last_os_error());
    }

    if let Err(err) = init_blocking(fd) {
        // Roll back the half-opened descriptor; a close failure here must
        // not mask the primary error.
        unsafe { libc::close(fd) };
        return Err(err);
    }

    trace!(port = name, fd, "opened native port");
    Ok(Box::new(PosixPort {
        fd,
        read_timeout_ms: 0,
    }))
}

/// Verify the descriptor speaks termios, then restore blocking mode.
fn init_blocking(fd: RawFd) -> Result<()> {
    get_termios(fd).map_err(|_| last_os_error())?;

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(last_os_error());
    }
    Ok(())
}

/// Current errno translated into the taxonomy. Only used on the open path;
/// everything after open maps straight to `Io`.
fn last_os_error() -> SerialError {
    std::io::Error::last_os_error().into()
}

fn get_termios(fd: RawFd) -> Result<libc::termios> {
    let mut raw = std::mem::MaybeUninit::<libc::termios>::uninit();
    if unsafe { libc::tcgetattr(fd, raw.as_mut_ptr()) } < 0 {
        return Err(SerialError::Io);
    }
    Ok(unsafe { raw.assume_init() })
}

fn commit(fd: RawFd, raw: &libc::termios) -> Result<()> {
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, raw) } < 0 {
        return Err(SerialError::Io);
    }
    Ok(())
}

/// Raw, non-canonical mode: receiver enabled, no echo, no signal keys, no
/// byte translation on input or output.
fn raw_mode(raw: &mut libc::termios) {
    raw.c_cflag |= libc::CLOCAL | libc::CREAD;
    raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ISIG);
    raw.c_iflag &= !(libc::ISTRIP | libc::IGNCR | libc::INLCR | libc::ICRNL);
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        raw.c_iflag &= !libc::IUCLC;
    }
    raw.c_oflag &= !(libc::OPOST | libc::ONLCR | libc::OCRNL | libc::ONOCR | libc::ONLRET);
}

fn native_baud(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        460_800 => libc::B460800,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        500_000 => libc::B500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        576_000 => libc::B576000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        921_600 => libc::B921600,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1_000_000 => libc::B1000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1_152_000 => libc::B1152000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1_500_000 => libc::B1500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        2_000_000 => libc::B2000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        2_500_000 => libc::B2500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        3_000_000 => libc::B3000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        3_500_000 => libc::B3500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        4_000_000 => libc::B4000000,
        _ => return Err(SerialError::InvalidParam),
    };
    Ok(speed)
}

fn set_baud(raw: &mut libc::termios, baud: u32) -> Result<()> {
    let speed = native_baud(baud)?;
    if unsafe { libc::cfsetispeed(raw, speed) } < 0 {
        return Err(SerialError::Io);
    }
    if unsafe { libc::cfsetospeed(raw, speed) } < 0 {
        return Err(SerialError::Io);
    }
    Ok(())
}

fn set_data_bits(raw: &mut libc::termios, bits: DataBits) {
    let size = match bits {
        DataBits::Five => libc::CS5,
        DataBits::Six => libc::CS6,
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };
    raw.c_cflag &= !libc::CSIZE;
    raw.c_cflag |= size;
}

fn set_parity(raw: &mut libc::termios, parity: Parity) {
    match parity {
        Parity::None => raw.c_cflag &= !libc::PARENB,
        Parity::Even => {
            raw.c_cflag |= libc::PARENB;
            raw.c_cflag &= !libc::PARODD;
        }
        Parity::Odd => raw.c_cflag |= libc::PARENB | libc::PARODD,
    }
}

fn set_stop_bits(raw: &mut libc::termios, bits: StopBits) {
    match bits {
        StopBits::One => raw.c_cflag &= !libc::CSTOPB,
        // termios has no 1.5-stop-bit mode; both map to two stop bits.
        StopBits::OnePointFive | StopBits::Two => raw.c_cflag |= libc::CSTOPB,
    }
}

/// Arm the native read slice: VTIME in deciseconds, VMIN 0.
///
/// Rounds up so a sub-decisecond remainder still blocks instead of spinning.
fn arm_native_timeout(fd: RawFd, millis: u32) -> Result<()> {
    let mut raw = get_termios(fd)?;
    raw.c_cc[libc::VTIME] = millis.div_ceil(100).min(u32::from(u8::MAX)) as libc::cc_t;
    raw.c_cc[libc::VMIN] = 0;
    commit(fd, &raw)
}

fn read_once(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    let len = buf.len().min(MAX_NATIVE_IO);
    let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), len) };
    if n < 0 {
        return Err(SerialError::Io);
    }
    Ok(n as usize)
}

/// Drive repeated native read slices until data arrives, an error occurs, or
/// `timeout_ms` of wall-clock time has elapsed (then `Ok(0)`).
///
/// Each retry re-arms the native slice to the remaining time, so the total
/// wait tracks the request instead of the VTIME ceiling.
fn read_full_timeout<R, A, C>(
    timeout_ms: u32,
    mut now_ms: C,
    mut rearm: A,
    mut read_once: R,
    buf: &mut [u8],
) -> Result<usize>
where
    R: FnMut(&mut [u8]) -> Result<usize>,
    A: FnMut(u32) -> Result<()>,
    C: FnMut() -> u64,
{
    let start = now_ms();
    loop {
        let n = read_once(buf)?;
        if n > 0 {
            return Ok(n);
        }

        let elapsed = now_ms().saturating_sub(start);
        if elapsed >= u64::from(timeout_ms) {
            return Ok(0);
        }

        let remaining = (u64::from(timeout_ms) - elapsed).min(u64::from(MAX_NATIVE_TIMEOUT_MS));
        rearm(remaining as u32)?;
    }
}

impl NativePort for PosixPort {
    fn configure(&mut self, config: &PortConfig) -> Result<()> {
        let mut raw = get_termios(self.fd)?;
        raw_mode(&mut raw);
        set_baud(&mut raw, config.baud)?;
        set_data_bits(&mut raw, config.data_bits);
        set_parity(&mut raw, config.parity);
        set_stop_bits(&mut raw, config.stop_bits);
        commit(self.fd, &raw)
    }

    fn set_read_timeout(&mut self, millis: u32) -> Result<()> {
        let mut raw = get_termios(self.fd)?;
        raw.c_cc[libc::VTIME] = (millis / 100).min(u32::from(u8::MAX)) as libc::cc_t;
        raw.c_cc[libc::VMIN] = 0;
        commit(self.fd, &raw)?;
        self.read_timeout_ms = millis;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd;

        // Timeout disabled: a single slice with VTIME 0 polls and returns
        // whatever is buffered right now.
        if self.read_timeout_ms == 0 {
            return read_once(fd, buf);
        }

        let start = Instant::now();
        read_full_timeout(
            self.read_timeout_ms,
            || start.elapsed().as_millis() as u64,
            |remaining| arm_native_timeout(fd, remaining),
            |out| read_once(fd, out),
            buf,
        )
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let len = buf.len().min(MAX_NATIVE_IO);
        let n = unsafe { libc::write(self.fd, buf.as_ptr().cast(), len) };
        if n < 0 {
            return Err(SerialError::Io);
        }
        Ok(n as usize)
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        let mut count: libc::c_int = 0;
        if unsafe { libc::ioctl(self.fd, libc::FIONREAD, &mut count) } < 0 {
            return Err(SerialError::Io);
        }
        Ok(count.max(0) as u32)
    }

    fn purge(&mut self, kind: PurgeKind) -> Result<()> {
        let queue = match kind {
            PurgeKind::Rx => libc::TCIFLUSH,
            PurgeKind::Tx => libc::TCOFLUSH,
            PurgeKind::RxTx => libc::TCIOFLUSH,
        };
        if unsafe { libc::tcflush(self.fd, queue) } < 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if unsafe { libc::tcdrain(self.fd) } < 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Release exactly once; Drop must not see a live descriptor after
        // this, even when close(2) itself reports a failure.
        let fd = self.fd;
        self.fd = -1;
        if unsafe { libc::close(fd) } < 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }
}

impl Drop for PosixPort {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}

/// Fill `list` with every usable serial device under `/dev`.
pub(crate) fn enumerate(list: &mut PortList) -> Result<()> {
    let candidates = collect_candidates(Path::new(PORT_BASE))?;
    probe_candidates(&candidates, probe_open, list)?;
    debug!(count = list.len(), "enumerated candidate devices");
    Ok(())
}

/// Character devices under `dir` whose file name matches a known serial
/// driver prefix. Directory-level failures abort.
fn collect_candidates(dir: &Path) -> Result<Vec<String>> {
    let meta = fs::metadata(dir).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => SerialError::NotFound,
        _ => SerialError::Io,
    })?;
    if !meta.is_dir() {
        return Err(SerialError::InvalidParam);
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(|_| SerialError::Io)? {
        let entry = entry.map_err(|_| SerialError::Io)?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !PORT_NAME_PATTERN.is_match(name) {
            continue;
        }
        // stat, not lstat: a candidate that vanished mid-scan is skipped.
        let Ok(meta) = fs::metadata(entry.path()) else {
            continue;
        };
        if !meta.file_type().is_char_device() {
            continue;
        }
        candidates.push(entry.path().to_string_lossy().into_owned());
    }
    Ok(candidates)
}

/// Append every candidate the probe accepts. Probe failures are expected
/// (device claimed by another process, insufficient permissions) and are
/// skipped; only list failures abort.
fn probe_candidates<P>(candidates: &[String], mut probe: P, list: &mut PortList) -> Result<()>
where
    P: FnMut(&str) -> Result<()>,
{
    for path in candidates {
        match probe(path) {
            Ok(()) => {
                list.add(path)?;
            }
            Err(err) => {
                trace!(port = %path, %err, "skipping unusable candidate");
            }
        }
    }
    Ok(())
}

/// A device counts as usable if it can be opened and closed again.
fn probe_open(path: &str) -> Result<()> {
    let mut port = open(path)?;
    port.close()
}
