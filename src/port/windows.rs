//! Win32 COM backend.
//!
//! Ports are `HANDLE`s from `CreateFileA` on the `\\.\COMn` device
//! namespace, configured through `DCB` and `COMMTIMEOUTS`. Millisecond read
//! timeouts are native here, so no retry loop is needed.

use std::ffi::CString;
use std::ptr;

use tracing::{debug, trace};

use winapi::shared::minwindef::{DWORD, HKEY};
use winapi::shared::winerror::{
    ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_INVALID_PARAMETER, ERROR_NOT_ENOUGH_MEMORY,
    ERROR_NO_MORE_ITEMS, ERROR_OUTOFMEMORY, ERROR_SUCCESS,
};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{CreateFileA, FlushFileBuffers, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winbase::{
    ClearCommError, GetCommState, PurgeComm, SetCommState, SetCommTimeouts, COMMTIMEOUTS, COMSTAT,
    DCB, EVENPARITY, NOPARITY, ODDPARITY, ONE5STOPBITS, ONESTOPBIT, PURGE_RXCLEAR, PURGE_TXCLEAR,
    TWOSTOPBITS,
};
use winapi::um::winnt::{FILE_ATTRIBUTE_NORMAL, GENERIC_READ, GENERIC_WRITE, HANDLE, KEY_READ};
use winapi::um::winreg::{RegCloseKey, RegEnumValueA, RegOpenKeyExA, HKEY_LOCAL_MACHINE};

use super::native::{NativePort, PurgeKind, MAX_NATIVE_IO};
use crate::config::{Parity, PortConfig, StopBits};
use crate::error::{Result, SerialError};
use crate::list::PortList;

/// Prefix turning a bare COM name into a device-namespace path.
const DEVICE_NAMESPACE_PREFIX: &str = r"\\.\";

/// Registry key holding the live serial-port-name map.
const SERIALCOMM_KEY: &[u8] = b"HARDWARE\\DEVICEMAP\\SERIALCOMM\0";

#[derive(Debug)]
pub(crate) struct WinPort {
    handle: HANDLE,
}

// The handle is exclusively owned by one port and never aliased.
unsafe impl Send for WinPort {}

/// Open `name` (a bare registry name such as `COM3`) with exclusive access.
pub(crate) fn open(name: &str) -> Result<Box<dyn NativePort>> {
    let full = format!("{DEVICE_NAMESPACE_PREFIX}{name}");
    let path = CString::new(full).map_err(|_| SerialError::InvalidParam)?;

    let handle = unsafe {
        CreateFileA(
            path.as_ptr(),
            GENERIC_READ | GENERIC_WRITE,
            0, // no sharing
            ptr::null_mut(),
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(last_win_error());
    }

    // A handle that cannot produce a comm state is not a serial device.
    let mut dcb: DCB = unsafe { std::mem::zeroed() };
    if unsafe { GetCommState(handle, &mut dcb) } == 0 {
        // Roll back; CloseHandle must not mask the probe failure.
        unsafe { CloseHandle(handle) };
        return Err(SerialError::Io);
    }

    trace!(port = name, "opened native port");
    Ok(Box::new(WinPort { handle }))
}

/// `GetLastError` translated into the taxonomy. Only used on the open path;
/// everything after open maps straight to `Io`.
fn last_win_error() -> SerialError {
    match unsafe { GetLastError() } {
        ERROR_ACCESS_DENIED => SerialError::AccessDenied,
        ERROR_FILE_NOT_FOUND => SerialError::NotFound,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY => SerialError::OutOfMemory,
        ERROR_INVALID_PARAMETER => SerialError::InvalidParam,
        _ => SerialError::Io,
    }
}

impl WinPort {
    fn comm_state(&self) -> Result<DCB> {
        let mut dcb: DCB = unsafe { std::mem::zeroed() };
        if unsafe { GetCommState(self.handle, &mut dcb) } == 0 {
            return Err(SerialError::Io);
        }
        Ok(dcb)
    }
}

impl NativePort for WinPort {
    fn configure(&mut self, config: &PortConfig) -> Result<()> {
        let mut dcb = self.comm_state()?;

        dcb.BaudRate = config.baud;
        dcb.ByteSize = config.data_bits.bits();
        dcb.Parity = match config.parity {
            Parity::None => NOPARITY,
            Parity::Even => EVENPARITY,
            Parity::Odd => ODDPARITY,
        };
        dcb.StopBits = match config.stop_bits {
            StopBits::One => ONESTOPBIT,
            StopBits::OnePointFive => ONE5STOPBITS,
            StopBits::Two => TWOSTOPBITS,
        };

        if unsafe { SetCommState(self.handle, &mut dcb) } == 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, millis: u32) -> Result<()> {
        let mut timeouts: COMMTIMEOUTS = unsafe { std::mem::zeroed() };
        timeouts.ReadIntervalTimeout = millis;
        timeouts.ReadTotalTimeoutConstant = millis;

        if unsafe { SetCommTimeouts(self.handle, &mut timeouts) } == 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(MAX_NATIVE_IO) as DWORD;
        let mut n: DWORD = 0;
        if unsafe { ReadFile(self.handle, buf.as_mut_ptr().cast(), len, &mut n, ptr::null_mut()) }
            == 0
        {
            return Err(SerialError::Io);
        }
        Ok(n as usize)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let len = buf.len().min(MAX_NATIVE_IO) as DWORD;
        let mut n: DWORD = 0;
        if unsafe { WriteFile(self.handle, buf.as_ptr().cast(), len, &mut n, ptr::null_mut()) } == 0
        {
            return Err(SerialError::Io);
        }
        Ok(n as usize)
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        let mut stat: COMSTAT = unsafe { std::mem::zeroed() };
        let mut errors: DWORD = 0;
        if unsafe { ClearCommError(self.handle, &mut errors, &mut stat) } == 0 {
            return Err(SerialError::Io);
        }
        Ok(stat.cbInQue)
    }

    fn purge(&mut self, kind: PurgeKind) -> Result<()> {
        let flags = match kind {
            PurgeKind::Rx => PURGE_RXCLEAR,
            PurgeKind::Tx => PURGE_TXCLEAR,
            PurgeKind::RxTx => PURGE_RXCLEAR | PURGE_TXCLEAR,
        };
        if unsafe { PurgeComm(self.handle, flags) } == 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if unsafe { FlushFileBuffers(self.handle) } == 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Release exactly once; Drop must not see a live handle after this.
        let handle = self.handle;
        self.handle = INVALID_HANDLE_VALUE;
        if unsafe { CloseHandle(handle) } == 0 {
            return Err(SerialError::Io);
        }
        Ok(())
    }
}

impl Drop for WinPort {
    fn drop(&mut self) {
        if self.handle != INVALID_HANDLE_VALUE {
            unsafe { CloseHandle(self.handle) };
        }
    }
}

/// Fill `list` from the registry's live serial-port-name map. Values hold the
/// bare COM names; the device-namespace prefix is applied only at open time.
pub(crate) fn enumerate(list: &mut PortList) -> Result<()> {
    let mut key: HKEY = ptr::null_mut();
    let status = unsafe {
        RegOpenKeyExA(
            HKEY_LOCAL_MACHINE,
            SERIALCOMM_KEY.as_ptr().cast(),
            0,
            KEY_READ,
            &mut key,
        )
    };
    if status != ERROR_SUCCESS as i32 {
        return Err(SerialError::Io);
    }

    let result = enum_values(key, list);

    // Closing the key must not mask an enumeration error.
    let close_status = unsafe { RegCloseKey(key) };
    if result.is_ok() && close_status != ERROR_SUCCESS as i32 {
        return Err(SerialError::Io);
    }

    if result.is_ok() {
        debug!(count = list.len(), "enumerated registry port map");
    }
    result
}

fn enum_values(key: HKEY, list: &mut PortList) -> Result<()> {
    let mut index: DWORD = 0;
    loop {
        let mut value_name = [0u8; 256];
        let mut value_name_len: DWORD = value_name.len() as DWORD;
        let mut data = [0u8; 256];
        let mut data_len: DWORD = data.len() as DWORD;

        let status = unsafe {
            RegEnumValueA(
                key,
                index,
                value_name.as_mut_ptr().cast(),
                &mut value_name_len,
                ptr::null_mut(),
                ptr::null_mut(),
                data.as_mut_ptr(),
                &mut data_len,
            )
        };

        if status == ERROR_NO_MORE_ITEMS as i32 {
            return Ok(());
        }
        if status != ERROR_SUCCESS as i32 {
            // Any stop other than "no more items" is an enumeration failure.
            return Err(SerialError::Io);
        }

        // Value data is a NUL-terminated port name, e.g. "COM3".
        let end = data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(data.len())
            .min(data_len as usize);
        let name = String::from_utf8_lossy(&data[..end]);
        list.add(&name)?;

        index += 1;
    }
}
