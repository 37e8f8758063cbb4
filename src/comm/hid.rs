//! USB-HID framed transport to on-board microcontrollers (`spec.md` §4.A).
//!
//! Every on-board I/O/RTD board enumerates as a 64-byte fixed-report HID device carrying a
//! Modbus-RTU frame, left-aligned and zero-padded. Mirrors `comm::serial::Serial`: one `Mutex`
//! guards the open device handle, reconnect-on-error drops it so the next request reopens by
//! path, and a separate `busy` lock is held by the caller for the whole write+read round trip.
use std::sync::Arc;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};

use crate::locking::{Mutex, MutexGuard};
use crate::{Error, HardwareError, Result};

use super::Client;
use super::Communicator;
use super::Protocol;

/// Fixed HID report size every board speaks, per `spec.md` §4.A
pub const REPORT_LEN: usize = 64;

/// Maximum number of HID boards this gateway will bind (`spec.md` §6, `MAX_HID_PORTS`)
pub const MAX_HID_PORTS: usize = 4;

/// Product-ID-derived board classification, replacing the original firmware's
/// dispatch-by-integer-pid at every call site (`spec.md` §9).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BoardKind {
    /// GPIO/AD74416H/capture-PWM/PWM-out I/O board (pid `0xA2`)
    IoBoard,
    /// AD7124 RTD board (pid `0xA3`)
    RtdBoard,
    /// Enumerated but unrecognized product ID
    Unknown,
}

impl BoardKind {
    fn from_pid(pid: u16) -> Self {
        match pid {
            0xA2 => BoardKind::IoBoard,
            0xA3 => BoardKind::RtdBoard,
            _ => BoardKind::Unknown,
        }
    }
}

/// One discovered HID board: its identity and a handle to reopen it by path
#[derive(Debug, Clone)]
pub struct HidPortInfo {
    pub vid: u16,
    pub pid: u16,
    pub kind: BoardKind,
    pub path: String,
}

/// Enumerates attached HID boards by `vid`, in discovery order, up to [`MAX_HID_PORTS`].
pub fn enumerate(vid: u16) -> Result<Vec<HidPortInfo>> {
    let api = HidApi::new().map_err(|e| Error::io(e))?;
    let mut ports: Vec<HidPortInfo> = api
        .device_list()
        .filter(|d| d.vendor_id() == vid)
        .map(|d| HidPortInfo {
            vid: d.vendor_id(),
            pid: d.product_id(),
            kind: BoardKind::from_pid(d.product_id()),
            path: d.path().to_string_lossy().into_owned(),
        })
        .collect();
    ports.truncate(MAX_HID_PORTS);
    Ok(ports)
}

/// A single USB-HID framed transport, one per enumerated board
#[allow(clippy::module_name_repetitions)]
pub struct Hid {
    info: HidPortInfo,
    device: Mutex<Option<HidDevice>>,
    timeout: Duration,
    busy: Mutex<()>,
}

#[allow(clippy::module_name_repetitions)]
pub type HidClient = Arc<Hid>;

impl Hid {
    pub fn create(info: HidPortInfo, timeout: Duration) -> Arc<Self> {
        Self {
            info,
            device: <_>::default(),
            timeout,
            busy: <_>::default(),
        }
        .into()
    }
    /// The board kind classified from this port's product ID
    pub fn kind(&self) -> BoardKind {
        self.info.kind
    }
    fn get_device(&self) -> std::io::Result<MutexGuard<Option<HidDevice>>> {
        let mut lock = self.device.lock();
        if lock.is_none() {
            let api = HidApi::new().map_err(hid_io_error)?;
            let dev = api.open_path(
                &std::ffi::CString::new(self.info.path.clone())
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?,
            )
            .map_err(hid_io_error)?;
            lock.replace(dev);
        }
        Ok(lock)
    }
}

fn hid_io_error(e: hidapi::HidError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

impl Communicator for Hid {
    fn lock(&self) -> MutexGuard<()> {
        self.busy.lock()
    }
    fn reconnect(&self) {
        self.device.lock().take();
    }
    fn write(&self, buf: &[u8]) -> std::io::Result<()> {
        if buf.len() > REPORT_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "frame exceeds HID report length",
            ));
        }
        let mut report = [0_u8; REPORT_LEN];
        report[..buf.len()].copy_from_slice(buf);
        let mut lock = self.get_device()?;
        let outcome = lock.as_mut().unwrap().write(&report);
        drop(lock);
        match outcome {
            Ok(_) => Ok(()),
            Err(e) => {
                self.reconnect();
                Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            }
        }
    }
    fn read_exact(&self, buf: &mut [u8]) -> std::io::Result<()> {
        let mut report = [0_u8; REPORT_LEN];
        let mut lock = self.get_device()?;
        let outcome = lock
            .as_mut()
            .unwrap()
            .read_timeout(&mut report, self.timeout.as_millis() as i32);
        drop(lock);
        let read = outcome.map_err(|e| {
            self.reconnect();
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
        if read == 0 {
            self.reconnect();
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                HardwareError::Timeout,
            ));
        }
        if read < buf.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short HID report",
            ));
        }
        buf.copy_from_slice(&report[..buf.len()]);
        Ok(())
    }
    fn protocol(&self) -> Protocol {
        Protocol::Hid
    }
    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Binds every HID board attached under `vid`, up to [`MAX_HID_PORTS`], returning one [`Client`]
/// per board alongside its classified [`BoardKind`].
pub fn bind_all(vid: u16, timeout: Duration) -> Result<Vec<(BoardKind, Client)>> {
    enumerate(vid)?
        .into_iter()
        .map(|info| {
            let kind = info.kind;
            let hid = Hid::create(info, timeout);
            Ok((kind, Client::new(hid)))
        })
        .collect()
}
