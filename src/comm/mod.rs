//! Per-port, framed transports shared by the board command layer (§4.A-C) and the RS-485 bridge
//! used by the RTD acquisition pipeline (§4.E). Mirrors `roboplc::comm`: a transport-erased
//! [`Client`] wraps one [`Communicator`] implementation per wire (HID report, serial line), each
//! holding a single per-port mutex for the full duration of a request/response round trip so
//! callers never need to reason about interleaved HID/UART traffic.
use std::{
    io::{Read, Write},
    sync::Arc,
    time::Duration,
};

use crate::locking::MutexGuard;
use crate::{Error, Result};

/// USB-HID framed transport to on-board microcontrollers (§4.A)
pub mod hid;
/// RS-485 serial transport to bridged Modbus-RTU slaves
pub mod serial;

/// A versatile (HID/serial) client, cheap to clone, safe to share across threads
#[derive(Clone)]
pub struct Client(Arc<dyn Communicator + Send + Sync>);

impl Client {
    pub(crate) fn new(inner: Arc<dyn Communicator + Send + Sync>) -> Self {
        Self(inner)
    }
    /// Locks the client for the full duration of one request/response round trip
    pub fn lock(&self) -> MutexGuard<()> {
        self.0.lock()
    }
    /// Forces the underlying port to be reopened on its next use
    pub fn reconnect(&self) {
        self.0.reconnect();
    }
    /// Writes a frame to the client
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        self.0.write(buf).map_err(Error::IO)
    }
    /// Reads exactly `buf.len()` bytes from the client
    pub fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        self.0.read_exact(buf).map_err(Error::IO)
    }
    /// Returns the wire protocol of this client, for RTU/TCP frame generation
    pub fn protocol(&self) -> Protocol {
        self.0.protocol()
    }
    /// Per-request round-trip timeout
    pub fn timeout(&self) -> Duration {
        self.0.timeout()
    }
}

impl Read for Client {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read_exact(buf).map(|()| buf.len())
    }
}

impl Write for Client {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf).map(|()| buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The wire protocol a [`Client`] speaks, used to select the correct `rmodbus::ModbusProto`
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Protocol {
    /// Modbus-RTU frame carried inside fixed-size USB-HID reports (on-board microcontrollers)
    Hid,
    /// Modbus-RTU frame carried on an RS-485 serial line (bridged slaves)
    Serial,
}

impl From<Protocol> for rmodbus::ModbusProto {
    fn from(value: Protocol) -> Self {
        match value {
            Protocol::Hid | Protocol::Serial => rmodbus::ModbusProto::Rtu,
        }
    }
}

pub(crate) trait Communicator {
    fn lock(&self) -> MutexGuard<()>;
    fn reconnect(&self);
    fn write(&self, buf: &[u8]) -> std::io::Result<()>;
    fn read_exact(&self, buf: &mut [u8]) -> std::io::Result<()>;
    fn protocol(&self) -> Protocol;
    fn timeout(&self) -> Duration;
}
