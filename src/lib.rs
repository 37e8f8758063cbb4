//! Management gateway for a Kenmec Coolant Distribution Unit.
//!
//! Fronts a bank of USB-HID attached I/O boards with two coherent external views: a Modbus TCP
//! register map mirroring all hardware state, and a Redfish HTTP(S) management API.
use core::{fmt, num};
use std::{env, sync::Arc, time::Duration};

use colored::Colorize as _;

pub use rtsc::locking;

/// Reliable HID/serial communications (per-port framed transports)
pub mod comm;
/// Persistence-backed accounts/sessions/certificate store
pub mod db;
/// I/O mapping (Modbus over HID and serial)
pub mod io;
/// Shared 16-bit register map
pub mod regmap;
/// Task supervisor to manage long-running gateway threads
pub mod supervisor;
/// Periodic interval helper used by the acquisition engine
pub mod time;

/// Application configuration (paths, ports, intervals)
pub mod config;
/// Board-specific command layer (GPIO, AD74416H, AD7124, capture-PWM, PWM out, UART)
pub mod board;
/// Per-channel sensor transforms applied by the acquisition engine
pub mod transforms;
/// Declarative per-channel sensor/device configuration store
pub mod sensor_config;
/// Periodic AIO/RTD acquisition pipelines
pub mod acquisition;
/// Named control-logic instance registry
pub mod controllogic;
/// Modbus TCP server mirroring the register map to external masters
pub mod modbus_tcp;
/// Redfish HTTP(S) management API
pub mod redfish;
/// Long-lived application context wiring every component together
pub mod app;

/// The crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// The crate error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A hardware operation (HID transport, RTU codec, board command) failed
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),
    /// A register address or width fell outside the map's bounds
    #[error("register address out of range")]
    OutOfRange,
    /// A Redfish request body failed to parse
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Authentication/authorization failed
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// The requested resource does not exist
    #[error("not found")]
    NotFound,
    /// An If-Match precondition failed
    #[error("precondition failed")]
    PreconditionFailed,
    /// The method is not valid for the matched resource
    #[error("method not allowed")]
    MethodNotAllowed,
    /// A uniqueness constraint was violated (e.g. duplicate username)
    #[error("conflict: {0}")]
    Conflict(String),
    /// Standard I/O errors
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
    /// Non-standard I/O / communication errors
    #[error("communication error: {0}")]
    Comm(String),
    /// Invalid data / parameters
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// Supervisor error: task name is not specified
    #[error("task name must be specified when spawning via the supervisor")]
    SupervisorNameNotSpecified,
    /// Supervisor error: duplicate task name
    #[error("task already registered: `{0}`")]
    SupervisorDuplicateTask(String),
    /// Supervisor error: task not found
    #[error("task not found")]
    SupervisorTaskNotFound,
    /// [binrw](https://crates.io/crates/binrw) errors
    #[error("binrw: {0}")]
    BinRw(String),
    /// Database (accounts/sessions/certificates) errors
    #[error("database error: {0}")]
    Database(String),
    /// TLS configuration/handshake errors
    #[error("tls error: {0}")]
    Tls(String),
    /// Any other internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors produced by the HID transport, RTU codec, and board command layer (`spec.md` §7)
#[derive(thiserror::Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum HardwareError {
    /// A write or read did not complete within its timeout
    #[error("timed out")]
    Timeout,
    /// The response frame failed CRC validation
    #[error("bad CRC")]
    BadCrc,
    /// The device returned a Modbus exception code
    #[error("exception code {0:?}")]
    ExceptionCode(ModbusException),
    /// The HID port or serial line is not open / disconnected
    #[error("disconnected")]
    Disconnected,
    /// The port is not open (never enumerated, or closed at shutdown)
    #[error("port not open")]
    NotOpen,
}

/// Modbus exception codes surfaced by device error responses
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ModbusException {
    /// Unsupported function code
    FunctionCode,
    /// Illegal address
    Address,
    /// Illegal value
    Value,
    /// Device failure
    Device,
    /// Negative acknowledge
    Ack,
    /// Device busy
    Busy,
}

/// Errors surfaced while parsing a Redfish request body
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// The body is not valid JSON
    #[error("malformed JSON")]
    MalformedJson,
    /// A required property is missing
    #[error("missing property: {0}")]
    MissingProperty(String),
    /// A property had a value outside its allowed set
    #[error("bad value for property: {0}")]
    BadValue(String),
}

/// Errors surfaced by the auth/identity store and router
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// No valid session token or Basic credentials were presented
    #[error("unauthorized")]
    Unauthorized,
    /// The account lacks the privilege required for this operation
    #[error("insufficient privilege")]
    Forbidden,
    /// Session creation was attempted over plain HTTP
    #[error("session creation requires HTTPS")]
    NotHttps,
}

macro_rules! impl_error {
    ($t: ty, $key: ident) => {
        impl From<$t> for Error {
            fn from(err: $t) -> Self {
                Error::$key(err.to_string())
            }
        }
    };
}

impl_error!(rmodbus::ErrorKind, Comm);
impl_error!(num::ParseIntError, InvalidData);
impl_error!(num::ParseFloatError, InvalidData);
impl_error!(binrw::Error, BinRw);
impl_error!(serde_json::Error, InvalidData);
impl_error!(rusqlite::Error, Database);

impl Error {
    /// Creates a new invalid-data error
    pub fn invalid_data<S: fmt::Display>(msg: S) -> Self {
        Error::InvalidData(msg.to_string())
    }
    /// Creates a new communication error (non-standard I/O)
    pub fn io<S: fmt::Display>(msg: S) -> Self {
        Error::Comm(msg.to_string())
    }
    /// Creates a new internal error
    pub fn internal<S: fmt::Display>(msg: S) -> Self {
        Error::Internal(msg.to_string())
    }
}

/// Immediately terminates the process, printing `msg` to stderr in red. Used when a shared
/// invariant (e.g. a poisoned register map lock) can no longer be trusted.
pub fn critical(msg: &str) -> ! {
    eprintln!("{}", msg.red().bold());
    std::process::exit(1);
}

/// Returns true if started under a systemd unit (mirrors the teacher's production-mode check)
pub fn is_production() -> bool {
    env::var("INVOCATION_ID").map_or(false, |v| !v.is_empty())
}

/// Configures the process-wide `tracing` subscriber. Timestamps are suppressed in production mode
/// (a systemd unit already timestamps the journal).
pub fn configure_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_owned()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if is_production() {
        builder.without_time().init();
    } else {
        builder.init();
    }
}

/// Ignores SIGPIPE so a client disconnecting mid-write never terminates the process
/// (`spec.md` §4.L).
pub fn ignore_sigpipe() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

/// Blocks the calling thread until SIGINT or SIGTERM is delivered, then sets `aborted` and
/// returns. Mirrors the teacher's `controller` shutdown wiring (`roboplc::controller`), trimmed
/// down to the two signals `spec.md` §6 names.
pub fn wait_for_shutdown(aborted: &Arc<std::sync::atomic::AtomicBool>) -> Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };
    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(Error::io)?;
    for sig in signals.forever() {
        tracing::info!(signal = sig, "shutdown signal received");
        aborted.store(true, std::sync::atomic::Ordering::SeqCst);
        break;
    }
    Ok(())
}

/// Sleep step used by busy-wait style shutdown checks
pub const SLEEP_STEP: Duration = Duration::from_millis(100);

/// Prelude module
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::io::prelude::*;
    pub use crate::{Error, Result};
}
