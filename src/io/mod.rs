//! I/O mapping: structural (de)serialization of device registers on top of
//! [binrw](https://crates.io/crates/binrw), and the Modbus transport built over it.
pub use binrw;
use binrw::{BinRead, BinWrite};

use crate::Result;

/// Modbus-RTU/TCP register mapping shared by the board command layer and the RTD bridge
pub mod modbus;

/// Generic I/O mapping trait: read/write a typed value through a register-backed transport
#[allow(clippy::module_name_repetitions)]
pub trait IoMapping {
    /// Options for the mapping
    type Options;
    /// Read data from the raw buffer
    fn read<T>(&mut self) -> Result<T>
    where
        T: for<'a> BinRead<Args<'a> = ()>;
    /// Write data to the raw buffer
    fn write<T>(&mut self, value: T) -> Result<()>
    where
        T: for<'a> BinWrite<Args<'a> = ()>;
}

/// I/O mapping prelude
pub mod prelude {
    pub use super::IoMapping as _;
    pub use binrw::prelude::*;
}
