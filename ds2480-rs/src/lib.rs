#![deny(missing_docs)]
//! # ds2480
//!
//! Driver for the DS2480B "serial 1-Wire line driver", the bridge chip that
//! puts a 1-Wire bus behind a plain UART. The chip is a half-duplex state
//! machine whose input stream is interpreted in one of two modes (command or
//! data); this crate keeps that session state, frames every exchange
//! accordingly, and implements the [`Adapter`] trait from the `onewire`
//! crate on top of it: chip detection and resynchronization, bus reset, raw
//! data exchange and the accelerated ROM search.
//!
//! The serial port itself stays behind the [`Transport`] trait; any blocking
//! byte channel that can send a line break and commit new line settings will
//! do. A `serialport`-backed implementation ships with the `ds2480-linux`
//! binary crate.

mod adapter;
mod config;
mod search;
mod transport;

#[cfg(test)]
mod mock;

pub use adapter::{ChipVersion, ResetStatus};
pub use config::{ConfigError, DURATION_FOREVER, Ds2480Builder, Speed};
pub use onewire::{Adapter, OneWireError, OneWireResult};
pub use search::{decode_search_response, encode_search_request};
pub use transport::{BREAK_BASELINE, LineSettings, Transport};

/// A DS2480B bridge on a byte-stream transport: one logical 1-Wire bus.
///
/// Owns the transport plus the per-adapter session state: the validated,
/// chip-encoded configuration, the chip's current input mode and the line
/// baseline last forced by [`detect`](onewire::Adapter::detect). Protocol
/// calls take `&mut self` and block; the chip cannot overlap operations, so
/// callers sharing an adapter across threads must serialize access
/// themselves.
///
/// Built through [`Ds2480Builder`].
#[derive(Debug)]
pub struct Ds2480<T> {
    pub(crate) transport: T,
    pub(crate) config: config::EncodedConfig,
    pub(crate) chip_mode: adapter::ChipMode,
    pub(crate) chip_speed: u8,
    pub(crate) chip_baud: u8,
}

impl<T> Ds2480<T> {
    /// Consume the adapter and hand back the transport.
    ///
    /// Closing the transport is how an adapter session ends; there is no
    /// separate shutdown handshake with the chip.
    pub fn into_transport(self) -> T {
        self.transport
    }
}
