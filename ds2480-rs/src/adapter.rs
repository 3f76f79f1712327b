//! The DS2480B protocol engine: mode-switched transactions, chip detection
//! and resynchronization, bus reset and the accelerated search pass.

use std::fmt;
use std::thread;
use std::time::Duration;

use bitfield_struct::bitfield;
use log::{debug, trace, warn};
use onewire::{Adapter, OneWireError, OneWireResult};

use crate::Ds2480;
use crate::config::{EncodedConfig, Parameter, Speed};
use crate::search::{decode_search_response, encode_search_request};
use crate::transport::{BREAK_BASELINE, Transport};

/// Switch the chip's input stream to data mode.
pub(crate) const MODE_DATA: u8 = 0xe1;
/// Switch the chip's input stream to command mode.
pub(crate) const MODE_COMMAND: u8 = 0xe3;

/// Generate a reset/presence-detect cycle on the bus.
pub(crate) const CMD_RESET: u8 = 0xc1;
/// Write one configuration parameter.
pub(crate) const CMD_CONFIG: u8 = 0x01;
/// Generate a single bit time slot.
pub(crate) const CMD_WRITE_BIT: u8 = 0x81;
/// Begin an accelerated ROM search pass.
pub(crate) const CMD_SEARCH: u8 = 0xf0;
/// Turn chip-side search acceleration on.
pub(crate) const CMD_SEARCH_ACCEL_ON: u8 = 0xb1;
/// Turn chip-side search acceleration off.
pub(crate) const CMD_SEARCH_ACCEL_OFF: u8 = 0xa1;

/// Settle time the chip needs after a line break or a wake-up reset byte.
const SETTLE: Duration = Duration::from_millis(2);

/// The two interpretation modes of the chip's input stream.
///
/// Every byte the chip receives is either a command or bus data depending on
/// which mode the preceding marker byte selected; the engine remembers the
/// last selected mode so frames only carry a marker on an actual change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChipMode {
    Command,
    Data,
}

impl ChipMode {
    fn marker(self) -> u8 {
        match self {
            ChipMode::Command => MODE_COMMAND,
            ChipMode::Data => MODE_DATA,
        }
    }
}

/// Reply byte to a bus reset command.
#[bitfield(u8)]
pub(crate) struct ResetReply {
    /// Bus presence information, reported opaquely to callers.
    #[bits(2)]
    bus_status: u8,
    /// Chip revision code; the low two bits are set in every well-formed
    /// reply.
    #[bits(3)]
    chip_rev: u8,
    #[bits(3)]
    __: u8,
}

/// Chip generation decoded from a reset reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVersion {
    /// The original DS2480.
    Ds2480,
    /// The DS2480B revision.
    Ds2480B,
}

impl fmt::Display for ChipVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChipVersion::Ds2480 => "ds2480",
            ChipVersion::Ds2480B => "ds2480b",
        })
    }
}

/// Decoded reply to a bus reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetStatus {
    /// Which chip generation answered.
    pub version: ChipVersion,
    /// The reply's low two bits: presence information for the caller.
    pub status: u8,
}

impl<T: Transport> Ds2480<T> {
    /// One framed exchange with the chip.
    ///
    /// Prepends the mode marker when `mode` differs from the remembered chip
    /// mode, discards stale input, writes the frame and blocks until `rx` is
    /// filled. A failed read leaves the chip mid-frame in an unknown state,
    /// so it triggers one [`resync`](Ds2480::resync) before the transport
    /// error is surfaced.
    pub(crate) fn transact(
        &mut self,
        mode: ChipMode,
        tx: &[u8],
        rx: &mut [u8],
    ) -> OneWireResult<(), T::Error> {
        let mut frame = Vec::with_capacity(tx.len() + 1);
        if mode != self.chip_mode {
            frame.push(mode.marker());
            self.chip_mode = mode;
        }
        frame.extend_from_slice(tx);

        self.transport.flush()?;
        trace!("tx {frame:02x?}");
        self.transport.write_all(&frame)?;
        if let Err(err) = self.transport.read_full(rx) {
            self.resync();
            return Err(OneWireError::Transport(err));
        }
        trace!("rx {rx:02x?}");
        Ok(())
    }

    /// Re-detect the chip after a garbled exchange.
    ///
    /// Best effort and single shot: failures are logged, never surfaced, and
    /// nothing is retried. Resynchronization repairs future calls; the call
    /// that observed the garble still returns its original error.
    pub fn resync(&mut self) {
        match self.detect() {
            Ok(true) => debug!("adapter resynchronized"),
            Ok(false) => warn!("adapter did not answer the resynchronization probe"),
            Err(_) => warn!("resynchronization failed on the transport"),
        }
    }
}

impl<T: Transport> Adapter for Ds2480<T> {
    type Status = ResetStatus;
    type BusError = T::Error;

    /// Force the chip to its post-break baseline and probe for it.
    ///
    /// Drops the line to 9600/8N1, sends a break and a wake-up reset byte
    /// (which the chip uses for calibration and does not answer), then
    /// writes the five-byte probe: slew-rate, write-1 and write-0
    /// configuration, a baud read-back request and a single-bit write. The
    /// chip is present when the read-back matches the configured baud code
    /// and the bit-write echo matches on its top six bits.
    fn detect(&mut self) -> OneWireResult<bool, T::Error> {
        // A break drops the chip back to 9600 baud, command mode, flexible
        // speed; remember that before touching the wire.
        self.chip_mode = ChipMode::Command;
        self.chip_baud = 0;
        self.chip_speed = Speed::Flexible.code();

        self.transport.update_line(&BREAK_BASELINE)?;
        self.transport.send_break()?;
        thread::sleep(SETTLE);
        self.transport.flush()?;

        self.transport
            .write_all(&[CMD_RESET | self.config.speed_bits()])?;
        thread::sleep(SETTLE);

        let probe = [
            self.config.config_write(Parameter::PulldownSlewRate),
            self.config.config_write(Parameter::WriteOneLowTime),
            self.config.config_write(Parameter::WriteZeroRecovery),
            EncodedConfig::config_read(Parameter::Baud),
            CMD_WRITE_BIT | 1 << 4 | self.config.speed_bits() | self.config.spu_bit(),
        ];
        self.transport.write_all(&probe)?;

        let mut reply = [0u8; 5];
        self.transport.read_full(&mut reply)?;
        trace!("detect probe {probe:02x?} -> {reply:02x?}");

        let present = reply[3] == self.config.code(Parameter::Baud)
            && reply[4] & 0xfc == probe[4] & 0xfc;
        if present {
            debug!(
                "bridge answered at the break baseline (speed code {}, baud code {})",
                self.chip_speed, self.chip_baud
            );
        }
        Ok(present)
    }

    /// Reset the bus and decode the chip's status reply.
    fn reset(&mut self) -> OneWireResult<ResetStatus, T::Error> {
        let mut rx = [0u8; 1];
        self.transact(
            ChipMode::Command,
            &[CMD_RESET | self.config.speed_bits()],
            &mut rx,
        )?;

        let reply = ResetReply::from_bits(rx[0]);
        if reply.chip_rev() & 0x3 != 0x3 {
            self.resync();
            return Err(OneWireError::InvalidResponse);
        }
        let version = match reply.chip_rev() {
            2 => ChipVersion::Ds2480,
            3 => ChipVersion::Ds2480B,
            _ => {
                self.resync();
                return Err(OneWireError::InvalidResponse);
            }
        };
        Ok(ResetStatus {
            version,
            status: reply.bus_status(),
        })
    }

    /// One accelerated search pass.
    ///
    /// Resets the bus, then sends one frame carrying the search command,
    /// acceleration on, the 16 packed request bytes and acceleration off,
    /// with the embedded mode switches the chip requires. The 17-byte reply
    /// echoes the search command ahead of the packed response.
    fn search(&mut self, tree: u64, last_discrepancy: u8) -> OneWireResult<(u64, u8), T::Error> {
        self.reset()?;

        let request = encode_search_request(tree, last_discrepancy);
        let mut tx = [0u8; 22];
        tx[0] = CMD_SEARCH;
        tx[1] = MODE_COMMAND;
        tx[2] = CMD_SEARCH_ACCEL_ON | self.config.speed_bits();
        tx[3] = MODE_DATA;
        tx[4..20].copy_from_slice(&request);
        tx[20] = MODE_COMMAND;
        tx[21] = CMD_SEARCH_ACCEL_OFF;

        let mut rx = [0u8; 17];
        self.transact(ChipMode::Data, &tx, &mut rx)?;

        if rx[0] & CMD_SEARCH != CMD_SEARCH {
            self.resync();
            return Err(OneWireError::InvalidResponse);
        }

        let mut reply = [0u8; 16];
        reply.copy_from_slice(&rx[1..]);
        Ok(decode_search_response(&reply))
    }

    /// Exchange raw data bytes with an addressed device.
    fn txrx(&mut self, tx: &[u8], rx: &mut [u8]) -> OneWireResult<(), T::Error> {
        self.transact(ChipMode::Data, tx, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ds2480Builder;
    use crate::mock::MockTransport;
    use std::io;

    fn adapter(mock: MockTransport) -> Ds2480<MockTransport> {
        Ds2480Builder::default()
            .with_slew_rate(1370)
            .with_write_one_low(10)
            .with_write_zero_recovery(8)
            .build(mock)
            .unwrap()
    }

    /// The probe frame for the configuration above at standard speed.
    const PROBE: [u8; 5] = [0x17, 0x45, 0x5b, 0x0f, 0x91];

    fn expect_detect(mock: &mut MockTransport, reply: [u8; 5]) {
        mock.expect(&[CMD_RESET], &[]);
        mock.expect(&PROBE, &reply);
    }

    #[test]
    fn detect_probes_the_break_baseline() {
        let mut mock = MockTransport::new();
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x00, 0x91]);

        let mut adapter = adapter(mock);
        assert!(adapter.detect().unwrap());

        let mock = adapter.into_transport();
        assert!(mock.exhausted());
        assert_eq!(mock.breaks, 1);
        assert_eq!(mock.lines, vec![BREAK_BASELINE]);
    }

    #[test]
    fn detect_rejects_wrong_baud_or_echo() {
        // Read-back reports 19200 instead of the configured 9600.
        let mut mock = MockTransport::new();
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x01, 0x91]);
        assert!(!adapter(mock).detect().unwrap());

        // Echo differs in the probe's top six bits.
        let mut mock = MockTransport::new();
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x00, 0x95]);
        assert!(!adapter(mock).detect().unwrap());

        // Echo noise in the low two bits is fine.
        let mut mock = MockTransport::new();
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x00, 0x93]);
        assert!(adapter(mock).detect().unwrap());
    }

    #[test]
    fn reset_decodes_version_and_status() {
        let mut mock = MockTransport::new();
        mock.expect(&[CMD_RESET], &[0xcd]);

        let mut adapter = adapter(mock);
        let status = adapter.reset().unwrap();
        assert_eq!(status.version, ChipVersion::Ds2480B);
        assert_eq!(status.version.to_string(), "ds2480b");
        assert_eq!(status.status, 0x1);
        assert!(adapter.into_transport().exhausted());
    }

    #[test]
    fn reset_encodes_the_configured_speed() {
        let mut mock = MockTransport::new();
        mock.expect(&[CMD_RESET | 2 << 2], &[0xcd]);

        let mut adapter = Ds2480Builder::default()
            .with_speed(Speed::Overdrive)
            .build(mock)
            .unwrap();
        adapter.reset().unwrap();
        assert!(adapter.into_transport().exhausted());
    }

    #[test]
    fn garbled_reset_recovers_then_surfaces_the_error() {
        let mut mock = MockTransport::new();
        // Reply without the mandatory status bits.
        mock.expect(&[CMD_RESET], &[0x00]);
        // The engine re-detects before giving up...
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x00, 0x91]);

        let mut adapter = adapter(mock);
        assert!(matches!(
            adapter.reset(),
            Err(OneWireError::InvalidResponse)
        ));
        // ...and the recovery really went out on the wire.
        let mock = adapter.into_transport();
        assert!(mock.exhausted());
        assert_eq!(mock.breaks, 1);
    }

    #[test]
    fn unknown_chip_revision_recovers_then_surfaces_the_error() {
        let mut mock = MockTransport::new();
        // Mandatory bits set, but revision code 7 names no known chip.
        mock.expect(&[CMD_RESET], &[0x1c]);
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x00, 0x91]);

        let mut adapter = adapter(mock);
        assert!(matches!(
            adapter.reset(),
            Err(OneWireError::InvalidResponse)
        ));
        assert!(adapter.into_transport().exhausted());
    }

    #[test]
    fn search_frames_the_request_and_decodes_the_response() {
        // One device: DS18S20 at 10.450736030800.e7, discovered in
        // little-endian search order.
        let bits = u64::from_le_bytes([0x10, 0x45, 0x07, 0x36, 0x03, 0x08, 0x00, 0xe7]);

        let mut frame = vec![MODE_DATA, CMD_SEARCH, MODE_COMMAND, CMD_SEARCH_ACCEL_ON, MODE_DATA];
        frame.extend_from_slice(&encode_search_request(0, 0));
        frame.extend_from_slice(&[MODE_COMMAND, CMD_SEARCH_ACCEL_OFF]);

        let mut reply = vec![CMD_SEARCH];
        reply.extend_from_slice(&encode_search_request(bits, 64));

        let mut mock = MockTransport::new();
        mock.expect(&[CMD_RESET], &[0xcd]);
        mock.expect(&frame, &reply);

        let mut adapter = adapter(mock);
        assert_eq!(adapter.search(0, 0).unwrap(), (bits, 64));
        assert!(adapter.into_transport().exhausted());
    }

    #[test]
    fn consecutive_operations_switch_modes_only_on_change() {
        let bits = u64::from_le_bytes([0x10, 0x45, 0x07, 0x36, 0x03, 0x08, 0x00, 0xe7]);
        let reply: Vec<u8> = {
            let mut reply = vec![CMD_SEARCH];
            reply.extend_from_slice(&encode_search_request(bits, 64));
            reply
        };

        let mut mock = MockTransport::new();
        // First reset: the engine already believes the chip is in command
        // mode, so no marker.
        mock.expect(&[CMD_RESET], &[0xcd]);
        // The search frame switches to data mode.
        let mut frame = vec![MODE_DATA, CMD_SEARCH, MODE_COMMAND, CMD_SEARCH_ACCEL_ON, MODE_DATA];
        frame.extend_from_slice(&encode_search_request(0, 0));
        frame.extend_from_slice(&[MODE_COMMAND, CMD_SEARCH_ACCEL_OFF]);
        mock.expect(&frame, &reply);
        // Second pass: the engine now remembers data mode, so the reset
        // frame carries the command marker and the search frame switches
        // back again.
        mock.expect(&[MODE_COMMAND, CMD_RESET], &[0xcd]);
        let mut frame = vec![MODE_DATA, CMD_SEARCH, MODE_COMMAND, CMD_SEARCH_ACCEL_ON, MODE_DATA];
        frame.extend_from_slice(&encode_search_request(bits, 64));
        frame.extend_from_slice(&[MODE_COMMAND, CMD_SEARCH_ACCEL_OFF]);
        mock.expect(&frame, &reply);

        let mut adapter = adapter(mock);
        adapter.search(0, 0).unwrap();
        adapter.search(bits, 64).unwrap();
        assert!(adapter.into_transport().exhausted());
    }

    #[test]
    fn garbled_search_echo_recovers_then_surfaces_the_error() {
        let mut frame = vec![MODE_DATA, CMD_SEARCH, MODE_COMMAND, CMD_SEARCH_ACCEL_ON, MODE_DATA];
        frame.extend_from_slice(&encode_search_request(0, 0));
        frame.extend_from_slice(&[MODE_COMMAND, CMD_SEARCH_ACCEL_OFF]);

        let mut mock = MockTransport::new();
        mock.expect(&[CMD_RESET], &[0xcd]);
        // First reply byte lost the search-command bits.
        mock.expect(&frame, &[0u8; 17]);
        // Recovery probes the chip over the raw transport, no mode markers.
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x00, 0x91]);

        let mut adapter = adapter(mock);
        assert!(matches!(
            adapter.search(0, 0),
            Err(OneWireError::InvalidResponse)
        ));
        let mock = adapter.into_transport();
        assert!(mock.exhausted());
        assert_eq!(mock.breaks, 1);
    }

    #[test]
    fn txrx_passes_data_through() {
        let mut mock = MockTransport::new();
        mock.expect(&[MODE_DATA, 0x33], &[0x10]);
        mock.expect(&[0xbe, 0xff], &[0xaa, 0x01]);

        let mut adapter = adapter(mock);
        let mut rx = [0u8; 1];
        adapter.txrx(&[0x33], &mut rx).unwrap();
        assert_eq!(rx, [0x10]);

        let mut rx = [0u8; 2];
        adapter.txrx(&[0xbe, 0xff], &mut rx).unwrap();
        assert_eq!(rx, [0xaa, 0x01]);
        assert!(adapter.into_transport().exhausted());
    }

    #[test]
    fn short_read_recovers_then_surfaces_the_transport_error() {
        let mut mock = MockTransport::new();
        // Two bytes expected, one scripted: the read comes up short.
        mock.expect(&[MODE_DATA, 0xbe], &[0xaa]);
        expect_detect(&mut mock, [0x17, 0x45, 0x5b, 0x00, 0x91]);

        let mut adapter = adapter(mock);
        let mut rx = [0u8; 2];
        let err = adapter.txrx(&[0xbe], &mut rx).unwrap_err();
        match err {
            OneWireError::Transport(io) => {
                assert_eq!(io.kind(), io::ErrorKind::UnexpectedEof);
            }
            other => panic!("expected a transport error, got {other:?}"),
        }
        let mock = adapter.into_transport();
        assert!(mock.exhausted());
        assert_eq!(mock.breaks, 1);
    }

    #[test]
    fn transact_flushes_stale_input_before_writing() {
        let mut mock = MockTransport::new();
        mock.expect(&[MODE_DATA, 0x33], &[0x10]);

        let mut adapter = adapter(mock);
        let mut rx = [0u8; 1];
        adapter.txrx(&[0x33], &mut rx).unwrap();
        assert_eq!(adapter.into_transport().flushes, 1);
    }
}
