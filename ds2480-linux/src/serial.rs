//! `serialport`-backed [`Transport`] implementation.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use ds2480::{LineSettings, Transport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

/// How long reads may wait on the port before the OS gives up for us. The
/// protocol engine itself never times out; this is the transport's policy.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Hold time for the line break that resets the chip's UART state.
const BREAK_HOLD: Duration = Duration::from_millis(2);

/// A serial port channel to a DS2480B bridge.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at the 9600/8N1 baseline the bridge wakes up in.
    pub fn open(path: &str) -> serialport::Result<Self> {
        let port = serialport::new(path, 9600)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        log::debug!("opened {path} at 9600/8N1");
        Ok(Self { port })
    }
}

fn parse_framing(framing: &str) -> io::Result<(DataBits, Parity, StopBits)> {
    match framing {
        "8N1" => Ok((DataBits::Eight, Parity::None, StopBits::One)),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported framing {other:?}"),
        )),
    }
}

impl Transport for SerialTransport {
    type Error = io::Error;

    fn write_all(&mut self, tx: &[u8]) -> io::Result<()> {
        self.port.write_all(tx)?;
        self.port.flush()
    }

    fn read_full(&mut self, rx: &mut [u8]) -> io::Result<()> {
        self.port.read_exact(rx)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn send_break(&mut self) -> io::Result<()> {
        self.port.set_break().map_err(io::Error::from)?;
        thread::sleep(BREAK_HOLD);
        self.port.clear_break().map_err(io::Error::from)
    }

    fn update_line(&mut self, line: &LineSettings) -> io::Result<()> {
        let (data_bits, parity, stop_bits) = parse_framing(line.framing)?;
        self.port.set_baud_rate(line.baud).map_err(io::Error::from)?;
        self.port.set_data_bits(data_bits).map_err(io::Error::from)?;
        self.port.set_parity(parity).map_err(io::Error::from)?;
        self.port.set_stop_bits(stop_bits).map_err(io::Error::from)
    }
}
