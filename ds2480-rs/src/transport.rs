//! Byte-stream boundary between the protocol engine and the serial line.

/// Line discipline committed onto the transport in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Bit rate in bit/s.
    pub baud: u32,
    /// Character framing, e.g. `"8N1"`.
    pub framing: &'static str,
}

/// Baseline the DS2480B falls back to after a line break.
pub const BREAK_BASELINE: LineSettings = LineSettings {
    baud: 9600,
    framing: "8N1",
};

/// A synchronous duplex byte channel to the bridge chip.
///
/// Every operation blocks until it completes or the channel fails; the
/// protocol engine adds no timeouts of its own, so a hung read blocks the
/// caller for as long as the transport's own policy allows. Closing the
/// transport from another thread is the only way to abort an exchange, and
/// must surface here as an error.
pub trait Transport {
    /// Error produced by channel operations.
    type Error;

    /// Write the whole buffer to the channel.
    fn write_all(&mut self, tx: &[u8]) -> Result<(), Self::Error>;

    /// Block until `rx` is completely filled. A short read is an error.
    fn read_full(&mut self, rx: &mut [u8]) -> Result<(), Self::Error>;

    /// Discard any input queued on the channel.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Hold the line in break state long enough for the chip to notice.
    fn send_break(&mut self) -> Result<(), Self::Error>;

    /// Commit new line settings onto the channel.
    fn update_line(&mut self, line: &LineSettings) -> Result<(), Self::Error>;
}
