use crate::OneWireResult;

/// A bus adapter: the bridge between the host and the 1-Wire line.
///
/// Implementations own whatever transport and session state the bridge chip
/// needs. All operations are synchronous and take `&mut self`; a chip is a
/// half-duplex state machine, so callers must serialize access to one adapter
/// and never overlap operations on it.
pub trait Adapter {
    /// Status information returned by a bus reset.
    type Status;
    /// The error type of the underlying byte transport.
    type BusError;

    /// Probe for the adapter chip and force it into a known protocol state.
    ///
    /// Returns whether a chip answered the probe. This doubles as the
    /// resynchronization primitive: it is safe to call whenever the protocol
    /// state is suspected corrupt.
    ///
    /// # Errors
    /// Fails only when the transport itself fails; an absent chip is
    /// `Ok(false)`.
    fn detect(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Reset the 1-Wire bus and report the chip's status.
    ///
    /// # Errors
    /// Fails when the transport fails or the chip's reply is garbled.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Run one pass of the accelerated ROM search.
    ///
    /// `tree` holds the ROM bits decided on previous passes and
    /// `last_discrepancy` the bit position whose 1-branch this pass must
    /// take (64 when no branch is pending). Returns the full 64-bit pattern
    /// discovered by this pass and the next pending branch position, again
    /// with 64 meaning the bus is exhausted.
    ///
    /// The returned bits are in discovery order, least-significant bit
    /// first; see [`Address::from_search_bits`](crate::Address::from_search_bits).
    ///
    /// # Errors
    /// Fails when the transport fails or the chip's reply is garbled.
    fn search(
        &mut self,
        tree: u64,
        last_discrepancy: u8,
    ) -> OneWireResult<(u64, u8), Self::BusError>;

    /// Exchange raw data bytes with the bus.
    ///
    /// Writes all of `tx` and blocks until `rx` is filled. This is the
    /// primitive device protocols build on once a device has been addressed.
    ///
    /// # Errors
    /// Fails when the transport fails.
    fn txrx(&mut self, tx: &[u8], rx: &mut [u8]) -> OneWireResult<(), Self::BusError>;
}
