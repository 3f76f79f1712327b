use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::crc::Crc8;

/// The unique 64-bit ROM code of a 1-Wire device.
///
/// Canonical layout, most significant byte first:
///
/// ```text
///  MSB       LSB MSB                  LSB MSB         LSB
/// +--------------+------------------------+---------------+
/// | 8-bit family |  48-bit serial number  |   8-bit crc   |
/// +--------------+------------------------+---------------+
/// ```
///
/// The CRC byte covers the family and serial bytes in canonical order. Every
/// constructor that accepts untrusted input (text, wire bytes, search bits)
/// recomputes it and refuses a value that does not check out, so holding an
/// `Address` means holding a validated ROM code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u64);

/// Failure to construct an [`Address`] from an untrusted source.
///
/// These are local validation failures; they never involve the bus adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The text form did not have exactly three dot-separated fields.
    #[error("a ROM code reads family.serial.crc, three dot-separated fields")]
    InvalidFormat,
    /// The family field was not a one-byte hex value.
    #[error("family field is not a one-byte hex value")]
    InvalidFamily,
    /// The serial field was not a hex value of at most six bytes.
    #[error("serial field is not a hex value of at most six bytes")]
    InvalidSerial,
    /// The crc field was neither a one-byte hex value nor the `--` placeholder.
    #[error("crc field is not a one-byte hex value or `--`")]
    InvalidCrc,
    /// The byte form was not exactly eight bytes long.
    #[error("a ROM code is exactly 8 bytes, got {0}")]
    InvalidLength(usize),
    /// The stored CRC disagrees with the one computed over the ROM bytes.
    #[error("crc mismatch: stored {stored:#04x}, computed {computed:#04x}")]
    CrcMismatch {
        /// CRC byte carried by the input.
        stored: u8,
        /// CRC computed over the family and serial bytes.
        computed: u8,
    },
}

impl Address {
    /// The device family code, identifying the device type.
    pub fn family(&self) -> u8 {
        (self.0 >> 56) as u8
    }

    /// The 48-bit serial number.
    pub fn serial(&self) -> u64 {
        (self.0 >> 8) & 0xffff_ffff_ffff
    }

    /// The CRC byte covering family and serial.
    pub fn crc(&self) -> u8 {
        self.0 as u8
    }

    /// The canonical byte form: `[family, serial (big-endian), crc]`.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Create an `Address` from its canonical byte form.
    ///
    /// # Errors
    /// [`AddressError::InvalidLength`] unless `buf` is exactly 8 bytes;
    /// [`AddressError::CrcMismatch`] when the trailing CRC byte disagrees
    /// with the first seven bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; 8] = buf
            .try_into()
            .map_err(|_| AddressError::InvalidLength(buf.len()))?;
        let computed = Crc8::checksum(&bytes[..7]);
        if bytes[7] != computed {
            return Err(AddressError::CrcMismatch {
                stored: bytes[7],
                computed,
            });
        }
        Ok(Address(u64::from_be_bytes(bytes)))
    }

    /// Create an `Address` from the 64-bit accumulator of a bus search.
    ///
    /// A search discovers ROM bits least-significant first, so the
    /// accumulator holds the canonical bytes in little-endian order. The
    /// value is re-read as canonical bytes and validated like
    /// [`from_bytes`](Address::from_bytes).
    pub fn from_search_bits(bits: u64) -> Result<Self, AddressError> {
        Self::from_bytes(&bits.to_le_bytes())
    }
}

impl fmt::Display for Address {
    /// Canonical text form: `family.serial.crc`, lower-case hex, the serial
    /// zero-padded to twelve digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}.{:012x}.{:02x}",
            self.family(),
            self.serial(),
            self.crc()
        )
    }
}

fn hex_field(field: &str, max_digits: usize) -> Option<&str> {
    let ok = !field.is_empty()
        && field.len() <= max_digits
        && field.bytes().all(|b| b.is_ascii_hexdigit());
    ok.then_some(field)
}

impl FromStr for Address {
    type Err = AddressError;

    /// Parse the canonical text form.
    ///
    /// The serial accepts 1 to 12 hex digits and is left-padded with zeros.
    /// A crc field of `--` asks for the CRC to be computed instead of
    /// verified.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split('.').collect();
        if fields.len() != 3 {
            return Err(AddressError::InvalidFormat);
        }
        let (family, serial, crc) = (fields[0], fields[1], fields[2]);

        let family = hex_field(family, 2)
            .and_then(|f| u8::from_str_radix(f, 16).ok())
            .ok_or(AddressError::InvalidFamily)?;
        let serial = hex_field(serial, 12)
            .and_then(|s| u64::from_str_radix(s, 16).ok())
            .ok_or(AddressError::InvalidSerial)?;

        let value = (family as u64) << 56 | serial << 8;
        // The little-endian bytes above the empty CRC slot are the serial and
        // family in discovery order; the reversed checksum walks them
        // canonically.
        let computed = Crc8::checksum_reversed(&value.to_le_bytes()[1..]);

        if crc != "--" {
            let stored = hex_field(crc, 2)
                .and_then(|c| u8::from_str_radix(c, 16).ok())
                .ok_or(AddressError::InvalidCrc)?;
            if stored != computed {
                return Err(AddressError::CrcMismatch { stored, computed });
            }
        }

        Ok(Address(value | computed as u64))
    }
}
