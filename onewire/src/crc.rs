/// Dallas/Maxim CRC-8 accumulator used to validate 1-Wire ROM codes.
///
/// Polynomial x^8 + x^5 + x^4 + 1, bit-reflected, zero initial value.
#[derive(Debug, Default)]
pub struct Crc8(u8);

impl Crc8 {
    /// Get the current CRC value.
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with one incoming byte.
    pub fn update(&mut self, byte: u8) {
        let mut crc = self.0 ^ byte;
        for _ in 0..8 {
            if crc & 0x1 == 0x1 {
                crc = (crc >> 1) ^ 0x8c;
            } else {
                crc >>= 1;
            }
        }
        self.0 = crc;
    }

    /// Checksum of `bytes` in the order given.
    pub fn checksum(bytes: &[u8]) -> u8 {
        let mut crc = Crc8::default();
        for &byte in bytes {
            crc.update(byte);
        }
        crc.0
    }

    /// Checksum of `bytes` taken back-to-front.
    ///
    /// Bus searches deliver a ROM code least-significant byte first, so the
    /// significant bytes arrive in the reverse of their canonical order. For
    /// any buffer `b`, `checksum_reversed(b)` equals `checksum` of the same
    /// bytes re-ordered canonically.
    pub fn checksum_reversed(bytes: &[u8]) -> u8 {
        let mut crc = Crc8::default();
        for &byte in bytes.iter().rev() {
            crc.update(byte);
        }
        crc.0
    }

    /// Validate a sequence whose last byte is the CRC of the preceding bytes.
    ///
    /// Folding the stored CRC into the accumulator leaves zero when it agrees
    /// with the data.
    pub fn validate(sequence: &[u8]) -> bool {
        Self::checksum(sequence) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn known_rom_checksums() {
        // DS18S20 with serial 450736030800.
        assert_eq!(
            Crc8::checksum(&[0x10, 0x45, 0x07, 0x36, 0x03, 0x08, 0x00]),
            0xe7
        );
        assert_eq!(
            Crc8::checksum(&[0x01, 0x00, 0x45, 0x07, 0x36, 0x03, 0x08]),
            0x18
        );
    }

    #[test]
    fn trailing_crc_validates() {
        assert!(Crc8::validate(&[
            0x10, 0x45, 0x07, 0x36, 0x03, 0x08, 0x00, 0xe7
        ]));
        assert!(!Crc8::validate(&[
            0x10, 0x45, 0x07, 0x36, 0x03, 0x08, 0x00, 0x09
        ]));
        assert!(Crc8::validate(&[]));
    }

    #[test]
    fn incremental_matches_oneshot() {
        let bytes = [0x28, 0xff, 0x1c, 0x6e, 0x00, 0x16, 0x04];
        let mut crc = Crc8::default();
        for &byte in &bytes {
            crc.update(byte);
        }
        assert_eq!(crc.value(), Crc8::checksum(&bytes));
    }

    #[test]
    fn reversed_checksum_equals_forward_of_reversed_bytes() {
        let mut rng = rand::rng();
        // Every length from empty through a full ROM code, odd lengths
        // included; the equivalence must not depend on byte-count parity.
        for len in 0..=8 {
            for _ in 0..256 {
                let mut bytes = vec![0u8; len];
                rng.fill(bytes.as_mut_slice());
                let mut flipped = bytes.clone();
                flipped.reverse();
                assert_eq!(
                    Crc8::checksum_reversed(&bytes),
                    Crc8::checksum(&flipped),
                    "length {len}, bytes {bytes:02x?}"
                );
            }
        }
    }
}
