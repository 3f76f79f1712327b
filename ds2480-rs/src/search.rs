//! Bit-packed request/response codec for the chip's accelerated search.
//!
//! With search acceleration on, the chip runs the per-bit read/read/write
//! cycles of a ROM search internally and trades 16-byte bit-packed buffers
//! with the host instead: two packed bits per ROM bit position. In the
//! response, packed bit `2*i + 1` is the ROM bit the chip settled on for
//! position `i` and packed bit `2*i` is the discrepancy flag, set where
//! devices drove both bit values. The request mirrors the layout, replaying
//! the ROM bits decided on earlier passes together with one discrepancy
//! marker at the branch position this pass must take.
//!
//! The two functions here are pure inverses of each other; the tests hold
//! them to an exact round trip.

/// Pack the accumulated ROM bits and the pending branch position into a
/// search request.
///
/// ROM bit `i` of `tree` lands at packed bit `2*i + 1` for every position up
/// to and including `last_discrepancy`; bits above the branch point stay
/// clear so the chip explores them fresh. A `last_discrepancy` of 64 means
/// no branch is pending and the whole tree is replayed unmarked.
pub fn encode_search_request(tree: u64, last_discrepancy: u8) -> [u8; 16] {
    let mut data = [0u8; 16];
    let decided = if last_discrepancy < 64 {
        last_discrepancy as usize + 1
    } else {
        64
    };
    for position in 0..decided {
        if tree >> position & 1 == 1 {
            set_bit(&mut data, 2 * position + 1);
        }
    }
    if last_discrepancy < 64 {
        set_bit(&mut data, 2 * last_discrepancy as usize);
    }
    data
}

/// Unpack a search response into the discovered ROM bits and the next
/// pending branch position.
///
/// The next discrepancy is the lowest position whose discrepancy flag is
/// set, or 64 when the response leaves no branch to explore.
pub fn decode_search_response(data: &[u8; 16]) -> (u64, u8) {
    let mut tree = 0u64;
    let mut next_discrepancy = 64u8;
    for position in 0..64 {
        if bit(data, 2 * position + 1) {
            tree |= 1 << position;
        }
        if bit(data, 2 * position) && next_discrepancy == 64 {
            next_discrepancy = position as u8;
        }
    }
    (tree, next_discrepancy)
}

fn set_bit(data: &mut [u8; 16], index: usize) {
    data[index / 8] |= 1 << (index % 8);
}

fn bit(data: &[u8; 16], index: usize) -> bool {
    data[index / 8] >> (index % 8) & 1 == 1
}
