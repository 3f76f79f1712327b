use log::warn;

use crate::{Adapter, Address, OneWireResult};

/// Sentinel discrepancy position meaning "no further branch to explore".
const SEARCH_EXHAUSTED: u8 = 64;

/// Hard bound on search passes per enumeration. A well-behaved bus never
/// needs more than one pass per device, and a 1-Wire tree has 64 levels;
/// this keeps a garbled chip from trapping the driver in a loop.
const MAX_SEARCH_PASSES: usize = 64;

/// Position state threaded through one full bus enumeration.
///
/// `tree` accumulates the ROM bits decided so far in discovery order and
/// `last_discrepancy` is the lowest bit position with an unexplored 1-branch
/// (64 once the tree is exhausted). The cursor only lives for the duration of
/// one enumeration; nothing about it is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchCursor {
    tree: u64,
    last_discrepancy: u8,
}

impl SearchCursor {
    /// The ROM bits decided by the passes so far.
    pub fn tree(&self) -> u64 {
        self.tree
    }

    /// The next branch position to explore, 64 when none is pending.
    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }
}

/// Driver for discovering every device on a 1-Wire bus.
///
/// Each call to [`next_device`](BusSearch::next_device) runs one adapter
/// search pass and narrows the explored subtree, so walking the search to the
/// end visits each device exactly once. A candidate whose CRC does not check
/// out is logged and skipped; one garbled device must not hide the rest of
/// the bus.
pub struct BusSearch<'a, A> {
    adapter: &'a mut A,
    cursor: SearchCursor,
    passes: usize,
    done: bool,
}

impl<'a, A> BusSearch<'a, A> {
    /// Start a fresh search over `adapter`.
    pub fn new(adapter: &'a mut A) -> Self {
        Self {
            adapter,
            cursor: SearchCursor::default(),
            passes: 0,
            done: false,
        }
    }
}

impl<A: Adapter> BusSearch<'_, A> {
    /// Discover the next device on the bus.
    ///
    /// Returns `Ok(None)` once the tree is exhausted or the pass bound is
    /// reached.
    ///
    /// # Errors
    /// Adapter errors abort the enumeration; a CRC failure on an individual
    /// candidate does not.
    pub fn next_device(&mut self) -> OneWireResult<Option<Address>, A::BusError> {
        while !self.done && self.passes < MAX_SEARCH_PASSES {
            self.passes += 1;
            let (tree, next) = self
                .adapter
                .search(self.cursor.tree, self.cursor.last_discrepancy)?;
            self.cursor = SearchCursor {
                tree,
                last_discrepancy: next,
            };
            if next >= SEARCH_EXHAUSTED {
                self.done = true;
            }
            match Address::from_search_bits(tree) {
                Ok(address) => return Ok(Some(address)),
                Err(err) => {
                    warn!("discarding search candidate {tree:#018x}: {err}");
                }
            }
        }
        Ok(None)
    }

    /// Discover every device on the bus.
    ///
    /// # Errors
    /// Propagates the first adapter error; see
    /// [`next_device`](BusSearch::next_device).
    pub fn enumerate(mut self) -> OneWireResult<Vec<Address>, A::BusError> {
        let mut devices = Vec::new();
        while let Some(address) = self.next_device()? {
            devices.push(address);
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OneWireError;
    use std::convert::Infallible;

    /// Adapter stand-in replaying a fixed sequence of search results and
    /// recording the cursor values it was driven with.
    struct ScriptedAdapter {
        script: Vec<(u64, u8)>,
        calls: Vec<(u64, u8)>,
        fail_at: Option<usize>,
    }

    impl ScriptedAdapter {
        fn new(script: Vec<(u64, u8)>) -> Self {
            Self {
                script,
                calls: Vec::new(),
                fail_at: None,
            }
        }
    }

    impl Adapter for ScriptedAdapter {
        type Status = ();
        type BusError = Infallible;

        fn detect(&mut self) -> OneWireResult<bool, Infallible> {
            Ok(true)
        }

        fn reset(&mut self) -> OneWireResult<(), Infallible> {
            Ok(())
        }

        fn search(
            &mut self,
            tree: u64,
            last_discrepancy: u8,
        ) -> OneWireResult<(u64, u8), Infallible> {
            if self.fail_at == Some(self.calls.len()) {
                return Err(OneWireError::InvalidResponse);
            }
            self.calls.push((tree, last_discrepancy));
            let step = self.calls.len() - 1;
            Ok(self.script[step.min(self.script.len() - 1)])
        }

        fn txrx(&mut self, _tx: &[u8], _rx: &mut [u8]) -> OneWireResult<(), Infallible> {
            Ok(())
        }
    }

    /// Search accumulator whose little-endian bytes are the given canonical
    /// ROM text.
    fn bits_of(text: &str) -> u64 {
        u64::from_le_bytes(text.parse::<Address>().unwrap().to_bytes())
    }

    #[test]
    fn enumerates_and_threads_the_cursor() {
        let first = bits_of("10.450736030800.e7");
        let second = bits_of("01.004507360308.18");
        let mut adapter = ScriptedAdapter::new(vec![(first, 5), (second, 64)]);

        let devices = BusSearch::new(&mut adapter).enumerate().unwrap();
        assert_eq!(
            devices,
            vec![
                "10.450736030800.e7".parse().unwrap(),
                "01.004507360308.18".parse().unwrap(),
            ]
        );
        // Each pass is driven with the previous pass's results.
        assert_eq!(adapter.calls, vec![(0, 0), (first, 5)]);
    }

    #[test]
    fn bad_crc_candidate_is_skipped_not_fatal() {
        let good = bits_of("10.450736030800.e7");
        let garbled = good ^ 0x40;
        let last = bits_of("01.004507360308.18");
        let mut adapter = ScriptedAdapter::new(vec![(good, 9), (garbled, 3), (last, 64)]);

        let devices = BusSearch::new(&mut adapter).enumerate().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].to_string(), "10.450736030800.e7");
        assert_eq!(devices[1].to_string(), "01.004507360308.18");
        // The garbled pass still advanced the cursor.
        assert_eq!(adapter.calls[2], (garbled, 3));
    }

    #[test]
    fn stops_at_the_pass_bound_on_adversarial_responses() {
        // A chip that forever reports another pending branch.
        let tree = bits_of("10.450736030800.e7");
        let mut adapter = ScriptedAdapter::new(vec![(tree, 0)]);

        let devices = BusSearch::new(&mut adapter).enumerate().unwrap();
        assert_eq!(devices.len(), 64);
        assert_eq!(adapter.calls.len(), 64);
    }

    #[test]
    fn no_devices_after_bad_candidates_terminates() {
        let good = bits_of("10.450736030800.e7");
        let mut adapter = ScriptedAdapter::new(vec![(good ^ 0x40, 64)]);

        let devices = BusSearch::new(&mut adapter).enumerate().unwrap();
        assert!(devices.is_empty());
        assert_eq!(adapter.calls.len(), 1);
    }

    #[test]
    fn adapter_errors_abort() {
        let good = bits_of("10.450736030800.e7");
        let mut adapter = ScriptedAdapter::new(vec![(good, 2)]);
        adapter.fail_at = Some(1);

        let mut search = BusSearch::new(&mut adapter);
        assert!(search.next_device().unwrap().is_some());
        assert!(matches!(
            search.next_device(),
            Err(OneWireError::InvalidResponse)
        ));
    }
}
