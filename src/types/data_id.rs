//! Transfer identifiers

use std::fmt;

/// Identifier of one transfer, always within `1..=250`.
///
/// `0` and `251..=255` are reserved for out-of-band use and are never handed
/// out by [`DataIdCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(u8);

impl DataId {
    /// Lowest assignable id.
    pub const MIN: u8 = 1;
    /// Highest assignable id.
    pub const MAX: u8 = 250;

    /// Wrap a raw value, rejecting reserved ids.
    pub fn new(raw: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&raw).then_some(Self(raw))
    }

    /// The raw wire value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether a raw byte falls in the reserved range.
    pub fn is_reserved(raw: u8) -> bool {
        !(Self::MIN..=Self::MAX).contains(&raw)
    }

    fn successor(self) -> Self {
        if self.0 >= Self::MAX { Self(Self::MIN) } else { Self(self.0 + 1) }
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic transfer id source: `1, 2, ..., 250, 1, 2, ...`.
#[derive(Debug, Clone, Default)]
pub struct DataIdCounter {
    last: Option<DataId>,
}

impl DataIdCounter {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Advance and return the id for the next transfer.
    pub fn next_id(&mut self) -> DataId {
        let next = match self.last {
            Some(id) => id.successor(),
            None => DataId(DataId::MIN),
        };
        self.last = Some(next);
        next
    }

    /// The id most recently handed out, if any.
    pub fn last(&self) -> Option<DataId> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_at_one_and_wraps_after_250() {
        let mut counter = DataIdCounter::new();
        let ids: Vec<u8> = (0..251).map(|_| counter.next_id().get()).collect();
        assert_eq!(ids[0], 1);
        assert_eq!(ids[249], 250);
        assert_eq!(ids[250], 1);
    }

    #[test]
    fn reserved_values_are_rejected() {
        assert!(DataId::new(0).is_none());
        for raw in 251..=255u8 {
            assert!(DataId::new(raw).is_none());
            assert!(DataId::is_reserved(raw));
        }
        assert_eq!(DataId::new(250).map(DataId::get), Some(250));
    }

    proptest! {
        #[test]
        fn never_yields_reserved_ids(transfers in 1usize..2000) {
            let mut counter = DataIdCounter::new();
            let mut previous = 0u8;
            for _ in 0..transfers {
                let id = counter.next_id().get();
                prop_assert!(!DataId::is_reserved(id));
                if previous == DataId::MAX {
                    prop_assert_eq!(id, DataId::MIN);
                } else {
                    prop_assert_eq!(id, previous + 1);
                }
                previous = id;
            }
        }
    }
}
