//! Block-height/transaction-index "timestamps".
//!
//! AT timestamps are not wall-clock times: the high 32 bits hold a block
//! height and the low 32 bits the index of a transaction within that block
//! (zero for block-level values).

/// Decomposed AT timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Timestamp {
    pub block_height: u32,
    pub transaction_index: u32,
}

impl Timestamp {
    pub fn new(block_height: u32, transaction_index: u32) -> Self {
        Self {
            block_height,
            transaction_index,
        }
    }

    /// Splits a packed 64-bit timestamp.
    pub fn from_long(value: i64) -> Self {
        Self {
            block_height: (value >> 32) as u32,
            transaction_index: value as u32,
        }
    }

    /// Packs a height and transaction index into the 64-bit wire form.
    pub fn to_long(block_height: u32, transaction_index: u32) -> i64 {
        ((block_height as i64) << 32) | transaction_index as i64
    }

    /// Returns this timestamp in the packed 64-bit wire form.
    pub fn as_long(&self) -> i64 {
        Self::to_long(self.block_height, self.transaction_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_height_into_high_bits() {
        assert_eq!(Timestamp::to_long(1, 0), 1 << 32);
        assert_eq!(Timestamp::to_long(0, 7), 7);
        assert_eq!(Timestamp::to_long(5, 3), (5 << 32) | 3);
    }

    #[test]
    fn round_trips() {
        let ts = Timestamp::new(123_456, 42);
        assert_eq!(Timestamp::from_long(ts.as_long()), ts);
    }

    #[test]
    fn high_height_does_not_bleed_into_index() {
        let ts = Timestamp::from_long(Timestamp::to_long(u32::MAX, u32::MAX));
        assert_eq!(ts.block_height, u32::MAX);
        assert_eq!(ts.transaction_index, u32::MAX);
    }
}
