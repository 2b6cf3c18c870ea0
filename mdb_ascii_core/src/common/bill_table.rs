/// Number of banknote channels the validator reports.
pub const BILL_TYPE_COUNT: usize = 6;

/// Ordered banknote denomination table, indexed by the validator's
/// bill-type channel (0..=5).
///
/// Values are minor currency units. The table comes from configuration
/// rather than device discovery; a poll frame whose type index falls
/// outside the table is not a credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillTable {
    denominations: [u32; BILL_TYPE_COUNT],
}

impl BillTable {
    /// Builds a table from the configured channel values.
    #[must_use]
    pub const fn new(denominations: [u32; BILL_TYPE_COUNT]) -> Self {
        Self { denominations }
    }

    /// Denomination for a bill-type channel, or `None` when the index is
    /// out of range.
    #[must_use]
    pub fn denomination(&self, bill_type: u8) -> Option<u32> {
        self.denominations.get(usize::from(bill_type)).copied()
    }

    /// All configured denominations in channel order.
    #[must_use]
    pub const fn denominations(&self) -> &[u32; BILL_TYPE_COUNT] {
        &self.denominations
    }
}

impl Default for BillTable {
    /// 10.00 to 500.00 in the usual banknote cascade.
    fn default() -> Self {
        Self::new([1000, 2000, 5000, 10_000, 20_000, 50_000])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_within_range() {
        let table = BillTable::default();
        assert_eq!(table.denomination(0), Some(1000));
        assert_eq!(table.denomination(5), Some(50_000));
    }

    #[test]
    fn lookup_out_of_range() {
        let table = BillTable::default();
        assert_eq!(table.denomination(6), None);
        assert_eq!(table.denomination(0xF), None);
    }
}
