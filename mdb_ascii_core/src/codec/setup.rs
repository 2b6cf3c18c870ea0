use crate::codec::line::{classify, hex_payload_bytes, ResponseLine};
use crate::common::coin_table::{CoinTypeTable, COIN_TYPE_COUNT};

/// Offset of the decimal-places byte inside a setup response block.
pub const SETUP_DECIMAL_PLACES_OFFSET: usize = 6;

/// Credit byte marking an unpopulated coin-type slot.
const CREDIT_ABSENT: u8 = 0x00;
const CREDIT_INVALID: u8 = 0xFF;

/// Decodes a setup response block and returns the currency's decimal
/// places (byte 6), or `None` when the payload is too short.
#[must_use]
pub fn parse_setup(line: &str) -> Option<u8> {
    let ResponseLine::Polled(payload) = classify(line) else {
        return None;
    };
    hex_payload_bytes(payload)
        .get(SETUP_DECIMAL_PLACES_OFFSET)
        .copied()
}

/// Decodes the changer's COIN TYPE response (`R,09`) into a
/// [`CoinTypeTable`].
///
/// Layout: byte 3 is the scaling factor (zero means 1), byte 4 the
/// decimal places, and the trailing sixteen bytes are the per-type credit
/// values. A credit of `0x00` or `0xFF` leaves the slot unpopulated;
/// anything else becomes `credit × scaling` minor units. Returns `None`
/// when the payload cannot hold the credit table.
#[must_use]
pub fn parse_coin_type_config(line: &str) -> Option<CoinTypeTable> {
    let ResponseLine::Polled(payload) = classify(line) else {
        return None;
    };

    let bytes = hex_payload_bytes(payload);
    if bytes.len() < 5 + COIN_TYPE_COUNT {
        return None;
    }

    let scaling = match bytes[3] {
        0 => 1,
        factor => u32::from(factor),
    };
    let decimal_places = bytes[4];

    let mut table = CoinTypeTable::new(scaling, decimal_places);
    let credits = &bytes[bytes.len() - COIN_TYPE_COUNT..];
    for (index, &credit) in credits.iter().enumerate() {
        if credit == CREDIT_ABSENT || credit == CREDIT_INVALID {
            continue;
        }
        #[allow(clippy::cast_possible_truncation)] // index < COIN_TYPE_COUNT
        table.set(index as u8, u32::from(credit) * scaling);
    }

    Some(table)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn setup_decimal_places_at_offset_six() {
        assert_eq!(parse_setup("p,00000000000002"), Some(2));
        assert_eq!(parse_setup("p,01020304050603"), Some(3));
    }

    #[test]
    fn setup_too_short_or_wrong_class() {
        assert_eq!(parse_setup("p,000000"), None);
        assert_eq!(parse_setup(""), None);
        assert_eq!(parse_setup("p,ACK"), None);
        assert_eq!(parse_setup("d,STATUS"), None);
    }

    #[test]
    fn coin_config_builds_scaled_table() {
        // scaling 10, 2 decimals, credits 1,2,5,10,20,50 then empty slots
        let line = "p,0000000A020102050A143200000000000000000000";
        let table = parse_coin_type_config(line).unwrap();
        assert_eq!(table.scaling(), 10);
        assert_eq!(table.decimal_places(), 2);
        assert_eq!(table.denomination(0), Some(10));
        assert_eq!(table.denomination(1), Some(20));
        assert_eq!(table.denomination(2), Some(50));
        assert_eq!(table.denomination(3), Some(100));
        assert_eq!(table.denomination(4), Some(200));
        assert_eq!(table.denomination(5), Some(500));
        assert_eq!(table.denomination(6), None);
    }

    #[test]
    fn zero_scaling_defaults_to_one() {
        let line = "p,00000000020102050A143200000000000000000000";
        let table = parse_coin_type_config(line).unwrap();
        assert_eq!(table.scaling(), 1);
        assert_eq!(table.denomination(0), Some(1));
    }

    #[test]
    fn invalid_credits_leave_slots_empty() {
        let line = "p,0000000A02FF02050A143200000000000000000000";
        let table = parse_coin_type_config(line).unwrap();
        assert_eq!(table.denomination(0), None);
        assert_eq!(table.denomination(1), Some(20));
    }

    #[test]
    fn short_payload_is_rejected() {
        assert_eq!(parse_coin_type_config("p,0000000A02"), None);
        assert_eq!(parse_coin_type_config(""), None);
    }
}
