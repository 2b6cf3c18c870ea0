use crate::codec::line::{classify, hex_digit, ResponseLine};
use crate::common::bill_table::BillTable;

/// Route nibble the validator reports for a banknote held in escrow.
pub const BILL_ESCROW_ROUTE: u8 = 0x9;

/// A banknote held in escrow, decoded from a bill poll response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillEscrow {
    /// Denomination in minor currency units.
    pub denomination: u32,
    /// Bill-type channel (0..=5) the validator reported.
    pub bill_type: u8,
}

/// Decodes a bill poll response (`R,33`).
///
/// The payload is a single byte: high nibble is the routing state, low
/// nibble the bill-type channel. Only route `0x9` (escrow) with a channel
/// present in `bills` is an event; empty lines, ACKs and every other
/// payload are not applicable and yield `None`.
#[must_use]
pub fn parse_bill(line: &str, bills: &BillTable) -> Option<BillEscrow> {
    let ResponseLine::Polled(payload) = classify(line) else {
        return None;
    };

    let payload = payload.as_bytes();
    if payload.len() != 2 {
        return None;
    }
    let byte = (hex_digit(payload[0])? << 4) | hex_digit(payload[1])?;

    let route = (byte >> 4) & 0x0F;
    let bill_type = byte & 0x0F;
    if route != BILL_ESCROW_ROUTE {
        return None;
    }

    bills.denomination(bill_type).map(|denomination| BillEscrow {
        denomination,
        bill_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::bill_table::BILL_TYPE_COUNT;

    #[test]
    fn escrow_frame_decodes() {
        let bills = BillTable::default();
        let escrow = parse_bill("p,90", &bills).expect("escrow frame");
        assert_eq!(escrow.denomination, 1000);
        assert_eq!(escrow.bill_type, 0);

        let escrow = parse_bill("p,92", &bills).expect("escrow frame");
        assert_eq!(escrow.denomination, 5000);
        assert_eq!(escrow.bill_type, 2);
    }

    #[test]
    fn non_escrow_lines_are_not_applicable() {
        let bills = BillTable::default();
        assert_eq!(parse_bill("", &bills), None);
        assert_eq!(parse_bill("p,ACK", &bills), None);
        assert_eq!(parse_bill("d,STATUS", &bills), None);
        // one hex digit and three hex digits are malformed
        assert_eq!(parse_bill("p,9", &bills), None);
        assert_eq!(parse_bill("p,900", &bills), None);
    }

    #[test]
    fn every_byte_decodes_iff_route_9_and_known_channel() {
        let bills = BillTable::default();
        for byte in 0..=u8::MAX {
            let line = format!("p,{byte:02X}");
            let decoded = parse_bill(&line, &bills);
            let route = (byte >> 4) & 0x0F;
            let bill_type = byte & 0x0F;
            if route == BILL_ESCROW_ROUTE && usize::from(bill_type) < BILL_TYPE_COUNT {
                let escrow = decoded.expect("valid escrow byte");
                assert_eq!(Some(escrow.denomination), bills.denomination(bill_type));
            } else {
                assert_eq!(decoded, None, "byte {byte:#04X} should not decode");
            }
        }
    }
}
