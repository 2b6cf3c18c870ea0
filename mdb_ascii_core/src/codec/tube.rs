use std::collections::BTreeMap;

use crate::codec::line::{classify, hex_payload_bytes, CodecError, ResponseLine};
use crate::common::coin_table::{CoinTypeTable, COIN_TYPE_COUNT};

/// Minimum payload length of a tube status response: the two-byte
/// fullness bitmap plus at least one per-type count.
pub const MIN_TUBE_STATUS_BYTES: usize = 3;

/// Per-type count the changer uses for "sensor sees coins but count is
/// not usable"; treated as an empty tube.
pub const TUBE_COUNT_UNUSABLE: u8 = 0xFF;

/// Decodes a tube status response (`R,0A`) into a denomination → count
/// map.
///
/// The first two payload bytes are the tube-full bitmap and are skipped;
/// up to sixteen per-type count bytes follow. Zero and `0xFF` counts
/// yield no entry, as do coin types absent from the discovered table.
///
/// # Errors
///
/// [`CodecError::NotPolledData`] when the line is not a `p,` payload,
/// [`CodecError::PayloadTooShort`] when fewer than three bytes decode.
pub fn parse_tube_status(
    line: &str,
    coins: &CoinTypeTable,
) -> Result<BTreeMap<u32, u32>, CodecError> {
    let ResponseLine::Polled(payload) = classify(line) else {
        return Err(CodecError::NotPolledData);
    };

    let bytes = hex_payload_bytes(payload);
    if bytes.len() < MIN_TUBE_STATUS_BYTES {
        return Err(CodecError::PayloadTooShort {
            expected: MIN_TUBE_STATUS_BYTES,
            actual: bytes.len(),
        });
    }

    let mut tubes = BTreeMap::new();
    for (index, &count) in bytes[2..].iter().take(COIN_TYPE_COUNT).enumerate() {
        if count == 0 || count == TUBE_COUNT_UNUSABLE {
            continue;
        }
        #[allow(clippy::cast_possible_truncation)] // index < COIN_TYPE_COUNT
        let Some(denomination) = coins.denomination(index as u8) else {
            continue;
        };
        *tubes.entry(denomination).or_insert(0) += u32::from(count);
    }

    Ok(tubes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn coins() -> CoinTypeTable {
        let mut table = CoinTypeTable::new(10, 2);
        table.set(0, 10);
        table.set(1, 20);
        table.set(2, 50);
        table
    }

    #[test]
    fn decodes_per_type_counts() {
        let tubes = parse_tube_status("p,0000050301", &coins()).unwrap();
        assert_eq!(tubes, BTreeMap::from([(10, 5), (20, 3), (50, 1)]));
    }

    #[test]
    fn zero_and_unusable_counts_are_skipped() {
        let tubes = parse_tube_status("p,0000FF0005", &coins()).unwrap();
        assert_eq!(tubes, BTreeMap::from([(50, 5)]));
    }

    #[test]
    fn unknown_coin_types_are_skipped() {
        // Only three types are mapped; counts beyond them are dropped.
        let tubes = parse_tube_status("p,000001010101", &coins()).unwrap();
        assert_eq!(tubes, BTreeMap::from([(10, 1), (20, 1), (50, 1)]));
    }

    #[test]
    fn short_payload_is_rejected() {
        assert_eq!(
            parse_tube_status("p,0000", &coins()),
            Err(CodecError::PayloadTooShort {
                expected: MIN_TUBE_STATUS_BYTES,
                actual: 2
            })
        );
    }

    #[test]
    fn non_polled_lines_are_rejected() {
        assert_eq!(parse_tube_status("", &coins()), Err(CodecError::NotPolledData));
        assert_eq!(
            parse_tube_status("d,STATUS", &coins()),
            Err(CodecError::NotPolledData)
        );
    }
}
