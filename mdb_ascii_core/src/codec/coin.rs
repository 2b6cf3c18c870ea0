use crate::codec::line::{classify, hex_digit, ResponseLine};
use crate::common::route::CoinRoute;

/// Maximum coin frames one poll response can carry (16 payload bytes).
pub const MAX_COIN_FRAMES: usize = 8;

/// One 16-bit coin event frame from a coin poll response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinFrame {
    /// Where the coin went.
    pub route: CoinRoute,
    /// Coin-type index (0..=15) into the discovered coin table.
    pub coin_type: u8,
    /// Raw frame value, kept for diagnostics.
    pub raw: u16,
}

/// Decodes every coin frame contained in a coin poll response (`R,0B`).
///
/// The payload is a stream of 4-hex-digit frames; separator or noise
/// characters between digits are ignored and frames are taken from
/// non-overlapping windows in order. For each frame the high byte holds
/// the routing nibble (top) and the coin-type index (bottom); the low
/// byte is device-specific and ignored. Non-`p,` lines yield no frames.
#[must_use]
pub fn parse_coin_stream(line: &str) -> heapless::Vec<CoinFrame, MAX_COIN_FRAMES> {
    let mut frames = heapless::Vec::new();

    let ResponseLine::Polled(payload) = classify(line) else {
        return frames;
    };

    let digits: Vec<u8> = payload
        .bytes()
        .filter(u8::is_ascii_hexdigit)
        .collect();

    for window in digits.chunks_exact(4) {
        let mut raw: u16 = 0;
        for &digit in window {
            let Some(value) = hex_digit(digit) else {
                return frames;
            };
            raw = (raw << 4) | u16::from(value);
        }

        #[allow(clippy::cast_possible_truncation)]
        let high = (raw >> 8) as u8;
        let frame = CoinFrame {
            route: CoinRoute::from((high >> 4) & 0x0F),
            coin_type: high & 0x0F,
            raw,
        };
        if frames.push(frame).is_err() {
            break;
        }
    }

    frames
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_to_tube() {
        let frames = parse_coin_stream("p,5112");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].route, CoinRoute::ToTube);
        assert_eq!(frames[0].coin_type, 1);
        assert_eq!(frames[0].raw, 0x5112);
    }

    #[test]
    fn multiple_frames_in_decoded_order() {
        let frames = parse_coin_stream("p,511291124803");
        let routes: Vec<_> = frames.iter().map(|f| f.route).collect();
        assert_eq!(
            routes,
            vec![CoinRoute::ToTube, CoinRoute::Dispensed, CoinRoute::ToCashbox]
        );
        assert_eq!(frames[2].coin_type, 8);
    }

    #[test]
    fn noise_between_digits_is_ignored() {
        let frames = parse_coin_stream("p,51,12 xx91--12");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].raw, 0x5112);
        assert_eq!(frames[1].raw, 0x9112);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let frames = parse_coin_stream("p,5112911");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw, 0x5112);
    }

    #[test]
    fn non_polled_lines_yield_nothing() {
        assert!(parse_coin_stream("").is_empty());
        assert!(parse_coin_stream("p,ACK").is_empty());
        assert!(parse_coin_stream("d,STATUS").is_empty());
        assert!(parse_coin_stream("c,R,0B").is_empty());
    }

    #[test]
    fn unknown_route_nibbles_are_preserved() {
        let frames = parse_coin_stream("p,7312");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].route, CoinRoute::Unknown(0x7));
    }
}
