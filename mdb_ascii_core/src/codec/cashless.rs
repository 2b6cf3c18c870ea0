use crate::codec::line::{classify, hex_payload_bytes, ResponseLine};

/// Outcome of one cashless poll (`C,62`) during an open vend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashlessPoll {
    /// `p,01` — the reader approved the vend; the session is finished.
    Approved,
    /// `p,02` — the reader denied the vend; the session is finished.
    Denied,
    /// Anything else — keep polling.
    Pending,
}

impl CashlessPoll {
    /// `true` once the reader has reached a terminal outcome.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Approved | Self::Denied)
    }
}

/// Decodes a cashless poll response.
#[must_use]
pub fn parse_cashless_poll(line: &str) -> CashlessPoll {
    let ResponseLine::Polled(payload) = classify(line) else {
        return CashlessPoll::Pending;
    };

    match hex_payload_bytes(payload).as_slice() {
        [0x01] => CashlessPoll::Approved,
        [0x02] => CashlessPoll::Denied,
        _ => CashlessPoll::Pending,
    }
}
