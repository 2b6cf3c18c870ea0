use thiserror::Error;

/// Decoding failure for a well-formed line with unusable semantics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("response is not polled data")]
    NotPolledData,
    #[error("payload too short: {actual} bytes, need {expected}")]
    PayloadTooShort { expected: usize, actual: usize },
}

/// Classification of one response line from the bridge.
///
/// The first character of a response names its class: `p,` polled data,
/// `d,` diagnostic text, `c,` command echo. `p,ACK` is the generic
/// acknowledgement and an empty line is a read timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLine<'a> {
    /// `p,ACK` — command acknowledged.
    Ack,
    /// `p,<hex>` — polled data payload.
    Polled(&'a str),
    /// `d,<text>` — diagnostic or status text.
    Diagnostic(&'a str),
    /// `c,<text>` — command echo.
    Echo(&'a str),
    /// Empty line — the link's read timed out.
    Empty,
    /// Anything else.
    Other(&'a str),
}

/// Classifies a trimmed response line.
#[must_use]
pub fn classify(line: &str) -> ResponseLine<'_> {
    if line.is_empty() {
        return ResponseLine::Empty;
    }
    if let Some(payload) = line.strip_prefix("p,") {
        if payload.eq_ignore_ascii_case("ACK") {
            return ResponseLine::Ack;
        }
        return ResponseLine::Polled(payload);
    }
    if let Some(text) = line.strip_prefix("d,") {
        return ResponseLine::Diagnostic(text);
    }
    if let Some(text) = line.strip_prefix("c,") {
        return ResponseLine::Echo(text);
    }
    ResponseLine::Other(line)
}

/// `true` when the line is the generic `p,ACK` acknowledgement.
#[must_use]
pub fn is_ack(line: &str) -> bool {
    matches!(classify(line), ResponseLine::Ack)
}

/// Extracts payload bytes from an ASCII-hex payload, ignoring any
/// separator or noise characters. A trailing unpaired digit is dropped.
#[must_use]
pub fn hex_payload_bytes(payload: &str) -> Vec<u8> {
    let digits: Vec<u8> = payload
        .bytes()
        .filter(u8::is_ascii_hexdigit)
        .collect();

    digits
        .chunks_exact(2)
        .filter_map(|pair| {
            let high = hex_digit(pair[0])?;
            let low = hex_digit(pair[1])?;
            Some((high << 4) | low)
        })
        .collect()
}

pub(crate) fn hex_digit(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}
