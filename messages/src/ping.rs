//! Ping frames: `<unixTimestampMillis>!<localHeight>` as ASCII text.

use crate::error::DecodeError;

const MAX_TIMESTAMP_DIGITS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ping {
    /// Sender's wall clock at send time, Unix milliseconds.
    pub timestamp: u64,
    /// Sender's chain height.
    pub height: u64,
}

impl Ping {
    pub fn new(timestamp: u64, height: u64) -> Self {
        Self { timestamp, height }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}!{}", self.timestamp, self.height).into_bytes()
    }

    /// Whether the frame has ping shape: 1 to 32 digits, `!`, 1 or more digits.
    pub fn matches(frame: &[u8]) -> bool {
        let Some(bang) = frame.iter().position(|&b| b == b'!') else {
            return false;
        };
        let (ts, rest) = (&frame[..bang], &frame[bang + 1..]);
        (1..=MAX_TIMESTAMP_DIGITS).contains(&ts.len())
            && !rest.is_empty()
            && ts.iter().all(u8::is_ascii_digit)
            && rest.iter().all(u8::is_ascii_digit)
    }

    pub fn parse(frame: &[u8]) -> Result<Self, DecodeError> {
        if !Self::matches(frame) {
            return Err(DecodeError::MalformedPing("not a ping frame".into()));
        }
        // matches() guarantees ASCII digits around a single '!'
        let text = std::str::from_utf8(frame)
            .map_err(|e| DecodeError::MalformedPing(e.to_string()))?;
        let (ts, h) = text
            .split_once('!')
            .ok_or_else(|| DecodeError::MalformedPing("missing separator".into()))?;
        let timestamp = ts
            .parse()
            .map_err(|_| DecodeError::MalformedPing(format!("timestamp out of range: {ts}")))?;
        let height = h
            .parse()
            .map_err(|_| DecodeError::MalformedPing(format!("height out of range: {h}")))?;
        Ok(Self { timestamp, height })
    }
}
