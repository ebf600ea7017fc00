//! Wildcarded byte-signature search.
//!
//! A [`Signature`] is a sequence of optional bytes: `None` matches any
//! byte at that position, `Some(b)` must match (optionally under a mask).
//! [`find`] returns the smallest index at or after `start` where the
//! signature matches, scanning at most `max_iterations` positions.

use crate::error::{EngineError, EngineResult};

/// One element of a [`Signature`]: a concrete byte to match, or a wildcard.
pub type SigByte = Option<u8>;

/// A wildcarded byte signature.
#[derive(Debug, Clone)]
pub struct Signature {
    bytes: Vec<SigByte>,
    mask: Option<Vec<u8>>,
}

impl Signature {
    /// Build a signature from literal bytes, no wildcards.
    pub fn exact(bytes: &[u8]) -> Self {
        Signature {
            bytes: bytes.iter().map(|&b| Some(b)).collect(),
            mask: None,
        }
    }

    /// Build a signature from a mix of concrete bytes and wildcards.
    pub fn new(bytes: Vec<SigByte>) -> Self {
        Signature { bytes, mask: None }
    }

    /// Attach a per-byte AND-mask; `mask.len()` must equal `bytes.len()`.
    pub fn with_mask(mut self, mask: Vec<u8>) -> Self {
        assert_eq!(
            mask.len(),
            self.bytes.len(),
            "mask must be as long as the signature"
        );
        self.mask = Some(mask);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn matches_at(&self, buffer: &[u8], i: usize) -> bool {
        for (j, sig_byte) in self.bytes.iter().enumerate() {
            let Some(expected) = sig_byte else {
                continue;
            };
            let mask = self.mask.as_ref().map_or(0xFF, |m| m[j]);
            if (buffer[i + j] & mask) != *expected {
                return false;
            }
        }
        true
    }
}

/// Search for `signature` in `buffer`, starting at `start` (default 0),
/// stopping after `max_iterations` positions (default: scan to the end).
///
/// Returns the smallest matching index `i` such that every non-wildcard
/// signature byte equals `buffer[i+j] & mask[j]`. Fails with
/// [`EngineError::PatternNotFound`] if the search window is exhausted.
pub fn find(
    buffer: &[u8],
    signature: &Signature,
    start: Option<usize>,
    max_iterations: Option<usize>,
) -> EngineResult<usize> {
    let start = start.unwrap_or(0);
    let sig_len = signature.len();

    if sig_len == 0 || sig_len > buffer.len() {
        return Err(EngineError::PatternNotFound(
            "signature longer than buffer".to_string(),
        ));
    }

    let natural_stop = buffer.len() - sig_len;
    let stop = match max_iterations {
        Some(n) => natural_stop.min(start.saturating_add(n)),
        None => natural_stop,
    };

    let mut i = start;
    while i <= stop {
        if signature.matches_at(buffer, i) {
            log::trace!("signature match at offset {i:#x}");
            return Ok(i);
        }
        i += 1;
    }

    Err(EngineError::PatternNotFound(format!(
        "pattern not found searching [{start:#x}, {stop:#x}]"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let buf = [0x10, 0x20, 0x30, 0x40];
        let s = Signature::exact(&[0x20, 0x30]);
        assert_eq!(find(&buf, &s, None, None).unwrap(), 1);
    }

    #[test]
    fn wildcard_match() {
        let buf = [0x10, 0x20, 0x30, 0x40];
        let s = Signature::new(vec![Some(0x10), None, Some(0x30)]);
        assert_eq!(find(&buf, &s, None, None).unwrap(), 0);
    }

    #[test]
    fn mask_match() {
        let buf = [0x1F, 0x2F];
        let s = Signature::new(vec![Some(0x10), Some(0x20)]).with_mask(vec![0xF0, 0xF0]);
        assert_eq!(find(&buf, &s, None, None).unwrap(), 0);
    }

    #[test]
    fn not_found() {
        let buf = [0x10, 0x20, 0x30];
        let s = Signature::exact(&[0x99]);
        assert!(matches!(
            find(&buf, &s, None, None),
            Err(EngineError::PatternNotFound(_))
        ));
    }

    #[test]
    fn start_at_match_succeeds_start_past_match_fails() {
        let buf = [0xAA, 0xBB, 0xAA, 0xBB];
        let s = Signature::exact(&[0xAA, 0xBB]);
        assert_eq!(find(&buf, &s, Some(0), None).unwrap(), 0);
        assert_eq!(find(&buf, &s, Some(1), None).unwrap(), 2);
        assert!(find(&buf, &s, Some(3), None).is_err());
    }

    #[test]
    fn max_iterations_bounds_search() {
        let buf = [0x00, 0x00, 0x00, 0xAA];
        let s = Signature::exact(&[0xAA]);
        assert!(find(&buf, &s, Some(0), Some(2)).is_err());
        assert_eq!(find(&buf, &s, Some(0), Some(4)).unwrap(), 3);
    }

    #[test]
    fn smallest_index_wins() {
        let buf = [0xAA, 0xAA, 0xAA];
        let s = Signature::exact(&[0xAA]);
        assert_eq!(find(&buf, &s, None, None).unwrap(), 0);
    }
}
