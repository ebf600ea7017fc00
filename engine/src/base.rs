//! The shared buffer type and the header-checksum routine every chip
//! family invokes at the end of a session.

use crate::checksum;
use crate::error::{EngineError, EngineResult};
use crate::pattern::{self, Signature};

/// One byte-level edit, kept for introspection. Advisory only — the
/// mutated buffer is the authoritative output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    pub name: String,
    pub offset: usize,
    pub pre: Vec<u8>,
    pub post: Vec<u8>,
}

impl PatchRecord {
    pub fn new(name: impl Into<String>, offset: usize, pre: Vec<u8>, post: Vec<u8>) -> Self {
        PatchRecord {
            name: name.into(),
            offset,
            pre,
            post,
        }
    }
}

/// The mutable firmware image every family/model patcher writes through.
/// Owns the bytes exclusively; there is no sharing across patch sessions.
#[derive(Debug, Clone)]
pub struct PatchBuffer {
    data: Vec<u8>,
}

impl PatchBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        PatchBuffer { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Replace the contents wholesale (used by N32's envelope splice and
    /// encrypt/decrypt passes, which operate on the whole buffer at once).
    pub fn replace_all(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn find(
        &self,
        signature: &Signature,
        start: Option<usize>,
        max_iterations: Option<usize>,
    ) -> EngineResult<usize> {
        pattern::find(&self.data, signature, start, max_iterations)
    }

    /// Overwrite `bytes` at `offset`, returning the edit as a [`PatchRecord`].
    pub fn write(&mut self, name: &str, offset: usize, bytes: &[u8]) -> EngineResult<PatchRecord> {
        let end = offset
            .checked_add(bytes.len())
            .ok_or(EngineError::RangeError {
                offset,
                size: bytes.len(),
                len: self.data.len(),
            })?;
        let data_len = self.data.len();
        let slot = self
            .data
            .get_mut(offset..end)
            .ok_or(EngineError::RangeError {
                offset,
                size: bytes.len(),
                len: data_len,
            })?;
        let pre = slot.to_vec();
        slot.copy_from_slice(bytes);
        log::debug!("{name}: wrote {} bytes at {offset:#x}", bytes.len());
        Ok(PatchRecord::new(name, offset, pre, bytes.to_vec()))
    }
}

/// Generic header-checksum fixer shared by every chip family (spec §4.4).
///
/// `start_offset` is the chip-family-specific base (e.g. the LKS32 body
/// marker minus 8, or the ES32 body marker minus 0x10). Returns `None`
/// (no edit) if the image is already finalized for this header.
pub fn header_checksum(buf: &mut PatchBuffer, start_offset: usize) -> EngineResult<Option<PatchRecord>> {
    let data = buf.as_slice();

    let sentinel = match start_offset.checked_sub(2).and_then(|s| data.get(s..start_offset)) {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    if sentinel != [0xFF, 0xFF] {
        log::trace!("header checksum at {start_offset:#x} already finalized, skipping");
        return Ok(None);
    }

    let navee = data.first() == Some(&b'T');
    let (size, mut chk_rel) = if navee {
        (buf.len().saturating_sub(start_offset), 0x13usize)
    } else {
        let size_bytes: [u8; 4] = data
            .get(0..4)
            .ok_or(EngineError::RangeError {
                offset: 0,
                size: 4,
                len: data.len(),
            })?
            .try_into()
            .unwrap();
        (u32::from_be_bytes(size_bytes) as usize, 0xAusize)
    };

    loop {
        let candidate = start_offset + chk_rel;
        let probe = buf
            .as_slice()
            .get(candidate..candidate + 2)
            .ok_or(EngineError::RangeError {
                offset: candidate,
                size: 2,
                len: buf.len(),
            })?;
        if probe != [0x00, 0x00] || chk_rel >= 0x2E {
            let crc = checksum::crc16_ccitt(buf.as_slice(), start_offset, size)?;
            return buf
                .write("header_checksum", candidate, &crc.to_be_bytes())
                .map(Some);
        }
        chk_rel += 0x10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navee_image() -> Vec<u8> {
        let mut img = vec![b'T'; 0x30];
        img[0x0E] = 0xFF;
        img[0x0F] = 0xFF;
        img
    }

    #[test]
    fn skips_when_not_finalized() {
        let mut img = navee_image();
        img[0x0E] = 0x00;
        img[0x0F] = 0x00;
        let mut buf = PatchBuffer::new(img);
        assert!(header_checksum(&mut buf, 0x10).unwrap().is_none());
    }

    #[test]
    fn writes_navee_header_checksum() {
        let mut buf = PatchBuffer::new(navee_image());
        let rec = header_checksum(&mut buf, 0x10).unwrap().unwrap();
        assert_eq!(rec.offset, 0x10 + 0x13);
        assert_eq!(rec.post.len(), 2);
    }

    #[test]
    fn idempotent_on_second_pass() {
        let mut buf = PatchBuffer::new(navee_image());
        header_checksum(&mut buf, 0x10).unwrap();
        // second pass: the 0xFFFF sentinel is gone now, so it's a no-op.
        assert!(header_checksum(&mut buf, 0x10).unwrap().is_none());
    }
}
