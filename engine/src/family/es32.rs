//! ES32 chip-family patcher: body CRC-16/CCITT, km/h-to-raw speed
//! conversion, and the cruise-control decision site shared by every ES32
//! model.

use crate::asm;
use crate::base::{header_checksum, PatchBuffer, PatchRecord};
use crate::checksum;
use crate::error::{EngineError, EngineResult};
use crate::pattern::Signature;

const BODY_MARKER: &[u8] = b"SZMC-ES-ZM-";

/// The signature `ES32Patcher.cruise_control_enable` matches on: a pair
/// of near-identical dashboard-write sequences bracketing the decision
/// byte shared by every ES32 model.
const CCE_SIG: &[Option<u8>] = &[
    Some(0xCA),
    Some(0x09),
    Some(0x1A),
    Some(0x70),
    Some(0x4A),
    Some(0x06),
    None,
    Some(0x4B),
    Some(0xD2),
    Some(0x0F),
    Some(0x1A),
    Some(0x70),
    Some(0x8A),
    Some(0x06),
    None,
    Some(0x4B),
    Some(0xD2),
    Some(0x0F),
    Some(0x1A),
    Some(0x70),
];

pub struct Es32Family {
    pub buf: PatchBuffer,
}

impl Es32Family {
    pub fn new(data: Vec<u8>) -> Self {
        Es32Family {
            buf: PatchBuffer::new(data),
        }
    }

    /// `floor(factor * kmh)` as little-endian bytes of the requested width.
    pub fn calc_speed(kmh: f64, factor: f64, size: usize) -> Vec<u8> {
        let value = (factor * kmh).floor() as i64;
        value.to_le_bytes()[..size].to_vec()
    }

    pub fn cruise_control_enable(&mut self) -> EngineResult<PatchRecord> {
        let sig = Signature::new(CCE_SIG.to_vec());
        let ofs = self.buf.find(&sig, None, None)? + sig.len() - 4;
        let bytes = asm::assemble("movs r2, #1", None)?;
        self.buf.write("cruise_control_enable", ofs, &bytes)
    }

    /// Recomputes the ES32 body CRC-16/CCITT, then the shared header
    /// checksum at `marker - 0x10`.
    pub fn fix_checksum(&mut self) -> EngineResult<Vec<PatchRecord>> {
        let marker = self.buf.find(&Signature::exact(BODY_MARKER), None, None)?;
        let base = marker + 0x20;

        let size_bytes: [u8; 2] = self
            .buf
            .as_slice()
            .get(base - 0x2A..base - 0x28)
            .ok_or(EngineError::RangeError {
                offset: base - 0x2A,
                size: 2,
                len: self.buf.len(),
            })?
            .try_into()
            .unwrap();
        let size = u16::from_be_bytes(size_bytes) as usize;

        let crc = checksum::crc16_ccitt(self.buf.as_slice(), base + 0x50, size)?;
        let mut out = vec![self.buf.write("fix_checksum", base, &crc.to_be_bytes())?];
        out.extend(header_checksum(&mut self.buf, marker - 0x10)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calc_speed_truncates_not_rounds() {
        // 25.5 * 20.9 = 532.95 -> floor 532
        assert_eq!(Es32Family::calc_speed(25.5, 20.9, 2), 532i64.to_le_bytes()[..2]);
    }

    #[test]
    fn cce_signature_match_offset() {
        let mut data = vec![0u8; 64];
        let sig_bytes: Vec<u8> = CCE_SIG.iter().map(|b| b.unwrap_or(0x00)).collect();
        data[10..10 + sig_bytes.len()].copy_from_slice(&sig_bytes);
        let mut fam = Es32Family::new(data);
        let rec = fam.cruise_control_enable().unwrap();
        assert_eq!(rec.offset, 10 + sig_bytes.len() - 4);
        assert_eq!(rec.post, vec![0x01, 0x22]);
    }
}
