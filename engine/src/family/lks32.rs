//! LKS32 chip-family patcher: body CRC-32, literal-pool relocation, branch
//! redirection, region-serial neutralization.

use crate::asm;
use crate::base::{header_checksum, PatchBuffer, PatchRecord};
use crate::checksum;
use crate::error::{EngineError, EngineResult};
use crate::pattern::Signature;

const BODY_MARKER: &[u8] = b"LKS32MC0";
const FDV_SIG: &[Option<u8>] = &[
    Some(0x6F),
    Some(0x6B),
    Some(0x0D),
    None,
    None,
    None,
    None,
    Some(0x0D),
    Some(0x65),
    Some(0x72),
    Some(0x72),
    Some(0x6F),
    Some(0x72),
];

/// LKS32-family patcher state: owns the buffer, nothing else. Every
/// helper below is a pure transformation over it.
pub struct Lks32Family {
    pub buf: PatchBuffer,
}

impl Lks32Family {
    pub fn new(data: Vec<u8>) -> Self {
        Lks32Family {
            buf: PatchBuffer::new(data),
        }
    }

    /// Literal-pool allocator: picks a word-aligned destination for a
    /// 4-byte constant reachable by a PC-relative LDR at `ldr_offset`,
    /// no earlier than `min_dst`. Returns `(literal_offset, ldr_imm)`.
    pub fn safe_ldr(ldr_offset: usize, min_dst: usize) -> EngineResult<(usize, usize)> {
        let pc_base = (ldr_offset & !0x3) + 4;
        if min_dst < pc_base {
            return Err(EngineError::InvalidParameter(
                "destination offset precedes the instruction's PC base".to_string(),
            ));
        }
        let mut min_off = min_dst - pc_base;
        if min_off % 4 != 0 {
            min_off = (min_off & !0x3) + 4;
        }
        Ok((pc_base + min_off, min_off))
    }

    /// Redirects execution from just past `src_sig`'s match to `dst_offset`
    /// bytes past `dst_sig`'s first match at or after the source. A no-op
    /// if the bytes there already hold the planned branch.
    pub fn branch_from_to(
        &mut self,
        src_sig: &Signature,
        dst_sig: &Signature,
        desc: &str,
        dst_offset: usize,
    ) -> EngineResult<PatchRecord> {
        let src_match = self.buf.find(src_sig, None, None)?;
        let ofs = src_match + src_sig.len();
        let dst_match = self.buf.find(dst_sig, Some(ofs), None)?;
        let ofs_dst = dst_match + dst_offset;

        let delta = ofs_dst as i64 - ofs as i64;
        let planned = asm::assemble(&format!("b {delta}"), None)?;

        let current = self
            .buf
            .as_slice()
            .get(ofs..ofs + planned.len())
            .ok_or(EngineError::RangeError {
                offset: ofs,
                size: planned.len(),
                len: self.buf.len(),
            })?;
        if current == planned.as_slice() {
            return Ok(PatchRecord::new(desc, ofs, current.to_vec(), planned));
        }
        self.buf.write(desc, ofs, &planned)
    }

    /// Zeroes every occurrence of each 4-byte regional serial tag.
    pub fn region_free(&mut self, tags: &[[u8; 4]]) -> EngineResult<Vec<PatchRecord>> {
        let mut out = Vec::new();
        for tag in tags {
            let sig = Signature::exact(tag);
            let mut start = Some(0);
            while let Ok(ofs) = self.buf.find(&sig, start, None) {
                out.push(self.buf.write("region_free", ofs, &[0, 0, 0, 0])?);
                start = Some(ofs + 4);
            }
        }
        if out.is_empty() {
            return Err(EngineError::PatternNotFound(
                "no regional serial tag found".to_string(),
            ));
        }
        Ok(out)
    }

    /// Enables cruise control: `movs r1, #1` at the decision site, then
    /// optionally NOPs out a model-specific unlock guard.
    pub fn cruise_control_enable(
        &mut self,
        decision_sig: &Signature,
        decision_offset: usize,
        guard_sig: Option<&Signature>,
    ) -> EngineResult<Vec<PatchRecord>> {
        let m = self.buf.find(decision_sig, None, None)?;
        let ofs = m + decision_offset;
        let bytes = asm::assemble("movs r1, #1", None)?;
        let mut out = vec![self.buf.write("cruise_control_enable", ofs, &bytes)?];

        if let Some(guard) = guard_sig {
            let gofs = self.buf.find(guard, None, None)?;
            let nop_count = guard.len() / 2;
            let nops = asm::assemble(&"nop\n".repeat(nop_count), None)?;
            out.push(self.buf.write("cruise_control_unlock", gofs, &nops)?);
        }
        Ok(out)
    }

    /// Recomputes the LKS32 body CRC-32, then the shared header checksum.
    pub fn fix_checksum(&mut self) -> EngineResult<Vec<PatchRecord>> {
        let marker = self.buf.find(&Signature::exact(BODY_MARKER), None, None)?;
        let base = marker
            .checked_sub(8)
            .ok_or(EngineError::RangeError {
                offset: marker,
                size: 8,
                len: self.buf.len(),
            })?;

        let sentinel = self
            .buf
            .as_slice()
            .get(base.saturating_sub(2)..base)
            .ok_or(EngineError::RangeError {
                offset: base,
                size: 2,
                len: self.buf.len(),
            })?;
        if sentinel != [0xFF, 0xFF] {
            log::trace!("LKS32 body checksum at {base:#x} already finalized, skipping");
            return Ok(vec![]);
        }

        let size_bytes: [u8; 4] = self.buf.as_slice()[base..base + 4].try_into().unwrap();
        let size = u32::from_le_bytes(size_bytes) as usize;

        let crc = checksum::crc32_be(self.buf.as_slice(), base + 0x18, size)?;
        let mut out = vec![self.buf.write("fix_checksum", base + 4, &crc.to_le_bytes())?];
        out.extend(header_checksum(&mut self.buf, base)?);
        Ok(out)
    }

    pub fn fake_drv_version(&mut self, firmware_version: &str) -> EngineResult<PatchRecord> {
        if firmware_version.len() != 4 || !firmware_version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EngineError::InvalidParameter(format!(
                "firmware version must be exactly 4 ASCII digits, got '{firmware_version}'"
            )));
        }
        let sig = Signature::new(FDV_SIG.to_vec());
        let ofs = self.buf.find(&sig, None, None)? + 3;
        self.buf
            .write("fake_drv_version", ofs, firmware_version.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_ldr_rounds_up_to_word_alignment() {
        let (lit, imm) = Lks32Family::safe_ldr(0x100, 0x105).unwrap();
        assert_eq!(lit % 4, 0);
        assert!(lit >= 0x105);
        let pc_base = (0x100 & !0x3) + 4;
        assert_eq!(lit - pc_base, imm);
    }

    #[test]
    fn safe_ldr_rejects_destination_before_pc_base() {
        assert!(Lks32Family::safe_ldr(0x100, 0x50).is_err());
    }

    #[test]
    fn fake_drv_version_rejects_non_digits() {
        let mut fam = Lks32Family::new(vec![0u8; 32]);
        assert!(matches!(
            fam.fake_drv_version("12a4"),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn fake_drv_version_rejects_wrong_length() {
        let mut fam = Lks32Family::new(vec![0u8; 32]);
        assert!(matches!(
            fam.fake_drv_version("123"),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn region_free_zeroes_every_tag_occurrence() {
        let mut data = vec![0u8; 32];
        data[4..8].copy_from_slice(&[0x85, 0xEC, 0x00, 0x00]);
        data[20..24].copy_from_slice(&[0x85, 0xEC, 0x00, 0x00]);
        let mut fam = Lks32Family::new(data);
        let recs = fam.region_free(&[[0x85, 0xEC, 0x00, 0x00]]).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(&fam.buf.as_slice()[4..8], &[0, 0, 0, 0]);
        assert_eq!(&fam.buf.as_slice()[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn region_free_errors_when_no_tag_found() {
        let mut fam = Lks32Family::new(vec![0u8; 32]);
        assert!(matches!(
            fam.region_free(&[[0x85, 0xEC, 0x00, 0x00]]),
            Err(EngineError::PatternNotFound(_))
        ));
    }
}
