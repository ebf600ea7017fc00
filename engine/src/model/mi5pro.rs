//! Mi 5 Pro: ES32, relocates the speed-limit comparison constant via its
//! own PC-relative literal instead of writing it at a fixed stride, then
//! disables the now-redundant runtime speed check.

use crate::asm;
use crate::base::PatchRecord;
use crate::error::{EngineError, EngineResult};
use crate::family::es32::Es32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

const SPEED_CHECK_SIG: &[u8] = &[0x00, 0x88, 0x09, 0xB2, 0x81, 0x42, 0x00, 0xDD, 0xA0, 0x82];

const REGION_SIG: &[Option<u8>] =
    &[Some(0xC8), Some(0x03), Some(0x00), Some(0x20), None, Some(0x03), Some(0x00), Some(0x20)];
const REGION_FIX_SIG: &[Option<u8>] = &[None, Some(0x8B), None, Some(0x82), None, Some(0x48), Some(0x00), Some(0x78)];
const REGION_STRIDE: usize = 4;
const REGION_REPEATS: usize = 7;

pub struct Mi5pro {
    fam: Es32Family,
}

impl Mi5pro {
    pub fn new(data: Vec<u8>) -> Self {
        Mi5pro { fam: Es32Family::new(data) }
    }

    /// Best-effort: firmware revisions vary in whether this guard exists at
    /// all, so a missing match is not an error.
    fn remove_speed_check(&mut self) -> EngineResult<Option<PatchRecord>> {
        let sig = Signature::exact(SPEED_CHECK_SIG);
        match self.fam.buf.find(&sig, None, None) {
            Ok(ofs) => {
                let bytes = asm::assemble(&"nop\n".repeat(sig.len() / 2), None)?;
                Ok(Some(self.fam.buf.write("remove_speed_check", ofs, &bytes)?))
            }
            Err(_) => Ok(None),
        }
    }
}

impl Model for Mi5pro {
    fn name(&self) -> &'static str {
        "mi5pro"
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        let lead = Signature::exact(&[0x77, 0x49, 0x09, 0x88, 0xD2, 0xE7]);
        let ofs_lead = self.fam.buf.find(&lead, None, None)?;
        let pre = self.fam.buf.as_slice()[ofs_lead..ofs_lead + 2].to_vec();

        let nop_ofs = ofs_lead + 2;
        let mut out = vec![self.fam.buf.write("speed_limit_drive_nop", nop_ofs, &asm::assemble("nop", None)?)?];

        let disasm = asm::disassemble(&pre)?;
        let ldr_imm = asm::extract_ldr_offset(&disasm).ok_or_else(|| {
            crate::error::EngineError::AssemblyError("expected a pc-relative ldr at speed_limit_drive site".into())
        })?;
        let literal_offset = asm::offset_to_nearest_word(ofs_lead + ldr_imm as usize);
        let value = Es32Family::calc_speed(kmh, 20.9, 4);
        out.push(self.fam.buf.write("speed_limit_drive_value", literal_offset, &value)?);

        if let Some(rec) = self.remove_speed_check()? {
            out.push(rec);
        }
        Ok(out)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sls", kmh, 1.0, 39.5)?;
        let lead = Signature::exact(&[0x87, 0x48, 0x01, 0x29, 0x2D, 0xD0]);
        let ofs_lead = self.fam.buf.find(&lead, None, None)?;
        let pre = self.fam.buf.as_slice()[ofs_lead..ofs_lead + 2].to_vec();

        let mov_sig = Signature::exact(&[0x01, 0x88, 0xD0, 0xE7, 0x12, 0x78, 0x0B, 0x78]);
        let mov_ofs = self.fam.buf.find(&mov_sig, None, None)?;
        let mov_bytes = asm::assemble("mov r1, r0", None)?;
        let mut out = vec![self.fam.buf.write("speed_limit_sport_mov", mov_ofs, &mov_bytes)?];

        let disasm = asm::disassemble(&pre)?;
        let ldr_imm = asm::extract_ldr_offset(&disasm).ok_or_else(|| {
            crate::error::EngineError::AssemblyError("expected a pc-relative ldr at speed_limit_sport site".into())
        })?;
        let literal_offset = asm::offset_to_nearest_word(ofs_lead + ldr_imm as usize);
        let value = Es32Family::calc_speed(kmh, 20.9, 4);
        out.push(self.fam.buf.write("speed_limit_sport_value", literal_offset, &value)?);

        if let Some(rec) = self.remove_speed_check()? {
            out.push(rec);
        }
        Ok(out)
    }

    /// The same duplicated-comparison-constant loop [`super::mi4pro2nd`]
    /// uses, plus a continuity check: once a run's second byte is seen,
    /// later entries that don't share it belong to a different constant
    /// and are skipped rather than clobbered.
    fn region_free(&mut self) -> EngineResult<Vec<PatchRecord>> {
        let sig = Signature::new(REGION_SIG.to_vec());
        let base = self.fam.buf.find(&sig, None, None)?;
        let mut out = Vec::new();
        let mut tmp_byte: Option<u8> = None;
        for i in 0..REGION_REPEATS {
            let ofs = base + (i + 1) * REGION_STRIDE;
            let byte1 = *self.fam.buf.as_slice().get(ofs + 1).ok_or(EngineError::RangeError {
                offset: ofs + 1,
                size: 1,
                len: self.fam.buf.len(),
            })?;
            if let Some(prev) = tmp_byte {
                if byte1 != prev {
                    continue;
                }
            }
            tmp_byte = Some(byte1);
            out.push(self.fam.buf.write(&format!("region_free_{i}"), ofs, &[0x28, 0x03, 0x00, 0x20])?);
        }

        let fixup_sig = Signature::new(REGION_FIX_SIG.to_vec());
        let fixup_ofs = self.fam.buf.find(&fixup_sig, None, None)? + REGION_FIX_SIG.len();
        let bytes = asm::assemble("cmp r0, #0xff", None)?;
        out.push(self.fam.buf.write("region_free_fixup", fixup_ofs, &bytes)?);
        Ok(out)
    }

    fn cruise_control_enable(&mut self) -> EngineResult<Vec<PatchRecord>> {
        Ok(vec![self.fam.cruise_control_enable()?])
    }

    fn fix_checksum(&mut self) -> EngineResult<Vec<PatchRecord>> {
        self.fam.fix_checksum()
    }

    fn into_bytes(self: Box<Self>) -> Vec<u8> {
        self.fam.buf.into_bytes()
    }
}
