//! S60: ES32, the same relocated-literal speed-limit shape as
//! [`super::mi5pro`] with its own signatures and a dedicated register for
//! the sport-mode carry-through.

use crate::asm;
use crate::base::PatchRecord;
use crate::error::EngineResult;
use crate::family::es32::Es32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

const SPEED_CHECK_SIG: &[u8] = &[0x14, 0x20, 0x38, 0x5E, 0x88, 0x42, 0xE2, 0xDD, 0xB9, 0x82];

pub struct S60 {
    fam: Es32Family,
}

impl S60 {
    pub fn new(data: Vec<u8>) -> Self {
        S60 { fam: Es32Family::new(data) }
    }

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

impl Model for S60 {
    fn name(&self) -> &'static str {
        "s60"
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        let lead = Signature::exact(&[0x5C, 0x4A, 0x12, 0x88, 0xEA, 0xE7]);
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
        let lead = Signature::exact(&[0x68, 0x48, 0x01, 0x2A, 0x17, 0xD0]);
        let ofs_lead = self.fam.buf.find(&lead, None, None)?;
        let pre = self.fam.buf.as_slice()[ofs_lead..ofs_lead + 2].to_vec();

        let mov_sig = Signature::exact(&[0x02, 0x88, 0xE8, 0xE7, 0x1A, 0x78, 0x01, 0x2A]);
        let mov_ofs = self.fam.buf.find(&mov_sig, None, None)?;
        let mov_bytes = asm::assemble("mov r2, r0", None)?;
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
