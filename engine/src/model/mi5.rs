//! Mi 5: LKS32, a variant of the branch-redirect trampoline where the
//! literal destination is found by re-matching the branch source signature
//! rather than a dedicated destination signature.

use crate::asm;
use crate::base::PatchRecord;
use crate::error::EngineResult;
use crate::family::lks32::Lks32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

pub struct Mi5 {
    pub(crate) fam: Lks32Family,
}

impl Mi5 {
    pub fn new(data: Vec<u8>) -> Self {
        Mi5 { fam: Lks32Family::new(data) }
    }

    fn sig_branch_src() -> Signature {
        Signature::new(vec![Some(0x59), Some(0x68), None, Some(0x4A), None, Some(0x3A), Some(0x91), Some(0x42)])
    }

    fn sig_branch_src_dst() -> Signature {
        Signature::exact(&[0xF5, 0x31, 0x41, 0x81, 0x70, 0xBD])
    }

    pub(crate) fn speed_limit_drive_impl(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        let mut out = vec![self.fam.branch_from_to(
            &Self::sig_branch_src(),
            &Self::sig_branch_src_dst(),
            "speed_limit_fix",
            4,
        )?];

        let lead = Signature::new(vec![None, Some(0x49), Some(0x41), Some(0x82), Some(0xCB), Some(0x25), Some(0x05), Some(0x80)]);
        let mut dst_bytes = vec![Some(0x59), Some(0x68), None, Some(0x4A), None, Some(0x3A), Some(0x91), Some(0x42), None, None];
        let ofs = self.fam.buf.find(&lead, None, None)? + 4;
        let dst_sig = Signature::new(std::mem::take(&mut dst_bytes));
        let ofs_dst = self.fam.buf.find(&dst_sig, Some(ofs), None)? + dst_sig.len();
        let (literal_offset, ldr_imm) = Lks32Family::safe_ldr(ofs, ofs_dst)?;

        let value = (kmh * 10.0) as i64;
        out.push(self.fam.buf.write("speed_limit_value", literal_offset, &value.to_le_bytes()[..4])?);
        let bytes = asm::assemble(&format!("ldr r5, [pc, #{ldr_imm}]"), None)?;
        out.push(self.fam.buf.write("speed_limit_ldr", ofs, &bytes)?);
        Ok(out)
    }

    pub(crate) fn speed_limit_sport_impl(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sls", kmh, 1.0, 39.5)?;
        let mut out = vec![self.fam.branch_from_to(
            &Self::sig_branch_src(),
            &Self::sig_branch_src_dst(),
            "speed_limit_fix",
            4,
        )?];

        let lead = Signature::new(vec![Some(0xFD), Some(0x21), Some(0x41), Some(0x80), None, Some(0x49), Some(0x81), Some(0x61)]);
        let dst_sig = Signature::new(vec![Some(0x59), Some(0x68), None, Some(0x4A), None, Some(0x3A), Some(0x91), Some(0x42), None, None]);
        let ofs = self.fam.buf.find(&lead, None, None)?;
        let ofs_dst = self.fam.buf.find(&dst_sig, Some(ofs), None)? + dst_sig.len() + 4;
        let (literal_offset, ldr_imm) = Lks32Family::safe_ldr(ofs, ofs_dst)?;

        let value = (kmh * 10.0) as i64;
        out.push(self.fam.buf.write("speed_limit_value", literal_offset, &value.to_le_bytes()[..4])?);
        let bytes = asm::assemble(&format!("ldr r1, [pc, #{ldr_imm}]"), None)?;
        out.push(self.fam.buf.write("speed_limit_ldr", ofs, &bytes)?);
        Ok(out)
    }
}

impl Model for Mi5 {
    fn name(&self) -> &'static str {
        "mi5"
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        self.speed_limit_drive_impl(kmh)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        self.speed_limit_sport_impl(kmh)
    }

    fn fix_checksum(&mut self) -> EngineResult<Vec<PatchRecord>> {
        self.fam.fix_checksum()
    }

    fn fake_drv_version(&mut self, version: &str) -> EngineResult<Vec<PatchRecord>> {
        Ok(vec![self.fam.fake_drv_version(version)?])
    }

    fn into_bytes(self: Box<Self>) -> Vec<u8> {
        self.fam.buf.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_limit_sport_rejects_out_of_range() {
        let mut m = Mi5::new(vec![0u8; 64]);
        assert!(m.speed_limit_sport(50.0).is_err());
    }
}
