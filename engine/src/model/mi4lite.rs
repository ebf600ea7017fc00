//! Mi 4 Lite: LKS32, the same trampoline shape as [`super::mi4`] but with a
//! zero trampoline offset and fixed registers instead of discovered ones.

use crate::asm;
use crate::base::PatchRecord;
use crate::error::EngineResult;
use crate::family::lks32::Lks32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

pub struct Mi4lite {
    fam: Lks32Family,
}

impl Mi4lite {
    pub fn new(data: Vec<u8>) -> Self {
        Mi4lite { fam: Lks32Family::new(data) }
    }

    fn sig_branch_src() -> Signature {
        Signature::exact(&[0x27, 0x4B, 0xD7, 0x18, 0x0A, 0x22, 0x3B, 0x00])
    }

    fn sig_branch_dst() -> Signature {
        Signature::exact(&[0x11, 0x48, 0x00, 0x21, 0x01, 0x70, 0x02, 0x22])
    }

    fn patch_speed_limit(
        &mut self,
        search_sig: &Signature,
        dst_offset: usize,
        reg: &str,
        kmh: f64,
    ) -> EngineResult<Vec<PatchRecord>> {
        let mut out = vec![self.fam.branch_from_to(
            &Self::sig_branch_src(),
            &Self::sig_branch_dst(),
            "speed_limit_fix",
            0,
        )?];

        let ofs = self.fam.buf.find(search_sig, None, None)?;
        let ofs_dst = self.fam.buf.find(&Self::sig_branch_src(), Some(ofs), None)?
            + Self::sig_branch_src().len()
            + dst_offset;
        let (literal_offset, ldr_imm) = Lks32Family::safe_ldr(ofs, ofs_dst)?;

        let value = (kmh * 10.0) as i64;
        out.push(
            self.fam
                .buf
                .write("speed_limit_value", literal_offset, &value.to_le_bytes()[..4])?,
        );
        let bytes = asm::assemble(&format!("ldr {reg}, [pc, #{ldr_imm}]"), None)?;
        out.push(self.fam.buf.write("speed_limit_ldr", ofs, &bytes)?);
        Ok(out)
    }
}

impl Model for Mi4lite {
    fn name(&self) -> &'static str {
        "mi4lite"
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        let sig = Signature::new(vec![Some(0xCA), Some(0x24), Some(0x04), Some(0x80), None, Some(0x4D)]);
        self.patch_speed_limit(&sig, 2, "r4", kmh)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sls", kmh, 1.0, 39.5)?;
        let sig = Signature::exact(&[0xFC, 0x23, 0x43, 0x80, 0x32, 0x23, 0x83, 0x81]);
        self.patch_speed_limit(&sig, 6, "r3", kmh)
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
    fn speed_limit_drive_rejects_out_of_range() {
        let mut m = Mi4lite::new(vec![0u8; 64]);
        assert!(m.speed_limit_drive(0.5).is_err());
    }
}
