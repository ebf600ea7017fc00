//! Mi 4: LKS32, the reference model for the branch-redirect speed-limit
//! trampoline other LKS32 models reuse with different signatures.

use crate::asm;
use crate::base::PatchRecord;
use crate::error::EngineResult;
use crate::family::lks32::Lks32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

pub struct Mi4 {
    fam: Lks32Family,
}

impl Mi4 {
    pub fn new(data: Vec<u8>) -> Self {
        Mi4 { fam: Lks32Family::new(data) }
    }

    fn sig_branch_src() -> Signature {
        Signature::new(vec![
            Some(0x20),
            Some(0x31),
            None,
            Some(0x72),
            Some(0x0F),
            None,
            None,
            Some(0x72),
        ])
    }

    fn sig_branch_dst() -> Signature {
        Signature::exact(&[0xF5, 0x31, 0x01, 0x83, 0x11, 0x48])
    }

    /// Shared by `speed_limit_drive`/`speed_limit_sport`: installs the
    /// trampoline once, relocates a literal for the raw speed value, then
    /// rewrites the PC-relative load that reads it, discovering the
    /// register the firmware already uses there.
    fn patch_speed_limit(
        &mut self,
        search_sig: &Signature,
        dst_offset: usize,
        kmh: f64,
    ) -> EngineResult<Vec<PatchRecord>> {
        let mut out = vec![self.fam.branch_from_to(
            &Self::sig_branch_src(),
            &Self::sig_branch_dst(),
            "speed_limit_fix",
            4,
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

        let pre = self.fam.buf.as_slice()[ofs..ofs + 2].to_vec();
        let reg = asm::get_reg(&asm::disassemble(&pre)?, "r4");
        let bytes = asm::assemble(&format!("ldr {reg}, [pc, #{ldr_imm}]"), None)?;
        out.push(self.fam.buf.write("speed_limit_ldr", ofs, &bytes)?);
        Ok(out)
    }
}

impl Model for Mi4 {
    fn name(&self) -> &'static str {
        "mi4"
    }

    fn dashboard_max_speed(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("dms", kmh, 1.0, 29.6)?;
        let speed = (kmh / 2.0 * 10.0) as i64;
        let sig = Signature::exact(&[0x01, 0x46, 0xF3, 0x39, 0x11, 0x29, 0x00, 0xD2, 0xFF, 0x20]);
        let ofs = self.fam.buf.find(&sig, None, None)?;
        let snippet = format!("movs r1, #{speed}\nlsls r1, r1, #0x1\ncmp r1, r0\nbcs 10\nmovs r0, r1");
        let bytes = asm::assemble(&snippet, None)?;
        if bytes.len() != 10 {
            return Err(crate::error::EngineError::AssemblyError(format!(
                "dashboard_max_speed snippet encoded to {} bytes, expected 10",
                bytes.len()
            )));
        }
        Ok(vec![self.fam.buf.write("dashboard_max_speed", ofs, &bytes)?])
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        let sig = Signature::new(vec![
            Some(0xCA),
            None,
            None,
            Some(0x80),
            None,
            None,
            Some(0xB9),
            Some(0x21),
            None,
            Some(0x80),
        ]);
        self.patch_speed_limit(&sig, 2, kmh)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sls", kmh, 1.0, 39.5)?;
        let sig = Signature::new(vec![
            Some(0xFD),
            Some(0x21),
            Some(0x41),
            Some(0x80),
            None,
            Some(0x49),
            Some(0x81),
            Some(0x61),
        ]);
        self.patch_speed_limit(&sig, 6, kmh)
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

    fn firmware_with_dashboard_sig() -> Vec<u8> {
        let mut data = vec![0u8; 256];
        let sig = [0x01, 0x46, 0xF3, 0x39, 0x11, 0x29, 0x00, 0xD2, 0xFF, 0x20];
        data[64..64 + sig.len()].copy_from_slice(&sig);
        data
    }

    #[test]
    fn dashboard_max_speed_rejects_out_of_range() {
        let mut m = Mi4::new(firmware_with_dashboard_sig());
        assert!(m.dashboard_max_speed(40.0).is_err());
    }

    #[test]
    fn dashboard_max_speed_writes_ten_bytes() {
        let mut m = Mi4::new(firmware_with_dashboard_sig());
        let recs = m.dashboard_max_speed(20.0).unwrap();
        assert_eq!(recs[0].post.len(), 10);
    }

    #[test]
    fn fdv_delegates_to_family() {
        let mut data = vec![0u8; 64];
        let sig = [0x6F, 0x6B, 0x0D, 0, 0, 0, 0, 0x0D, 0x65, 0x72, 0x72, 0x6F, 0x72];
        data[8..8 + sig.len()].copy_from_slice(&sig);
        let mut m = Mi4::new(data);
        let recs = m.fake_drv_version("1234").unwrap();
        assert_eq!(recs[0].post, b"1234");
    }
}
