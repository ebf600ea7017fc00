//! Ultra 4: LKS32, adds a motor-start-speed byte patch with a
//! register-selecting discriminator and a dashboard cap gated by `ble`
//! instead of [`super::mi4`]'s `bcs`.

use crate::asm;
use crate::base::PatchRecord;
use crate::error::{EngineError, EngineResult};
use crate::family::lks32::Lks32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

pub struct Ultra4 {
    fam: Lks32Family,
}

impl Ultra4 {
    pub fn new(data: Vec<u8>) -> Self {
        Ultra4 { fam: Lks32Family::new(data) }
    }

    fn sig_branch_src() -> Signature {
        Signature::new(vec![
            Some(0xCB), Some(0x73), None, None, Some(0x03), Some(0x80), None, None, Some(0x41), Some(0x80),
        ])
    }

    fn sig_branch_src_dst() -> Signature {
        Signature::new(vec![Some(0x45), Some(0x81), Some(0x85), Some(0x81), None, Some(0x48)])
    }
}

impl Model for Ultra4 {
    fn name(&self) -> &'static str {
        "ultra4"
    }

    fn dashboard_max_speed(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("dms", kmh, 1.0, 29.6)?;
        let speed = (kmh / 2.0 * 10.0) as i64;
        let sig = Signature::exact(&[0x01, 0x46, 0xF3, 0x39, 0x11, 0x29, 0x00, 0xD2, 0xFF, 0x20]);
        let ofs = self.fam.buf.find(&sig, None, None)?;
        let snippet =
            format!("movs r1, #{speed}\nlsls r1, r1, #0x1\ncmp r1, r0\nble 10\nmovs r0, r1\nnop; nop; nop; nop; nop;");
        let bytes = asm::assemble(&snippet, None)?;
        if bytes.len() != 20 {
            return Err(EngineError::AssemblyError(format!(
                "dashboard_max_speed snippet encoded to {} bytes, expected 20",
                bytes.len()
            )));
        }
        Ok(vec![self.fam.buf.write("dashboard_max_speed", ofs, &bytes)?])
    }

    fn motor_start_speed(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("mss", kmh, 1.0, 9.0)?;
        let raw = -0.36 * kmh * kmh - 5.39 * kmh + 68.6;
        let encoded = raw.round() as i64 * 3;
        if !(0..=255).contains(&encoded) {
            return Err(EngineError::InvalidParameter(format!(
                "motor start speed {kmh} km/h converts to out-of-range byte {encoded}"
            )));
        }

        let sig = Signature::new(vec![
            Some(0x16), Some(0xE0), None, Some(0x88), Some(0x49), None, None, Some(0x00), None, Some(0x42), Some(0x11), Some(0xD2),
        ]);
        let base = self.fam.buf.find(&sig, None, None)?;
        let ofs = base + 4;
        let discriminator = *self
            .fam
            .buf
            .as_slice()
            .get(ofs + 1)
            .ok_or(EngineError::RangeError { offset: ofs + 1, size: 1, len: self.fam.buf.len() })?;
        let reg = match discriminator {
            0x25 => "r5",
            0x26 => "r6",
            other => {
                return Err(EngineError::InvalidParameter(format!(
                    "unrecognized motor start speed discriminator byte {other:#x}"
                )))
            }
        };
        let bytes = asm::assemble(&format!("movs {reg}, #{encoded}"), None)?;
        Ok(vec![self.fam.buf.write("motor_start_speed", ofs, &bytes)?])
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        let mut out = vec![self.fam.branch_from_to(
            &Self::sig_branch_src(),
            &Self::sig_branch_src_dst(),
            "speed_limit_fix",
            4,
        )?];

        let lead = Signature::exact(&[0x0F, 0x23, 0xCB, 0x73, 0xCA, 0x23, 0x03, 0x80]);
        let dst_sig = Self::sig_branch_src();
        let ofs = self.fam.buf.find(&lead, None, None)? + 4;
        let ofs_dst = self.fam.buf.find(&dst_sig, Some(ofs.saturating_sub(4)), None)? + dst_sig.len();
        let (literal_offset, ldr_imm) = Lks32Family::safe_ldr(ofs, ofs_dst)?;
        let value = (kmh * 10.0) as i64;
        out.push(self.fam.buf.write("speed_limit_value", literal_offset, &value.to_le_bytes()[..4])?);
        let bytes = asm::assemble(&format!("ldr r3, [pc, #{ldr_imm}]"), None)?;
        out.push(self.fam.buf.write("speed_limit_ldr", ofs, &bytes)?);
        Ok(out)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sls", kmh, 1.0, 39.5)?;
        let mut out = vec![self.fam.branch_from_to(
            &Self::sig_branch_src(),
            &Self::sig_branch_src_dst(),
            "speed_limit_fix",
            4,
        )?];

        let lead = Signature::new(vec![
            Some(0x0F), Some(0x23), Some(0xCB), Some(0x73), None, None, Some(0x03), Some(0x80), Some(0xFC), Some(0x21), Some(0x41), Some(0x80),
        ]);
        let ofs = self.fam.buf.find(&lead, None, None)? + 8;
        let ofs_dst = self.fam.buf.find(&Self::sig_branch_src(), Some(ofs.saturating_sub(8)), None)?
            + Self::sig_branch_src().len()
            + 6;
        let (literal_offset, ldr_imm) = Lks32Family::safe_ldr(ofs, ofs_dst)?;
        let value = (kmh * 10.0) as i64;
        out.push(self.fam.buf.write("speed_limit_value", literal_offset, &value.to_le_bytes()[..4])?);
        let bytes = asm::assemble(&format!("ldr r3, [pc, #{ldr_imm}]"), None)?;
        out.push(self.fam.buf.write("speed_limit_ldr", ofs, &bytes)?);
        Ok(out)
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
    fn motor_start_speed_rejects_unknown_discriminator() {
        let mut data = vec![0u8; 64];
        let sig = [0x16, 0xE0, 0x00, 0x88, 0x49, 0x00, 0x00, 0x00, 0x00, 0x42, 0x11, 0xD2];
        data[10..10 + sig.len()].copy_from_slice(&sig);
        data[10 + 4 + 1] = 0x99;
        let mut m = Ultra4::new(data);
        assert!(matches!(m.motor_start_speed(5.0), Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn motor_start_speed_picks_register_from_discriminator() {
        let mut data = vec![0u8; 64];
        let sig = [0x16, 0xE0, 0x00, 0x88, 0x49, 0x00, 0x00, 0x00, 0x00, 0x42, 0x11, 0xD2];
        data[10..10 + sig.len()].copy_from_slice(&sig);
        data[10 + 4 + 1] = 0x25;
        let mut m = Ultra4::new(data);
        let recs = m.motor_start_speed(5.0).unwrap();
        assert_eq!(recs[0].post.len(), 2);
    }
}
