//! Mi 4 Pro (2nd generation): ES32, writes the raw speed value at every
//! stride a duplicated comparison constant appears in rather than patching
//! a single comparison site.

use crate::base::PatchRecord;
use crate::error::EngineResult;
use crate::family::es32::Es32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

const SPEED_STRIDE: usize = 2;
const SPEED_REPEATS: usize = 11;
const REGION_STRIDE: usize = 4;
const REGION_REPEATS: usize = 7;

pub struct Mi4pro2nd {
    fam: Es32Family,
}

impl Mi4pro2nd {
    pub fn new(data: Vec<u8>) -> Self {
        Mi4pro2nd { fam: Es32Family::new(data) }
    }

    fn patch_speed_limit(&mut self, sig: &Signature, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        let base = self.fam.buf.find(sig, None, None)?;
        let value = Es32Family::calc_speed(kmh, 20.9, 2);
        let mut out = Vec::with_capacity(SPEED_REPEATS);
        for i in 0..SPEED_REPEATS {
            let ofs = base + (i + 1) * SPEED_STRIDE;
            out.push(self.fam.buf.write("speed_limit_value", ofs, &value)?);
        }
        Ok(out)
    }
}

impl Model for Mi4pro2nd {
    fn name(&self) -> &'static str {
        "mi4pro2nd"
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        let sig = Signature::exact(&[0x38, 0x00, 0x39, 0x01, 0xA1, 0x01, 0x39, 0x01, 0x39]);
        self.patch_speed_limit(&sig, kmh)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sls", kmh, 1.0, 39.5)?;
        let sig = Signature::exact(&[0x00, 0x00, 0xA1, 0x01, 0x0A, 0x02, 0xA1, 0x01]);
        self.patch_speed_limit(&sig, kmh)
    }

    fn region_free(&mut self) -> EngineResult<Vec<PatchRecord>> {
        let sig = Signature::exact(&[0x9C, 0xA7, 0x00, 0x00, 0x22, 0x03, 0x00, 0x20]);
        let base = self.fam.buf.find(&sig, None, None)?;
        let mut out = Vec::with_capacity(REGION_REPEATS + 1);
        for i in 0..REGION_REPEATS {
            let ofs = base + (i + 1) * REGION_STRIDE;
            out.push(self.fam.buf.write("region_free", ofs, &[0x21, 0x03, 0x00, 0x20])?);
        }

        let fixup_sig = Signature::exact(&[0x60, 0x8B, 0x60, 0x82, 0x56, 0x48, 0x00, 0x78]);
        let fixup_ofs = self.fam.buf.find(&fixup_sig, None, None)? + fixup_sig.len();
        let bytes = crate::asm::assemble("cmp r0, #0xff", None)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_limit_drive_writes_eleven_copies() {
        let mut data = vec![0u8; 256];
        let sig = [0x38, 0x00, 0x39, 0x01, 0xA1, 0x01, 0x39, 0x01, 0x39];
        data[40..40 + sig.len()].copy_from_slice(&sig);
        let mut m = Mi4pro2nd::new(data);
        let recs = m.speed_limit_drive(25.0).unwrap();
        assert_eq!(recs.len(), SPEED_REPEATS);
    }
}
