//! Mi 5 Elite: N32, the structural trampoline. The first speed-limit
//! patch installs a branch + dispatch table; every subsequent speed patch
//! only rebuilds the table, keyed by which modes have been touched so far.

use std::collections::HashMap;

use crate::asm;
use crate::base::PatchRecord;
use crate::error::{EngineError, EngineResult};
use crate::family::n32::N32Family;
use crate::model::{validate_range, Model};
use crate::pattern::Signature;

const MODE_PEDESTRIAN: i64 = 1;
const MODE_DRIVE: i64 = 2;
const MODE_SPORT: i64 = 3;

const SIG_SPEED_LIMIT_RETURN: &[u8] = &[
    0x08, 0x80, 0x52, 0x48, 0x52, 0x49, 0x00, 0x88, 0x09, 0x88, 0x00, 0xF1, 0x0A, 0x02, 0x8A, 0x42,
    0x01, 0xD9,
];

const SIG_SPEED_LIMIT_DST: &[u8] = &[0xDF, 0xF8, 0xF0, 0x81, 0xA8, 0xF8, 0x00, 0x10, 0x7B, 0x49, 0x67, 0x45];

const SIG_MOTOR_START: &[u8] = &[
    0x01, 0x80, 0x2D, 0x2B, 0xEF, 0xD3, 0x11, 0x70, 0x70, 0xBD, 0x14, 0x33, 0x2D, 0x2B, 0x07, 0xD2,
];

const SPEED_FACTOR: f64 = 10.0;

#[derive(Default)]
struct SpeedPatchOffsets {
    ldr_patch_offset: usize,
    speed_logic_offset: usize,
    default_path_address: usize,
    patched_path_address: usize,
    ldr_r0_offset: i64,
    ldr_r1_offset: i64,
}

pub struct Mi5elite {
    fam: N32Family,
    patched_speeds: HashMap<&'static str, i64>,
    speed_block_patched: bool,
    offsets: Option<SpeedPatchOffsets>,
    final_image: Option<Vec<u8>>,
}

impl Mi5elite {
    pub fn new(data: Vec<u8>) -> Self {
        Mi5elite {
            fam: N32Family::new(data),
            patched_speeds: HashMap::new(),
            speed_block_patched: false,
            offsets: None,
            final_image: None,
        }
    }

    fn locate_speed_patch_offsets(&mut self) -> EngineResult<()> {
        let return_sig = Signature::exact(SIG_SPEED_LIMIT_RETURN);
        let sig_offset = self.fam.buf.find(&return_sig, None, None)?;
        let ldr_patch_offset = sig_offset
            .checked_sub(12)
            .ok_or(EngineError::RangeError { offset: sig_offset, size: 12, len: self.fam.buf.len() })?;

        let dst_sig = Signature::exact(SIG_SPEED_LIMIT_DST);
        let speed_logic_offset = self.fam.buf.find(&dst_sig, None, None)? + dst_sig.len() + 2;

        let default_path_address = ldr_patch_offset + 6;
        let patched_path_address = ldr_patch_offset + 12;

        let mode_data_sig = Signature::exact(&[0x8A, 0x01, 0x00, 0x20]);
        let mode_data_addr = self.fam.buf.find(&mode_data_sig, None, None)?;
        let ldr_r0_pc = ((ldr_patch_offset + 4) & !0x3) as i64;
        let ldr_r0_offset = mode_data_addr as i64 - ldr_r0_pc;

        let r1_data_sig = Signature::exact(&[0xA4, 0x01, 0x00, 0x20]);
        let r1_data_addr = self.fam.buf.find(&r1_data_sig, None, None)?;
        let ldr_r1_pc = ((speed_logic_offset + 4) & !0x3) as i64;
        let ldr_r1_offset = r1_data_addr as i64 - ldr_r1_pc;

        self.offsets = Some(SpeedPatchOffsets {
            ldr_patch_offset,
            speed_logic_offset,
            default_path_address,
            patched_path_address,
            ldr_r0_offset,
            ldr_r1_offset,
        });
        Ok(())
    }

    fn apply_branch_patch(&mut self) -> EngineResult<PatchRecord> {
        let o = self.offsets.as_ref().expect("offsets located before branch patch");
        let asm_src = format!(
            "ldr r0, [pc, #{}]\nldrb r0, [r0, #0]\nb {:#x}",
            o.ldr_r0_offset, o.speed_logic_offset
        );
        let bytes = asm::assemble(&asm_src, Some(o.ldr_patch_offset as u32))?;
        if bytes.len() != 6 {
            return Err(EngineError::AssemblyError(format!(
                "branch patch encoded to {} bytes, expected 6",
                bytes.len()
            )));
        }
        self.fam.buf.write("branch_patch", o.ldr_patch_offset, &bytes)
    }

    fn build_speed_logic_asm(&self) -> String {
        let o = self.offsets.as_ref().expect("offsets located before speed logic build");
        let mode_map: &[(&str, i64)] = &[("ped", MODE_PEDESTRIAN), ("drive", MODE_DRIVE), ("sport", MODE_SPORT)];
        let checks: Vec<&str> = ["ped", "drive", "sport"]
            .into_iter()
            .filter(|m| self.patched_speeds.contains_key(m))
            .collect();

        let mut asm_code = format!("ldr r1, [pc, #{}]\n", o.ldr_r1_offset);
        for (i, mode) in checks.iter().enumerate() {
            let mode_num = mode_map.iter().find(|(m, _)| m == mode).unwrap().1;
            let speed = self.patched_speeds[mode];
            let next_label = checks
                .get(i + 1)
                .map(|m| format!("check_{m}"))
                .unwrap_or_else(|| "default_case".to_string());
            asm_code.push_str(&format!(
                "check_{mode}:\ncmp r0, #{mode_num}\nbne {next_label}\nmovs.w r0, #{speed}\nb {:#x}\n",
                o.patched_path_address
            ));
        }
        asm_code.push_str(&format!(
            "default_case:\nldrb.w r0, [r8, #5]\nb {:#x}\n",
            o.default_path_address
        ));
        asm_code
    }

    fn patch_speed_block(
        &mut self,
        ped_kmh: Option<f64>,
        drive_kmh: Option<f64>,
        sport_kmh: Option<f64>,
    ) -> EngineResult<Vec<PatchRecord>> {
        if let Some(kmh) = ped_kmh {
            self.patched_speeds.insert("ped", N32Family::calc_speed(kmh, SPEED_FACTOR, 0));
        }
        if let Some(kmh) = drive_kmh {
            self.patched_speeds.insert("drive", N32Family::calc_speed(kmh, SPEED_FACTOR, 0));
        }
        if let Some(kmh) = sport_kmh {
            self.patched_speeds.insert("sport", N32Family::calc_speed(kmh, SPEED_FACTOR, 0));
        }

        let mut out = self.remove_region_speed_limit()?;

        if !self.speed_block_patched {
            self.locate_speed_patch_offsets()?;
            out.push(self.apply_branch_patch()?);
        }

        let asm_code = self.build_speed_logic_asm();
        let speed_logic_offset = self.offsets.as_ref().unwrap().speed_logic_offset;
        let bytes = asm::assemble(&asm_code, Some(speed_logic_offset as u32))?;
        out.push(self.fam.buf.write("speed_logic_block", speed_logic_offset, &bytes)?);

        self.speed_block_patched = true;
        Ok(out)
    }

    /// Replaces the regional-limit conditional branch with an
    /// unconditional one; a no-op (empty result, not an error) once the
    /// signature is already gone because a previous call already patched it.
    fn remove_region_speed_limit(&mut self) -> EngineResult<Vec<PatchRecord>> {
        let dst_sig = Signature::exact(SIG_SPEED_LIMIT_DST);
        let ofs_sig = match self.fam.buf.find(&dst_sig, None, None) {
            Ok(ofs) => ofs,
            Err(_) => return Ok(vec![]),
        };
        let ofs = ofs_sig + dst_sig.len();
        let branch_target = ofs + 130;
        let bytes = asm::assemble(&format!("b {branch_target:#x}"), Some(ofs as u32))?;

        let current = self.fam.buf.as_slice().get(ofs..ofs + bytes.len()).ok_or(EngineError::RangeError {
            offset: ofs,
            size: bytes.len(),
            len: self.fam.buf.len(),
        })?;
        if current == bytes.as_slice() {
            return Ok(vec![]);
        }
        Ok(vec![self.fam.buf.write("speed_limit_fix", ofs, &bytes)?])
    }
}

impl Model for Mi5elite {
    fn name(&self) -> &'static str {
        "mi5elite"
    }

    fn speed_limit_ped(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("slp", kmh, 1.0, 29.6)?;
        self.patch_speed_block(Some(kmh), None, None)
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sld", kmh, 1.0, 39.5)?;
        self.patch_speed_block(None, Some(kmh), None)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("sls", kmh, 1.0, 39.5)?;
        self.patch_speed_block(None, None, Some(kmh))
    }

    fn motor_start_speed(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        validate_range("mss", kmh, 1.0, 9.0)?;
        let sig = Signature::exact(SIG_MOTOR_START);
        let ofs_sig = self.fam.buf.find(&sig, None, None)?;
        let speed = N32Family::calc_speed(kmh, SPEED_FACTOR, 0);
        let hyst = speed / 2;

        let mut out = Vec::with_capacity(3);
        out.push(self.fam.buf.write("motor_start_speed_threshold_1", ofs_sig + 2, &[(speed & 0xFF) as u8])?);
        out.push(self.fam.buf.write("motor_start_speed_hysteresis", ofs_sig + 10, &[(hyst & 0xFF) as u8])?);
        out.push(self.fam.buf.write("motor_start_speed_threshold_2", ofs_sig + 12, &[(speed & 0xFF) as u8])?);
        Ok(out)
    }

    fn fix_checksum(&mut self) -> EngineResult<Vec<PatchRecord>> {
        let (recs, image) = self.fam.fix_checksum()?;
        self.final_image = Some(image);
        Ok(recs)
    }

    fn into_bytes(self: Box<Self>) -> Vec<u8> {
        match self.final_image {
            Some(image) => image,
            None => self.fam.buf.into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firmware_with_speed_signatures() -> Vec<u8> {
        let mut data = vec![0u8; 512];
        data[100..100 + SIG_SPEED_LIMIT_RETURN.len()].copy_from_slice(SIG_SPEED_LIMIT_RETURN);
        data[200..200 + SIG_SPEED_LIMIT_DST.len()].copy_from_slice(SIG_SPEED_LIMIT_DST);
        // placed after each literal pool's pc base: ldr [pc, #imm] only encodes
        // forward (positive, word-aligned) offsets.
        data[96..96 + 4].copy_from_slice(&[0x8A, 0x01, 0x00, 0x20]);
        data[260..260 + 4].copy_from_slice(&[0xA4, 0x01, 0x00, 0x20]);
        data
    }

    #[test]
    fn first_speed_patch_installs_branch_and_table() {
        let mut m = Mi5elite::new(firmware_with_speed_signatures());
        let recs = m.speed_limit_drive(25.0).unwrap();
        assert!(recs.iter().any(|r| r.name == "branch_patch"));
        assert!(recs.iter().any(|r| r.name == "speed_logic_block"));
        assert!(m.speed_block_patched);
    }

    #[test]
    fn second_speed_patch_only_rebuilds_table() {
        let mut m = Mi5elite::new(firmware_with_speed_signatures());
        m.speed_limit_drive(25.0).unwrap();
        let recs = m.speed_limit_sport(30.0).unwrap();
        assert!(!recs.iter().any(|r| r.name == "branch_patch"));
        assert!(recs.iter().any(|r| r.name == "speed_logic_block"));
    }

    #[test]
    fn motor_start_speed_rejects_out_of_range() {
        let mut m = Mi5elite::new(vec![0u8; 64]);
        assert!(m.motor_start_speed(20.0).is_err());
    }
}
