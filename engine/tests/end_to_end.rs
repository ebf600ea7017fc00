//! Full-session tests: drive [`bw_patch_engine::patch_firmware`] over
//! synthetic firmware images built in memory, one per chip family, the
//! way a real `bw-patch` invocation would exercise it.

use bw_patch_engine::{patch_firmware, EngineError, ScooterModel};

#[test]
fn mi4_drive_limit_then_checksum_round_trips_length() {
    let mut data = vec![0u8; 0x200];

    // branch-redirect trampoline: src signature then dst signature 8 bytes later.
    data[0x10..0x18].copy_from_slice(&[0x20, 0x31, 0x00, 0x72, 0x0F, 0x00, 0x00, 0x72]);
    data[0x18..0x1E].copy_from_slice(&[0xF5, 0x31, 0x01, 0x83, 0x11, 0x48]);

    // speed_limit_drive search signature, with a second copy of the src
    // signature right after it so `patch_speed_limit` can relocate the literal.
    data[0x40..0x4A].copy_from_slice(&[0xCA, 0x00, 0x00, 0x80, 0x00, 0x00, 0xB9, 0x21, 0x00, 0x80]);
    data[0x4A..0x52].copy_from_slice(&[0x20, 0x31, 0x00, 0x72, 0x0F, 0x00, 0x00, 0x72]);

    // LKS32 body marker: sentinel, size, and enough room for the CRC range.
    data[0x106..0x108].copy_from_slice(&[0xFF, 0xFF]);
    data[0x108..0x10C].copy_from_slice(&0x10u32.to_le_bytes());
    data[0x110..0x118].copy_from_slice(b"LKS32MC0");

    let input = data.clone();
    let out = patch_firmware(ScooterModel::Mi4, input, "sld=20.0,chk", false).unwrap();

    assert_eq!(out.len(), data.len());
    // literal_offset computed by safe_ldr(0x40, 0x54) == 0x54.
    let value = i64::from_le_bytes([out[0x54], out[0x55], out[0x56], out[0x57], 0, 0, 0, 0]);
    assert_eq!(value, 200); // 20.0 km/h * 10
}

#[test]
fn mi4_rejects_out_of_range_speed_before_touching_the_buffer() {
    let data = vec![0u8; 64];
    let result = patch_firmware(ScooterModel::Mi4, data, "sld=99.0", false);
    assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
}

#[test]
fn mi4pro2nd_sport_limit_auto_appends_checksum() {
    let mut data = vec![0u8; 400];
    data[40..48].copy_from_slice(&[0x00, 0x00, 0xA1, 0x01, 0x0A, 0x02, 0xA1, 0x01]);
    data[200..211].copy_from_slice(b"SZMC-ES-ZM-");
    data[178..180].copy_from_slice(&[0x00, 0x08]); // crc range size, BE u16
    data[188..190].copy_from_slice(&[0xFF, 0xFF]); // finalize sentinel

    // no "chk" token given: the orchestrator appends it because this is an
    // ES32 model.
    let out = patch_firmware(ScooterModel::Mi4pro2nd, data.clone(), "sls=25.5", false).unwrap();

    assert_eq!(out.len(), data.len());
    // last of the 11 copies, written at match + 11*stride.
    let value = u16::from_le_bytes([out[62], out[63]]);
    assert_eq!(value, 532); // floor(20.9 * 25.5)
}

#[test]
fn ultra4_motor_start_speed_picks_register_and_encodes_byte() {
    let mut data = vec![0u8; 64];
    let sig = [0x16, 0xE0, 0x00, 0x88, 0x49, 0x00, 0x00, 0x00, 0x00, 0x42, 0x11, 0xD2];
    data[10..10 + sig.len()].copy_from_slice(&sig);
    data[10 + 4 + 1] = 0x25; // discriminator selects r5

    let out = patch_firmware(ScooterModel::Ultra4, data, "mss=5.0", false).unwrap();

    // movs r5, #99 (raw = -0.36*25 - 5.39*5 + 68.6 = 32.65 -> round 33 * 3 = 99)
    assert_eq!(&out[14..16], &[0x63, 0x25]);
}

#[test]
fn rfm_with_no_regional_tag_is_skipped_not_fatal_on_cli() {
    let data = vec![0u8; 64];
    let out = patch_firmware(ScooterModel::Mi5max, data.clone(), "rfm", false).unwrap();
    assert_eq!(out, data);
}

#[test]
fn rfm_with_no_regional_tag_aborts_the_session_in_web_mode() {
    let data = vec![0u8; 64];
    let result = patch_firmware(ScooterModel::Mi5max, data, "rfm", true);
    assert!(matches!(result, Err(EngineError::PatternNotFound(_))));
}

#[test]
fn fake_drv_version_with_bad_value_aborts_before_any_mutation() {
    let data = vec![0xABu8; 64];
    let result = patch_firmware(ScooterModel::Mi4, data, "fdv=12ab", false);
    assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
}

fn mi5elite_fixture() -> Vec<u8> {
    let mut data = vec![0u8; 700];
    data[20..38].copy_from_slice(&[
        0x08, 0x80, 0x52, 0x48, 0x52, 0x49, 0x00, 0x88, 0x09, 0x88, 0x00, 0xF1, 0x0A, 0x02, 0x8A, 0x42, 0x01, 0xD9,
    ]);
    data[60..72].copy_from_slice(&[0xDF, 0xF8, 0xF0, 0x81, 0xA8, 0xF8, 0x00, 0x10, 0x7B, 0x49, 0x67, 0x45]);
    data[300..304].copy_from_slice(&[0x8A, 0x01, 0x00, 0x20]);
    data[320..324].copy_from_slice(&[0xA4, 0x01, 0x00, 0x20]);
    data[450..466].copy_from_slice(&[
        0x01, 0x80, 0x2D, 0x2B, 0xEF, 0xD3, 0x11, 0x70, 0x70, 0xBD, 0x14, 0x33, 0x2D, 0x2B, 0x07, 0xD2,
    ]);
    data
}

#[test]
fn mi5elite_speed_sequence_then_motor_start_then_checksum() {
    let data = mi5elite_fixture();
    let out = patch_firmware(ScooterModel::Mi5elite, data.clone(), "slp=25.0,sld=30.0,sls=35.0,mss=5.0,chk", false)
        .unwrap();

    // length is preserved: no envelope was present, so fix_checksum splices nothing in.
    assert_eq!(out.len(), data.len());
    // motor start: threshold written at sig+2 and sig+12, hysteresis at sig+10.
    // speed = floor(10.0 * 5.0) = 50, hysteresis = 25.
    assert_eq!(out[450 + 2], 50);
    assert_eq!(out[450 + 10], 25);
    assert_eq!(out[450 + 12], 50);
}

#[test]
fn mi5elite_second_speed_patch_does_not_relocate_the_branch_twice() {
    let data = mi5elite_fixture();
    let after_one = patch_firmware(ScooterModel::Mi5elite, data.clone(), "sld=30.0", false).unwrap();
    let after_two =
        patch_firmware(ScooterModel::Mi5elite, data, "sld=30.0,sls=35.0", false).unwrap();

    // the branch patch at ldr_patch_offset (8) is identical whether or not
    // a second speed was also patched in the same session.
    assert_eq!(&after_one[8..14], &after_two[8..14]);
}

#[test]
fn unrecognized_patch_token_is_invalid_parameter_not_a_panic() {
    let data = vec![0u8; 16];
    let result = patch_firmware(ScooterModel::Mi4, data, "not_a_real_token", false);
    assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
}

#[test]
fn empty_patch_list_returns_input_unchanged_for_every_model() {
    for model in ScooterModel::ALL {
        let data = vec![0u8; 32];
        // LKS32/ES32/N32 models all fail fast on an empty buffer once `chk`
        // is auto-appended, but models that don't auto-append it must give
        // byte-identical output back.
        if model.auto_appends_checksum() {
            continue;
        }
        let out = patch_firmware(*model, data.clone(), "", false).unwrap();
        assert_eq!(out, data, "{model} mutated the buffer with no patches requested");
    }
}
