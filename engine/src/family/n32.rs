//! N32 chip-family patcher: XOR-0xAA encrypted firmware inside an outer
//! image envelope, with a bit-reversed CRC-16 trailer.

use crate::base::{PatchBuffer, PatchRecord};
use crate::checksum;
use crate::error::{EngineError, EngineResult};

const ENCRYPTION_KEY: u8 = 0xAA;
const FIRMWARE_OFFSET: usize = 0x80;
const FIRMWARE_SIZE: usize = 0x9880;
const CRC_START_OFFSET: usize = 0x40;
const MIN_FIRMWARE_SIZE: usize = 0x42;
const MIN_PADDING_LENGTH: usize = 500;
const ALIGNMENT_BOUNDARY: usize = 128;

fn xor_with_key(data: &[u8]) -> Vec<u8> {
    data.iter().map(|&b| b ^ ENCRYPTION_KEY).collect()
}

/// Longest run of a constant byte in {0xAA, 0x00} longer than
/// `MIN_PADDING_LENGTH`; the index just past it, rounded up to the next
/// 128-byte boundary. Falls back to `data.len()` if no such run exists.
fn calculate_firmware_size(data: &[u8]) -> usize {
    let mut max_len = 0usize;
    let mut max_end = 0usize;
    let mut i = 0usize;
    while i < data.len() {
        let b = data[i];
        if b == 0xAA || b == 0x00 {
            let start = i;
            while i < data.len() && data[i] == b {
                i += 1;
            }
            let len = i - start;
            if len > max_len && len > MIN_PADDING_LENGTH {
                max_len = len;
                max_end = i;
            }
        } else {
            i += 1;
        }
    }
    if max_end > 0 {
        max_end.div_ceil(ALIGNMENT_BOUNDARY) * ALIGNMENT_BOUNDARY
    } else {
        data.len()
    }
}

fn verify_crc(data: &[u8]) -> EngineResult<bool> {
    let fw_size = calculate_firmware_size(data);
    if fw_size < MIN_FIRMWARE_SIZE {
        return Ok(false);
    }
    let crc_end = fw_size - 2;
    let Some(embedded) = data.get(crc_end..crc_end + 2) else {
        return Ok(false);
    };
    let embedded = u16::from_be_bytes([embedded[0], embedded[1]]);
    let calculated = checksum::crc16_reflected(data, CRC_START_OFFSET, crc_end - CRC_START_OFFSET)?;
    Ok(embedded == calculated)
}

/// N32-family patcher. Transparently strips the outer envelope (if
/// present) and decrypts the firmware (if it was encrypted) on
/// construction; [`N32Family::fix_checksum`] undoes both at the end.
pub struct N32Family {
    pub buf: PatchBuffer,
    header: Vec<u8>,
    footer: Vec<u8>,
    was_encrypted: bool,
}

impl N32Family {
    pub fn new(data: Vec<u8>) -> Self {
        let (firmware, header, footer) = if data.len() >= FIRMWARE_OFFSET + FIRMWARE_SIZE {
            (
                data[FIRMWARE_OFFSET..FIRMWARE_OFFSET + FIRMWARE_SIZE].to_vec(),
                data[..FIRMWARE_OFFSET].to_vec(),
                data[FIRMWARE_OFFSET + FIRMWARE_SIZE..].to_vec(),
            )
        } else {
            (data, Vec::new(), Vec::new())
        };

        let was_encrypted = verify_crc(&firmware).unwrap_or(false);
        let firmware = if was_encrypted {
            xor_with_key(&firmware)
        } else {
            firmware
        };

        N32Family {
            buf: PatchBuffer::new(firmware),
            header,
            footer,
            was_encrypted,
        }
    }

    pub fn calc_speed(kmh: f64, factor: f64, _size: usize) -> i64 {
        (factor * kmh).floor() as i64
    }

    pub fn calc_speed_bytes(kmh: f64, factor: f64, size: usize) -> Vec<u8> {
        let value = Self::calc_speed(kmh, factor, size);
        value.to_le_bytes()[..size].to_vec()
    }

    /// Re-encrypts (if the input was encrypted) and recomputes the
    /// bit-reversed CRC-16 trailer, then splices the envelope back
    /// together if one was present on input.
    pub fn fix_checksum(&mut self) -> EngineResult<(Vec<PatchRecord>, Vec<u8>)> {
        let currently_encrypted = verify_crc(self.buf.as_slice())?;
        if self.was_encrypted && !currently_encrypted {
            let reencrypted = xor_with_key(self.buf.as_slice());
            self.buf.replace_all(reencrypted);
        }

        let fw_size = calculate_firmware_size(self.buf.as_slice());
        if fw_size < MIN_FIRMWARE_SIZE {
            return Err(EngineError::RangeError {
                offset: 0,
                size: MIN_FIRMWARE_SIZE,
                len: fw_size,
            });
        }
        let crc_end = fw_size - 2;
        let crc = checksum::crc16_reflected(self.buf.as_slice(), CRC_START_OFFSET, crc_end - CRC_START_OFFSET)?;
        let rec = self.buf.write("fix_checksum", crc_end, &crc.to_be_bytes())?;

        let full_image = if !self.header.is_empty() && !self.footer.is_empty() {
            let mut image = Vec::with_capacity(self.header.len() + self.buf.len() + self.footer.len());
            image.extend_from_slice(&self.header);
            image.extend_from_slice(self.buf.as_slice());
            image.extend_from_slice(&self.footer);
            image
        } else {
            self.buf.as_slice().to_vec()
        };

        Ok((vec![rec], full_image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_plaintext_firmware() -> Vec<u8> {
        vec![0u8; 1024]
    }

    #[test]
    fn xor_roundtrip_is_symmetric() {
        let data = vec![0x01, 0x02, 0xAA, 0xFF];
        let enc = xor_with_key(&data);
        let dec = xor_with_key(&enc);
        assert_eq!(dec, data);
    }

    #[test]
    fn firmware_size_falls_back_to_full_length_without_padding() {
        let data = vec![0x11; 200];
        assert_eq!(calculate_firmware_size(&data), data.len());
    }

    #[test]
    fn firmware_size_detects_padding_run() {
        let mut data = vec![0x11; 100];
        data.extend(vec![0x00; 600]);
        let size = calculate_firmware_size(&data);
        assert_eq!(size % ALIGNMENT_BOUNDARY, 0);
        assert!(size >= 700);
    }

    #[test]
    fn unencrypted_input_is_not_touched_by_constructor() {
        let fw = make_plaintext_firmware();
        let fam = N32Family::new(fw.clone());
        assert_eq!(fam.buf.as_slice(), fw.as_slice());
        assert!(!fam.was_encrypted);
    }

    #[test]
    fn fix_checksum_writes_trailing_crc() {
        let mut fw = vec![0u8; 200];
        fw[100..].copy_from_slice(&vec![0x00; 100]);
        let mut fam = N32Family::new(fw);
        let (recs, image) = fam.fix_checksum().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(image.len(), fam.buf.len());
    }
}
