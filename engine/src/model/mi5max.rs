//! Mi 5 Max: LKS32, identical speed-limit trampoline to [`super::mi5`] plus
//! regional-serial neutralization for the markets that ship it.

use crate::base::PatchRecord;
use crate::error::EngineResult;
use crate::model::mi5::Mi5;
use crate::model::Model;

const REGIONAL_SERIAL_TAGS: &[[u8; 4]] = &[[0x85, 0xEC, 0x00, 0x00], [0xC4, 0xEE, 0x00, 0x00]];

pub struct Mi5max {
    inner: Mi5,
}

impl Mi5max {
    pub fn new(data: Vec<u8>) -> Self {
        Mi5max { inner: Mi5::new(data) }
    }
}

impl Model for Mi5max {
    fn name(&self) -> &'static str {
        "mi5max"
    }

    fn speed_limit_drive(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        self.inner.speed_limit_drive_impl(kmh)
    }

    fn speed_limit_sport(&mut self, kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        self.inner.speed_limit_sport_impl(kmh)
    }

    fn region_free(&mut self) -> EngineResult<Vec<PatchRecord>> {
        self.inner.fam.region_free(REGIONAL_SERIAL_TAGS)
    }

    fn fix_checksum(&mut self) -> EngineResult<Vec<PatchRecord>> {
        self.inner.fam.fix_checksum()
    }

    fn fake_drv_version(&mut self, version: &str) -> EngineResult<Vec<PatchRecord>> {
        Ok(vec![self.inner.fam.fake_drv_version(version)?])
    }

    fn into_bytes(self: Box<Self>) -> Vec<u8> {
        self.inner.fam.buf.into_bytes()
    }
}
