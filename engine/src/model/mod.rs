//! Model patchers: one per scooter model, each binding concrete
//! signatures to the family primitives and exposing the subset of
//! [`Model`]'s capabilities the real firmware supports.

pub mod mi4;
pub mod mi4lite;
pub mod mi4pro2nd;
pub mod mi5;
pub mod mi5elite;
pub mod mi5max;
pub mod mi5pro;
pub mod s60;
pub mod ultra4;

use crate::base::PatchRecord;
use crate::error::{EngineError, EngineResult};

/// Inclusive range check shared by every speed-parameter capability.
pub fn validate_range(name: &'static str, value: f64, lo: f64, hi: f64) -> EngineResult<()> {
    if value < lo || value > hi {
        return Err(EngineError::InvalidParameter(format!(
            "{name} must be between {lo} and {hi} km/h, got {value}"
        )));
    }
    Ok(())
}

/// Capability surface every model patcher may implement. Unimplemented
/// capabilities default to [`EngineError::UnsupportedCapability`] — a
/// compile-time property of the model, reported only when dispatched.
pub trait Model {
    fn name(&self) -> &'static str;

    fn unsupported(&self, capability: &'static str) -> EngineError {
        EngineError::UnsupportedCapability {
            capability,
            model: self.name(),
        }
    }

    fn speed_limit_sport(&mut self, _kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("sls"))
    }

    fn speed_limit_drive(&mut self, _kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("sld"))
    }

    fn speed_limit_ped(&mut self, _kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("slp"))
    }

    /// Defaults to `speed_limit_sport(36.7)` per spec — every LKS32 model
    /// defines `rsls` this way; override only where the family differs.
    fn remove_speed_limit_sport(&mut self) -> EngineResult<Vec<PatchRecord>> {
        self.speed_limit_sport(36.7)
    }

    fn dashboard_max_speed(&mut self, _kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("dms"))
    }

    fn motor_start_speed(&mut self, _kmh: f64) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("mss"))
    }

    fn region_free(&mut self) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("rfm"))
    }

    fn cruise_control_enable(&mut self) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("cce"))
    }

    fn fake_drv_version(&mut self, _version: &str) -> EngineResult<Vec<PatchRecord>> {
        Err(self.unsupported("fdv"))
    }

    fn fix_checksum(&mut self) -> EngineResult<Vec<PatchRecord>>;

    /// Consumes the patcher, returning the final output image.
    fn into_bytes(self: Box<Self>) -> Vec<u8>;
}
