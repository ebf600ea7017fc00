//! Explicit scooter-model registry: one enum variant per supported model,
//! dispatched by `match` rather than scanned from a module directory.

use crate::model::mi4::Mi4;
use crate::model::mi4lite::Mi4lite;
use crate::model::mi4pro2nd::Mi4pro2nd;
use crate::model::mi5::Mi5;
use crate::model::mi5elite::Mi5elite;
use crate::model::mi5max::Mi5max;
use crate::model::mi5pro::Mi5pro;
use crate::model::s60::S60;
use crate::model::ultra4::Ultra4;
use crate::model::Model;

/// The LKS32/ES32/N32 firmware families this engine can patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScooterModel {
    Mi4,
    Mi4lite,
    Mi4pro2nd,
    Mi5,
    Mi5elite,
    Mi5max,
    Mi5pro,
    S60,
    Ultra4,
}

impl ScooterModel {
    /// Lowercase CLI token for this model, e.g. `mi4lite`, `mi5pro`.
    pub fn as_str(self) -> &'static str {
        match self {
            ScooterModel::Mi4 => "mi4",
            ScooterModel::Mi4lite => "mi4lite",
            ScooterModel::Mi4pro2nd => "mi4pro2nd",
            ScooterModel::Mi5 => "mi5",
            ScooterModel::Mi5elite => "mi5elite",
            ScooterModel::Mi5max => "mi5max",
            ScooterModel::Mi5pro => "mi5pro",
            ScooterModel::S60 => "s60",
            ScooterModel::Ultra4 => "ultra4",
        }
    }

    pub fn from_str(token: &str) -> Option<Self> {
        Some(match token {
            "mi4" => ScooterModel::Mi4,
            "mi4lite" => ScooterModel::Mi4lite,
            "mi4pro2nd" => ScooterModel::Mi4pro2nd,
            "mi5" => ScooterModel::Mi5,
            "mi5elite" => ScooterModel::Mi5elite,
            "mi5max" => ScooterModel::Mi5max,
            "mi5pro" => ScooterModel::Mi5pro,
            "s60" => ScooterModel::S60,
            "ultra4" => ScooterModel::Ultra4,
            _ => return None,
        })
    }

    pub const ALL: &'static [ScooterModel] = &[
        ScooterModel::Mi4,
        ScooterModel::Mi4lite,
        ScooterModel::Mi4pro2nd,
        ScooterModel::Mi5,
        ScooterModel::Mi5elite,
        ScooterModel::Mi5max,
        ScooterModel::Mi5pro,
        ScooterModel::S60,
        ScooterModel::Ultra4,
    ];

    /// Build the concrete patcher for this model over `data`.
    pub fn build(self, data: Vec<u8>) -> Box<dyn Model> {
        match self {
            ScooterModel::Mi4 => Box::new(Mi4::new(data)),
            ScooterModel::Mi4lite => Box::new(Mi4lite::new(data)),
            ScooterModel::Mi4pro2nd => Box::new(Mi4pro2nd::new(data)),
            ScooterModel::Mi5 => Box::new(Mi5::new(data)),
            ScooterModel::Mi5elite => Box::new(Mi5elite::new(data)),
            ScooterModel::Mi5max => Box::new(Mi5max::new(data)),
            ScooterModel::Mi5pro => Box::new(Mi5pro::new(data)),
            ScooterModel::S60 => Box::new(S60::new(data)),
            ScooterModel::Ultra4 => Box::new(Ultra4::new(data)),
        }
    }

    /// Whether `chk` should be auto-appended to a patch token list that
    /// doesn't already end with one: true for every ES32/N32 model, since
    /// their checksum layout is mandatory for the firmware to boot.
    pub fn auto_appends_checksum(self) -> bool {
        matches!(
            self,
            ScooterModel::Mi4pro2nd
                | ScooterModel::Mi5pro
                | ScooterModel::S60
                | ScooterModel::Mi5elite
        )
    }
}

impl std::fmt::Display for ScooterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_model_token() {
        for model in ScooterModel::ALL {
            assert_eq!(ScooterModel::from_str(model.as_str()), Some(*model));
        }
    }

    #[test]
    fn unknown_token_is_none() {
        assert_eq!(ScooterModel::from_str("not-a-model"), None);
    }
}
