//! Top-level entrypoint: parses patch tokens, enforces the `chk`-last
//! ordering rule, dispatches each token to the named capability, and
//! applies the CLI-vs-web error policy.

use crate::base::PatchRecord;
use crate::error::{EngineError, EngineResult};
use crate::model::Model;
use crate::registry::ScooterModel;

/// One of the ten patch capabilities the token grammar recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Sls,
    Sld,
    Slp,
    Rsls,
    Dms,
    Mss,
    Rfm,
    Cce,
    Fdv,
    Chk,
}

impl PatchKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sls" => PatchKind::Sls,
            "sld" => PatchKind::Sld,
            "slp" => PatchKind::Slp,
            "rsls" => PatchKind::Rsls,
            "dms" => PatchKind::Dms,
            "mss" => PatchKind::Mss,
            "rfm" => PatchKind::Rfm,
            "cce" => PatchKind::Cce,
            "fdv" => PatchKind::Fdv,
            "chk" => PatchKind::Chk,
            _ => return None,
        })
    }
}

/// A parsed `name` or `name=value` token.
#[derive(Debug, Clone)]
pub struct PatchToken {
    pub kind: PatchKind,
    pub raw_value: Option<String>,
}

/// Split a comma-separated token list into parsed tokens. Unknown names
/// fail fast — a parse-time error, not a runtime capability miss.
///
/// `value` presence is judged by whether `name=value` was written at all,
/// never by whether the parsed value is falsy — `mss=0` is a present
/// value, not an absent one.
pub fn parse_tokens(patches: &str) -> EngineResult<Vec<PatchToken>> {
    patches
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_token)
        .collect()
}

fn parse_token(tok: &str) -> EngineResult<PatchToken> {
    let (name, value) = match tok.split_once('=') {
        Some((n, v)) => (n, Some(v.to_string())),
        None => (tok, None),
    };
    let kind = PatchKind::from_name(name)
        .ok_or_else(|| EngineError::InvalidParameter(format!("unrecognized patch token '{name}'")))?;
    Ok(PatchToken { kind, raw_value: value })
}

fn require_value<'a>(token: &'a PatchToken, name: &'static str) -> EngineResult<&'a str> {
    token
        .raw_value
        .as_deref()
        .ok_or_else(|| EngineError::InvalidParameter(format!("'{name}' requires a value")))
}

fn parse_speed(token: &PatchToken, name: &'static str) -> EngineResult<f64> {
    require_value(token, name)?
        .parse::<f64>()
        .map_err(|_| EngineError::InvalidParameter(format!("'{name}' value must be a number")))
}

fn dispatch(model: &mut dyn Model, token: &PatchToken) -> EngineResult<Vec<PatchRecord>> {
    match token.kind {
        PatchKind::Sls => model.speed_limit_sport(parse_speed(token, "sls")?),
        PatchKind::Sld => model.speed_limit_drive(parse_speed(token, "sld")?),
        PatchKind::Slp => model.speed_limit_ped(parse_speed(token, "slp")?),
        PatchKind::Rsls => model.remove_speed_limit_sport(),
        PatchKind::Dms => model.dashboard_max_speed(parse_speed(token, "dms")?),
        PatchKind::Mss => model.motor_start_speed(parse_speed(token, "mss")?),
        PatchKind::Rfm => model.region_free(),
        PatchKind::Cce => model.cruise_control_enable(),
        PatchKind::Fdv => model.fake_drv_version(require_value(token, "fdv")?),
        PatchKind::Chk => model.fix_checksum(),
    }
}

/// Patch `input` for `model` according to the comma-separated `patches`
/// token list.
///
/// In `web` mode, any patch error aborts the session and is propagated
/// unchanged. In CLI mode (`web = false`), only [`EngineError::PatternNotFound`]
/// is recoverable — it is logged and the session continues with the
/// remaining tokens; every other error kind always aborts, in both modes.
pub fn patch_firmware(
    model: ScooterModel,
    input: Vec<u8>,
    patches: &str,
    web: bool,
) -> EngineResult<Vec<u8>> {
    let mut tokens = parse_tokens(patches)?;
    if model.auto_appends_checksum() && !matches!(tokens.last().map(|t| t.kind), Some(PatchKind::Chk)) {
        tokens.push(PatchToken { kind: PatchKind::Chk, raw_value: None });
    }

    let mut patcher = model.build(input);
    let mut skipped = Vec::new();

    for token in &tokens {
        match dispatch(patcher.as_mut(), token) {
            Ok(records) => {
                log::debug!("{:?}: {} byte edit(s)", token.kind, records.len());
            }
            Err(EngineError::PatternNotFound(msg)) if !web => {
                log::warn!("{:?}: pattern not found, skipping: {msg}", token.kind);
                skipped.push((token.kind, msg));
            }
            Err(e) => return Err(e),
        }
    }

    for (kind, msg) in &skipped {
        log::error!("patch {kind:?} did not apply: {msg}");
    }

    Ok(patcher.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_valued_tokens() {
        let tokens = parse_tokens("rfm,sld=20.0,chk").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, PatchKind::Rfm);
        assert_eq!(tokens[1].kind, PatchKind::Sld);
        assert_eq!(tokens[1].raw_value.as_deref(), Some("20.0"));
        assert_eq!(tokens[2].kind, PatchKind::Chk);
    }

    #[test]
    fn zero_value_is_present_not_absent() {
        let tokens = parse_tokens("mss=0").unwrap();
        assert_eq!(tokens[0].raw_value.as_deref(), Some("0"));
    }

    #[test]
    fn unknown_token_is_invalid_parameter() {
        assert!(matches!(
            parse_tokens("bogus"),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn fdv_with_bad_value_aborts_before_mutation() {
        let data = vec![0u8; 64];
        let result = patch_firmware(ScooterModel::Mi4, data, "fdv=12ab", false);
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn auto_appends_chk_for_es32_models() {
        let mut data = vec![0u8; 256];
        data[40..51].copy_from_slice(b"SZMC-ES-ZM-");
        let result = patch_firmware(ScooterModel::Mi4pro2nd, data.clone(), "", false);
        // with no tokens given, the orchestrator still appends chk because
        // mi4pro2nd is an ES32 model.
        assert!(result.is_ok());
    }
}
