//! Coverage report parser (spec §4.8): recognizes two common summary
//! shapes so the Coverage gate doesn't depend on one specific tool's exact
//! output format.

use std::path::Path;

use serde_json::Value;

use super::VerificationError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoverageReport {
    pub pct: f64,
}

/// Parse a coverage JSON report recognizing:
/// - a root-level `{ "total": N, "covered": N, "percent": f64 }`-ish object
///   with a top-level `percent` or `pct` field, and
/// - a keyed report nesting the figure at `total.lines.pct` (the shape
///   `nyc`/`istanbul`-style tools emit) or the equivalent `lines.pct`.
///
/// Any other shape is reported as [`VerificationError::CoverageUnparseable`].
pub fn parse_coverage_report(path: &Path, contents: &str) -> Result<CoverageReport, VerificationError> {
    let value: Value = serde_json::from_str(contents)
        .map_err(|_| VerificationError::CoverageUnparseable(path.to_path_buf()))?;

    if let Some(pct) = value
        .get("percent")
        .or_else(|| value.get("pct"))
        .and_then(Value::as_f64)
    {
        return Ok(CoverageReport { pct });
    }

    if let Some(pct) = value
        .pointer("/total/lines/pct")
        .or_else(|| value.pointer("/lines/pct"))
        .and_then(Value::as_f64)
    {
        return Ok(CoverageReport { pct });
    }

    Err(VerificationError::CoverageUnparseable(path.to_path_buf()))
}
