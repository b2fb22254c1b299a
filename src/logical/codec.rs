//! Versioned JSON plan codec
//!
//! ```text
//! { "version": 1, "plan": { "kind": "root", "child": { "kind": "scan", ... } } }
//! ```
//!
//! The version is checked before the plan body is decoded, so a plan from an
//! unknown version is reported as such rather than as a shape mismatch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{LogicalError, LogicalResult};
use super::node::LogicalNode;

pub const PLAN_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PlanEnvelope {
    version: u32,
    plan: LogicalNode,
}

pub fn encode_plan(plan: &LogicalNode) -> LogicalResult<String> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        version: u32,
        plan: &'a LogicalNode,
    }

    serde_json::to_string_pretty(&Borrowed {
        version: PLAN_FORMAT_VERSION,
        plan,
    })
    .map_err(|e| LogicalError::Codec(e.to_string()))
}

pub fn decode_plan(json: &str) -> LogicalResult<LogicalNode> {
    let value: Value = serde_json::from_str(json).map_err(|e| LogicalError::Codec(e.to_string()))?;

    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| LogicalError::Codec("missing plan version".into()))?;
    if version != u64::from(PLAN_FORMAT_VERSION) {
        return Err(LogicalError::UnsupportedVersion {
            found: version,
            supported: PLAN_FORMAT_VERSION,
        });
    }

    let envelope: PlanEnvelope =
        serde_json::from_value(value).map_err(|e| LogicalError::Codec(e.to_string()))?;
    Ok(envelope.plan)
}
