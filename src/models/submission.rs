// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Flat submission payload sent by the game client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Payload POSTed by the submission agent.
///
/// Only the identity fields, `l3_moves` and `v_seen` reach the remote table;
/// the rest is session metadata that the endpoint drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Submission {
    pub name: String,
    pub grade: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub l3_moves: u64,
    pub v_seen: bool,
    /// Elapsed play time in whole seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_sec: Option<u64>,
    /// When the submission was built (RFC 3339, UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Game name, version and any caller-supplied extras
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[cfg_attr(
        feature = "binding-generation",
        ts(type = "Record<string, unknown>")
    )]
    pub meta: Map<String, Value>,
}

impl Submission {
    /// Names of the identity fields that are empty.
    pub fn missing_identity(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_empty() {
            missing.push("name");
        }
        if self.grade.is_empty() {
            missing.push("grade");
        }
        if self.class_name.is_empty() {
            missing.push("class");
        }
        missing
    }
}
