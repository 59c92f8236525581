// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Canonical game-completion record and its Bitable row representation.

use serde::{Deserialize, Serialize};

/// Bitable column names. These must match the remote table schema exactly.
pub mod columns {
    pub const NICKNAME: &str = "昵称";
    pub const GRADE: &str = "年级";
    pub const CLASS: &str = "班级";
    pub const LEVEL3_MOVES: &str = "第3关步数";
    /// Older clients spelled the number out.
    pub const LEVEL3_MOVES_ALT: &str = "第三关步数";
    pub const VIDEO_SEEN: &str = "是否看视频";
}

/// Affirmative option of the single-select video column.
pub const VIDEO_SEEN_YES: &str = "是";
/// Negative option of the single-select video column.
pub const VIDEO_SEEN_NO: &str = "否";

/// One normalized game-completion record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Student nickname (trimmed)
    pub nickname: String,
    /// School grade, e.g. "六年级" (trimmed)
    pub grade: String,
    /// Class within the grade, e.g. "3班" (trimmed)
    pub class_name: String,
    /// Moves used to finish level 3
    pub level3_moves: u64,
    /// Whether the intro video was watched
    pub video_seen: bool,
}

impl Record {
    /// True if at least one identity field carries a value.
    pub fn has_any_identity(&self) -> bool {
        !self.nickname.is_empty() || !self.grade.is_empty() || !self.class_name.is_empty()
    }

    /// Row payload for the remote table.
    pub fn to_remote_fields(&self) -> RemoteFields {
        RemoteFields {
            nickname: self.nickname.clone(),
            grade: self.grade.clone(),
            class_name: self.class_name.clone(),
            level3_moves: self.level3_moves,
            video_seen: if self.video_seen {
                VIDEO_SEEN_YES
            } else {
                VIDEO_SEEN_NO
            }
            .to_string(),
        }
    }
}

/// Exactly the five columns written to Bitable.
///
/// The video column is a single-select field, so it is always a plain string
/// option and never a structured value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFields {
    #[serde(rename = "昵称")]
    pub nickname: String,
    #[serde(rename = "年级")]
    pub grade: String,
    #[serde(rename = "班级")]
    pub class_name: String,
    #[serde(rename = "第3关步数")]
    pub level3_moves: u64,
    #[serde(rename = "是否看视频")]
    pub video_seen: String,
}
