// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod record;
pub mod submission;

pub use record::{RemoteFields, Record};
pub use submission::Submission;
