// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI support: mesh summaries and colored reporting

pub mod reporter;

pub use reporter::{MeshSummary, Reporter};
