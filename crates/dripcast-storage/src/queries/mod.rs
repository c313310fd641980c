// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions. Each takes `&Database` and runs on the single
//! connection thread.

pub mod campaigns;
pub mod contacts;
pub mod devices;
pub mod messages;
pub mod recipients;
