// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session management for dripcast.
//!
//! [`SessionPool`] owns one protocol client per device and drives pairing,
//! reconnects and teardown. Protocol events are reconciled into storage by
//! the [`Reconciler`]; [`Messenger`] covers direct sends and account
//! queries.

pub mod messaging;
pub mod pool;
pub mod qr;
pub mod reconciler;

pub use messaging::{Messenger, record_outbound, send_payload};
pub use pool::SessionPool;
pub use qr::render_qr_data_url;
pub use reconciler::{DeviceTransitions, Effect, Reconciler, plan};
