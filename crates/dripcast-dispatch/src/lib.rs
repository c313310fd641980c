// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast dispatch engine for dripcast.
//!
//! Recurring, jittered ticks drive campaigns forward one recipient at a
//! time: [`BroadcastDispatcher`] sends, [`RegistrationChecker`] confirms
//! contacts, and [`ReservationSweeper`] retires stuck reservations.
//! [`CampaignService`] is the owner-facing side.

pub mod broadcast;
pub mod campaigns;
pub mod pacing;
pub mod registration;
pub mod runner;
pub mod selector;

pub use broadcast::{BroadcastDispatcher, TickOutcome};
pub use campaigns::{
    CampaignRequest, CampaignService, ReservationSweeper, sweep_stale_reservations,
};
pub use pacing::PacingPolicy;
pub use registration::{RegistrationChecker, RegistrationOutcome};
pub use runner::{RecurringTask, run_tick, spawn_recurring};
pub use selector::{RecipientSelector, Selection};
