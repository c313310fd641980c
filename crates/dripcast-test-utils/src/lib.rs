// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for dripcast integration tests.
//!
//! # Components
//!
//! - [`MockClient`] - scripted protocol client with send capture and event injection
//! - [`MockClientFactory`] - hands out mock clients and remembers them per device
//! - [`TestHarness`] - temp database, session pool and dispatch stack in one place

pub mod harness;
pub mod mock_client;

pub use harness::{TestHarness, TestHarnessBuilder, wait_until};
pub use mock_client::{MockClient, MockClientFactory, SentMessage};
