// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register map and polling loop shared by the PicoSoC firmware and the
//! host-side simulator.
//!
//! The crate is `no_std` and allocation free. All hardware access goes
//! through [`RegisterBus`], implemented by [`MmioBus`] on the target and by
//! the simulated system bus on the host.
#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod poll_loop;
pub mod regs;

pub use bus::{MmioBus, RegisterBus};
pub use poll_loop::{PollConfig, PollLoop, StepReport};
