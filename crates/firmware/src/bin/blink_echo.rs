// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! LED sawtooth every 20 ms, every received UART byte sent straight back.
#![no_std]
#![no_main]

use panic_halt as _;
use picoblink_poll::{MmioBus, PollConfig, PollLoop};
use riscv_rt::entry;

#[entry]
fn main() -> ! {
    // Everything is polled; keep machine interrupts masked.
    // SAFETY: single hart, no critical sections exist yet.
    unsafe { riscv::interrupt::disable() };

    // SAFETY: sole owner of the PicoSoC register map.
    let mut bus = unsafe { MmioBus::new() };
    let mut poll = PollLoop::new(PollConfig::echo());

    match poll.run(&mut bus) {
        Ok(never) => match never {},
        Err(never) => match never {},
    }
}
