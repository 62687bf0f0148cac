// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod machine;
pub mod observer;
pub mod peripherals;
pub mod snapshot;

use std::any::Any;

pub use machine::Machine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Misaligned register access at {0:#x}")]
    MisalignedAccess(u64),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait representing a memory-mapped peripheral.
///
/// Registers are 32 bits wide and addressed by byte offset from the
/// peripheral base. Reads take `&mut self` since some registers (a receive
/// FIFO) change state when read.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, offset: u64) -> SimResult<u32>;
    fn write(&mut self, offset: u64, value: u32) -> SimResult<()>;

    /// Register contents without read side effects. Write-only
    /// configuration registers report their last written value.
    fn peek(&self, offset: u64) -> u32;

    /// Advance the peripheral by `cycles` reference clock cycles.
    fn tick(&mut self, _cycles: u64) {}

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
