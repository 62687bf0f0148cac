// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! PicoSoC memory map.
//!
//! Addresses are part of the hardware contract and must not change.

/// LED output register. Low bits drive the LED bank.
pub const LED: u32 = 0x0300_0000;

pub const COUNTER_BASE: u32 = 0x0200_1000;
/// Counter configuration. Bit 0 enables the free-running counter.
pub const COUNTER_CFG: u32 = COUNTER_BASE;
/// Counter prescaler: the count advances every `prescaler + 1` clock cycles.
pub const COUNTER_PRESC: u32 = COUNTER_BASE + 0x04;
/// Free-running count, read-only.
pub const COUNTER_CNT: u32 = COUNTER_BASE + 0x08;

pub const UART_BASE: u32 = 0x0200_0100;
pub const UART_CFG: u32 = UART_BASE;
pub const UART_CLK_DIV: u32 = UART_BASE + 0x04;
pub const UART_STATUS: u32 = UART_BASE + 0x08;
pub const UART_TX: u32 = UART_BASE + 0x0C;
pub const UART_RX: u32 = UART_BASE + 0x10;

// Register offsets relative to each peripheral base.
pub const COUNTER_CFG_OFFSET: u64 = 0x00;
pub const COUNTER_PRESC_OFFSET: u64 = 0x04;
pub const COUNTER_CNT_OFFSET: u64 = 0x08;

pub const UART_CFG_OFFSET: u64 = 0x00;
pub const UART_CLK_DIV_OFFSET: u64 = 0x04;
pub const UART_STATUS_OFFSET: u64 = 0x08;
pub const UART_TX_OFFSET: u64 = 0x0C;
pub const UART_RX_OFFSET: u64 = 0x10;

pub const COUNTER_CFG_ENABLE: u32 = 1 << 0;

/// Set while the receive FIFO is empty; clear means a byte can be read.
pub const UART_STATUS_RX_EMPTY: u32 = 1 << 3;

/// Reference clock feeding both the counter and the UART.
pub const REFERENCE_CLOCK_HZ: u32 = 100_000_000;

/// Prescaler value that makes the counter advance at `tick_hz`.
/// Saturates at 0 when the clock is slower than `tick_hz`.
pub const fn counter_prescaler(reference_clock_hz: u32, tick_hz: u32) -> u32 {
    (reference_clock_hz / tick_hz).saturating_sub(1)
}

/// UART clock divisor for `baud_rate`.
pub const fn uart_divisor(reference_clock_hz: u32, baud_rate: u32) -> u32 {
    reference_clock_hz / baud_rate
}
