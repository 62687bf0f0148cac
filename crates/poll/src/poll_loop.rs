// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use core::convert::Infallible;

use crate::bus::RegisterBus;
use crate::regs;

/// Tunables for [`PollLoop`]. The defaults describe PicoSoC at 100 MHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub reference_clock_hz: u32,
    pub tick_hz: u32,
    pub baud_rate: u32,
    /// Minimum counter ticks between two LED steps.
    pub led_interval_ms: u32,
    /// LED value that is replaced by 0.
    pub led_wrap: u32,
    /// Echo received UART bytes from the steady-state loop.
    pub echo: bool,
    /// Send the startup burst and drain the receive FIFO during `init`.
    pub startup_burst: bool,
    pub burst_len: u32,
    pub drain_limit: u32,
}

impl PollConfig {
    /// LED blinker plus UART echo.
    pub const fn echo() -> Self {
        Self {
            reference_clock_hz: regs::REFERENCE_CLOCK_HZ,
            tick_hz: 1_000,
            baud_rate: 115_200,
            led_interval_ms: 20,
            led_wrap: 0x10,
            echo: true,
            startup_burst: false,
            burst_len: 260,
            drain_limit: 16,
        }
    }

    /// LED blinker that transmits a startup burst and never echoes.
    pub const fn startup_burst() -> Self {
        Self {
            echo: false,
            startup_burst: true,
            ..Self::echo()
        }
    }

    pub const fn counter_prescaler(&self) -> u32 {
        regs::counter_prescaler(self.reference_clock_hz, self.tick_hz)
    }

    pub const fn uart_divisor(&self) -> u32 {
        regs::uart_divisor(self.reference_clock_hz, self.baud_rate)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::echo()
    }
}

/// What a single [`PollLoop::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// New LED register value, if the pattern advanced.
    pub led: Option<u32>,
    /// Byte read from the receiver and written back to the transmitter.
    pub echoed: Option<u8>,
}

/// The firmware main loop: an LED sawtooth on the millisecond counter and
/// a single-byte UART echo, both checked without blocking.
#[derive(Debug, Clone)]
pub struct PollLoop {
    config: PollConfig,
    last_time_ms: u32,
}

impl PollLoop {
    pub const fn new(config: PollConfig) -> Self {
        Self {
            config,
            last_time_ms: 0,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Counter value at which the LED pattern last advanced.
    pub fn last_time_ms(&self) -> u32 {
        self.last_time_ms
    }

    /// One-time peripheral setup. Runs the startup burst when enabled.
    pub fn init<B: RegisterBus>(&mut self, bus: &mut B) -> Result<(), B::Error> {
        bus.write(regs::LED, 0)?;

        bus.write(regs::COUNTER_PRESC, self.config.counter_prescaler())?;
        bus.write(regs::COUNTER_CFG, regs::COUNTER_CFG_ENABLE)?;

        bus.write(regs::UART_CLK_DIV, self.config.uart_divisor())?;

        if self.config.startup_burst {
            self.send_startup_burst(bus)?;
            self.drain_rx(bus)?;
        }
        Ok(())
    }

    /// Transmits `burst_len` consecutive byte values, wrapping at 256.
    pub fn send_startup_burst<B: RegisterBus>(&mut self, bus: &mut B) -> Result<(), B::Error> {
        for i in 0..self.config.burst_len {
            bus.write(regs::UART_TX, i & 0xFF)?;
        }
        Ok(())
    }

    /// Discards pending receive data, reading at most `drain_limit` bytes.
    /// Returns the number of bytes discarded.
    pub fn drain_rx<B: RegisterBus>(&mut self, bus: &mut B) -> Result<u32, B::Error> {
        let mut drained = 0;
        while drained < self.config.drain_limit {
            if bus.read(regs::UART_STATUS)? & regs::UART_STATUS_RX_EMPTY != 0 {
                break;
            }
            bus.read(regs::UART_RX)?;
            drained += 1;
        }
        Ok(drained)
    }

    /// Advances the LED pattern by one step when at least `led_interval_ms`
    /// ticks have passed. A long stall still yields a single step.
    pub fn led_tick<B: RegisterBus>(&mut self, bus: &mut B) -> Result<Option<u32>, B::Error> {
        let now = bus.read(regs::COUNTER_CNT)?;
        if now.wrapping_sub(self.last_time_ms) < self.config.led_interval_ms {
            return Ok(None);
        }
        self.last_time_ms = now;

        let mut leds = bus.read(regs::LED)?.wrapping_add(1);
        if leds == self.config.led_wrap {
            leds = 0;
        }
        bus.write(regs::LED, leds)?;
        Ok(Some(leds))
    }

    /// Moves at most one byte from the receiver to the transmitter.
    pub fn echo_once<B: RegisterBus>(&mut self, bus: &mut B) -> Result<Option<u8>, B::Error> {
        if bus.read(regs::UART_STATUS)? & regs::UART_STATUS_RX_EMPTY != 0 {
            return Ok(None);
        }
        let byte = bus.read(regs::UART_RX)? as u8;
        bus.write(regs::UART_TX, byte as u32)?;
        Ok(Some(byte))
    }

    /// One steady-state iteration: LED check first, then the echo path.
    pub fn step<B: RegisterBus>(&mut self, bus: &mut B) -> Result<StepReport, B::Error> {
        let led = self.led_tick(bus)?;
        let echoed = if self.config.echo {
            self.echo_once(bus)?
        } else {
            None
        };
        Ok(StepReport { led, echoed })
    }

    /// `init` followed by `step` forever. Only returns on a bus error.
    pub fn run<B: RegisterBus>(&mut self, bus: &mut B) -> Result<Infallible, B::Error> {
        self.init(bus)?;
        loop {
            self.step(bus)?;
        }
    }
}
