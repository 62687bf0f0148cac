// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::SystemBus;
use crate::peripherals::led::Led;
use crate::peripherals::uart::Uart;
use crate::snapshot::{MachineSnapshot, PollSnapshot};
use crate::SimResult;
use picoblink_config::Variant;
use picoblink_poll::{regs, PollConfig, PollLoop, StepReport};

/// Poll-loop settings for `variant` on a SoC clocked at `reference_clock_hz`.
pub fn poll_config_for(variant: Variant, reference_clock_hz: u32) -> PollConfig {
    let base = match variant {
        Variant::Echo => PollConfig::echo(),
        Variant::Burst => PollConfig::startup_burst(),
    };
    PollConfig {
        reference_clock_hz,
        ..base
    }
}

/// Runs the poll loop against a simulated SoC.
///
/// Time only moves between iterations: each `step` first advances every
/// peripheral by `cycles_per_iteration` reference clock cycles, then runs
/// one poll-loop iteration against the bus. Boot is instantaneous.
#[derive(Debug)]
pub struct Machine {
    pub bus: SystemBus,
    poll: PollLoop,
    reference_clock_hz: u32,
    cycles_per_iteration: u32,
    total_cycles: u64,
    iterations: u64,
    booted: bool,
}

impl Machine {
    pub fn new(bus: SystemBus, config: PollConfig, cycles_per_iteration: u32) -> Self {
        Self {
            bus,
            poll: PollLoop::new(config),
            reference_clock_hz: config.reference_clock_hz,
            cycles_per_iteration,
            total_cycles: 0,
            iterations: 0,
            booted: false,
        }
    }

    pub fn poll(&self) -> &PollLoop {
        &self.poll
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Peripheral setup, including the startup burst when enabled.
    pub fn boot(&mut self) -> SimResult<()> {
        tracing::info!(
            "Booting poll loop (echo: {}, startup burst: {})",
            self.poll.config().echo,
            self.poll.config().startup_burst
        );
        self.poll.init(&mut self.bus)?;
        self.booted = true;
        Ok(())
    }

    /// One poll-loop iteration. Boots first if needed.
    pub fn step(&mut self) -> SimResult<StepReport> {
        if !self.booted {
            self.boot()?;
        }

        self.bus.tick_peripherals(self.cycles_per_iteration as u64);
        self.total_cycles += self.cycles_per_iteration as u64;
        self.iterations += 1;

        let report = self.poll.step(&mut self.bus)?;
        if let Some(led) = report.led {
            tracing::debug!("LED pattern {} at {} ms", led, self.elapsed_ms());
        }
        Ok(report)
    }

    /// Run `iterations` poll-loop iterations.
    pub fn run(&mut self, iterations: u64) -> SimResult<()> {
        for _ in 0..iterations {
            self.step()?;
        }
        Ok(())
    }

    /// Run until at least `ms` of simulated time have elapsed.
    pub fn run_for_ms(&mut self, ms: u64) -> SimResult<()> {
        let target = self.cycles_for_ms(ms);
        while self.total_cycles < target {
            self.step()?;
        }
        Ok(())
    }

    pub fn cycles_for_ms(&self, ms: u64) -> u64 {
        ms * self.reference_clock_hz as u64 / 1_000
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.total_cycles * 1_000 / self.reference_clock_hz as u64
    }

    pub fn led_value(&self) -> u32 {
        self.bus.peek_u32(regs::LED as u64).unwrap_or(0)
    }

    /// Writes that changed the first LED bank's output.
    pub fn led_changes(&self) -> u64 {
        self.bus.first_of::<Led>().map(Led::changes).unwrap_or(0)
    }

    /// Feed bytes into the first UART's receive FIFO.
    pub fn push_uart_rx(&mut self, bytes: &[u8]) {
        match self.bus.first_of_mut::<Uart>() {
            Some(uart) => uart.push_rx(bytes),
            None => tracing::warn!("No UART on the bus; dropping {} RX bytes", bytes.len()),
        }
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            poll: PollSnapshot {
                echo: self.poll.config().echo,
                startup_burst: self.poll.config().startup_burst,
                last_time_ms: self.poll.last_time_ms(),
            },
            total_cycles: self.total_cycles,
            iterations: self.iterations,
            peripherals: self
                .bus
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
        }
    }
}
