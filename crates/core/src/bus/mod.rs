// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::observer::BusObserver;
use crate::peripherals::counter::Counter;
use crate::peripherals::led::Led;
use crate::peripherals::uart::{Uart, DEFAULT_RX_FIFO_DEPTH};
use crate::{Peripheral, SimResult, SimulationError};
use picoblink_config::{parse_size, SocDescriptor};
use picoblink_poll::{regs, RegisterBus};
use std::sync::{Arc, Mutex};

const DEFAULT_WINDOW_SIZE: u64 = 0x100;

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

#[derive(Debug, Default)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    observers: Vec<Arc<dyn BusObserver>>,
}

impl SystemBus {
    /// The stock PicoSoC map.
    pub fn new() -> Self {
        Self {
            peripherals: vec![
                PeripheralEntry {
                    name: "leds".to_string(),
                    base: regs::LED as u64,
                    size: DEFAULT_WINDOW_SIZE,
                    dev: Box::new(Led::new()),
                },
                PeripheralEntry {
                    name: "counter".to_string(),
                    base: regs::COUNTER_BASE as u64,
                    size: DEFAULT_WINDOW_SIZE,
                    dev: Box::new(Counter::new()),
                },
                PeripheralEntry {
                    name: "uart".to_string(),
                    base: regs::UART_BASE as u64,
                    size: DEFAULT_WINDOW_SIZE,
                    dev: Box::new(Uart::new()),
                },
            ],
            observers: Vec::new(),
        }
    }

    pub fn from_config(soc: &SocDescriptor) -> anyhow::Result<Self> {
        let mut bus = Self::default();

        for p_cfg in &soc.peripherals {
            let dev: Box<dyn Peripheral> = match p_cfg.r#type.as_str() {
                "led" => Box::new(Led::new()),
                "counter" => Box::new(Counter::new()),
                "uart" => {
                    let depth = p_cfg
                        .config_u64("rx_fifo_depth")?
                        .map(|d| d as usize)
                        .unwrap_or(DEFAULT_RX_FIFO_DEPTH);
                    Box::new(Uart::new_with_fifo_depth(depth))
                }
                other => {
                    tracing::warn!(
                        "Unsupported peripheral type '{}' for id '{}'; skipping",
                        other,
                        p_cfg.id
                    );
                    continue;
                }
            };

            let size = match &p_cfg.size {
                Some(size) => parse_size(size)?,
                None => DEFAULT_WINDOW_SIZE,
            };

            // Register addresses on the poll-loop side are 32 bits wide.
            let end = p_cfg
                .base_address
                .checked_add(size)
                .filter(|&end| end <= u32::MAX as u64 + 1)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Peripheral '{}' window {:#x}+{:#x} does not fit the 32-bit address space",
                        p_cfg.id,
                        p_cfg.base_address,
                        size
                    )
                })?;

            let entry = PeripheralEntry {
                name: p_cfg.id.clone(),
                base: p_cfg.base_address,
                size,
                dev,
            };
            // Every registered window already fits below 2^32, so these sums cannot overflow.
            if let Some(other) = bus
                .peripherals
                .iter()
                .find(|p| entry.base < p.base + p.size && p.base < end)
            {
                anyhow::bail!(
                    "Peripheral '{}' at {:#x} overlaps '{}' at {:#x}",
                    entry.name,
                    entry.base,
                    other.name,
                    other.base
                );
            }
            bus.peripherals.push(entry);
        }

        Ok(bus)
    }

    pub fn add_observer(&mut self, observer: Arc<dyn BusObserver>) {
        self.observers.push(observer);
    }

    /// Attach a UART TX capture sink to any UART peripherals on this bus.
    ///
    /// When `echo_stdout` is false, UART writes are not printed to stdout.
    pub fn attach_uart_tx_sink(&mut self, sink: Arc<Mutex<Vec<u8>>>, echo_stdout: bool) {
        for uart in self.peripherals_of_mut::<Uart>() {
            uart.set_sink(Some(sink.clone()), echo_stdout);
        }
    }

    fn locate(&self, addr: u64) -> SimResult<(usize, u64)> {
        if addr % 4 != 0 {
            return Err(SimulationError::MisalignedAccess(addr));
        }
        self.peripherals
            .iter()
            .position(|p| p.contains(addr))
            .map(|idx| (idx, addr - self.peripherals[idx].base))
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    pub fn read_u32(&mut self, addr: u64) -> SimResult<u32> {
        let (idx, offset) = self.locate(addr)?;
        let value = self.peripherals[idx].dev.read(offset)?;
        for observer in &self.observers {
            observer.on_read(addr, value);
        }
        Ok(value)
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        let (idx, offset) = self.locate(addr)?;
        self.peripherals[idx].dev.write(offset, value)?;
        for observer in &self.observers {
            observer.on_write(addr, value);
        }
        Ok(())
    }

    /// Register contents without side effects and without notifying observers.
    pub fn peek_u32(&self, addr: u64) -> SimResult<u32> {
        let (idx, offset) = self.locate(addr)?;
        Ok(self.peripherals[idx].dev.peek(offset))
    }

    pub fn tick_peripherals(&mut self, cycles: u64) {
        for p in &mut self.peripherals {
            p.dev.tick(cycles);
        }
    }

    /// First peripheral of type `T` registered under `name`.
    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .filter(|p| p.name == name)
            .find_map(|p| p.dev.as_any()?.downcast_ref::<T>())
    }

    pub fn peripheral_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .filter(|p| p.name == name)
            .find_map(|p| p.dev.as_any_mut()?.downcast_mut::<T>())
    }

    pub fn first_of<T: 'static>(&self) -> Option<&T> {
        self.peripherals
            .iter()
            .find_map(|p| p.dev.as_any()?.downcast_ref::<T>())
    }

    pub fn first_of_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.peripherals_of_mut::<T>().next()
    }

    fn peripherals_of_mut<T: 'static>(&mut self) -> impl Iterator<Item = &mut T> {
        self.peripherals
            .iter_mut()
            .filter_map(|p| p.dev.as_any_mut()?.downcast_mut::<T>())
    }
}

impl RegisterBus for SystemBus {
    type Error = SimulationError;

    fn read(&mut self, addr: u32) -> SimResult<u32> {
        self.read_u32(addr as u64)
    }

    fn write(&mut self, addr: u32, value: u32) -> SimResult<()> {
        self.write_u32(addr as u64, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::AccessLog;

    #[test]
    fn test_default_map_routes_registers() {
        let mut bus = SystemBus::new();
        bus.write_u32(regs::LED as u64, 3).unwrap();
        assert_eq!(bus.read_u32(regs::LED as u64).unwrap(), 3);

        bus.first_of_mut::<Uart>().unwrap().push_rx(b"x");
        assert_eq!(bus.read_u32(regs::UART_STATUS as u64).unwrap() & 0x8, 0);
        assert_eq!(bus.read_u32(regs::UART_RX as u64).unwrap(), b'x' as u32);
    }

    #[test]
    fn test_unmapped_access_is_violation() {
        let mut bus = SystemBus::new();
        assert_eq!(
            bus.read_u32(0x1000_0000),
            Err(SimulationError::MemoryViolation(0x1000_0000))
        );
        assert_eq!(
            bus.write_u32(0x0300_0100, 1),
            Err(SimulationError::MemoryViolation(0x0300_0100))
        );
    }

    #[test]
    fn test_misaligned_access() {
        let mut bus = SystemBus::new();
        assert_eq!(
            bus.read_u32(0x0300_0002),
            Err(SimulationError::MisalignedAccess(0x0300_0002))
        );
    }

    #[test]
    fn test_observers_see_accesses_but_not_peeks() {
        let mut bus = SystemBus::new();
        let log = Arc::new(AccessLog::new());
        bus.add_observer(log.clone());

        bus.write_u32(regs::UART_CLK_DIV as u64, 868).unwrap();
        bus.read_u32(regs::COUNTER_CNT as u64).unwrap();
        assert_eq!(bus.peek_u32(regs::UART_CLK_DIV as u64).unwrap(), 868);

        assert_eq!(log.writes_to(regs::UART_CLK_DIV as u64), vec![868]);
        assert_eq!(log.reads_of(regs::COUNTER_CNT as u64), 1);
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn test_typed_lookup_by_name() {
        let bus = SystemBus::new();
        assert!(bus.peripheral::<Led>("leds").is_some());
        assert!(bus.peripheral::<Uart>("leds").is_none());
        assert!(bus.peripheral::<Counter>("timer").is_none());
    }

    #[test]
    fn test_from_config_matches_default_map() {
        let mut bus = SystemBus::from_config(&SocDescriptor::picosoc()).unwrap();
        bus.write_u32(regs::COUNTER_PRESC as u64, 99_999).unwrap();
        assert_eq!(bus.peek_u32(regs::COUNTER_PRESC as u64).unwrap(), 99_999);
        assert!(bus.peripheral::<Uart>("uart").is_some());
    }

    #[test]
    fn test_from_config_rejects_overlap() {
        let soc = SocDescriptor::from_yaml(
            r#"
name: "overlap"
peripherals:
  - id: "a"
    type: "led"
    base_address: 0x1000
  - id: "b"
    type: "led"
    base_address: 0x1080
"#,
        )
        .unwrap();
        let err = SystemBus::from_config(&soc).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_from_config_rejects_windows_past_32_bits() {
        for base in ["0xFFFFFFFFFFFFFF00", "0x100000000", "0xFFFFFFC0"] {
            let soc = SocDescriptor::from_yaml(&format!(
                r#"
name: "high"
peripherals:
  - id: "leds"
    type: "led"
    base_address: 0x03000000
  - id: "far"
    type: "led"
    base_address: {}
"#,
                base
            ))
            .unwrap();
            let err = SystemBus::from_config(&soc).unwrap_err();
            assert!(
                err.to_string().contains("32-bit address space"),
                "base {} should be rejected",
                base
            );
        }
    }

    #[test]
    fn test_from_config_accepts_window_ending_at_top_of_space() {
        let soc = SocDescriptor::from_yaml(
            r#"
name: "top"
peripherals:
  - id: "leds"
    type: "led"
    base_address: 0xFFFFFF00
"#,
        )
        .unwrap();
        let mut bus = SystemBus::from_config(&soc).unwrap();
        bus.write_u32(0xFFFF_FF00, 7).unwrap();
        assert_eq!(bus.read_u32(0xFFFF_FF00).unwrap(), 7);
        assert_eq!(bus.read_u32(0xFFFF_FFFC).unwrap(), 0);
    }

    #[test]
    fn test_from_config_skips_unknown_types() {
        let soc = SocDescriptor::from_yaml(
            r#"
name: "extra"
peripherals:
  - id: "leds"
    type: "led"
    base_address: 0x03000000
  - id: "spi"
    type: "spi"
    base_address: 0x02000200
"#,
        )
        .unwrap();
        let bus = SystemBus::from_config(&soc).unwrap();
        assert_eq!(bus.peripherals.len(), 1);
    }

    #[test]
    fn test_from_config_fifo_depth() {
        let soc = SocDescriptor::from_yaml(
            r#"
name: "tiny-fifo"
peripherals:
  - id: "uart"
    type: "uart"
    base_address: 0x02000100
    config:
      rx_fifo_depth: 2
"#,
        )
        .unwrap();
        let mut bus = SystemBus::from_config(&soc).unwrap();
        let uart = bus.peripheral_mut::<Uart>("uart").unwrap();
        uart.push_rx(b"abc");
        assert_eq!(uart.overruns(), 1);
    }
}
