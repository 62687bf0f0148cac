// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;
use picoblink_poll::regs::{
    UART_CFG_OFFSET, UART_CLK_DIV_OFFSET, UART_RX_OFFSET, UART_STATUS_OFFSET,
    UART_STATUS_RX_EMPTY, UART_TX_OFFSET,
};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

pub const DEFAULT_RX_FIFO_DEPTH: usize = 16;

/// PicoSoC UART: transmit is immediate, receive goes through a bounded FIFO.
#[derive(Debug, serde::Serialize)]
pub struct Uart {
    cfg: u32,
    clk_div: u32,
    rx_fifo: VecDeque<u8>,
    rx_fifo_depth: usize,
    overruns: u64,
    tx_count: u64,
    #[serde(skip)]
    sink: Option<Arc<Mutex<Vec<u8>>>>,
    echo_stdout: bool,
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}

impl Uart {
    pub fn new() -> Self {
        Self::new_with_fifo_depth(DEFAULT_RX_FIFO_DEPTH)
    }

    pub fn new_with_fifo_depth(rx_fifo_depth: usize) -> Self {
        Self {
            cfg: 0,
            clk_div: 0,
            rx_fifo: VecDeque::with_capacity(rx_fifo_depth),
            rx_fifo_depth,
            overruns: 0,
            tx_count: 0,
            sink: None,
            echo_stdout: false,
        }
    }

    fn status(&self) -> u32 {
        if self.rx_fifo.is_empty() {
            UART_STATUS_RX_EMPTY
        } else {
            0
        }
    }

    fn push_tx(&mut self, value: u8) {
        self.tx_count += 1;
        tracing::debug!("UART TX {:#04x}", value);

        if let Some(sink) = &self.sink {
            if let Ok(mut guard) = sink.lock() {
                guard.push(value);
            }
        }

        if self.echo_stdout {
            let mut stdout = io::stdout().lock();
            if let Err(e) = stdout.write_all(&[value]).and_then(|_| stdout.flush()) {
                tracing::warn!("UART stdout write failed: {}", e);
            }
        }
    }

    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>, echo_stdout: bool) {
        self.sink = sink;
        self.echo_stdout = echo_stdout;
    }

    /// Deliver bytes from the line into the receive FIFO. Bytes that find
    /// the FIFO full are lost and counted as overruns.
    pub fn push_rx(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.rx_fifo.len() >= self.rx_fifo_depth {
                self.overruns += 1;
                tracing::warn!("UART RX overrun, dropping {:#04x}", b);
                continue;
            }
            self.rx_fifo.push_back(b);
        }
    }

    pub fn rx_pending(&self) -> usize {
        self.rx_fifo.len()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn tx_count(&self) -> u64 {
        self.tx_count
    }

    pub fn clock_divisor(&self) -> u32 {
        self.clk_div
    }

    /// Baud rate implied by the programmed divisor, if one was written.
    pub fn baud_rate(&self, reference_clock_hz: u32) -> Option<u32> {
        (self.clk_div != 0).then(|| reference_clock_hz / self.clk_div)
    }
}

impl crate::Peripheral for Uart {
    fn read(&mut self, offset: u64) -> SimResult<u32> {
        match offset {
            UART_STATUS_OFFSET => Ok(self.status()),
            // An empty FIFO reads as zero.
            UART_RX_OFFSET => Ok(self.rx_fifo.pop_front().map(u32::from).unwrap_or(0)),
            _ => Ok(0),
        }
    }

    fn write(&mut self, offset: u64, value: u32) -> SimResult<()> {
        match offset {
            UART_CFG_OFFSET => self.cfg = value,
            UART_CLK_DIV_OFFSET => self.clk_div = value,
            UART_TX_OFFSET => self.push_tx((value & 0xFF) as u8),
            _ => tracing::debug!("Ignoring UART write {:#x} at offset {:#x}", value, offset),
        }
        Ok(())
    }

    fn peek(&self, offset: u64) -> u32 {
        match offset {
            UART_CFG_OFFSET => self.cfg,
            UART_CLK_DIV_OFFSET => self.clk_div,
            UART_STATUS_OFFSET => self.status(),
            UART_RX_OFFSET => self.rx_fifo.front().copied().map(u32::from).unwrap_or(0),
            _ => 0,
        }
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn std::any::Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
