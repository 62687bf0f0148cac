// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;
use picoblink_poll::regs::{
    COUNTER_CFG_ENABLE, COUNTER_CFG_OFFSET, COUNTER_CNT_OFFSET, COUNTER_PRESC_OFFSET,
};

/// Free-running prescaled counter.
///
/// While enabled, `cnt` advances once every `presc + 1` reference clock
/// cycles and wraps at 32 bits.
#[derive(Debug, Default, serde::Serialize)]
pub struct Counter {
    cfg: u32,
    presc: u32,
    cnt: u32,

    // Internal state
    psc_cnt: u64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        (self.cfg & COUNTER_CFG_ENABLE) != 0
    }

    pub fn count(&self) -> u32 {
        self.cnt
    }

    /// Force the count, e.g. to exercise wraparound.
    pub fn set_count(&mut self, value: u32) {
        self.cnt = value;
    }
}

impl crate::Peripheral for Counter {
    fn read(&mut self, offset: u64) -> SimResult<u32> {
        match offset {
            COUNTER_CNT_OFFSET => Ok(self.cnt),
            // cfg and presc are write-only
            _ => Ok(0),
        }
    }

    fn write(&mut self, offset: u64, value: u32) -> SimResult<()> {
        match offset {
            COUNTER_CFG_OFFSET => self.cfg = value & COUNTER_CFG_ENABLE,
            COUNTER_PRESC_OFFSET => self.presc = value,
            COUNTER_CNT_OFFSET => {
                tracing::debug!("Ignoring write {:#x} to read-only counter count", value)
            }
            _ => {}
        }
        Ok(())
    }

    fn peek(&self, offset: u64) -> u32 {
        match offset {
            COUNTER_CFG_OFFSET => self.cfg,
            COUNTER_PRESC_OFFSET => self.presc,
            COUNTER_CNT_OFFSET => self.cnt,
            _ => 0,
        }
    }

    fn tick(&mut self, cycles: u64) {
        if !self.enabled() {
            return;
        }

        let period = self.presc as u64 + 1;
        self.psc_cnt += cycles;
        let ticks = self.psc_cnt / period;
        self.psc_cnt %= period;
        self.cnt = self.cnt.wrapping_add(ticks as u32);
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
