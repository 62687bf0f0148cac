// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimResult;

/// LED bank: a single read/write output register at offset 0.
#[derive(Debug, Default, serde::Serialize)]
pub struct Led {
    value: u32,
    changes: u64,
}

impl Led {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Number of writes that changed the output.
    pub fn changes(&self) -> u64 {
        self.changes
    }
}

impl crate::Peripheral for Led {
    fn read(&mut self, offset: u64) -> SimResult<u32> {
        Ok(self.peek(offset))
    }

    fn write(&mut self, offset: u64, value: u32) -> SimResult<()> {
        if offset != 0 {
            return Ok(());
        }
        if value != self.value {
            self.changes += 1;
            tracing::debug!("LED {:#06b} -> {:#06b}", self.value, value);
        }
        self.value = value;
        Ok(())
    }

    fn peek(&self, offset: u64) -> u32 {
        match offset {
            0x00 => self.value,
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
