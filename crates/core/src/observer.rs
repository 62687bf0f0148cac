// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use std::sync::Mutex;

/// Trait for observing register traffic on the system bus.
pub trait BusObserver: std::fmt::Debug + Send + Sync {
    fn on_read(&self, _addr: u64, _value: u32) {}
    fn on_write(&self, _addr: u64, _value: u32) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusAccess {
    pub kind: AccessKind,
    pub addr: u64,
    pub value: u32,
}

/// Records every bus access in order.
#[derive(Debug, Default)]
pub struct AccessLog {
    entries: Mutex<Vec<BusAccess>>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: AccessKind, addr: u64, value: u32) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(BusAccess { kind, addr, value });
        }
    }

    pub fn entries(&self) -> Vec<BusAccess> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.clear();
        }
    }

    /// Values written to `addr`, oldest first.
    pub fn writes_to(&self, addr: u64) -> Vec<u32> {
        self.entries()
            .into_iter()
            .filter(|a| a.kind == AccessKind::Write && a.addr == addr)
            .map(|a| a.value)
            .collect()
    }

    pub fn reads_of(&self, addr: u64) -> usize {
        self.entries()
            .iter()
            .filter(|a| a.kind == AccessKind::Read && a.addr == addr)
            .count()
    }
}

impl BusObserver for AccessLog {
    fn on_read(&self, addr: u64, value: u32) {
        self.push(AccessKind::Read, addr, value);
    }

    fn on_write(&self, addr: u64, value: u32) {
        self.push(AccessKind::Write, addr, value);
    }
}

/// Emits every access as a `debug` level event.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl BusObserver for TracingObserver {
    fn on_read(&self, addr: u64, value: u32) {
        tracing::debug!("R [{:#010x}] -> {:#010x}", addr, value);
    }

    fn on_write(&self, addr: u64, value: u32) {
        tracing::debug!("W [{:#010x}] <- {:#010x}", addr, value);
    }
}
