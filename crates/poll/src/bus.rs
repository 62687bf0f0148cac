// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use core::convert::Infallible;

/// 32-bit register access.
///
/// Reads take `&mut self` because reading a register can have side
/// effects (popping the UART receive FIFO).
pub trait RegisterBus {
    type Error;

    fn read(&mut self, addr: u32) -> Result<u32, Self::Error>;
    fn write(&mut self, addr: u32, value: u32) -> Result<(), Self::Error>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    type Error = B::Error;

    fn read(&mut self, addr: u32) -> Result<u32, Self::Error> {
        (**self).read(addr)
    }

    fn write(&mut self, addr: u32, value: u32) -> Result<(), Self::Error> {
        (**self).write(addr, value)
    }
}

/// Direct volatile access to the physical register map.
pub struct MmioBus {
    _private: (),
}

impl MmioBus {
    /// # Safety
    ///
    /// Every address passed to [`RegisterBus::read`] / [`RegisterBus::write`]
    /// must be a valid, word-aligned device register, and nothing else may
    /// drive those registers concurrently.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterBus for MmioBus {
    type Error = Infallible;

    #[inline(always)]
    fn read(&mut self, addr: u32) -> Result<u32, Infallible> {
        // SAFETY: upheld by the contract of `MmioBus::new`.
        Ok(unsafe { core::ptr::read_volatile(addr as usize as *const u32) })
    }

    #[inline(always)]
    fn write(&mut self, addr: u32, value: u32) -> Result<(), Infallible> {
        // SAFETY: upheld by the contract of `MmioBus::new`.
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) };
        Ok(())
    }
}
