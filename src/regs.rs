//! Register access layer. Drivers never touch raw pointers; they go through [`Bus`], which has
//! a volatile MMIO implementation ([`Mcu`]) and a host model (`sim::Sim`).
//!
//! There is no logic here beyond bit-field arithmetic.

use core::{
    ptr::{with_exposed_provenance, with_exposed_provenance_mut},
    sync::atomic::{AtomicBool, Ordering},
};

use cfg_if::cfg_if;

/// 32-bit register access at absolute addresses.
pub trait Bus {
    /// Read the register at `addr`.
    fn read(&self, addr: u32) -> u32;

    /// Write `value` to the register at `addr`.
    fn write(&self, addr: u32, value: u32);

    /// The address a bus master (eg DMA) uses to reach `buf`.
    fn bus_address(&self, buf: &[u8]) -> u32;

    /// Read-modify-write. Not atomic with respect to other bus masters.
    fn modify<F: FnOnce(u32) -> u32>(&self, addr: u32, f: F) {
        let val = self.read(addr);
        self.write(addr, f(val));
    }

    fn set_bits(&self, addr: u32, mask: u32) {
        self.modify(addr, |v| v | mask);
    }

    fn clear_bits(&self, addr: u32, mask: u32) {
        self.modify(addr, |v| v & !mask);
    }

    /// Replace the `width`-bit field at `shift` with `value`. Bits of `value` above `width` are
    /// dropped.
    fn write_field(&self, addr: u32, shift: u8, width: u8, value: u32) {
        let mask = field_mask(width) << shift;
        self.modify(addr, |v| (v & !mask) | ((value << shift) & mask));
    }

    fn read_field(&self, addr: u32, shift: u8, width: u8) -> u32 {
        (self.read(addr) >> shift) & field_mask(width)
    }

    fn bit_is_set(&self, addr: u32, mask: u32) -> bool {
        self.read(addr) & mask != 0
    }
}

/// The CPU instructions the drivers need besides loads and stores.
pub trait Cpu {
    /// One `nop`. The unit of `delay::delay_cycles`.
    fn nop(&self);

    /// Halt for the debugger (`bkpt #0`). Without a debugger attached this is a fault on
    /// silicon; the firmware only uses it as the final "done" signal.
    fn breakpoint(&self);
}

impl<T: Bus + ?Sized> Bus for &T {
    fn read(&self, addr: u32) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        (**self).write(addr, value)
    }

    fn bus_address(&self, buf: &[u8]) -> u32 {
        (**self).bus_address(buf)
    }
}

impl<T: Cpu + ?Sized> Cpu for &T {
    fn nop(&self) {
        (**self).nop()
    }

    fn breakpoint(&self) {
        (**self).breakpoint()
    }
}

/// Mask with the low `width` bits set.
pub const fn field_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

static TAKEN: AtomicBool = AtomicBool::new(false);

/// The real memory-mapped bus and CPU.
///
/// The handle is `Copy` so one `take` can feed every driver the board needs. It doesn't own
/// any register block, so `take` only guards against a second, independent setup. Exclusive
/// access to a block is the job of the driver handle built on it (`Pin`, `Usart`, `Dma`):
/// build at most one per block.
#[derive(Clone, Copy)]
pub struct Mcu {
    _private: (),
}

impl Mcu {
    /// Returns the hardware handle the first time it's called, and `None` afterwards.
    pub fn take() -> Option<Self> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { _private: () })
        }
    }

    /// Get the handle regardless of whether it was already taken.
    ///
    /// # Safety
    /// The caller must make sure no two drivers own the same register block.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl Bus for Mcu {
    #[inline(always)]
    fn read(&self, addr: u32) -> u32 {
        let ptr = with_exposed_provenance::<u32>(addr as usize);
        // SAFETY: `addr` is a register address from `regmap`, which is always mapped.
        unsafe { ptr.read_volatile() }
    }

    #[inline(always)]
    fn write(&self, addr: u32, value: u32) {
        let ptr = with_exposed_provenance_mut::<u32>(addr as usize);
        // SAFETY: See `read`.
        unsafe { ptr.write_volatile(value) }
    }

    fn bus_address(&self, buf: &[u8]) -> u32 {
        // 32-bit target: the CPU and DMA address spaces are the same.
        buf.as_ptr().expose_provenance() as u32
    }
}

impl Cpu for Mcu {
    #[inline(always)]
    fn nop(&self) {
        cfg_if! {
            if #[cfg(cortex_m_target)] {
                cortex_m::asm::nop();
            } else {
                core::hint::spin_loop();
            }
        }
    }

    fn breakpoint(&self) {
        cfg_if! {
            if #[cfg(cortex_m_target)] {
                cortex_m::asm::bkpt();
            } else {
                core::hint::spin_loop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Sim;

    #[test]
    fn take_hands_out_one_handle() {
        let first = Mcu::take();
        assert!(first.is_some());
        assert!(Mcu::take().is_none());
    }

    #[test]
    fn field_mask_widths() {
        assert_eq!(field_mask(1), 0b1);
        assert_eq!(field_mask(2), 0b11);
        assert_eq!(field_mask(4), 0xF);
        assert_eq!(field_mask(32), u32::MAX);
    }

    #[test]
    fn write_field_leaves_neighbours_alone() {
        let sim = Sim::new();
        let addr = crate::regmap::rcc::CCIPR1;
        sim.write(addr, 0xFFFF_FFFF);

        sim.write_field(addr, 4, 2, 0b01);

        assert_eq!(sim.read(addr), 0xFFFF_FFDF);
        assert_eq!(sim.read_field(addr, 4, 2), 0b01);
    }

    #[test]
    fn write_field_truncates_wide_values() {
        let sim = Sim::new();
        let addr = crate::regmap::rcc::CCIPR1;

        sim.write_field(addr, 0, 4, 0x1F);

        assert_eq!(sim.read(addr), 0xF);
    }
}
