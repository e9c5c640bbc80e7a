//! This library provides the peripheral layer used to bring up demo firmware on the
//! STM32H563 (NUCLEO-H563ZI): clock enables, GPIO pins, USART3 transmission (polled or
//! DMA-fed), and the two demo applications built on top of them.
//!
//! Drivers talk to hardware through the [`regs::Bus`] trait. On silicon, use [`regs::Mcu`],
//! which performs volatile accesses at the addresses in [`regmap`]. With the `sim` feature
//! (and in this crate's tests), [`sim::Sim`] models the same register blocks on the host.
//!
//! Every wait in this crate is a busy-wait on a hardware flag, with no timeout. If a
//! peripheral never raises its flag, the caller hangs; that is the intended, externally
//! observable failure mode.
//!
//! Example, polled output on the ST-LINK virtual COM port:
//!
//! ```no_run
//! use bringup_hal::{board, regs::Mcu};
//!
//! let mcu = Mcu::take().unwrap();
//! let mut uart = board::setup_vcp_uart(mcu, Default::default());
//! uart.write_str("hello\r\n");
//! uart.write_u32_dec(42);
//! ```

#![no_std]
#![allow(clippy::new_without_default)]

#[cfg(any(test, sim))]
extern crate std;

// Keep first: the logging macros must be defined before the modules that use them.
mod fmt;

pub mod board;
pub mod clocks;
pub mod delay;
pub mod dma;
pub mod gpio;
pub mod regmap;
pub mod regs;
#[cfg(any(test, sim))]
pub mod sim;
pub mod telemetry;
pub mod usart;

pub mod prelude {
    pub use crate::{
        delay::delay_cycles,
        dma::{ChannelCfg, Dma, DmaChannel},
        gpio::{Pin, PinMode, PinState, Port},
        regs::{Bus, Cpu, Mcu},
        usart::{Usart, UsartConfig},
    };
}
