//! Clock enables for the peripherals this crate drives, and the clock tree they run from.
//!
//! We don't reconfigure the clock tree: after reset the H563 runs from HSI at 64 MHz, with
//! all bus prescalers at /1. Peripheral enables here are the only RCC writes we make.

use crate::{
    gpio::Port,
    regmap::rcc::{
        AHB1ENR, AHB1ENR_DMA1EN, AHB2ENR, APB1LENR, APB1LENR_USART3EN, CCIPR1,
        CCIPR1_USART3SEL_SHIFT, CCIPR1_USART3SEL_WIDTH, ahb2enr_gpioen,
    },
    regs::Bus,
};

/// HSI frequency after reset, in Hz.
pub const HSI_HZ: u32 = 64_000_000;

/// Set a peripheral clock enable bit in RCC. `$en` names the bus, eg `ahb2` for `AHB2ENR`.
macro_rules! rcc_en {
    ($bus:expr, $en:ident, $bit:expr) => {
        paste::paste! {
            $bus.set_bits([<$en:upper ENR>], $bit)
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Values for the `USART3SEL` field of `RCC_CCIPR1`.
pub enum UsartClkSrc {
    Pclk1 = 0b000,
    Pll2Q = 0b001,
    Pll3Q = 0b010,
    Hsi = 0b011,
    Csi = 0b100,
    Lse = 0b101,
}

/// Frequencies of the clock tree. USART3's kernel clock and the delay calibration both come
/// from here.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub sysclk: u32,
    pub hclk_prescaler: u32,
    pub apb1_prescaler: u32,
}

impl Default for Clocks {
    fn default() -> Self {
        Self::reset()
    }
}

impl Clocks {
    /// The tree as left by reset: HSI, all prescalers /1.
    pub const fn reset() -> Self {
        Self {
            sysclk: HSI_HZ,
            hclk_prescaler: 1,
            apb1_prescaler: 1,
        }
    }

    /// AHB bus, core, memory and DMA speed, in Hz.
    pub const fn hclk(&self) -> u32 {
        self.sysclk / self.hclk_prescaler
    }

    /// APB1 peripheral clock speed, in Hz. USART3's kernel clock with `UsartClkSrc::Pclk1`.
    pub const fn apb1(&self) -> u32 {
        self.hclk() / self.apb1_prescaler
    }
}

/// Enable the AHB2 clock for a GPIO port. Its registers ignore writes until this is done.
pub fn enable_gpio_port<B: Bus>(bus: B, port: Port) {
    rcc_en!(bus, ahb2, ahb2enr_gpioen(port.index()));
    trace!("GPIO port clock on: {}", port.index());
}

/// Enable the APB1 clock for USART3.
pub fn enable_usart3<B: Bus>(bus: B) {
    rcc_en!(bus, apb1l, APB1LENR_USART3EN);
}

/// Enable the AHB1 clock for DMA1.
pub fn enable_dma1<B: Bus>(bus: B) {
    rcc_en!(bus, ahb1, AHB1ENR_DMA1EN);
}

/// Select the USART3 kernel clock.
pub fn select_usart3_clock<B: Bus>(bus: B, src: UsartClkSrc) {
    bus.write_field(
        CCIPR1,
        CCIPR1_USART3SEL_SHIFT,
        CCIPR1_USART3SEL_WIDTH,
        src as u32,
    );
}
