//! Memory map of the register blocks this crate drives: base addresses, register offsets, and
//! bit positions. Values are for the STM32H563 (RM0481), except the DMA controller, which uses
//! the classic channel-based DMA1 layout (ISR/IFCR, then CCR/CNDTR/CPAR/CMAR per channel).
//!
//! These constants are the hardware contract. They're plain `u32`s so they can be used both by
//! the volatile MMIO bus and by the host register model.

/// Reset and clock control.
pub mod rcc {
    pub const BASE: u32 = 0x4402_0C00;

    pub const AHB1ENR: u32 = BASE + 0x088;
    pub const AHB2ENR: u32 = BASE + 0x08C;
    pub const APB1LENR: u32 = BASE + 0x09C;
    pub const CCIPR1: u32 = BASE + 0x0D8;

    /// AHB1ENR: DMA1 clock enable.
    pub const AHB1ENR_DMA1EN: u32 = 1 << 0;
    /// APB1LENR: USART3 clock enable.
    pub const APB1LENR_USART3EN: u32 = 1 << 18;

    /// CCIPR1: USART3 kernel clock source select, bits 8:6. 0 selects PCLK1.
    pub const CCIPR1_USART3SEL_SHIFT: u8 = 6;
    pub const CCIPR1_USART3SEL_WIDTH: u8 = 3;

    /// AHB2ENR: GPIO port clock enable. Bit `n` is port `n` (A = 0).
    pub const fn ahb2enr_gpioen(port_index: u8) -> u32 {
        1 << port_index
    }
}

/// General-purpose I/O. One block per port, 0x400 apart.
pub mod gpio {
    use paste::paste;

    pub const BASE: u32 = 0x4202_0000;
    pub const PORT_STRIDE: u32 = 0x400;

    pub const MODER: u32 = 0x00;
    pub const OTYPER: u32 = 0x04;
    pub const OSPEEDR: u32 = 0x08;
    pub const PUPDR: u32 = 0x0C;
    pub const IDR: u32 = 0x10;
    pub const ODR: u32 = 0x14;
    /// Write-only. Bits 15:0 set the matching ODR bit, bits 31:16 reset it.
    pub const BSRR: u32 = 0x18;
    pub const LCKR: u32 = 0x1C;
    pub const AFRL: u32 = 0x20;
    pub const AFRH: u32 = 0x24;
    /// Write-only. Bits 15:0 reset the matching ODR bit.
    pub const BRR: u32 = 0x28;

    /// Offset of the reset half of BSRR.
    pub const BSRR_RESET_SHIFT: u8 = 16;

    macro_rules! port_bases {
        ($($port:ident: $idx:expr),+ $(,)?) => {
            paste! {
                $(
                    pub const [<GPIO $port _BASE>]: u32 = BASE + $idx * PORT_STRIDE;
                )+
            }
        };
    }

    port_bases!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8);
}

/// USART3; the ST-LINK virtual COM port on the NUCLEO-H563ZI.
pub mod usart {
    pub const USART3_BASE: u32 = 0x4000_4800;

    pub const CR1: u32 = 0x00;
    pub const CR2: u32 = 0x04;
    pub const CR3: u32 = 0x08;
    pub const BRR: u32 = 0x0C;
    pub const ISR: u32 = 0x1C;
    pub const ICR: u32 = 0x20;
    pub const RDR: u32 = 0x24;
    pub const TDR: u32 = 0x28;

    pub const CR1_UE: u32 = 1 << 0;
    pub const CR1_RE: u32 = 1 << 2;
    pub const CR1_TE: u32 = 1 << 3;

    pub const CR3_DMAR: u32 = 1 << 6;
    pub const CR3_DMAT: u32 = 1 << 7;

    pub const ISR_RXNE: u32 = 1 << 5;
    pub const ISR_TC: u32 = 1 << 6;
    /// TXE, or TXFNF with the FIFO enabled. Same bit.
    pub const ISR_TXE: u32 = 1 << 7;

    pub const ICR_TCCF: u32 = 1 << 6;
}

/// Channel-based DMA controller.
pub mod dma {
    pub const DMA1_BASE: u32 = 0x4002_0000;

    pub const ISR: u32 = 0x00;
    /// Write 1 to clear the matching ISR flag.
    pub const IFCR: u32 = 0x04;

    pub const CHANNEL_BASE: u32 = 0x08;
    pub const CHANNEL_STRIDE: u32 = 0x14;
    pub const NUM_CHANNELS: u8 = 7;

    pub const CCR: u32 = 0x00;
    pub const CNDTR: u32 = 0x04;
    pub const CPAR: u32 = 0x08;
    pub const CMAR: u32 = 0x0C;

    pub const CCR_EN: u32 = 1 << 0;
    pub const CCR_TCIE: u32 = 1 << 1;
    pub const CCR_HTIE: u32 = 1 << 2;
    pub const CCR_TEIE: u32 = 1 << 3;
    pub const CCR_DIR: u32 = 1 << 4;
    pub const CCR_CIRC: u32 = 1 << 5;
    pub const CCR_PINC: u32 = 1 << 6;
    pub const CCR_MINC: u32 = 1 << 7;
    pub const CCR_PSIZE_SHIFT: u8 = 8;
    pub const CCR_MSIZE_SHIFT: u8 = 10;
    pub const CCR_PL_SHIFT: u8 = 12;
    pub const CCR_MEM2MEM: u32 = 1 << 14;

    /// CNDTR is 16 bits wide.
    pub const CNDTR_MAX: u32 = 0xFFFF;

    pub const ISR_GIF: u32 = 1 << 0;
    pub const ISR_TCIF: u32 = 1 << 1;
    pub const ISR_HTIF: u32 = 1 << 2;
    pub const ISR_TEIF: u32 = 1 << 3;
    /// Mask of all four flags for one channel, before shifting.
    pub const ISR_CHANNEL_MASK: u32 = 0xF;

    /// Address of a register in channel `n` (1-based) of the controller at `base`.
    pub const fn channel_reg(base: u32, n: u8, reg: u32) -> u32 {
        base + CHANNEL_BASE + CHANNEL_STRIDE * (n as u32 - 1) + reg
    }

    /// Shift of channel `n`'s (1-based) four-bit flag group in ISR and IFCR.
    pub const fn flag_shift(n: u8) -> u32 {
        4 * (n as u32 - 1)
    }
}
