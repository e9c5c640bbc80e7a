//! This module allows for serial communication using the STM32 U[S]ART peripheral. It provides
//! polled writes of bytes, strings and decimal numbers, a polled byte read, and DMA-fed
//! transmission.
//!
//! Every wait here blocks until the hardware flag asserts, with no timeout.

use core::fmt;

use crate::{
    clocks::Clocks,
    dma::{ChannelCfg, Dma, DmaChannel},
    regmap::usart::{
        BRR, CR1, CR1_RE, CR1_TE, CR1_UE, CR2, CR3, CR3_DMAT, ICR, ICR_TCCF, ISR, ISR_RXNE,
        ISR_TC, ISR_TXE, RDR, TDR, USART3_BASE,
    },
    regs::Bus,
};

/// USART3 kernel clock: PCLK1, running from HSI after reset.
pub const KERNEL_CLOCK_HZ: u32 = Clocks::reset().apb1();

pub const BAUD_115200: u32 = 115_200;

/// 64_000_000 / 115_200 = 555.56, rounded to 556. That gives 115_107 bps, 0.08% slow.
pub const USART3_BRR_115200_AT_64MHZ: u32 = brr_for(KERNEL_CLOCK_HZ, BAUD_115200);

/// Divisor for `baud` with 16x oversampling, rounded to nearest. For use in constants.
pub const fn brr_for(kernel_hz: u32, baud: u32) -> u32 {
    (kernel_hz + baud / 2) / baud
}

/// The baud rate a divisor actually produces.
pub const fn baud_from_brr(kernel_hz: u32, brr: u32) -> u32 {
    kernel_hz / brr
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Configuration for U[S]ART. Can be used with default::Default.
pub struct UsartConfig {
    /// Value written to BRR. Precompute it; see `brr_for`.
    pub brr: u32,
    /// Set CR3.DMAT before enabling, so a DMA channel can feed TDR.
    pub dma_tx: bool,
    /// Enable the receiver.
    pub rx: bool,
}

impl Default for UsartConfig {
    fn default() -> Self {
        Self {
            brr: USART3_BRR_115200_AT_64MHZ,
            dma_tx: false,
            rx: true,
        }
    }
}

/// Represents the USART peripheral, for serial communications.
pub struct Usart<B: Bus> {
    bus: B,
    base: u32,
    pub config: UsartConfig,
}

impl<B: Bus> Usart<B> {
    /// Initialize USART3. The TX/RX pins must already be muxed and the USART3 clock enabled.
    pub fn new(bus: B, config: UsartConfig) -> Self {
        let result = Self {
            bus,
            base: USART3_BASE,
            config,
        };

        // Disable, and return all control registers to their reset state, before setting
        // the divisor. BRR may only be written while UE is clear.
        result.bus.write(result.reg(CR1), 0);
        result.bus.write(result.reg(CR2), 0);
        result.bus.write(result.reg(CR3), 0);

        result.bus.write(result.reg(BRR), config.brr);

        if config.dma_tx {
            result.bus.write(result.reg(CR3), CR3_DMAT);
        }

        let mut cr1 = CR1_TE | CR1_UE;
        if config.rx {
            cr1 |= CR1_RE;
        }
        result.bus.write(result.reg(CR1), cr1);

        info!(
            "USART3 on, BRR {} ({} bps)",
            config.brr,
            baud_from_brr(KERNEL_CLOCK_HZ, config.brr)
        );

        result
    }

    fn reg(&self, offset: u32) -> u32 {
        self.base + offset
    }

    /// Transmit one byte. Blocks until TDR is empty.
    pub fn write_byte(&mut self, byte: u8) {
        while !self.bus.bit_is_set(self.reg(ISR), ISR_TXE) {}
        self.bus.write(self.reg(TDR), byte as u32);
    }

    /// Transmit every byte of `data`, in order.
    pub fn write(&mut self, data: &[u8]) {
        for byte in data {
            self.write_byte(*byte);
        }
    }

    /// Transmit a string. Stops at the first NUL, if there is one.
    pub fn write_str(&mut self, s: &str) {
        for byte in s.bytes().take_while(|b| *b != 0) {
            self.write_byte(byte);
        }
    }

    /// Transmit `value` in decimal ASCII, with no leading zeros.
    pub fn write_u32_dec(&mut self, mut value: u32) {
        if value == 0 {
            self.write_byte(b'0');
            return;
        }

        // u32::MAX has 10 digits.
        let mut digits = [0u8; 10];
        let mut len = 0;
        while value > 0 {
            digits[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }

        for digit in digits[..len].iter().rev() {
            self.write_byte(*digit);
        }
    }

    /// Receive one byte. Blocks until RXNE is set.
    pub fn read_byte(&mut self) -> u8 {
        while !self.bus.bit_is_set(self.reg(ISR), ISR_RXNE) {}
        self.bus.read(self.reg(RDR)) as u8
    }

    /// Block until the last byte written has left the shift register.
    pub fn flush(&mut self) {
        while !self.bus.bit_is_set(self.reg(ISR), ISR_TC) {}
    }

    /// Let the DMA controller load TDR whenever TXE is set.
    pub fn enable_dma_tx(&mut self) {
        self.bus.set_bits(self.reg(CR3), CR3_DMAT);
        self.config.dma_tx = true;
    }

    /// Address of the transmit data register, as a DMA destination.
    pub fn tdr_address(&self) -> u32 {
        self.reg(TDR)
    }

    /// Transmit `buf` using DMA. Returns once the channel is started; poll the `Dma` for
    /// completion.
    ///
    /// # Safety
    /// `buf` must stay valid, and must not be written, until the transfer completes.
    pub unsafe fn write_dma<D: Bus>(
        &mut self,
        buf: &[u8],
        dma: &mut Dma<D>,
        channel: DmaChannel,
        channel_cfg: ChannelCfg,
    ) {
        // DMA mode is enabled for transmission by setting DMAT in CR3. Data is then loaded
        // into TDR whenever TXE is set. This must happen before the channel starts.
        self.enable_dma_tx();

        // Clear the TC flag, so `flush` waits for this transfer.
        self.bus.write(self.reg(ICR), ICR_TCCF);

        // Destination is TDR, source is the buffer, one item per byte.
        dma.configure(
            channel,
            self.tdr_address(),
            self.bus.bus_address(buf),
            buf.len() as u32,
        );

        dma.start(channel, channel_cfg);
    }
}

impl<B: Bus> fmt::Write for Usart<B> {
    /// Writes the whole string; NULs included.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Usart::write(self, s.as_bytes());
        Ok(())
    }
}

#[cfg(feature = "embedded_hal")]
mod embedded_io_impl {
    use core::convert::Infallible;

    use embedded_io::{ErrorType, Write};

    use super::Usart;
    use crate::regs::Bus;

    impl<B: Bus> ErrorType for Usart<B> {
        type Error = Infallible;
    }

    impl<B: Bus> Write for Usart<B> {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            Usart::write(self, buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Usart::flush(self);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use core::fmt::Write as _;
    use std::{string::ToString, vec::Vec};

    use super::*;
    use crate::{clocks, sim::Sim};

    fn usart(sim: &Sim, config: UsartConfig) -> Usart<&Sim> {
        clocks::enable_usart3(sim);
        Usart::new(sim, config)
    }

    #[test]
    fn divisor_constant() {
        assert_eq!(KERNEL_CLOCK_HZ, clocks::HSI_HZ);
        assert_eq!(USART3_BRR_115200_AT_64MHZ, 556);
    }

    #[test]
    fn divisor_is_within_two_percent_of_115200() {
        let actual = baud_from_brr(KERNEL_CLOCK_HZ, USART3_BRR_115200_AT_64MHZ) as i64;
        let error_ppm = (actual - BAUD_115200 as i64) * 1_000_000 / BAUD_115200 as i64;
        assert_eq!(actual, 115_107);
        assert!(error_ppm.abs() < 20_000);
    }

    #[test]
    fn init_programs_registers() {
        let sim = Sim::new();
        clocks::enable_usart3(&sim);
        sim.write(USART3_BASE + CR2, 0xFFFF);

        let _uart = Usart::new(&sim, UsartConfig::default());

        assert_eq!(sim.read(USART3_BASE + BRR), 556);
        assert_eq!(sim.read(USART3_BASE + CR1), CR1_UE | CR1_RE | CR1_TE);
        assert_eq!(sim.read(USART3_BASE + CR2), 0);
        assert_eq!(sim.read(USART3_BASE + CR3), 0);
    }

    #[test]
    fn dma_tx_config_sets_dmat() {
        let sim = Sim::new();
        let _uart = usart(
            &sim,
            UsartConfig {
                dma_tx: true,
                rx: false,
                ..Default::default()
            },
        );
        assert_eq!(sim.read(USART3_BASE + CR3), CR3_DMAT);
        assert_eq!(sim.read(USART3_BASE + CR1), CR1_UE | CR1_TE);
    }

    #[test]
    fn write_str_emits_bytes_in_order() {
        let sim = Sim::new();
        let mut uart = usart(&sim, Default::default());

        uart.write_str("H563-BLINK-UART\r\n");

        assert_eq!(sim.uart_output(), b"H563-BLINK-UART\r\n");
    }

    #[test]
    fn write_str_stops_at_nul() {
        let sim = Sim::new();
        let mut uart = usart(&sim, Default::default());

        uart.write_str("ab\0cd");

        assert_eq!(sim.uart_output(), b"ab");
    }

    #[test]
    fn write_byte_waits_for_txe() {
        let sim = Sim::new();
        sim.set_tx_latency(50);
        let mut uart = usart(&sim, Default::default());

        uart.write(b"xyz");

        assert_eq!(sim.uart_output(), b"xyz");
    }

    #[test]
    fn decimal_output() {
        let sim = Sim::new();
        let mut uart = usart(&sim, Default::default());
        let values = [0, 7, 10, 99, 100, 1_000_000, 12_000_000, u32::MAX - 1, u32::MAX];

        let mut expected = Vec::new();
        for value in values {
            uart.write_u32_dec(value);
            uart.write_byte(b' ');
            expected.extend_from_slice(value.to_string().as_bytes());
            expected.push(b' ');
        }

        assert_eq!(sim.uart_output(), expected);
    }

    #[test]
    fn decimal_extremes() {
        let sim = Sim::new();
        let mut uart = usart(&sim, Default::default());

        uart.write_u32_dec(0);
        assert_eq!(sim.uart_output(), b"0");

        sim.clear_events();
        uart.write_u32_dec(4_294_967_295);
        assert_eq!(sim.uart_output(), b"4294967295");
    }

    #[test]
    fn fmt_write() {
        let sim = Sim::new();
        let mut uart = usart(&sim, Default::default());

        write!(uart, "n={} x={:#x}\r\n", 42, 255u8).unwrap();

        assert_eq!(sim.uart_output(), b"n=42 x=0xff\r\n");
    }

    #[test]
    fn read_byte_returns_received_data() {
        let sim = Sim::new();
        let mut uart = usart(&sim, Default::default());
        sim.push_rx(b"hi");

        assert_eq!(uart.read_byte(), b'h');
        assert_eq!(uart.read_byte(), b'i');
    }

    #[test]
    fn init_without_clock_has_no_effect() {
        let sim = Sim::new();
        let uart = Usart::new(&sim, Default::default());

        sim.write(uart.tdr_address(), b'x' as u32);

        assert_eq!(sim.peek(USART3_BASE + BRR), 0);
        assert!(sim.uart_output().is_empty());
    }
}
