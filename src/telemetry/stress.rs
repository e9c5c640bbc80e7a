//! One-shot DMA stress test: stream a 256-byte ramp out of USART3 with DMA1, then halt for the
//! debugger.
//!
//! Pass/fail is visible from outside: LD1 (PB0) is lit while the test runs, the UART carries
//! the start line, the ramp and the pass line, and the core stops on `bkpt`. A transfer that
//! never completes leaves LD1 lit and the pass line missing.

use crate::{
    board, clocks,
    dma::{ChannelCfg, Dma, DmaChannel},
    gpio::Pin,
    regs::{Bus, Cpu},
    usart::{Usart, UsartConfig},
};

pub const STRESS_BUFFER_SIZE: usize = 256;

pub const STARTED: &str = "HIL Stress Test Started\r\n";
pub const PASSED: &str = "HIL Stress Test Passed\r\n";

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StressConfig {
    pub channel: DmaChannel,
    pub channel_cfg: ChannelCfg,
    pub uart: UsartConfig,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            channel: DmaChannel::C1,
            channel_cfg: ChannelCfg::default(),
            // Transmit only, with DMA requests on from the start.
            uart: UsartConfig {
                dma_tx: true,
                rx: false,
                ..Default::default()
            },
        }
    }
}

pub struct StressTest<B: Bus + Cpu + Copy> {
    cpu: B,
    led: Pin<B>,
    uart: Usart<B>,
    dma: Dma<B>,
    /// Static, so the DMA source outlives any stack frame.
    buffer: &'static mut [u8; STRESS_BUFFER_SIZE],
    pub config: StressConfig,
}

impl<B: Bus + Cpu + Copy> StressTest<B> {
    /// Set up LD1, the VCP UART and DMA1. Nothing is transmitted yet. `buffer` is the transfer
    /// source; its contents are overwritten with the ramp.
    pub fn init(
        bus: B,
        buffer: &'static mut [u8; STRESS_BUFFER_SIZE],
        config: StressConfig,
    ) -> Self {
        let (port, pin) = board::LED1;
        clocks::enable_gpio_port(bus, port);
        let led = Pin::output(bus, port, pin);
        let uart = board::setup_vcp_uart(bus, config.uart);
        let dma = Dma::new(bus);

        Self {
            cpu: bus,
            led,
            uart,
            dma,
            buffer,
            config,
        }
    }

    /// Byte `i` of the buffer holds `i mod 256`.
    fn fill(&mut self) {
        for (i, val) in self.buffer.iter_mut().enumerate() {
            *val = (i & 0xFF) as u8;
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer[..]
    }

    /// Run the test, and return after the breakpoint. Blocks forever if the transfer never
    /// completes.
    pub fn run_to_halt(&mut self) {
        self.fill();

        // Announce before the DMA takes over TDR, so the polled and DMA bytes don't interleave.
        self.led.set_high();
        self.uart.write_str(STARTED);
        info!("stress: streaming {} bytes", STRESS_BUFFER_SIZE);

        let channel = self.config.channel;
        // SAFETY: `self.buffer` is `'static`, and not written until the transfer completes
        // below.
        unsafe {
            self.uart
                .write_dma(&self.buffer[..], &mut self.dma, channel, self.config.channel_cfg);
        }
        self.dma.wait_for_transfer(channel);

        self.uart.write_str(PASSED);
        self.led.set_low();
        info!("stress: passed");

        self.cpu.breakpoint();
    }

    /// Run the test, then spin forever.
    pub fn run(mut self) -> ! {
        self.run_to_halt();
        loop {
            self.cpu.nop();
        }
    }
}
