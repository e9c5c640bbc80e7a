//! Periodic report: blink all three LEDs, and print the LED and button state once per blink.
//!
//! ```text
//! H563-BLINK-UART
//! BLINK 0 PB0=1 PF4=1 PG4=1 BTN13=0
//! BLINK 1 PB0=0 PF4=0 PG4=0 BTN13=0
//! ```

use super::write_field;
use crate::{
    board::{self, Leds},
    delay::delay_cycles,
    gpio::Pin,
    regs::{Bus, Cpu},
    usart::{Usart, UsartConfig},
};

pub const BANNER: &str = "H563-BLINK-UART\r\n";

/// About 1 s between reports at 64 MHz, with loop overhead.
pub const DEFAULT_DELAY_CYCLES: u32 = 12_000_000;

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlinkConfig {
    /// `nop` iterations between reports.
    pub delay_cycles: u32,
    pub uart: UsartConfig,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            delay_cycles: DEFAULT_DELAY_CYCLES,
            uart: UsartConfig::default(),
        }
    }
}

pub struct Blinky<B: Bus + Cpu + Copy> {
    cpu: B,
    leds: Leds<B>,
    button: Pin<B>,
    uart: Usart<B>,
    /// Reports sent so far. Wraps at `u32::MAX`.
    count: u32,
    led_on: bool,
    pub config: BlinkConfig,
}

impl<B: Bus + Cpu + Copy> Blinky<B> {
    /// Configure LEDs, the user button and the VCP UART, then print the banner.
    pub fn init(bus: B, config: BlinkConfig) -> Self {
        let leds = board::setup_leds(bus);
        let button = board::setup_user_button(bus);
        let mut uart = board::setup_vcp_uart(bus, config.uart);

        uart.write_str(BANNER);
        info!("blink init done");

        Self {
            cpu: bus,
            leds,
            button,
            uart,
            count: 0,
            led_on: false,
            config,
        }
    }

    /// One cycle: toggle the LEDs, sample the button, report, then wait.
    pub fn step(&mut self) {
        self.led_on = !self.led_on;
        self.leds.write_all(self.led_on);

        let btn = self.button.input_data().bit();

        self.uart.write_str("BLINK ");
        self.uart.write_u32_dec(self.count);
        write_field(&mut self.uart, " PB0=", self.leds.ld1.output_data().bit());
        write_field(&mut self.uart, " PF4=", self.leds.ld2.output_data().bit());
        write_field(&mut self.uart, " PG4=", self.leds.ld3.output_data().bit());
        write_field(&mut self.uart, " BTN13=", btn);
        self.uart.write_str("\r\n");

        trace!("blink {}", self.count);
        self.count = self.count.wrapping_add(1);

        delay_cycles(self.cpu, self.config.delay_cycles);
    }

    /// Reports sent so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Step for as long as `keep_going` returns true. It's checked before each step.
    pub fn run_while<F: FnMut(&Self) -> bool>(&mut self, mut keep_going: F) {
        while keep_going(self) {
            self.step();
        }
    }

    /// Step forever.
    pub fn run(mut self) -> ! {
        loop {
            self.step();
        }
    }
}
