//! NUCLEO-H563ZI wiring: user LEDs, the user button, and USART3 on the ST-LINK virtual COM
//! port.

use crate::{
    clocks::{self, UsartClkSrc},
    gpio::{AltFn, OutputSpeed, OutputType, Pin, PinMode, Port, Pull},
    regs::Bus,
    usart::{Usart, UsartConfig},
};

/// LD1, green.
pub const LED1: (Port, u8) = (Port::B, 0);
/// LD2, yellow.
pub const LED2: (Port, u8) = (Port::F, 4);
/// LD3, red.
pub const LED3: (Port, u8) = (Port::G, 4);
/// B1, the blue user button. With the pull-up from `setup_user_button`, it reads 1 unless
/// driven low.
pub const USER_BUTTON: (Port, u8) = (Port::C, 13);

pub const VCP_TX: (Port, u8) = (Port::D, 8);
pub const VCP_RX: (Port, u8) = (Port::D, 9);
/// USART3 on PD8/PD9.
pub const VCP_AF: AltFn = AltFn::Af7;

/// The three user LEDs, as push-pull outputs.
pub struct Leds<B: Bus> {
    pub ld1: Pin<B>,
    pub ld2: Pin<B>,
    pub ld3: Pin<B>,
}

impl<B: Bus> Leds<B> {
    /// Drive all three LEDs to the same level.
    pub fn write_all(&mut self, on: bool) {
        self.ld1.write(on);
        self.ld2.write(on);
        self.ld3.write(on);
    }
}

/// Enable the LED ports' clocks, and configure the LED pins as outputs.
pub fn setup_leds<B: Bus + Copy>(bus: B) -> Leds<B> {
    for (port, _) in [LED1, LED2, LED3] {
        clocks::enable_gpio_port(bus, port);
    }
    Leds {
        ld1: Pin::output(bus, LED1.0, LED1.1),
        ld2: Pin::output(bus, LED2.0, LED2.1),
        ld3: Pin::output(bus, LED3.0, LED3.1),
    }
}

/// Enable port C's clock, and configure the user button as an input with pull-up.
pub fn setup_user_button<B: Bus>(bus: B) -> Pin<B> {
    clocks::enable_gpio_port(&bus, USER_BUTTON.0);
    Pin::input_pullup(bus, USER_BUTTON.0, USER_BUTTON.1)
}

/// Bring up USART3 on the virtual COM port: port D and USART3 clocks, PCLK1 as kernel clock,
/// PD8/PD9 on AF7, then the peripheral itself.
pub fn setup_vcp_uart<B: Bus + Copy>(bus: B, config: UsartConfig) -> Usart<B> {
    clocks::enable_gpio_port(bus, Port::D);
    clocks::enable_usart3(bus);
    clocks::select_usart3_clock(bus, UsartClkSrc::Pclk1);

    for ((port, pin), pull) in [(VCP_TX, Pull::Floating), (VCP_RX, Pull::Up)] {
        let mut p = Pin::unconfigured(bus, port, pin);
        p.output_type(OutputType::PushPull);
        p.output_speed(OutputSpeed::VeryHigh);
        p.pull(pull);
        p.mode(PinMode::Alt(VCP_AF));
    }

    Usart::new(bus, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        regmap::{gpio, rcc, usart},
        sim::Sim,
    };

    #[test]
    fn vcp_pins_are_muxed_to_af7() {
        let sim = Sim::new();
        let _uart = setup_vcp_uart(&sim, UsartConfig::default());
        let base = Port::D.base();

        assert_eq!(sim.peek(base + gpio::AFRH) & 0xFF, 0x77);
        assert_eq!((sim.peek(base + gpio::MODER) >> 16) & 0xF, 0b1010);
        assert_eq!((sim.peek(base + gpio::OSPEEDR) >> 16) & 0xF, 0b1111);
        assert_eq!((sim.peek(base + gpio::PUPDR) >> 16) & 0xF, 0b0100);
        assert_eq!(sim.peek(base + gpio::OTYPER) & 0x300, 0);
    }

    #[test]
    fn vcp_clocks_and_kernel_clock() {
        let sim = Sim::new();
        sim.write(rcc::CCIPR1, 0b101 << 6);
        let mut uart = setup_vcp_uart(&sim, UsartConfig::default());

        assert_ne!(sim.peek(rcc::AHB2ENR) & (1 << 3), 0);
        assert_ne!(sim.peek(rcc::APB1LENR) & rcc::APB1LENR_USART3EN, 0);
        assert_eq!(sim.peek(rcc::CCIPR1), 0);
        assert_eq!(sim.peek(usart::USART3_BASE + usart::BRR), 556);

        uart.write_str("ok");
        assert_eq!(sim.uart_output(), b"ok");
    }

    #[test]
    fn leds_and_button() {
        let sim = Sim::new();
        let mut leds = setup_leds(&sim);
        let button = setup_user_button(&sim);

        leds.write_all(true);
        assert!(leds.ld1.is_high() && leds.ld2.is_high() && leds.ld3.is_high());
        assert!(button.is_high());

        sim.drive_pin(Port::C, 13, crate::gpio::PinState::Low);
        assert!(button.is_low());
    }

    #[test]
    fn released_button_reads_high() {
        let sim = Sim::new();
        let button = setup_user_button(&sim);

        sim.drive_pin(Port::C, 13, crate::gpio::PinState::Low);
        sim.release_pin(Port::C, 13);

        assert!(button.is_high());
        assert_eq!((sim.peek(Port::C.base() + gpio::PUPDR) >> 26) & 0b11, 0b01);
    }
}
