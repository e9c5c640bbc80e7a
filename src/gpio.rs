//! This module provides functionality for General Purpose Input and Output (GPIO) pins:
//! mode, output type, speed, pull and alternate-function configuration, and atomic
//! set/reset/read of pin state. With the `embedded_hal` feature, it includes implementations
//! of the `embedded-hal` digital traits.
//!
//! Configuration must happen before a pin is used for I/O, and the port's clock must be enabled
//! first (`clocks::enable_gpio_port`). Neither ordering is checked.

use crate::{
    regmap::gpio::{
        AFRH, AFRL, BASE, BSRR, BSRR_RESET_SHIFT, IDR, MODER, ODR, OSPEEDR, OTYPER,
        PORT_STRIDE, PUPDR,
    },
    regs::Bus,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// GPIO port letter
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
}

impl Port {
    /// Index of the port; A is 0. This is also its bit in RCC AHB2ENR.
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Base address of the port's register block.
    pub const fn base(self) -> u32 {
        BASE + PORT_STRIDE * self as u32
    }

    pub const fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => Self::A,
            1 => Self::B,
            2 => Self::C,
            3 => Self::D,
            4 => Self::E,
            5 => Self::F,
            6 => Self::G,
            7 => Self::H,
            8 => Self::I,
            _ => return None,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Values for `GPIOx_MODER`
pub enum PinMode {
    Input,
    Output,
    Alt(AltFn),
    Analog,
}

impl PinMode {
    /// We use this function to find the value bits due to being unable to repr(u8) with
    /// the wrapped `AltFn` value.
    pub fn val(&self) -> u8 {
        match self {
            Self::Input => 0b00,
            Self::Output => 0b01,
            Self::Alt(_) => 0b10,
            Self::Analog => 0b11,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Values for `GPIOx_OTYPER`
pub enum OutputType {
    PushPull = 0,
    OpenDrain = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Values for `GPIOx_OSPEEDR`
pub enum OutputSpeed {
    Low = 0b00,
    Medium = 0b01,
    High = 0b10,
    VeryHigh = 0b11,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Values for `GPIOx_PUPDR`
pub enum Pull {
    Floating = 0b00,
    Up = 0b01,
    Dn = 0b10,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Values for `GPIOx_IDR` and `GPIOx_ODR`.
pub enum PinState {
    High = 1,
    Low = 0,
}

impl From<bool> for PinState {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl PinState {
    /// `1` or `0`, as used in the status lines.
    pub fn bit(self) -> u32 {
        self as u32
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Values for `GPIOx_AFRL` and `GPIOx_AFRH`.
pub enum AltFn {
    Af0 = 0b0000,
    Af1 = 0b0001,
    Af2 = 0b0010,
    Af3 = 0b0011,
    Af4 = 0b0100,
    Af5 = 0b0101,
    Af6 = 0b0110,
    Af7 = 0b0111,
    Af8 = 0b1000,
    Af9 = 0b1001,
    Af10 = 0b1010,
    Af11 = 0b1011,
    Af12 = 0b1100,
    Af13 = 0b1101,
    Af14 = 0b1110,
    Af15 = 0b1111,
}

/// Represents a single GPIO pin. Owns its bit of the port registers; not `Clone`.
pub struct Pin<B: Bus> {
    bus: B,
    pub port: Port,
    pub pin: u8,
}

impl<B: Bus> Pin<B> {
    /// Create a pin handle, and set its mode.
    pub fn new(bus: B, port: Port, pin: u8, mode: PinMode) -> Self {
        let mut result = Self::unconfigured(bus, port, pin);
        result.mode(mode);
        result
    }

    /// Create a pin handle without touching any register.
    pub fn unconfigured(bus: B, port: Port, pin: u8) -> Self {
        debug_assert!(pin < 16, "GPIO pin number out of range");
        Self { bus, port, pin }
    }

    /// Create a push-pull output pin. See `configure_output`.
    pub fn output(bus: B, port: Port, pin: u8) -> Self {
        let mut result = Self::unconfigured(bus, port, pin);
        result.configure_output();
        result
    }

    /// Create an input pin with the internal pull-up enabled.
    pub fn input_pullup(bus: B, port: Port, pin: u8) -> Self {
        let mut result = Self::unconfigured(bus, port, pin);
        result.configure_input_pullup();
        result
    }

    fn reg(&self, offset: u32) -> u32 {
        self.port.base() + offset
    }

    /// General-purpose push-pull output, medium speed, no pull.
    pub fn configure_output(&mut self) {
        self.mode(PinMode::Output);
        self.output_type(OutputType::PushPull);
        self.output_speed(OutputSpeed::Medium);
        self.pull(Pull::Floating);
    }

    /// Input, with the internal pull-up.
    pub fn configure_input_pullup(&mut self) {
        self.mode(PinMode::Input);
        self.pull(Pull::Up);
    }

    /// Set pin mode. For `Alt`, the alternate function is written before the mode switches, so
    /// the pin never drives a stale function.
    pub fn mode(&mut self, value: PinMode) {
        if let PinMode::Alt(alt) = value {
            self.alt_fn(alt);
        }
        self.bus
            .write_field(self.reg(MODER), self.pin * 2, 2, value.val() as u32);
    }

    /// Set output type
    pub fn output_type(&mut self, value: OutputType) {
        self.bus
            .write_field(self.reg(OTYPER), self.pin, 1, value as u32);
    }

    /// Set output speed.
    pub fn output_speed(&mut self, value: OutputSpeed) {
        self.bus
            .write_field(self.reg(OSPEEDR), self.pin * 2, 2, value as u32);
    }

    /// Set internal pull resistor: Pull up, pull down, or floating.
    pub fn pull(&mut self, value: Pull) {
        self.bus
            .write_field(self.reg(PUPDR), self.pin * 2, 2, value as u32);
    }

    /// Select the alternate function. Pins 0-7 live in AFRL, 8-15 in AFRH.
    pub fn alt_fn(&mut self, value: AltFn) {
        let (reg, slot) = if self.pin < 8 {
            (AFRL, self.pin)
        } else {
            (AFRH, self.pin - 8)
        };
        self.bus.write_field(self.reg(reg), slot * 4, 4, value as u32);
    }

    /// Drive the pin, through BSRR. This is a single write, so it can't race with
    /// operations on other pins of the port.
    pub fn set_state(&mut self, value: PinState) {
        let offset = match value {
            PinState::Low => BSRR_RESET_SHIFT,
            PinState::High => 0,
        };
        self.bus.write(self.reg(BSRR), 1 << (offset + self.pin));
    }

    /// Same as `set_state`, with a bool level.
    pub fn write(&mut self, high: bool) {
        self.set_state(high.into());
    }

    pub fn set_high(&mut self) {
        self.set_state(PinState::High);
    }

    pub fn set_low(&mut self) {
        self.set_state(PinState::Low);
    }

    /// Flip the driven level. Reads ODR, then writes BSRR; only this pin is affected.
    pub fn toggle(&mut self) {
        match self.output_data() {
            PinState::High => self.set_low(),
            PinState::Low => self.set_high(),
        }
    }

    /// The sampled input level, from IDR.
    pub fn input_data(&self) -> PinState {
        self.bus.bit_is_set(self.reg(IDR), 1 << self.pin).into()
    }

    /// The level this pin is being driven to, from ODR.
    pub fn output_data(&self) -> PinState {
        self.bus.bit_is_set(self.reg(ODR), 1 << self.pin).into()
    }

    pub fn is_high(&self) -> bool {
        self.input_data() == PinState::High
    }

    pub fn is_low(&self) -> bool {
        !self.is_high()
    }
}

#[cfg(feature = "embedded_hal")]
mod embedded_hal_impl {
    use core::convert::Infallible;

    use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

    use super::{Pin, PinState};
    use crate::regs::Bus;

    impl<B: Bus> ErrorType for Pin<B> {
        type Error = Infallible;
    }

    impl<B: Bus> InputPin for Pin<B> {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(Pin::is_high(self))
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(Pin::is_low(self))
        }
    }

    impl<B: Bus> OutputPin for Pin<B> {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            Pin::set_low(self);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            Pin::set_high(self);
            Ok(())
        }
    }

    impl<B: Bus> StatefulOutputPin for Pin<B> {
        fn is_set_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.output_data() == PinState::High)
        }

        fn is_set_low(&mut self) -> Result<bool, Self::Error> {
            Ok(self.output_data() == PinState::Low)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clocks, regmap::gpio::GPIOB_BASE, sim::Sim};

    fn sim_with_ports(ports: &[Port]) -> Sim {
        let sim = Sim::new();
        for port in ports {
            clocks::enable_gpio_port(&sim, *port);
        }
        sim
    }

    #[test]
    fn port_bases_match_memory_map() {
        assert_eq!(Port::A.base(), 0x4202_0000);
        assert_eq!(Port::B.base(), GPIOB_BASE);
        assert_eq!(Port::G.base(), 0x4202_1800);
        assert_eq!(Port::from_index(5), Some(Port::F));
        assert_eq!(Port::from_index(9), None);
    }

    #[test]
    fn configure_output_sets_mode_type_speed_and_pull() {
        let sim = sim_with_ports(&[Port::F]);
        let base = Port::F.base();
        sim.write(base + MODER, 0xFFFF_FFFF);
        sim.write(base + OTYPER, 0xFFFF);
        sim.write(base + PUPDR, 0xFFFF_FFFF);

        let _led = Pin::output(&sim, Port::F, 4);

        assert_eq!(sim.read_field(base + MODER, 8, 2), 0b01);
        assert_eq!(sim.read(base + MODER), 0xFFFF_FDFF);
        assert_eq!(sim.read(base + OTYPER), 0xFFEF);
        assert_eq!(sim.read_field(base + OSPEEDR, 8, 2), 0b01);
        assert_eq!(sim.read(base + PUPDR), 0xFFFF_FCFF);
    }

    #[test]
    fn configure_input_pullup() {
        let sim = sim_with_ports(&[Port::C]);
        let base = Port::C.base();
        sim.write(base + MODER, 0xFFFF_FFFF);

        let _btn = Pin::input_pullup(&sim, Port::C, 13);

        assert_eq!(sim.read_field(base + MODER, 26, 2), 0b00);
        assert_eq!(sim.read_field(base + PUPDR, 26, 2), 0b01);
    }

    #[test]
    fn alt_fn_uses_high_register_for_upper_pins() {
        let sim = sim_with_ports(&[Port::D]);
        let base = Port::D.base();

        let _tx = Pin::new(&sim, Port::D, 8, PinMode::Alt(AltFn::Af7));
        let _other = Pin::new(&sim, Port::D, 2, PinMode::Alt(AltFn::Af5));

        assert_eq!(sim.read(base + AFRH), 0x7);
        assert_eq!(sim.read(base + AFRL), 0x5 << 8);
        assert_eq!(sim.read_field(base + MODER, 16, 2), 0b10);
        assert_eq!(sim.read_field(base + MODER, 4, 2), 0b10);
    }

    #[test]
    fn write_then_read_back_through_idr() {
        let sim = sim_with_ports(&[Port::B]);
        let mut led = Pin::output(&sim, Port::B, 0);

        led.write(true);
        assert!(led.is_high());
        assert_eq!(led.output_data(), PinState::High);

        led.write(false);
        assert!(led.is_low());
        assert_eq!(led.output_data(), PinState::Low);
    }

    #[test]
    fn set_and_reset_use_bsrr_halves() {
        let sim = sim_with_ports(&[Port::G]);
        let mut led = Pin::output(&sim, Port::G, 4);

        led.set_high();
        assert_eq!(sim.last_write(Port::G.base() + BSRR), Some(1 << 4));

        led.set_low();
        assert_eq!(sim.last_write(Port::G.base() + BSRR), Some(1 << 20));
    }

    #[test]
    fn writing_one_pin_leaves_the_others_alone() {
        let sim = sim_with_ports(&[Port::B]);
        let mut a = Pin::output(&sim, Port::B, 0);
        let mut b = Pin::output(&sim, Port::B, 7);

        a.set_high();
        b.set_low();
        assert!(a.is_high());
        assert!(b.is_low());

        a.set_high();
        assert!(b.is_low());
        b.set_high();
        assert!(a.is_high());
        a.set_low();
        assert!(b.is_high());
        assert!(a.is_low());
    }

    #[test]
    fn toggle_flips_driven_level() {
        let sim = sim_with_ports(&[Port::B]);
        let mut led = Pin::output(&sim, Port::B, 14);

        led.toggle();
        assert_eq!(led.output_data(), PinState::High);
        led.toggle();
        assert_eq!(led.output_data(), PinState::Low);
    }

    #[test]
    fn pullup_input_reads_high_until_driven_low() {
        let sim = sim_with_ports(&[Port::C]);
        let btn = Pin::input_pullup(&sim, Port::C, 13);
        assert!(btn.is_high());

        sim.drive_pin(Port::C, 13, PinState::Low);
        assert!(btn.is_low());

        sim.release_pin(Port::C, 13);
        assert!(btn.is_high());
    }

    #[test]
    fn wired_output_drives_input() {
        let sim = sim_with_ports(&[Port::B, Port::C]);
        sim.wire((Port::B, 0), (Port::C, 13));
        let mut out = Pin::output(&sim, Port::B, 0);
        let input = Pin::input_pullup(&sim, Port::C, 13);

        out.set_low();
        assert!(input.is_low());
        out.set_high();
        assert!(input.is_high());
    }

    #[test]
    fn unclocked_port_ignores_configuration() {
        let sim = Sim::new();
        let mut led = Pin::output(&sim, Port::E, 1);
        led.set_high();

        assert_eq!(sim.read(Port::E.base() + MODER), 0);
        assert_eq!(led.output_data(), PinState::Low);
    }
}
