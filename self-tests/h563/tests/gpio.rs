// Test file for the GPIO driver.

// This test requires a wire between the following pins:
// * pb0 (LD1) <-> pc13 (B1)
//
// B1's own pull-down on the board is weak enough for PB0 to override it.

#![deny(warnings)]
#![no_std]
#![no_main]

#[cfg(test)]
#[embedded_test::tests(setup = rtt_target::rtt_init_defmt!())]
mod tests {
    use hal::{
        board, clocks,
        delay::delay_cycles,
        gpio::{OutputType, Pin, PinState, Port, Pull},
        regs::Mcu,
    };

    const SETTLE: u32 = 10_000;

    struct State {
        mcu: Mcu,
        input: Pin<Mcu>,
        output: Pin<Mcu>,
    }

    #[init]
    fn init() -> State {
        // SAFETY: Each test gets fresh handles; nothing else runs alongside.
        let mcu = unsafe { Mcu::steal() };
        clocks::enable_gpio_port(mcu, Port::B);
        clocks::enable_gpio_port(mcu, Port::C);
        State {
            mcu,
            input: Pin::input_pullup(mcu, Port::C, 13),
            output: Pin::output(mcu, Port::B, 0),
        }
    }

    #[test]
    fn push_pull_low(mut state: State) {
        state.output.set_low();
        delay_cycles(state.mcu, SETTLE);
        defmt::assert!(state.output.output_data() == PinState::Low);
        defmt::assert!(state.input.is_low());
    }

    #[test]
    fn push_pull_high(mut state: State) {
        state.output.set_high();
        delay_cycles(state.mcu, SETTLE);
        defmt::assert!(state.output.is_high());
        defmt::assert!(state.input.is_high());
    }

    #[test]
    fn toggle_follows_through(mut state: State) {
        state.output.set_low();
        state.output.toggle();
        delay_cycles(state.mcu, SETTLE);
        defmt::assert!(state.input.is_high());
        state.output.toggle();
        delay_cycles(state.mcu, SETTLE);
        defmt::assert!(state.input.is_low());
    }

    #[test]
    fn open_drain_high_is_pulled_up(mut state: State) {
        state.output.output_type(OutputType::OpenDrain);
        state.output.pull(Pull::Up);
        state.output.set_high();
        delay_cycles(state.mcu, SETTLE);
        defmt::assert!(state.input.is_high());
    }

    #[test]
    fn other_leds_unaffected(mut state: State) {
        let mut leds = board::setup_leds(state.mcu);
        leds.ld2.set_high();
        leds.ld3.set_low();

        state.output.set_high();
        state.output.set_low();

        defmt::assert!(leds.ld2.output_data() == PinState::High);
        defmt::assert!(leds.ld3.output_data() == PinState::Low);
    }
}
