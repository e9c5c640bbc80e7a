//! Smoke test for the board: LD1 follows the user button. The real checks live in `tests/`;
//! run them with `cargo test`.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_probe as _;

use hal::{board, regs::Mcu};

#[entry]
fn main() -> ! {
    rtt_target::rtt_init_defmt!();
    let mcu = Mcu::take().unwrap();

    let mut leds = board::setup_leds(mcu);
    let button = board::setup_user_button(mcu);

    defmt::println!("Press B1; LD1 follows it.");

    loop {
        leds.ld1.write(button.is_high());
    }
}
