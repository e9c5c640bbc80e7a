//! Blinks LD1-LD3 on the NUCLEO-H563ZI, and reports LED and user-button state on the ST-LINK
//! virtual COM port (USART3, 115200 8N1) once per blink.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_probe as _;

use hal::{
    regs::Mcu,
    telemetry::blink::{BlinkConfig, Blinky},
};

#[entry]
fn main() -> ! {
    let mcu = Mcu::take().unwrap();

    defmt::println!("blink-uart");

    Blinky::init(mcu, BlinkConfig::default()).run()
}
