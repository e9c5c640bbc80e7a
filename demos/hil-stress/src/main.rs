//! Streams a 256-byte ramp out of USART3 with DMA1 channel 1, then stops on a breakpoint.
//! Run it under a debugger or probe-rs; without one attached, `bkpt` faults.
//!
//! Expected VCP output: `HIL Stress Test Started\r\n`, bytes 0x00..=0xFF, then
//! `HIL Stress Test Passed\r\n`. LD1 is lit while the transfer runs.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_probe as _;

use hal::{
    regs::Mcu,
    telemetry::stress::{STRESS_BUFFER_SIZE, StressConfig, StressTest},
};

#[entry]
fn main() -> ! {
    let mcu = Mcu::take().unwrap();

    defmt::println!("hil-stress");

    let buffer =
        cortex_m::singleton!(: [u8; STRESS_BUFFER_SIZE] = [0; STRESS_BUFFER_SIZE]).unwrap();

    StressTest::init(mcu, buffer, StressConfig::default()).run()
}
