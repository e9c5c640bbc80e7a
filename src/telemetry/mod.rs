//! Demo applications: line-oriented status reporting over the VCP UART.
//!
//! Output is ASCII, one `\r\n`-terminated line per report, shaped `LABEL value ...`.

use crate::{regs::Bus, usart::Usart};

pub mod blink;
pub mod stress;

/// Write ` <label>=<value>`-style fields: `label` verbatim, then `value` in decimal.
pub(crate) fn write_field<B: Bus>(uart: &mut Usart<B>, label: &str, value: u32) {
    uart.write_str(label);
    uart.write_u32_dec(value);
}
