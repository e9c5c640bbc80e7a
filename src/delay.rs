//! Software delays, counted in `nop`s. These are uncalibrated: a `nop` plus loop overhead takes
//! a few core cycles, depending on optimization level and flash wait states.

use crate::{clocks::Clocks, regs::Cpu};

/// Spin for `cycles` iterations of a single `nop`.
pub fn delay_cycles<C: Cpu>(cpu: C, cycles: u32) {
    for _ in 0..cycles {
        cpu.nop();
    }
}

/// A `nop`-loop delay provider, assuming one iteration per core clock. Actual delays are
/// longer than requested.
pub struct Delay<C: Cpu> {
    cpu: C,
    /// Iterations per microsecond.
    per_us: u32,
}

impl<C: Cpu> Delay<C> {
    /// Delay provider for the reset core clock.
    pub fn new(cpu: C) -> Self {
        Self::with_clock(cpu, Clocks::reset().hclk())
    }

    pub fn with_clock(cpu: C, core_hz: u32) -> Self {
        Self {
            cpu,
            per_us: core_hz / 1_000_000,
        }
    }

    pub fn delay_us(&mut self, us: u32) {
        // Chunked, so long delays don't overflow the iteration count.
        let chunk = u32::MAX / self.per_us.max(1);
        let mut left = us;
        while left > 0 {
            let n = left.min(chunk);
            delay_cycles(&self.cpu, n * self.per_us);
            left -= n;
        }
    }

    pub fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

#[cfg(feature = "embedded_hal")]
impl<C: Cpu> embedded_hal::delay::DelayNs for Delay<C> {
    fn delay_ns(&mut self, ns: u32) {
        // Round up; a delay may be longer than asked, never shorter.
        self.delay_us(ns.div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        Delay::delay_us(self, us);
    }

    fn delay_ms(&mut self, ms: u32) {
        Delay::delay_ms(self, ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Sim;

    #[test]
    fn delay_cycles_counts_nops() {
        let sim = Sim::new();
        delay_cycles(&sim, 1_234);
        assert_eq!(sim.nop_count(), 1_234);
    }

    #[test]
    fn zero_cycles_is_immediate() {
        let sim = Sim::new();
        delay_cycles(&sim, 0);
        assert_eq!(sim.nop_count(), 0);
    }

    #[test]
    fn delay_us_scales_by_clock() {
        let sim = Sim::new();
        let mut delay = Delay::new(&sim);
        delay.delay_us(10);
        assert_eq!(sim.nop_count(), 640);

        let sim = Sim::new();
        let mut delay = Delay::with_clock(&sim, 4_000_000);
        delay.delay_ms(2);
        assert_eq!(sim.nop_count(), 8_000);
    }
}
