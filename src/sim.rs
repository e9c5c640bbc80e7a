//! Host model of the register blocks in `regmap`, for running drivers and applications off
//! target. Available in this crate's tests, and to dependents with the `sim` feature.
//!
//! What's modeled:
//! - RCC clock gating: a GPIO port, USART3 or DMA1 ignores writes and reads as zero until its
//!   enable bit is set.
//! - GPIO: BSRR/BRR drive ODR; IDR reflects output pins, externally driven pins, wires between
//!   pins, and pull resistors.
//! - USART3: TDR writes with UE and TE set are transmitted. TXE/TC are derived from an optional
//!   per-byte latency. RXNE and RDR are fed from a receive queue.
//! - DMA1: memory-to-peripheral transfers from buffers registered with `Bus::bus_address`. A
//!   channel targeting USART3 TDR only moves data while CR3.DMAT is set and TDR is empty.
//!
//! Time advances by one tick on every register read and every `nop`. Each tick frees the
//! transmitter by one step and lets every active DMA channel move one item.
//!
//! Everything else is plain storage: reads return what was last written, or 0.

use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    vec::Vec,
};

use crate::{
    gpio::{PinState, Port},
    regmap::{dma, gpio, rcc, usart},
    regs::{Bus, Cpu},
};

/// Where `bus_address` places the first registered buffer.
pub const SRAM_BASE: u32 = 0x2000_0000;

const GPIO_BLOCK_END: u32 = gpio::BASE + gpio::PORT_STRIDE * 9;
const USART3_TDR: u32 = usart::USART3_BASE + usart::TDR;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Externally observable activity, in order.
pub enum Event {
    /// A byte left USART3.
    Tx(u8),
    /// A pin's driven level changed.
    Pin {
        port: Port,
        pin: u8,
        level: PinState,
    },
    /// `bkpt` executed.
    Breakpoint,
}

#[derive(Copy, Clone)]
enum Block {
    Gpio(Port, u32),
    Usart3(u32),
    Dma1(u32),
    Other,
}

fn decode(addr: u32) -> Block {
    if (gpio::BASE..GPIO_BLOCK_END).contains(&addr) {
        let rel = addr - gpio::BASE;
        match Port::from_index((rel / gpio::PORT_STRIDE) as u8) {
            Some(port) => Block::Gpio(port, rel % gpio::PORT_STRIDE),
            None => Block::Other,
        }
    } else if (usart::USART3_BASE..usart::USART3_BASE + 0x400).contains(&addr) {
        Block::Usart3(addr - usart::USART3_BASE)
    } else if (dma::DMA1_BASE..dma::DMA1_BASE + 0x400).contains(&addr) {
        Block::Dma1(addr - dma::DMA1_BASE)
    } else {
        Block::Other
    }
}

/// Channel number (1-based) and register offset within the channel, for a DMA1 offset.
fn dma_channel(offset: u32) -> Option<(u8, u32)> {
    let rel = offset.checked_sub(dma::CHANNEL_BASE)?;
    let n = rel / dma::CHANNEL_STRIDE + 1;
    if n > dma::NUM_CHANNELS as u32 {
        return None;
    }
    Some((n as u8, rel % dma::CHANNEL_STRIDE))
}

#[derive(Clone, Copy, Default)]
struct Channel {
    active: bool,
    mem_ptr: u32,
    per_ptr: u32,
    reload: u32,
}

struct Region {
    base: u32,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct State {
    regs: BTreeMap<u32, u32>,
    last_writes: BTreeMap<u32, u32>,
    drives: BTreeMap<(u8, u8), PinState>,
    /// (output, input) pin pairs.
    wires: Vec<((u8, u8), (u8, u8))>,
    rx: VecDeque<u8>,
    tx_busy: u32,
    tx_latency: u32,
    channels: [Channel; dma::NUM_CHANNELS as usize],
    regions: Vec<Region>,
    next_region: u32,
    events: Vec<Event>,
    nops: u64,
    halted: bool,
}

impl State {
    fn reg(&self, addr: u32) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    fn clocked(&self, block: Block) -> bool {
        match block {
            Block::Gpio(port, _) => {
                self.reg(rcc::AHB2ENR) & rcc::ahb2enr_gpioen(port.index()) != 0
            }
            Block::Usart3(_) => self.reg(rcc::APB1LENR) & rcc::APB1LENR_USART3EN != 0,
            Block::Dma1(_) => self.reg(rcc::AHB1ENR) & rcc::AHB1ENR_DMA1EN != 0,
            Block::Other => true,
        }
    }

    fn store(&mut self, addr: u32, value: u32) {
        let block = decode(addr);
        if !self.clocked(block) {
            return;
        }
        match block {
            Block::Gpio(port, offset) => self.store_gpio(port, offset, addr, value),
            Block::Usart3(offset) => self.store_usart(offset, addr, value),
            Block::Dma1(offset) => self.store_dma(offset, addr, value),
            Block::Other => {
                self.regs.insert(addr, value);
            }
        }
    }

    fn store_gpio(&mut self, port: Port, offset: u32, addr: u32, value: u32) {
        let odr_addr = port.base() + gpio::ODR;
        let odr = self.reg(odr_addr);
        match offset {
            gpio::BSRR => {
                // Set wins when both halves name the same pin.
                let reset = value >> gpio::BSRR_RESET_SHIFT;
                let set = value & 0xFFFF;
                self.set_odr(port, (odr & !reset) | set);
            }
            gpio::BRR => self.set_odr(port, odr & !(value & 0xFFFF)),
            gpio::ODR => self.set_odr(port, value & 0xFFFF),
            gpio::IDR => (),
            _ => {
                self.regs.insert(addr, value);
            }
        }
    }

    fn set_odr(&mut self, port: Port, new: u32) {
        let addr = port.base() + gpio::ODR;
        let old = self.reg(addr);
        let changed = old ^ new;
        for pin in 0..16u8 {
            if changed & (1 << pin) != 0 {
                self.events.push(Event::Pin {
                    port,
                    pin,
                    level: (new & (1 << pin) != 0).into(),
                });
            }
        }
        self.regs.insert(addr, new);
    }

    fn store_usart(&mut self, offset: u32, addr: u32, value: u32) {
        match offset {
            usart::TDR => {
                let cr1 = self.reg(usart::USART3_BASE + usart::CR1);
                let enabled = usart::CR1_UE | usart::CR1_TE;
                if cr1 & enabled == enabled {
                    self.events.push(Event::Tx(value as u8));
                    self.tx_busy = self.tx_latency;
                }
            }
            usart::ISR | usart::RDR | usart::ICR => (),
            _ => {
                self.regs.insert(addr, value);
            }
        }
    }

    fn store_dma(&mut self, offset: u32, addr: u32, value: u32) {
        match offset {
            dma::ISR => (),
            dma::IFCR => {
                let isr = dma::DMA1_BASE + dma::ISR;
                let flags = self.reg(isr) & !value;
                self.regs.insert(isr, flags);
            }
            _ => match dma_channel(offset) {
                Some((n, dma::CCR)) => {
                    let was_enabled = self.reg(addr) & dma::CCR_EN != 0;
                    self.regs.insert(addr, value);
                    if value & dma::CCR_EN == 0 {
                        self.channels[n as usize - 1].active = false;
                    } else if !was_enabled {
                        let cpar = self.reg(dma::channel_reg(dma::DMA1_BASE, n, dma::CPAR));
                        let cmar = self.reg(dma::channel_reg(dma::DMA1_BASE, n, dma::CMAR));
                        let cndtr = self.reg(dma::channel_reg(dma::DMA1_BASE, n, dma::CNDTR));
                        self.channels[n as usize - 1] = Channel {
                            active: true,
                            mem_ptr: cmar,
                            per_ptr: cpar,
                            reload: cndtr,
                        };
                    }
                }
                Some((n, _)) => {
                    // Channel configuration is locked while enabled.
                    let ccr = dma::channel_reg(dma::DMA1_BASE, n, dma::CCR);
                    if self.reg(ccr) & dma::CCR_EN == 0 {
                        self.regs.insert(addr, value);
                    }
                }
                None => {
                    self.regs.insert(addr, value);
                }
            },
        }
    }

    fn load(&mut self, addr: u32) -> u32 {
        let block = decode(addr);
        if !self.clocked(block) {
            return 0;
        }
        match block {
            Block::Gpio(port, gpio::IDR) => self.idr(port),
            Block::Usart3(usart::ISR) => self.usart_isr(),
            Block::Usart3(usart::RDR) => {
                if self.usart_isr() & usart::ISR_RXNE != 0 {
                    self.rx.pop_front().map(u32::from).unwrap_or(0)
                } else {
                    0
                }
            }
            _ => self.reg(addr),
        }
    }

    fn pin_level(&self, port: Port, pin: u8) -> bool {
        let base = port.base();
        let mode = (self.reg(base + gpio::MODER) >> (pin * 2)) & 0b11;
        let odr = self.reg(base + gpio::ODR);
        match mode {
            0b01 | 0b10 => return odr & (1 << pin) != 0,
            0b11 => return false,
            _ => (),
        }
        if let Some(level) = self.drives.get(&(port.index(), pin)) {
            return *level == PinState::High;
        }
        if let Some((from, _)) = self.wires.iter().find(|(_, to)| *to == (port.index(), pin)) {
            if let Some(src) = Port::from_index(from.0) {
                return self.reg(src.base() + gpio::ODR) & (1 << from.1) != 0;
            }
        }
        (self.reg(base + gpio::PUPDR) >> (pin * 2)) & 0b11 == 0b01
    }

    fn idr(&self, port: Port) -> u32 {
        (0..16u8)
            .filter(|pin| self.pin_level(port, *pin))
            .fold(0, |acc, pin| acc | (1 << pin))
    }

    fn usart_isr(&self) -> u32 {
        let cr1 = self.reg(usart::USART3_BASE + usart::CR1);
        let mut isr = 0;
        if self.tx_busy == 0 {
            isr |= usart::ISR_TXE | usart::ISR_TC;
        }
        let rx_on = usart::CR1_UE | usart::CR1_RE;
        if cr1 & rx_on == rx_on && !self.rx.is_empty() {
            isr |= usart::ISR_RXNE;
        }
        isr
    }

    fn memory_byte(&self, addr: u32) -> Option<u8> {
        self.regions.iter().find_map(|r| {
            let offset = addr.checked_sub(r.base)? as usize;
            r.bytes.get(offset).copied()
        })
    }

    fn tick(&mut self) {
        self.tx_busy = self.tx_busy.saturating_sub(1);
        if !self.clocked(Block::Dma1(0)) {
            return;
        }
        for n in 1..=dma::NUM_CHANNELS {
            if self.channels[n as usize - 1].active {
                self.step_channel(n);
            }
        }
    }

    fn raise_flags(&mut self, n: u8, flags: u32) {
        let isr = dma::DMA1_BASE + dma::ISR;
        let value = self.reg(isr) | ((flags | dma::ISR_GIF) << dma::flag_shift(n));
        self.regs.insert(isr, value);
    }

    fn step_channel(&mut self, n: u8) {
        let ccr_addr = dma::channel_reg(dma::DMA1_BASE, n, dma::CCR);
        let cndtr_addr = dma::channel_reg(dma::DMA1_BASE, n, dma::CNDTR);
        let ccr = self.reg(ccr_addr);
        let remaining = self.reg(cndtr_addr);
        let ch = self.channels[n as usize - 1];

        // Only memory-to-peripheral transfers are modeled.
        if remaining == 0 || ccr & dma::CCR_DIR == 0 {
            return;
        }
        if ch.per_ptr == USART3_TDR {
            let cr3 = self.reg(usart::USART3_BASE + usart::CR3);
            if !self.clocked(Block::Usart3(0)) || cr3 & usart::CR3_DMAT == 0 || self.tx_busy != 0 {
                return;
            }
        }

        let Some(byte) = self.memory_byte(ch.mem_ptr) else {
            // Bus error: the channel is disabled by hardware.
            self.raise_flags(n, dma::ISR_TEIF);
            self.regs.insert(ccr_addr, ccr & !dma::CCR_EN);
            self.channels[n as usize - 1].active = false;
            return;
        };
        self.store(ch.per_ptr, byte as u32);

        let ch = &mut self.channels[n as usize - 1];
        if ccr & dma::CCR_MINC != 0 {
            ch.mem_ptr += 1;
        }
        if ccr & dma::CCR_PINC != 0 {
            ch.per_ptr += 1;
        }
        let reload = ch.reload;
        let mut remaining = remaining - 1;

        if remaining == reload / 2 {
            self.raise_flags(n, dma::ISR_HTIF);
        }
        if remaining == 0 {
            self.raise_flags(n, dma::ISR_TCIF);
            if ccr & dma::CCR_CIRC != 0 {
                remaining = reload;
                let cpar = self.reg(dma::channel_reg(dma::DMA1_BASE, n, dma::CPAR));
                let cmar = self.reg(dma::channel_reg(dma::DMA1_BASE, n, dma::CMAR));
                let ch = &mut self.channels[n as usize - 1];
                ch.mem_ptr = cmar;
                ch.per_ptr = cpar;
            }
        }
        self.regs.insert(cndtr_addr, remaining);
    }
}

/// A register-level model of the MCU. Implements `Bus` and `Cpu` through a shared reference,
/// so drivers can each hold a `&Sim` while the test inspects it.
pub struct Sim {
    state: RefCell<State>,
}

impl Sim {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State {
                next_region: SRAM_BASE,
                ..Default::default()
            }),
        }
    }

    /// Read a register without side effects and without advancing time.
    pub fn peek(&self, addr: u32) -> u32 {
        self.state.borrow().reg(addr)
    }

    /// The value last written to `addr` by software, including write-only registers.
    pub fn last_write(&self, addr: u32) -> Option<u32> {
        self.state.borrow().last_writes.get(&addr).copied()
    }

    /// Drive an input pin from outside, as a button or jumper would.
    pub fn drive_pin(&self, port: Port, pin: u8, level: PinState) {
        self.state
            .borrow_mut()
            .drives
            .insert((port.index(), pin), level);
    }

    /// Stop driving a pin; it reads its pull level again.
    pub fn release_pin(&self, port: Port, pin: u8) {
        self.state.borrow_mut().drives.remove(&(port.index(), pin));
    }

    /// Connect an output pin to an input pin, like a jumper wire.
    pub fn wire(&self, output: (Port, u8), input: (Port, u8)) {
        self.state.borrow_mut().wires.push((
            (output.0.index(), output.1),
            (input.0.index(), input.1),
        ));
    }

    /// Queue bytes on the USART3 receive line.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// After each transmitted byte, keep TXE and TC low for this many ticks.
    pub fn set_tx_latency(&self, ticks: u32) {
        self.state.borrow_mut().tx_latency = ticks;
    }

    /// Bytes transmitted on USART3 so far.
    pub fn uart_output(&self) -> Vec<u8> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Tx(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Number of `nop`s executed.
    pub fn nop_count(&self) -> u64 {
        self.state.borrow().nops
    }

    /// Whether a breakpoint has executed.
    pub fn is_halted(&self) -> bool {
        self.state.borrow().halted
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for Sim {
    fn read(&self, addr: u32) -> u32 {
        let mut state = self.state.borrow_mut();
        state.tick();
        state.load(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        let mut state = self.state.borrow_mut();
        state.last_writes.insert(addr, value);
        state.store(addr, value);
    }

    /// Copies `buf` into simulated SRAM. The DMA sees the contents as of this call.
    fn bus_address(&self, buf: &[u8]) -> u32 {
        let mut state = self.state.borrow_mut();
        let base = state.next_region;
        // Leave a gap, so running off the end of a buffer is a bus error.
        state.next_region = (base + buf.len() as u32 + 0x10 + 3) & !3;
        state.regions.push(Region {
            base,
            bytes: buf.to_vec(),
        });
        base
    }
}

impl Cpu for Sim {
    fn nop(&self) {
        let mut state = self.state.borrow_mut();
        state.nops += 1;
        state.tick();
    }

    fn breakpoint(&self) {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::Breakpoint);
        state.halted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enable_all(sim: &Sim) {
        sim.write(rcc::AHB1ENR, rcc::AHB1ENR_DMA1EN);
        sim.write(rcc::AHB2ENR, 0x1FF);
        sim.write(rcc::APB1LENR, rcc::APB1LENR_USART3EN);
    }

    #[test]
    fn bsrr_set_has_priority_over_reset() {
        let sim = Sim::new();
        enable_all(&sim);
        let bsrr = gpio::GPIOB_BASE + gpio::BSRR;

        sim.write(bsrr, (1 << 16) | 1);

        assert_eq!(sim.peek(gpio::GPIOB_BASE + gpio::ODR), 1);
        assert_eq!(
            sim.events(),
            [Event::Pin {
                port: Port::B,
                pin: 0,
                level: PinState::High
            }]
        );
    }

    #[test]
    fn tdr_ignored_until_transmitter_enabled() {
        let sim = Sim::new();
        enable_all(&sim);
        sim.write(USART3_TDR, b'x' as u32);
        sim.write(usart::USART3_BASE + usart::CR1, usart::CR1_UE | usart::CR1_TE);
        sim.write(USART3_TDR, b'y' as u32);

        assert_eq!(sim.uart_output(), b"y");
    }

    #[test]
    fn tx_latency_holds_txe_low() {
        let sim = Sim::new();
        enable_all(&sim);
        sim.set_tx_latency(3);
        sim.write(usart::USART3_BASE + usart::CR1, usart::CR1_UE | usart::CR1_TE);
        sim.write(USART3_TDR, 0);

        let isr = usart::USART3_BASE + usart::ISR;
        assert_eq!(sim.read(isr) & usart::ISR_TXE, 0);
        assert_eq!(sim.read(isr) & usart::ISR_TXE, 0);
        assert_ne!(sim.read(isr) & usart::ISR_TXE, 0);
    }

    #[test]
    fn dma_from_unregistered_memory_is_a_transfer_error() {
        let sim = Sim::new();
        enable_all(&sim);
        let ch = |reg| dma::channel_reg(dma::DMA1_BASE, 2, reg);
        sim.write(ch(dma::CPAR), SRAM_BASE + 0x1000);
        sim.write(ch(dma::CMAR), 0x0800_0000);
        sim.write(ch(dma::CNDTR), 4);
        sim.write(ch(dma::CCR), dma::CCR_DIR | dma::CCR_MINC | dma::CCR_EN);

        let isr = sim.read(dma::DMA1_BASE + dma::ISR);

        assert_eq!(isr >> dma::flag_shift(2), dma::ISR_TEIF | dma::ISR_GIF);
        assert_eq!(sim.peek(ch(dma::CCR)) & dma::CCR_EN, 0);
        assert_eq!(sim.peek(ch(dma::CNDTR)), 4);
    }

    #[test]
    fn rx_queue_feeds_rdr() {
        let sim = Sim::new();
        enable_all(&sim);
        sim.write(usart::USART3_BASE + usart::CR1, usart::CR1_UE | usart::CR1_RE);
        sim.push_rx(b"ok");

        let isr = usart::USART3_BASE + usart::ISR;
        let rdr = usart::USART3_BASE + usart::RDR;
        assert_ne!(sim.read(isr) & usart::ISR_RXNE, 0);
        assert_eq!(sim.read(rdr), b'o' as u32);
        assert_eq!(sim.read(rdr), b'k' as u32);
        assert_eq!(sim.read(isr) & usart::ISR_RXNE, 0);
    }
}
