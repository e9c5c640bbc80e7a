//! Support for the Direct Memory Access (DMA) peripheral. This module handles initialization and
//! transfer configuration for DMA1 channels. `Usart::write_dma` is built on it.
//!
//! Completion is observed by polling; there are no interrupt handlers.

use core::sync::atomic::{self, Ordering};

use crate::{
    clocks,
    regmap::dma::{
        CCR, CCR_CIRC, CCR_DIR, CCR_EN, CCR_HTIE, CCR_MEM2MEM, CCR_MINC, CCR_MSIZE_SHIFT,
        CCR_PINC, CCR_PL_SHIFT, CCR_PSIZE_SHIFT, CCR_TCIE, CCR_TEIE, CMAR, CNDTR, CNDTR_MAX,
        CPAR, DMA1_BASE, IFCR, ISR, ISR_CHANNEL_MASK, ISR_GIF, ISR_HTIF, ISR_TCIF, ISR_TEIF,
        channel_reg, flag_shift,
    },
    regs::Bus,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Represents a DMA channel to select, eg when configuring for use with a peripheral.
pub enum DmaChannel {
    C1 = 1,
    C2 = 2,
    C3 = 3,
    C4 = 4,
    C5 = 5,
    C6 = 6,
    C7 = 7,
}

impl DmaChannel {
    /// Channel number, starting at 1.
    pub const fn num(self) -> u8 {
        self as u8
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Channel priority compared to other channels (CCR PL). If two requests have the same
/// software priority, the channel with the lower number wins.
pub enum Priority {
    Low = 0b00,
    Medium = 0b01,
    High = 0b10,
    VeryHigh = 0b11,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Transfer direction. (CCR DIR and MEM2MEM bits)
pub enum Direction {
    /// DIR = 0 defines typically a peripheral-to-memory transfer
    ReadFromPeriph,
    /// DIR = 1 defines typically a memory-to-peripheral transfer.
    ReadFromMem,
    MemToMem,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Circular mode (CCR CIRC). Must not be combined with `Direction::MemToMem`.
pub enum Circular {
    Disabled = 0,
    Enabled = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Peripheral and memory increment mode. (CCR PINC and MINC bits)
pub enum IncrMode {
    Disabled = 0,
    Enabled = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Peripheral and memory data size. (CCR PSIZE and MSIZE fields)
pub enum DataSize {
    S8 = 0b00, // ie 8 bits
    S16 = 0b01,
    S32 = 0b10,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Channel event flags, as in ISR and IFCR.
pub enum DmaInterrupt {
    TransferError,
    HalfTransfer,
    TransferComplete,
}

impl DmaInterrupt {
    fn flag(self) -> u32 {
        match self {
            Self::TransferError => ISR_TEIF,
            Self::HalfTransfer => ISR_HTIF,
            Self::TransferComplete => ISR_TCIF,
        }
    }
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Everything written to CCR when a channel starts. The default is a byte-wide
/// memory-to-peripheral transfer that increments the memory address, at low priority, with the
/// transfer-complete interrupt enabled: CCR = 0x93 once EN is set.
pub struct ChannelCfg {
    pub priority: Priority,
    pub direction: Direction,
    pub circular: Circular,
    /// Whether we increment the peripheral address on each item; generally (and by default)
    /// disabled.
    pub periph_incr: IncrMode,
    /// Whether we increment the buffer address on each item; generally (and by default)
    /// enabled.
    pub mem_incr: IncrMode,
    pub periph_size: DataSize,
    pub mem_size: DataSize,
    /// Transfer-complete interrupt enable. Only affects the NVIC line; the ISR flag is set
    /// regardless.
    pub tc_interrupt: bool,
    pub ht_interrupt: bool,
    pub te_interrupt: bool,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        Self {
            priority: Priority::Low,
            direction: Direction::ReadFromMem,
            circular: Circular::Disabled,
            // Increment the buffer address, not the peripheral address.
            periph_incr: IncrMode::Disabled,
            mem_incr: IncrMode::Enabled,
            periph_size: DataSize::S8,
            mem_size: DataSize::S8,
            tc_interrupt: true,
            ht_interrupt: false,
            te_interrupt: false,
        }
    }
}

impl ChannelCfg {
    /// CCR contents for this configuration, without EN.
    pub fn ccr_bits(&self) -> u32 {
        let mut val = ((self.priority as u32) << CCR_PL_SHIFT)
            | ((self.periph_size as u32) << CCR_PSIZE_SHIFT)
            | ((self.mem_size as u32) << CCR_MSIZE_SHIFT);

        match self.direction {
            Direction::ReadFromPeriph => (),
            Direction::ReadFromMem => val |= CCR_DIR,
            Direction::MemToMem => val |= CCR_MEM2MEM,
        }

        let flags = [
            (self.circular == Circular::Enabled, CCR_CIRC),
            (self.periph_incr == IncrMode::Enabled, CCR_PINC),
            (self.mem_incr == IncrMode::Enabled, CCR_MINC),
            (self.tc_interrupt, CCR_TCIE),
            (self.ht_interrupt, CCR_HTIE),
            (self.te_interrupt, CCR_TEIE),
        ];
        for (enabled, bit) in flags {
            if enabled {
                val |= bit;
            }
        }
        val
    }
}

/// Represents a Direct Memory Access (DMA) peripheral.
pub struct Dma<B: Bus> {
    bus: B,
    base: u32,
}

impl<B: Bus> Dma<B> {
    /// Initialize DMA1, including enabling its RCC peripheral clock.
    pub fn new(bus: B) -> Self {
        clocks::enable_dma1(&bus);
        Self {
            bus,
            base: DMA1_BASE,
        }
    }

    fn ch_reg(&self, channel: DmaChannel, reg: u32) -> u32 {
        channel_reg(self.base, channel.num(), reg)
    }

    /// Program the peripheral address, memory address and item count of a channel. If the
    /// channel is running, it's stopped first; these registers are read-only while EN is set.
    pub fn configure(&mut self, channel: DmaChannel, periph_addr: u32, mem_addr: u32, len: u32) {
        debug_assert!(len <= CNDTR_MAX, "DMA transfer length exceeds CNDTR");

        if self.bus.bit_is_set(self.ch_reg(channel, CCR), CCR_EN) {
            self.stop(channel);
        }

        // 1. Set the peripheral register address in CPAR. Data is moved to or from this
        // address after each peripheral request.
        self.bus.write(self.ch_reg(channel, CPAR), periph_addr);

        atomic::compiler_fence(Ordering::SeqCst);

        // 2. Set the memory address in CMAR.
        self.bus.write(self.ch_reg(channel, CMAR), mem_addr);

        // 3. Configure the total number of items in CNDTR. It's decremented after each item.
        self.bus.write(self.ch_reg(channel, CNDTR), len);

        // Completion is polled, so a TCIF left over from the previous transfer on this
        // channel would read as this one finishing.
        self.clear_flags(channel);
    }

    /// Configure CCR and activate the channel, in a single write. From here the transfer runs
    /// alongside the CPU; the buffer must not be touched until it completes.
    pub fn start(&mut self, channel: DmaChannel, cfg: ChannelCfg) {
        // Prevent preceding memory operations (eg filling the buffer) from being moved after
        // the enabling write.
        atomic::compiler_fence(Ordering::Release);

        self.bus
            .write(self.ch_reg(channel, CCR), cfg.ccr_bits() | CCR_EN);

        debug!("DMA1 channel {} started", channel.num());
    }

    /// Stop a DMA transfer, if in progress.
    pub fn stop(&mut self, channel: DmaChannel) {
        let ccr = self.ch_reg(channel, CCR);
        self.bus.clear_bits(ccr, CCR_EN);
        while self.bus.bit_is_set(ccr, CCR_EN) {}
    }

    /// Whether the channel's transfer-complete flag is set.
    pub fn transfer_is_complete(&self, channel: DmaChannel) -> bool {
        self.bus
            .bit_is_set(self.base + ISR, ISR_TCIF << flag_shift(channel.num()))
    }

    /// Whether the channel stopped on a bus error. The hardware clears EN when this happens.
    pub fn transfer_has_error(&self, channel: DmaChannel) -> bool {
        self.bus
            .bit_is_set(self.base + ISR, ISR_TEIF << flag_shift(channel.num()))
    }

    /// Block until the transfer completes. There is no timeout.
    pub fn wait_for_transfer(&self, channel: DmaChannel) {
        while !self.transfer_is_complete(channel) {}
    }

    /// Clear one of the channel's flags.
    pub fn clear_interrupt(&mut self, channel: DmaChannel, interrupt: DmaInterrupt) {
        self.bus
            .write(self.base + IFCR, interrupt.flag() << flag_shift(channel.num()));
    }

    /// Clear all of the channel's flags, including the global one.
    pub fn clear_flags(&mut self, channel: DmaChannel) {
        self.bus.write(
            self.base + IFCR,
            (ISR_CHANNEL_MASK | ISR_GIF) << flag_shift(channel.num()),
        );
    }

    /// Items left to transfer.
    pub fn remaining(&self, channel: DmaChannel) -> u32 {
        self.bus.read(self.ch_reg(channel, CNDTR)) & CNDTR_MAX
    }
}
