//! DMA engine collaborator
//!
//! The micro-DMA controller runs two descriptor slots per channel (primary
//! and alternate). In ping-pong mode the engine consumes them alternately,
//! clearing a slot's cycle field as it finishes; a descriptor submitted with
//! the invalid cycle mode is the natural stop condition. The I2C driver is
//! the sole descriptor author; the engine only accepts submissions and
//! reports slot state.

/// DMA channels used by the I2C controller.
///
/// Master mode shares a single channel between TX and RX on this chip; the
/// driver differentiates direction with its sharing flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaChannel {
    /// Shared master TX/RX channel.
    I2cMaster,
    I2cSlaveTx,
    I2cSlaveRx,
}

/// Descriptor slot selector for ping-pong alternation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DescriptorSlot {
    Primary,
    Alternate,
}

impl DescriptorSlot {
    pub fn other(self) -> Self {
        match self {
            DescriptorSlot::Primary => DescriptorSlot::Alternate,
            DescriptorSlot::Alternate => DescriptorSlot::Primary,
        }
    }
}

/// Descriptor cycle mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleMode {
    /// Active ping-pong transfer chunk.
    PingPong,
    /// Stop condition: the engine halts the channel on consuming this slot.
    Invalid,
}

/// Transfer direction relative to memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Memory to peripheral FIFO (transmit).
    MemoryToFifo,
    /// Peripheral FIFO to memory (receive).
    FifoToMemory,
}

/// Which buffer region a descriptor covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaRegion {
    /// The byte-reversed data-address window sent before the payload.
    AddressWindow,
    /// Transmit payload.
    TxData,
    /// Receive payload.
    RxData,
}

/// One DMA transfer descriptor as the I2C driver programs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaDescriptor {
    pub channel: DmaChannel,
    pub slot: DescriptorSlot,
    pub mode: CycleMode,
    pub direction: Direction,
    pub region: DmaRegion,
    /// Byte offset into the region where this chunk starts.
    pub offset: usize,
    /// Chunk length in bytes; zero for [`CycleMode::Invalid`].
    pub len: usize,
}

/// Largest element count one descriptor can carry.
pub const MAX_TRANSFER_SIZE: usize = 1024;

/// Descriptor-based DMA engine.
pub trait DmaEngine {
    type Error;

    /// Claim a channel for use.
    fn init(&mut self, channel: DmaChannel) -> Result<(), Self::Error>;

    /// Release a channel.
    fn uninit(&mut self, channel: DmaChannel) -> Result<(), Self::Error>;

    /// Reset a channel's slot alternation so the primary slot is consumed
    /// first in the next transaction.
    fn reset_slots(&mut self, channel: DmaChannel);

    /// Program one descriptor slot.
    fn submit(&mut self, descriptor: DmaDescriptor) -> Result<(), Self::Error>;

    /// True when the slot's cycle field reads cleared: the engine finished
    /// it, or it holds a stop descriptor.
    fn slot_done(&self, channel: DmaChannel, slot: DescriptorSlot) -> bool;
}
