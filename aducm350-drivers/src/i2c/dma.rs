//! Ping-pong descriptor scheduler
//!
//! Splits one transfer into chunks of at most [`MAX_TRANSFER_SIZE`] bytes
//! and hands them out as alternating primary/alternate descriptors. When a
//! data-address window precedes the payload it consumes the first
//! descriptor. Once the payload is exhausted the scheduler emits an
//! invalid-mode stop descriptor; the engine halts the channel on consuming
//! it, which is the terminal condition the completion handler looks for.

use aducm350_hal::dma::{
    CycleMode, DescriptorSlot, Direction, DmaChannel, DmaDescriptor, DmaRegion, MAX_TRANSFER_SIZE,
};

#[derive(Debug)]
pub struct PingPongScheduler {
    channel: DmaChannel,
    direction: Direction,
    next_slot: DescriptorSlot,
    /// Address-window bytes not yet covered by a descriptor.
    window_remaining: usize,
    /// Payload byte offset of the next chunk.
    data_offset: usize,
    /// Payload bytes not yet covered by a descriptor.
    data_remaining: usize,
}

impl PingPongScheduler {
    pub fn new(
        channel: DmaChannel,
        direction: Direction,
        window_len: usize,
        data_len: usize,
    ) -> Self {
        PingPongScheduler {
            channel,
            direction,
            next_slot: DescriptorSlot::Primary,
            window_remaining: window_len,
            data_offset: 0,
            data_remaining: data_len,
        }
    }

    /// Build the next descriptor and advance. After the last data chunk
    /// this returns stop descriptors indefinitely.
    pub fn schedule(&mut self) -> DmaDescriptor {
        let slot = self.next_slot;
        self.next_slot = slot.other();

        if self.window_remaining > 0 {
            let len = self.window_remaining;
            self.window_remaining = 0;
            return DmaDescriptor {
                channel: self.channel,
                slot,
                mode: CycleMode::PingPong,
                direction: Direction::MemoryToFifo,
                region: DmaRegion::AddressWindow,
                offset: 0,
                len,
            };
        }

        let chunk = self.data_remaining.min(MAX_TRANSFER_SIZE);
        let descriptor = DmaDescriptor {
            channel: self.channel,
            slot,
            mode: if chunk == 0 {
                CycleMode::Invalid
            } else {
                CycleMode::PingPong
            },
            direction: self.direction,
            region: match self.direction {
                Direction::MemoryToFifo => DmaRegion::TxData,
                Direction::FifoToMemory => DmaRegion::RxData,
            },
            offset: self.data_offset,
            len: chunk,
        };
        self.data_offset += chunk;
        self.data_remaining -= chunk;
        descriptor
    }

    /// Bytes not yet covered by any descriptor.
    pub fn unscheduled(&self) -> usize {
        self.window_remaining + self.data_remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_window_consumes_first_descriptor() {
        let mut s = PingPongScheduler::new(
            DmaChannel::I2cMaster,
            Direction::MemoryToFifo,
            2,
            10,
        );
        let first = s.schedule();
        assert_eq!(first.region, DmaRegion::AddressWindow);
        assert_eq!(first.slot, DescriptorSlot::Primary);
        assert_eq!(first.len, 2);
        let second = s.schedule();
        assert_eq!(second.region, DmaRegion::TxData);
        assert_eq!(second.slot, DescriptorSlot::Alternate);
        assert_eq!(second.len, 10);
        let third = s.schedule();
        assert_eq!(third.mode, CycleMode::Invalid);
        assert_eq!(third.len, 0);
    }

    #[test]
    fn test_large_transfer_chunks_at_limit() {
        let mut s = PingPongScheduler::new(
            DmaChannel::I2cMaster,
            Direction::FifoToMemory,
            0,
            MAX_TRANSFER_SIZE + 100,
        );
        let a = s.schedule();
        assert_eq!(a.len, MAX_TRANSFER_SIZE);
        assert_eq!(a.offset, 0);
        let b = s.schedule();
        assert_eq!(b.len, 100);
        assert_eq!(b.offset, MAX_TRANSFER_SIZE);
        assert_eq!(s.schedule().mode, CycleMode::Invalid);
        assert_eq!(s.unscheduled(), 0);
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_payload_exactly(len in 0usize..5000) {
            let mut s = PingPongScheduler::new(
                DmaChannel::I2cSlaveRx,
                Direction::FifoToMemory,
                0,
                len,
            );
            let mut covered = 0;
            let mut expected_slot = DescriptorSlot::Primary;
            loop {
                let d = s.schedule();
                prop_assert_eq!(d.slot, expected_slot);
                expected_slot = expected_slot.other();
                if d.mode == CycleMode::Invalid {
                    prop_assert_eq!(d.len, 0);
                    break;
                }
                prop_assert!(d.len >= 1 && d.len <= MAX_TRANSFER_SIZE);
                prop_assert_eq!(d.offset, covered);
                covered += d.len;
            }
            prop_assert_eq!(covered, len);
        }
    }
}
