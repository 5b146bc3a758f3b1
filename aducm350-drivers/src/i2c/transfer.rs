//! Transaction phase state machine and addressing helpers
//!
//! All master-engine pumping is a function of the current phase and an
//! event; the interrupt handlers feed events in and act on the resulting
//! phase. The one-shot repeat-start latch and the data-address window
//! shifter live here too, since both are consumed by the pump.

/// Width of the data/register address sent before the payload.
///
/// The discriminant doubles as the number of address-window bytes on the
/// wire, which is why the 12-bit width carries three: the part pads it to
/// a full byte boundary with a leading nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataAddressWidth {
    None,
    Bits8,
    Bits16,
    Bits12,
    Bits32,
}

impl DataAddressWidth {
    /// Address-window length in bytes.
    pub fn byte_count(self) -> usize {
        match self {
            DataAddressWidth::None => 0,
            DataAddressWidth::Bits8 => 1,
            DataAddressWidth::Bits16 => 2,
            DataAddressWidth::Bits12 => 3,
            DataAddressWidth::Bits32 => 4,
        }
    }
}

/// Emits the data-address window most-significant byte first.
#[derive(Debug, Clone, Copy)]
pub struct AddressWindow {
    address: u32,
    remaining: usize,
}

impl AddressWindow {
    pub fn new(address: u32, width: DataAddressWidth) -> Self {
        AddressWindow {
            address,
            remaining: width.byte_count(),
        }
    }

    pub fn empty() -> Self {
        AddressWindow {
            address: 0,
            remaining: 0,
        }
    }

    /// Next window byte, or `None` once the window is drained.
    pub fn next_byte(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some((self.address >> (self.remaining * 8)) as u8)
    }

    /// Drain the whole window into `out`, returning the byte count.
    /// Used to stage the window for a DMA descriptor.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.next_byte() {
                Some(b) => {
                    out[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_drained(&self) -> bool {
        self.remaining == 0
    }
}

/// One-shot repeat-start latch.
///
/// Arming it tells the pump to rewrite the first address register exactly
/// once mid-transfer, which holds the bus instead of driving a stop. The
/// latch must fire at most once per transaction no matter how many TX/RX
/// interrupts observe it armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RepeatStart {
    #[default]
    Idle,
    Armed,
    Consumed,
}

impl RepeatStart {
    pub fn arm(&mut self) {
        *self = RepeatStart::Armed;
    }

    /// Consume the latch. Returns true exactly once after arming.
    pub fn take(&mut self) -> bool {
        if *self == RepeatStart::Armed {
            *self = RepeatStart::Consumed;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        *self == RepeatStart::Armed
    }

    pub fn reset(&mut self) {
        *self = RepeatStart::Idle;
    }
}

/// Master transaction phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No transaction in flight.
    #[default]
    Idle,
    /// Emitting the data-address window bytes.
    AddressWindow,
    /// Moving payload bytes through the FIFO.
    Data,
    /// Payload handed over; waiting for the engine to finish.
    Draining,
    /// Transaction finished cleanly.
    Complete,
    /// Transaction terminated by NACK or arbitration loss.
    Faulted,
}

/// Events the interrupt handlers feed to the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseEvent {
    /// ADR0 written; `window` is true when a data address precedes the
    /// payload.
    Launch { window: bool },
    /// Last address-window byte entered the FIFO.
    WindowDrained,
    /// Last payload byte moved.
    PayloadDrained,
    /// Engine reported the transaction done.
    Finished,
    /// NACK or arbitration loss latched.
    Fault,
    /// New transaction being set up.
    Reset,
}

impl Phase {
    /// Process an event and return the next phase.
    pub fn transition(self, event: PhaseEvent) -> Self {
        use Phase::*;
        use PhaseEvent::*;

        match (self, event) {
            (_, Reset) => Idle,
            (_, Fault) => Faulted,

            (Idle, Launch { window: true }) => AddressWindow,
            (Idle, Launch { window: false }) => Data,

            (AddressWindow, WindowDrained) => Data,

            (Data, PayloadDrained) => Draining,
            (Data, Finished) => Complete,

            (Draining, Finished) => Complete,

            // Anything else leaves the phase alone.
            (phase, _) => phase,
        }
    }

    /// A transaction is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::AddressWindow | Phase::Data | Phase::Draining)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Faulted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_phase_walks_write_transaction() {
        let mut p = Phase::Idle;
        p = p.transition(PhaseEvent::Launch { window: true });
        assert_eq!(p, Phase::AddressWindow);
        p = p.transition(PhaseEvent::WindowDrained);
        assert_eq!(p, Phase::Data);
        p = p.transition(PhaseEvent::PayloadDrained);
        assert_eq!(p, Phase::Draining);
        p = p.transition(PhaseEvent::Finished);
        assert_eq!(p, Phase::Complete);
        assert!(!p.is_active());
    }

    #[test]
    fn test_fault_terminates_any_phase() {
        for p in [Phase::Idle, Phase::AddressWindow, Phase::Data, Phase::Draining] {
            assert_eq!(p.transition(PhaseEvent::Fault), Phase::Faulted);
        }
    }

    #[test]
    fn test_repeat_start_fires_once() {
        let mut rs = RepeatStart::default();
        assert!(!rs.take());
        rs.arm();
        assert!(rs.take());
        assert!(!rs.take(), "second observer must not fire it again");
        rs.reset();
        assert!(!rs.take());
    }

    #[test]
    fn test_window_emits_most_significant_first() {
        let mut w = AddressWindow::new(0x0102_0304, DataAddressWidth::Bits32);
        assert_eq!(w.next_byte(), Some(0x01));
        assert_eq!(w.next_byte(), Some(0x02));
        assert_eq!(w.next_byte(), Some(0x03));
        assert_eq!(w.next_byte(), Some(0x04));
        assert_eq!(w.next_byte(), None);
    }

    #[test]
    fn test_window_widths() {
        let mut w = AddressWindow::new(0xABCD, DataAddressWidth::Bits16);
        let mut buf = [0u8; 4];
        assert_eq!(w.drain_into(&mut buf), 2);
        assert_eq!(&buf[..2], &[0xAB, 0xCD]);

        assert_eq!(DataAddressWidth::Bits12.byte_count(), 3);
        assert!(AddressWindow::new(0, DataAddressWidth::None).is_drained());
    }

    proptest! {
        #[test]
        fn prop_window_matches_big_endian_tail(address: u32) {
            for width in [
                DataAddressWidth::Bits8,
                DataAddressWidth::Bits16,
                DataAddressWidth::Bits12,
                DataAddressWidth::Bits32,
            ] {
                let n = width.byte_count();
                let mut w = AddressWindow::new(address, width);
                let mut out = [0u8; 4];
                prop_assert_eq!(w.drain_into(&mut out), n);
                let be = address.to_be_bytes();
                prop_assert_eq!(&out[..n], &be[4 - n..]);
            }
        }
    }
}
