//! Simulated RTC register model
//!
//! Models the posted-write pipeline the real part has: a write to any
//! 32 kHz-domain register occupies a one-deep buffer (the group's pend bit)
//! for one tick, then spends one more tick crossing the domain (the sync
//! bit reads clear until it lands). A second write while the buffer is
//! occupied is dropped and latched in the write-error field, exactly the
//! failure the driver's safe-write stall exists to prevent.
//!
//! One tick is one second of RTC time: when the counter is enabled it
//! advances by one per tick after the pipeline drains a stage.

use std::cell::RefCell;
use std::rc::Rc;

use aducm350_hal::rtc::{cr, RtcRegisters, RtcSources, WriteError, GATEWAY_FLUSH};
use aducm350_hal::wait::Idle;

use crate::WaitExpired;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Control,
    Status0,
    Count0,
    Count1,
    Alarm0,
    Alarm1,
    Trim,
}

const GROUPS: [Group; 7] = [
    Group::Control,
    Group::Status0,
    Group::Count0,
    Group::Count1,
    Group::Alarm0,
    Group::Alarm1,
    Group::Trim,
];

impl Group {
    /// Bit position shared by the SR1 pend bit and SR0 sync bit.
    fn status_bit(self) -> u16 {
        match self {
            Group::Control => 1 << 7,
            Group::Status0 => 1 << 8,
            Group::Count0 => 1 << 9,
            Group::Count1 => 1 << 10,
            Group::Alarm0 => 1 << 11,
            Group::Alarm1 => 1 << 12,
            Group::Trim => 1 << 13,
        }
    }

    fn error_source(self) -> WriteError {
        match self {
            Group::Control => WriteError::Control,
            Group::Status0 => WriteError::Status0,
            Group::Count0 => WriteError::Count0,
            Group::Count1 => WriteError::Count1,
            Group::Alarm0 => WriteError::Alarm0,
            Group::Alarm1 => WriteError::Alarm1,
            Group::Trim => WriteError::Trim,
        }
    }
}

#[derive(Default)]
struct Posted {
    /// Occupying the one-deep buffer; the group's pend bit.
    staged: Option<u16>,
    /// Crossing into the 32 kHz domain.
    crossing: Option<u16>,
    /// Clear from write until the value lands; the group's sync bit.
    synced: bool,
}

struct RtcModel {
    control: u16,
    /// Latched interrupt-source bits (SR0 bits 0..6).
    sources: u16,
    /// Last dropped-write source (SR1 error field).
    write_error: WriteError,
    count: u32,
    alarm: u32,
    trim: u16,
    posted: [Posted; 7],
}

impl RtcModel {
    fn new() -> Self {
        let mut posted: [Posted; 7] = Default::default();
        for p in posted.iter_mut() {
            p.synced = true;
        }
        RtcModel {
            control: 0,
            sources: 0,
            write_error: WriteError::None,
            count: 0,
            alarm: 0,
            trim: 0,
            posted,
        }
    }

    fn posted_mut(&mut self, group: Group) -> &mut Posted {
        let idx = GROUPS.iter().position(|g| *g == group).unwrap();
        &mut self.posted[idx]
    }

    fn write(&mut self, group: Group, value: u16) {
        let slot = self.posted_mut(group);
        if slot.staged.is_some() {
            // One-deep buffer occupied: the new write is lost.
            self.write_error = group.error_source();
            self.sources |= RtcSources::WRITE_PENDERR.bits();
            return;
        }
        slot.staged = Some(value);
        slot.synced = false;
        self.sources |= RtcSources::WRITE_PEND.bits();
    }

    fn apply(&mut self, group: Group, value: u16) {
        match group {
            Group::Control => self.control = value,
            // Write-one-to-clear on the latched source bits.
            Group::Status0 => self.sources &= !(value & 0x7F),
            Group::Count0 => self.count = (self.count & 0xFFFF_0000) | u32::from(value),
            Group::Count1 => self.count = (self.count & 0xFFFF) | (u32::from(value) << 16),
            Group::Alarm0 => self.alarm = (self.alarm & 0xFFFF_0000) | u32::from(value),
            Group::Alarm1 => self.alarm = (self.alarm & 0xFFFF) | (u32::from(value) << 16),
            Group::Trim => self.trim = value,
        }
    }

    fn tick(&mut self) {
        // Drain one pipeline stage per group.
        for group in GROUPS {
            let slot = self.posted_mut(group);
            let landing = slot.crossing.take();
            let accepted = slot.staged.take();
            let slot_empty = accepted.is_none();
            if let Some(value) = landing {
                self.apply(group, value);
                let slot = self.posted_mut(group);
                slot.synced = slot_empty && slot.crossing.is_none();
                if slot.synced {
                    self.sources |= RtcSources::WRITE_SYNC.bits();
                }
            }
            if let Some(value) = accepted {
                self.posted_mut(group).crossing = Some(value);
            }
        }

        // Advance time.
        if self.control & cr::CNTEN != 0 {
            self.count = self.count.wrapping_add(1);
            if self.control & cr::ALMEN != 0 && self.count == self.alarm {
                self.sources |= RtcSources::ALARM.bits();
            }
            if self.control & cr::LCDEN != 0 {
                let second = (self.control & cr::LCD_MASK) >> cr::LCD_OFFSET;
                if (self.count % 60) as u16 == second {
                    self.sources |= RtcSources::LCD_UPDATE.bits();
                }
            }
        }
    }

    fn sr0(&self) -> u16 {
        let mut v = self.sources;
        for group in GROUPS {
            let idx = GROUPS.iter().position(|g| *g == group).unwrap();
            if self.posted[idx].synced {
                v |= group.status_bit();
            }
        }
        v
    }

    fn sr1(&self) -> u16 {
        let mut v = self.write_error.to_field();
        for group in GROUPS {
            let idx = GROUPS.iter().position(|g| *g == group).unwrap();
            if self.posted[idx].staged.is_some() {
                v |= group.status_bit();
            }
        }
        v
    }

    fn flush(&mut self) {
        for p in self.posted.iter_mut() {
            p.staged = None;
            p.crossing = None;
            p.synced = true;
        }
    }
}

/// Simulated RTC. Clone handles out of it for the driver; keep it around to
/// advance time and inspect the hardware.
pub struct SimRtc {
    inner: Rc<RefCell<RtcModel>>,
}

impl SimRtc {
    pub fn new() -> Self {
        SimRtc {
            inner: Rc::new(RefCell::new(RtcModel::new())),
        }
    }

    /// Register-block handle for the driver.
    pub fn registers(&self) -> SimRtcRegisters {
        SimRtcRegisters {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Idle handle for the driver; fails after `budget` ticks.
    pub fn idle(&self, budget: u32) -> SimRtcIdle {
        SimRtcIdle {
            inner: Rc::clone(&self.inner),
            remaining: budget,
        }
    }

    pub fn tick(&self) {
        self.inner.borrow_mut().tick();
    }

    pub fn tick_n(&self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Latch the failsafe bit, as hardware does on first power-up or after
    /// total power loss, and scrap the counter.
    pub fn inject_failsafe(&self) {
        let mut m = self.inner.borrow_mut();
        m.sources |= RtcSources::FAIL.bits();
        m.count = 0;
    }

    /// Counter value as landed in the 32 kHz domain.
    pub fn count(&self) -> u32 {
        self.inner.borrow().count
    }

    /// Control register as landed in the 32 kHz domain.
    pub fn control(&self) -> u16 {
        self.inner.borrow().control
    }
}

impl Default for SimRtc {
    fn default() -> Self {
        Self::new()
    }
}

/// [`RtcRegisters`] implementation over the shared model.
pub struct SimRtcRegisters {
    inner: Rc<RefCell<RtcModel>>,
}

impl RtcRegisters for SimRtcRegisters {
    fn cr(&self) -> u16 {
        self.inner.borrow().control
    }

    fn set_cr(&mut self, value: u16) {
        self.inner.borrow_mut().write(Group::Control, value);
    }

    fn sr0(&self) -> u16 {
        self.inner.borrow().sr0()
    }

    fn set_sr0(&mut self, value: u16) {
        self.inner.borrow_mut().write(Group::Status0, value);
    }

    fn sr1(&self) -> u16 {
        self.inner.borrow().sr1()
    }

    fn cnt0(&self) -> u16 {
        self.inner.borrow().count as u16
    }

    fn set_cnt0(&mut self, value: u16) {
        self.inner.borrow_mut().write(Group::Count0, value);
    }

    fn cnt1(&self) -> u16 {
        (self.inner.borrow().count >> 16) as u16
    }

    fn set_cnt1(&mut self, value: u16) {
        self.inner.borrow_mut().write(Group::Count1, value);
    }

    fn alm0(&self) -> u16 {
        self.inner.borrow().alarm as u16
    }

    fn set_alm0(&mut self, value: u16) {
        self.inner.borrow_mut().write(Group::Alarm0, value);
    }

    fn alm1(&self) -> u16 {
        (self.inner.borrow().alarm >> 16) as u16
    }

    fn set_alm1(&mut self, value: u16) {
        self.inner.borrow_mut().write(Group::Alarm1, value);
    }

    fn trm(&self) -> u16 {
        self.inner.borrow().trim
    }

    fn set_trm(&mut self, value: u16) {
        self.inner.borrow_mut().write(Group::Trim, value);
    }

    fn set_gwy(&mut self, value: u16) {
        if value == GATEWAY_FLUSH {
            self.inner.borrow_mut().flush();
        }
    }
}

/// Ticks the RTC model once per call until the budget runs out.
pub struct SimRtcIdle {
    inner: Rc<RefCell<RtcModel>>,
    remaining: u32,
}

impl Idle for SimRtcIdle {
    type Error = WaitExpired;

    fn idle(&mut self) -> Result<(), WaitExpired> {
        if self.remaining == 0 {
            return Err(WaitExpired);
        }
        self.remaining -= 1;
        self.inner.borrow_mut().tick();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aducm350_hal::rtc::WriteGroups;

    #[test]
    fn test_posted_write_lands_after_two_ticks() {
        let sim = SimRtc::new();
        let mut regs = sim.registers();
        regs.set_trm(0x25);
        assert_eq!(regs.trm(), 0);
        assert_ne!(regs.sr1() & WriteGroups::TRIM.bits(), 0, "pend while staged");
        sim.tick();
        assert_eq!(regs.sr1() & WriteGroups::TRIM.bits(), 0, "pend clears on accept");
        assert_eq!(regs.sr0() & WriteGroups::TRIM.bits(), 0, "sync clear while crossing");
        sim.tick();
        assert_eq!(regs.trm(), 0x25);
        assert_ne!(regs.sr0() & WriteGroups::TRIM.bits(), 0, "sync set after landing");
    }

    #[test]
    fn test_second_write_while_pending_is_dropped() {
        let sim = SimRtc::new();
        let mut regs = sim.registers();
        regs.set_trm(0x11);
        regs.set_trm(0x22);
        sim.tick_n(3);
        assert_eq!(regs.trm(), 0x11);
        assert_eq!(WriteError::from_sr1(regs.sr1()), WriteError::Trim);
    }

    #[test]
    fn test_gateway_flush_discards_staged_writes() {
        let sim = SimRtc::new();
        let mut regs = sim.registers();
        regs.set_trm(0x11);
        regs.set_gwy(GATEWAY_FLUSH);
        sim.tick_n(3);
        assert_eq!(regs.trm(), 0);
        assert_eq!(regs.sr1() & WriteGroups::TRIM.bits(), 0);
    }

    #[test]
    fn test_counter_advances_only_when_enabled() {
        let sim = SimRtc::new();
        let mut regs = sim.registers();
        sim.tick_n(5);
        assert_eq!(sim.count(), 0);
        regs.set_cr(cr::CNTEN);
        sim.tick_n(2); // control write lands
        let base = sim.count();
        sim.tick_n(5);
        assert_eq!(sim.count(), base + 5);
    }
}
