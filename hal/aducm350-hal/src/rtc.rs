//! RTC register block abstraction
//!
//! The RTC lives in a 32 kHz oscillator domain behind a posted-write
//! interface: writes from the core clock domain are buffered one deep per
//! register group and drain at the slow clock's pace. The status registers
//! expose one pend bit (buffer occupied) and one sync bit (write has taken
//! observable effect) per group; the driver builds its stall protocol on
//! top of those.

use bitflags::bitflags;

/// Command accepted by the gateway register: discard all queued posted
/// writes immediately.
pub const GATEWAY_FLUSH: u16 = 0xA2C5;

/// Control register (CR) bit assignments.
pub mod cr {
    /// Counter enable.
    pub const CNTEN: u16 = 1 << 0;
    /// Alarm comparator enable.
    pub const ALMEN: u16 = 1 << 1;
    /// Alarm interrupt enable.
    pub const ALMINTEN: u16 = 1 << 2;
    /// Trim enable.
    pub const TRMEN: u16 = 1 << 3;
    /// LCD-update (second-within-minute) event enable.
    pub const LCDEN: u16 = 1 << 4;
    /// LCD-update second field, 0-59.
    pub const LCD_MASK: u16 = 0x3F << LCD_OFFSET;
    pub const LCD_OFFSET: u16 = 5;
    /// LCD-update interrupt enable.
    pub const LCDINTEN: u16 = 1 << 11;
    /// Power isolation done interrupt enable.
    pub const ISOINTEN: u16 = 1 << 12;
    /// Posted-write pend error interrupt enable.
    pub const WPENDERRINTEN: u16 = 1 << 13;
    /// Posted-write sync interrupt enable.
    pub const WSYNCINTEN: u16 = 1 << 14;
    /// Posted-write pend interrupt enable.
    pub const WPENDINTEN: u16 = 1 << 15;
}

/// Trim register (TRM) field encoding.
pub mod trim {
    /// Trim magnitude, 0-7 counts per interval.
    pub const VALUE_MASK: u16 = 0x0007;
    /// Trim polarity: set adds, clear subtracts.
    pub const ADD: u16 = 1 << 3;
    /// Trim interval exponent field: interval is 2^(14 + field) seconds.
    pub const INTERVAL_MASK: u16 = 0x0003 << 4;
    pub const INTERVAL_OFFSET: u16 = 4;
    /// All architected trim bits.
    pub const MASK: u16 = VALUE_MASK | ADD | INTERVAL_MASK;
}

bitflags! {
    /// Latched interrupt-source bits in SR0.
    ///
    /// `FAIL` is the failsafe latch: set by hardware on first power-up or
    /// total power loss, meaning the counter value is untrustworthy. It is
    /// unmaskable as an interrupt source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct RtcSources: u16 {
        const FAIL          = 1 << 0;
        const ALARM         = 1 << 1;
        const LCD_UPDATE    = 1 << 2;
        const ISO_DONE      = 1 << 3;
        const WRITE_PENDERR = 1 << 4;
        const WRITE_SYNC    = 1 << 5;
        const WRITE_PEND    = 1 << 6;
    }
}

bitflags! {
    /// Interrupt-enable gating bits in CR, one per maskable source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct RtcIntEnable: u16 {
        const ALARM         = crate::rtc::cr::ALMINTEN;
        const LCD_UPDATE    = crate::rtc::cr::LCDINTEN;
        const ISO_DONE      = crate::rtc::cr::ISOINTEN;
        const WRITE_PENDERR = crate::rtc::cr::WPENDERRINTEN;
        const WRITE_SYNC    = crate::rtc::cr::WSYNCINTEN;
        const WRITE_PEND    = crate::rtc::cr::WPENDINTEN;
    }
}

impl RtcIntEnable {
    /// Interrupt sources gated by this enable set.
    pub fn sources(self) -> RtcSources {
        let mut s = RtcSources::empty();
        if self.contains(RtcIntEnable::ALARM) {
            s |= RtcSources::ALARM;
        }
        if self.contains(RtcIntEnable::LCD_UPDATE) {
            s |= RtcSources::LCD_UPDATE;
        }
        if self.contains(RtcIntEnable::ISO_DONE) {
            s |= RtcSources::ISO_DONE;
        }
        if self.contains(RtcIntEnable::WRITE_PENDERR) {
            s |= RtcSources::WRITE_PENDERR;
        }
        if self.contains(RtcIntEnable::WRITE_SYNC) {
            s |= RtcSources::WRITE_SYNC;
        }
        if self.contains(RtcIntEnable::WRITE_PEND) {
            s |= RtcSources::WRITE_PEND;
        }
        s
    }
}

bitflags! {
    /// Per-register-group posted-write status bits.
    ///
    /// The same bit positions are used in SR1 (pend: a write is queued and
    /// the buffer slot is occupied) and SR0 (sync: the last write has taken
    /// observable effect; reads set when a group is quiescent).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct WriteGroups: u16 {
        const CONTROL = 1 << 7;
        const STATUS0 = 1 << 8;
        const COUNT0  = 1 << 9;
        const COUNT1  = 1 << 10;
        const ALARM0  = 1 << 11;
        const ALARM1  = 1 << 12;
        const TRIM    = 1 << 13;
    }
}

/// Write-error source field in SR1: which register group last had a posted
/// write dropped because its buffer slot was still occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteError {
    Control,
    Status0,
    Count0,
    Count1,
    Alarm0,
    Alarm1,
    Trim,
    /// No drop since the pend-error latch was last cleared.
    None,
}

impl WriteError {
    pub const FIELD_MASK: u16 = 0xF << 3;

    /// Decode the SR1 error field.
    pub fn from_sr1(sr1: u16) -> Self {
        match (sr1 & Self::FIELD_MASK) >> 3 {
            0 => WriteError::Control,
            1 => WriteError::Status0,
            3 => WriteError::Count0,
            4 => WriteError::Count1,
            5 => WriteError::Alarm0,
            6 => WriteError::Alarm1,
            7 => WriteError::Trim,
            _ => WriteError::None,
        }
    }

    /// Encode as the SR1 error field value.
    pub fn to_field(self) -> u16 {
        let code: u16 = match self {
            WriteError::Control => 0,
            WriteError::Status0 => 1,
            WriteError::Count0 => 3,
            WriteError::Count1 => 4,
            WriteError::Alarm0 => 5,
            WriteError::Alarm1 => 6,
            WriteError::Trim => 7,
            WriteError::None => 15,
        };
        code << 3
    }
}

/// RTC register block.
///
/// One implementor per physical RTC; the driver takes exclusive ownership.
/// SR0 writes are write-one-to-clear for the latched source bits. The CNT,
/// ALM and TRM registers are behind the posted-write buffer; reads return
/// the last value that reached the 32 kHz domain.
pub trait RtcRegisters {
    fn cr(&self) -> u16;
    fn set_cr(&mut self, value: u16);

    fn sr0(&self) -> u16;
    /// Write-one-to-clear the latched source bits.
    fn set_sr0(&mut self, value: u16);

    fn sr1(&self) -> u16;

    fn cnt0(&self) -> u16;
    fn set_cnt0(&mut self, value: u16);
    fn cnt1(&self) -> u16;
    fn set_cnt1(&mut self, value: u16);

    fn alm0(&self) -> u16;
    fn set_alm0(&mut self, value: u16);
    fn alm1(&self) -> u16;
    fn set_alm1(&mut self, value: u16);

    fn trm(&self) -> u16;
    fn set_trm(&mut self, value: u16);

    fn set_gwy(&mut self, value: u16);
}
