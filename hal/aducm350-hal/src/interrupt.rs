//! Interrupt line gating
//!
//! The drivers gate their interrupt lines through this trait instead of
//! touching the NVIC directly, so host tests can observe and honor the
//! gating. Handler installation is not modeled: the drivers expose their
//! dispatch entry points as methods and the platform wires them to vectors.

/// Interrupt lines the core drivers own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqLine {
    Rtc,
    I2cMaster,
    I2cSlave,
    DmaI2cMaster,
    DmaI2cSlaveTx,
    DmaI2cSlaveRx,
}

/// Interrupt controller facade.
///
/// Also used as the critical-region primitive: disabling a driver's own
/// line around a paired register read is how the RTC avoids the read-read
/// race on its split 32-bit registers.
pub trait InterruptControl {
    fn enable(&mut self, line: IrqLine);
    fn disable(&mut self, line: IrqLine);
    fn is_enabled(&self, line: IrqLine) -> bool;
}
