//! Simulated ADuCM350 hardware
//!
//! Host-side implementations of the `aducm350-hal` traits, used to test the
//! drivers without silicon. Each model is a shared-ownership register block
//! (`Rc<RefCell<...>>`) handed to the driver through small handle types, so
//! a test keeps its own handle to inspect and advance the hardware while
//! the driver owns the trait objects.
//!
//! Time is a tick counter. One tick advances the simulated world one step:
//! the RTC's posted-write pipeline drains one stage and its counter moves
//! one second; the I2C bus moves one byte or one scripted bus condition.
//! The [`Idle`](aducm350_hal::wait::Idle) implementations tick the world on
//! every call, which is what lets a driver's blocking loop make progress on
//! a single thread, and they fail once a tick budget is exhausted so a
//! wedged bus fails a test instead of hanging it.

pub mod dma;
pub mod i2c;
pub mod intc;
pub mod rtc;

pub use dma::{DmaFault, SimDma, SimDmaEngine};
pub use i2c::{BusEvent, ExternalSlave, MasterOp, SimI2c, SimI2cIdle, SimI2cRegisters};
pub use intc::SimIntc;
pub use rtc::{SimRtc, SimRtcIdle, SimRtcRegisters};

/// An [`Idle`](aducm350_hal::wait::Idle) tick budget ran out.
///
/// Surfaces in driver results as a wait failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitExpired;
