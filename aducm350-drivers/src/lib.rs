//! ADuCM350 core peripheral drivers
//!
//! Register-level drivers for the two quirkiest peripherals on the part:
//!
//! - RTC: a 32 kHz-domain counter behind a posted-write interface, with a
//!   failsafe latch that gates the whole driver until the clock is trusted
//!   again.
//! - I2C: a dual-engine (master + slave) controller with two-byte FIFOs,
//!   driven by interrupt dispatch in PIO mode or by a ping-pong descriptor
//!   scheduler in DMA mode.
//!
//! Both drivers are generic over the `aducm350-hal` traits, so they run
//! unchanged against the real register blocks on target or against the
//! simulated models in `aducm350-sim` on the host.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod i2c;
pub mod rtc;
