//! ADuCM350 Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction traits the core peripheral
//! drivers are written against. On target the traits are implemented over
//! the real memory-mapped register blocks; on the host they are implemented
//! by the simulated models in `aducm350-sim`, which is how the drivers are
//! tested without silicon.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application / test harness             │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  aducm350-drivers (RTC, I2C)            │
//! └─────────────────────────────────────────┘
//!                     │
//! ┌─────────────────────────────────────────┐
//! │  aducm350-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ target        │       │ aducm350-sim  │
//! │ register maps │       │ (host tests)  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`rtc::RtcRegisters`] - RTC register block access
//! - [`i2c::I2cRegisters`] - I2C register block access
//! - [`dma::DmaEngine`] - descriptor-based DMA collaborator
//! - [`interrupt::InterruptControl`] - interrupt line gating
//! - [`wait::Idle`] - suspend primitive used by blocking calls

#![no_std]
#![deny(unsafe_code)]

pub mod dma;
pub mod i2c;
pub mod interrupt;
pub mod rtc;
pub mod wait;

// Re-export key traits at crate root for convenience
pub use dma::{DmaChannel, DmaDescriptor, DmaEngine};
pub use i2c::I2cRegisters;
pub use interrupt::{InterruptControl, IrqLine};
pub use rtc::RtcRegisters;
pub use wait::Idle;
