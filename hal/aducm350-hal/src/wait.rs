//! Suspend primitive for blocking calls
//!
//! A blocking driver call suspends until an interrupt signals completion.
//! On target that is a low-power sleep instruction or an RTOS semaphore
//! pend; on the host it is a hook that advances the simulated hardware.
//! The drivers only require "give the world a chance to make progress,
//! then return so I can re-check my flag".

/// Called once per iteration of every stall and blocking-wait loop.
///
/// Implementations may fail (a semaphore error, or a host-side progress
/// budget running out); the drivers surface that as a wait failure rather
/// than spinning forever on a wedged bus.
pub trait Idle {
    type Error;

    fn idle(&mut self) -> Result<(), Self::Error>;
}
