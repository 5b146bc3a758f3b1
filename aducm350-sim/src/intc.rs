//! Simulated interrupt controller

use std::cell::RefCell;
use std::rc::Rc;

use aducm350_hal::interrupt::{InterruptControl, IrqLine};

fn index(line: IrqLine) -> usize {
    match line {
        IrqLine::Rtc => 0,
        IrqLine::I2cMaster => 1,
        IrqLine::I2cSlave => 2,
        IrqLine::DmaI2cMaster => 3,
        IrqLine::DmaI2cSlaveTx => 4,
        IrqLine::DmaI2cSlaveRx => 5,
    }
}

/// Records which interrupt lines are enabled. Cloning shares the state, so
/// a test can keep a handle while the driver owns another.
#[derive(Clone, Default)]
pub struct SimIntc {
    enabled: Rc<RefCell<[bool; 6]>>,
}

impl SimIntc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InterruptControl for SimIntc {
    fn enable(&mut self, line: IrqLine) {
        self.enabled.borrow_mut()[index(line)] = true;
    }

    fn disable(&mut self, line: IrqLine) {
        self.enabled.borrow_mut()[index(line)] = false;
    }

    fn is_enabled(&self, line: IrqLine) -> bool {
        self.enabled.borrow()[index(line)]
    }
}
