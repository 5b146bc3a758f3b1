//! Simulated I2C controller and bus
//!
//! Models the master and slave engines of the controller plus just enough
//! of the bus to test the driver: an external slave peer that acknowledges
//! (or refuses) master transactions, and a scripted external master that
//! drives the slave engine. Every bus-level condition is appended to a
//! trace the scenario tests assert against.
//!
//! Controller quirks carried over from the real part:
//! - Writing ADR0 while the engine is idle launches a start condition;
//!   writing it while a transaction is in flight arms a bus hold, so the
//!   phase ends without a stop and the next ADR0 write becomes a
//!   repeat-start. This is the target of the driver's one-shot
//!   repeat-start rewrite.
//! - FIFOs are two bytes deep. A master write phase ends when the TX FIFO
//!   underruns; a read phase ends when the programmed count is exhausted
//!   and the RX FIFO has been drained.
//! - Latched status bits clear on read; the FIFO-request bits are levels.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use aducm350_hal::i2c::{mcon, mrxcnt, msta, scon, ssta, I2cRegisters};
use aducm350_hal::wait::Idle;

use crate::WaitExpired;

/// One observable bus condition. `Start`/`RepeatStart` carry the raw
/// address byte (address shifted left, read bit in bit 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start { address: u8 },
    RepeatStart { address: u8 },
    Write(u8),
    Read(u8),
    Stop,
    GeneralCall(u8),
}

/// External slave peer for master-mode tests.
#[derive(Debug, Clone, Default)]
pub struct ExternalSlave {
    pub address: u16,
    pub ten_bit: bool,
    /// Acknowledge the address byte. When false every transaction NACKs.
    pub ack_address: bool,
    /// NACK the (n+1)-th written byte, accepting the first n.
    pub nack_data_after: Option<usize>,
    /// Bytes returned to master reads, then 0xFF when exhausted.
    pub response: Vec<u8>,
}

impl ExternalSlave {
    pub fn acking(address: u16) -> Self {
        ExternalSlave {
            address,
            ack_address: true,
            ..Default::default()
        }
    }
}

/// One action of the scripted external master used in slave-mode tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterOp {
    Start { address: u16, read: bool },
    WriteByte(u8),
    ReadByte,
    RepeatStart { address: u16, read: bool },
    Stop,
    GeneralCall(u8),
}

struct MasterXfer {
    read: bool,
    /// Reads left to perform; `None` in extended mode.
    remaining: Option<usize>,
}

struct SlaveSession {
    read: bool,
}

struct I2cModel {
    // Master engine.
    mcon: u16,
    mrxcnt: u16,
    div: u16,
    adr1: u8,
    mtx: VecDeque<u8>,
    mrx: VecDeque<u8>,
    msta_latch: u16,
    master: Option<MasterXfer>,
    bus_held: bool,
    hold_pending: bool,
    /// ADR0 rewrites issued while a transfer was in flight.
    midstream_rewrites: usize,
    peer: Option<ExternalSlave>,
    peer_read_pos: usize,
    peer_write_count: usize,
    peer_received: Vec<u8>,

    // Slave engine.
    scon: u16,
    id0: u8,
    id1: u8,
    stx: VecDeque<u8>,
    srx: VecDeque<u8>,
    ssta_latch: u16,
    session: Option<SlaveSession>,
    script: VecDeque<MasterOp>,

    trace: Vec<BusEvent>,
}

impl I2cModel {
    fn new() -> Self {
        I2cModel {
            mcon: 0,
            mrxcnt: 0,
            div: 0,
            adr1: 0,
            mtx: VecDeque::new(),
            mrx: VecDeque::new(),
            msta_latch: 0,
            master: None,
            bus_held: false,
            hold_pending: false,
            midstream_rewrites: 0,
            peer: None,
            peer_read_pos: 0,
            peer_write_count: 0,
            peer_received: Vec::new(),
            scon: 0,
            id0: 0,
            id1: 0,
            stx: VecDeque::new(),
            srx: VecDeque::new(),
            ssta_latch: 0,
            session: None,
            script: VecDeque::new(),
            trace: Vec::new(),
        }
    }

    fn launch_master(&mut self, adr0: u8) {
        if self.master.is_some() {
            // Mid-transfer rewrite: arm the bus hold instead of starting.
            self.hold_pending = true;
            self.midstream_rewrites += 1;
            return;
        }
        let event = if self.bus_held {
            BusEvent::RepeatStart { address: adr0 }
        } else {
            BusEvent::Start { address: adr0 }
        };
        self.trace.push(event);
        self.bus_held = false;

        let read = adr0 & 1 != 0;
        let acked = match &self.peer {
            Some(peer) if peer.ack_address => {
                let target = if peer.ten_bit {
                    (u16::from(adr0 >> 1) & 0x3) << 8 | u16::from(self.adr1)
                } else {
                    u16::from(adr0 >> 1)
                };
                target == peer.address
            }
            _ => false,
        };
        if !acked {
            self.msta_latch |= msta::NACKADDR;
            self.trace.push(BusEvent::Stop);
            return;
        }
        let remaining = if read {
            if self.mrxcnt & mrxcnt::EXTEND != 0 {
                None
            } else {
                Some(usize::from(self.mrxcnt & 0xFF) + 1)
            }
        } else {
            None
        };
        self.master = Some(MasterXfer { read, remaining });
    }

    fn end_master_phase(&mut self) {
        if self.hold_pending {
            self.bus_held = true;
            self.hold_pending = false;
        } else {
            self.trace.push(BusEvent::Stop);
        }
        self.msta_latch |= msta::TCOMP;
        self.master = None;
    }

    fn tick_master(&mut self) {
        let Some(xfer) = &mut self.master else {
            return;
        };
        if self.mcon & (mcon::TXDMA | mcon::RXDMA) != 0 {
            // DMA owns the byte pump. Transmit parks until the driver
            // clears the request bit; receive streams straight through the
            // FIFO at full rate and ends the phase when the count runs out.
            if xfer.read && self.mcon & mcon::RXDMA != 0 {
                if xfer.remaining == Some(0) {
                    self.end_master_phase();
                    return;
                }
                let byte = self
                    .peer
                    .as_ref()
                    .and_then(|p| p.response.get(self.peer_read_pos).copied())
                    .unwrap_or(0xFF);
                self.peer_read_pos += 1;
                if let Some(n) = &mut xfer.remaining {
                    *n -= 1;
                }
                self.trace.push(BusEvent::Read(byte));
            }
            return;
        }
        if xfer.read {
            let exhausted = xfer.remaining == Some(0)
                || (xfer.remaining.is_none() && self.mcon & mcon::IENRX == 0);
            if exhausted {
                if self.mrx.is_empty() {
                    self.end_master_phase();
                }
                return;
            }
            if self.mrx.len() < 2 {
                let byte = self
                    .peer
                    .as_ref()
                    .and_then(|p| p.response.get(self.peer_read_pos).copied())
                    .unwrap_or(0xFF);
                self.peer_read_pos += 1;
                if let Some(n) = &mut xfer.remaining {
                    *n -= 1;
                }
                self.mrx.push_back(byte);
                self.trace.push(BusEvent::Read(byte));
            }
        } else if let Some(byte) = self.mtx.pop_front() {
            self.peer_write_count += 1;
            let nacked = self
                .peer
                .as_ref()
                .and_then(|p| p.nack_data_after)
                .is_some_and(|n| self.peer_write_count > n);
            self.trace.push(BusEvent::Write(byte));
            if nacked {
                self.msta_latch |= msta::NACKDATA;
                self.trace.push(BusEvent::Stop);
                self.master = None;
                return;
            }
            self.peer_received.push(byte);
        } else {
            // TX underrun: an empty FIFO ends the write phase, address-only
            // probes included.
            self.end_master_phase();
        }
    }

    fn own_address_matches(&self, address: u16) -> bool {
        if self.scon & scon::SLVEN == 0 {
            return false;
        }
        if self.scon & scon::ADR10EN != 0 {
            (u16::from(self.id0) & 0x3) << 8 | u16::from(self.id1) == address
        } else {
            u16::from(self.id0 >> 1) == address
        }
    }

    fn tick_slave(&mut self) {
        let Some(op) = self.script.front().copied() else {
            return;
        };
        match op {
            MasterOp::Start { address, read } => {
                self.trace.push(BusEvent::Start {
                    address: ((address as u8) << 1) | u8::from(read),
                });
                if self.own_address_matches(address) {
                    self.session = Some(SlaveSession { read });
                }
            }
            MasterOp::WriteByte(byte) => {
                match &self.session {
                    Some(s) if !s.read => {
                        if self.srx.len() >= 2 {
                            // FIFO full: the slave stretches the clock
                            // until the driver drains it.
                            return;
                        }
                        self.srx.push_back(byte);
                        self.trace.push(BusEvent::Write(byte));
                    }
                    _ => {}
                }
            }
            MasterOp::ReadByte => match &self.session {
                Some(s) if s.read => {
                    if self.scon & scon::STRETCH != 0 {
                        return;
                    }
                    let Some(byte) = self.stx.pop_front() else {
                        return;
                    };
                    self.trace.push(BusEvent::Read(byte));
                }
                _ => {}
            },
            MasterOp::RepeatStart { address, read } => {
                self.trace.push(BusEvent::RepeatStart {
                    address: ((address as u8) << 1) | u8::from(read),
                });
                self.ssta_latch |= ssta::REPSTART;
                self.session = if self.own_address_matches(address) {
                    Some(SlaveSession { read })
                } else {
                    None
                };
            }
            MasterOp::Stop => {
                self.trace.push(BusEvent::Stop);
                self.ssta_latch |= ssta::STOP;
                self.session = None;
            }
            MasterOp::GeneralCall(command) => {
                self.trace.push(BusEvent::GeneralCall(command));
                if self.scon & scon::GCEN != 0 {
                    self.ssta_latch |= ssta::GCINT;
                    self.srx.push_back(command);
                }
            }
        }
        self.script.pop_front();
    }

    fn tick(&mut self) {
        self.tick_master();
        self.tick_slave();
    }

    fn fifo_level(q: &VecDeque<u8>) -> u16 {
        q.len().min(2) as u16
    }
}

/// Simulated I2C controller. Clone handles out of it for the driver; keep
/// it around to script the bus and read the trace.
pub struct SimI2c {
    inner: Rc<RefCell<I2cModel>>,
}

impl SimI2c {
    pub fn new() -> Self {
        SimI2c {
            inner: Rc::new(RefCell::new(I2cModel::new())),
        }
    }

    pub fn registers(&self) -> SimI2cRegisters {
        SimI2cRegisters {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Idle handle for the driver; fails after `budget` ticks.
    pub fn idle(&self, budget: u32) -> SimI2cIdle {
        SimI2cIdle {
            inner: Rc::clone(&self.inner),
            remaining: budget,
        }
    }

    /// Connect the external slave the master engine talks to.
    pub fn attach_slave(&self, peer: ExternalSlave) {
        self.inner.borrow_mut().peer = Some(peer);
    }

    /// Queue external-master bus actions for slave-mode tests.
    pub fn run_script(&self, ops: impl IntoIterator<Item = MasterOp>) {
        self.inner.borrow_mut().script.extend(ops);
    }

    pub fn tick(&self) {
        self.inner.borrow_mut().tick();
    }

    pub fn tick_n(&self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn trace(&self) -> Vec<BusEvent> {
        self.inner.borrow().trace.clone()
    }

    /// Bytes the external slave peer has accepted.
    pub fn received_by_peer(&self) -> Vec<u8> {
        self.inner.borrow().peer_received.clone()
    }

    /// ADR0 rewrites issued while a transfer was already in flight (the
    /// one-shot repeat-start mechanism).
    pub fn midstream_address_rewrites(&self) -> usize {
        self.inner.borrow().midstream_rewrites
    }

    /// Latch an arbitration loss into the master engine.
    pub fn inject_arbitration_lost(&self) {
        let mut m = self.inner.borrow_mut();
        m.msta_latch |= msta::ALOST;
        m.master = None;
    }

    pub fn scon(&self) -> u16 {
        self.inner.borrow().scon
    }

    /// Last value programmed into the receive-count register.
    pub fn mrxcnt(&self) -> u16 {
        self.inner.borrow().mrxcnt
    }

    /// Last value programmed into the clock-divider register.
    pub fn div(&self) -> u16 {
        self.inner.borrow().div
    }

    pub fn script_exhausted(&self) -> bool {
        self.inner.borrow().script.is_empty()
    }
}

impl Default for SimI2c {
    fn default() -> Self {
        Self::new()
    }
}

/// [`I2cRegisters`] implementation over the shared model.
pub struct SimI2cRegisters {
    inner: Rc<RefCell<I2cModel>>,
}

impl I2cRegisters for SimI2cRegisters {
    fn mcon(&self) -> u16 {
        self.inner.borrow().mcon
    }

    fn set_mcon(&mut self, value: u16) {
        self.inner.borrow_mut().mcon = value;
    }

    fn msta(&mut self) -> u16 {
        let mut m = self.inner.borrow_mut();
        let mut v = m.msta_latch;
        m.msta_latch = 0;
        if let Some(xfer) = &m.master {
            v |= msta::BUSY;
            if !xfer.read && m.mtx.len() < 2 {
                v |= msta::TXREQ;
            }
        }
        if !m.mrx.is_empty() {
            v |= msta::RXREQ;
        }
        v
    }

    fn mrx(&mut self) -> u8 {
        self.inner.borrow_mut().mrx.pop_front().unwrap_or(0)
    }

    fn set_mtx(&mut self, value: u8) {
        let mut m = self.inner.borrow_mut();
        if m.mtx.len() < 2 {
            m.mtx.push_back(value);
        }
    }

    fn set_mrxcnt(&mut self, value: u16) {
        self.inner.borrow_mut().mrxcnt = value;
    }

    fn set_div(&mut self, value: u16) {
        self.inner.borrow_mut().div = value;
    }

    fn set_adr0(&mut self, value: u8) {
        self.inner.borrow_mut().launch_master(value);
    }

    fn set_adr1(&mut self, value: u8) {
        self.inner.borrow_mut().adr1 = value;
    }

    fn scon(&self) -> u16 {
        self.inner.borrow().scon
    }

    fn set_scon(&mut self, value: u16) {
        self.inner.borrow_mut().scon = value;
    }

    fn ssta(&mut self) -> u16 {
        let mut m = self.inner.borrow_mut();
        let mut v = m.ssta_latch;
        m.ssta_latch = 0;
        if m.session.is_some() {
            v |= ssta::BUSY;
        }
        if let Some(s) = &m.session {
            if s.read && m.stx.len() < 2 && m.scon & scon::SLVEN != 0 {
                v |= ssta::TXREQ;
            }
        }
        // A pending general-call latch routes the FIFO byte to the
        // general-call handler, not the receive pump.
        if !m.srx.is_empty() && v & ssta::GCINT == 0 {
            v |= ssta::RXREQ;
        }
        v
    }

    fn srx(&mut self) -> u8 {
        self.inner.borrow_mut().srx.pop_front().unwrap_or(0)
    }

    fn set_stx(&mut self, value: u8) {
        let mut m = self.inner.borrow_mut();
        if m.stx.len() < 2 {
            m.stx.push_back(value);
        }
    }

    fn set_id0(&mut self, value: u8) {
        self.inner.borrow_mut().id0 = value;
    }

    fn set_id1(&mut self, value: u8) {
        self.inner.borrow_mut().id1 = value;
    }

    fn fsta(&self) -> u16 {
        use aducm350_hal::i2c::fsta;
        let m = self.inner.borrow();
        I2cModel::fifo_level(&m.stx) << fsta::STX_OFFSET
            | I2cModel::fifo_level(&m.srx) << fsta::SRX_OFFSET
            | I2cModel::fifo_level(&m.mtx) << fsta::MTX_OFFSET
            | I2cModel::fifo_level(&m.mrx) << fsta::MRX_OFFSET
    }

    fn set_fsta(&mut self, value: u16) {
        use aducm350_hal::i2c::fsta;
        let mut m = self.inner.borrow_mut();
        if value & fsta::MFLUSH != 0 {
            m.mtx.clear();
        }
        if value & fsta::SFLUSH != 0 {
            m.stx.clear();
        }
    }
}

/// Ticks the I2C model once per call until the budget runs out.
pub struct SimI2cIdle {
    inner: Rc<RefCell<I2cModel>>,
    remaining: u32,
}

impl Idle for SimI2cIdle {
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
