//! I2C driver
//!
//! One controller, two engines: the master engine launches a transaction
//! by writing the first address register (ADR0) and pumps data through a
//! two-byte FIFO; the slave engine answers an external master against a
//! programmed own-address. The driver owns one transaction at a time and
//! runs it in one of two modes:
//!
//! - PIO: the interrupt entry points pump the FIFOs byte by byte.
//! - DMA: a ping-pong descriptor pair feeds the FIFO; the interrupt entry
//!   points only refill descriptor slots and detect the chain end. DMA
//!   mode requires non-blocking mode.
//!
//! Repeat-start is a one-shot: rewriting ADR0 while a transfer is in
//! flight makes the engine hold the bus at the phase boundary instead of
//! driving a stop, and the next ADR0 write becomes a repeat-start. The
//! driver uses it both for the write-to-read turnaround of an addressed
//! receive and for the caller-requested bus hold between transactions.
//!
//! The interrupt entry points ([`I2c::master_interrupt`],
//! [`I2c::slave_interrupt`], [`I2c::dma_interrupt`]) are plain methods:
//! hardware targets call them from the ISRs, and blocking calls
//! self-service them between [`Idle::idle`] invocations.

pub mod dma;
pub mod transfer;

use core::fmt;

use aducm350_hal::dma::{DescriptorSlot, Direction, DmaChannel, DmaEngine};
use aducm350_hal::i2c::{
    fsta, master_rx_level, master_tx_level, mcon, mrxcnt, msta, scon, slave_tx_level, ssta,
    I2cRegisters,
};
use aducm350_hal::interrupt::{InterruptControl, IrqLine};
use aducm350_hal::wait::Idle;
use heapless::Vec;

use dma::PingPongScheduler;
use transfer::{AddressWindow, DataAddressWidth, Phase, PhaseEvent, RepeatStart};

pub use transfer::DataAddressWidth as AddressWidth;

/// I2C driver errors. `WE` is the suspend primitive's error type, `DE`
/// the DMA engine's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError<WE, DE> {
    /// Out-of-range address, length or rate.
    BadParameter,
    /// Blocking and DMA modes are mutually exclusive, or the call needs
    /// the other mode.
    BadModeCombination,
    /// Master-only call on a slave driver or vice versa.
    WrongRole,
    /// A transaction is still in flight.
    Busy,
    /// A general-call command is latched and unretrieved.
    GeneralCallPending,
    /// The addressed slave did not acknowledge its address.
    NackAddress,
    /// The slave did not acknowledge a data byte.
    NackData,
    /// Bus arbitration was lost to another master.
    ArbitrationLost,
    /// The suspend primitive failed during a blocking wait.
    WaitFailed(WE),
    /// The DMA engine refused a channel operation.
    Dma(DE),
}

/// Events delivered to the registered callback from the interrupt entry
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cEvent {
    MasterTxComplete,
    MasterRxComplete,
    ArbitrationLost,
    NackAddress,
    NackData,
    SlaveTxComplete,
    SlaveRxComplete,
    RepeatStart,
    Stop,
    GeneralCall(u8),
    DmaComplete(DmaChannel),
}

/// Non-blocking transaction status. The slave variants name the terminal
/// bus condition, since a slave transaction ends at whatever the external
/// master does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferStatus {
    Idle,
    InProgress,
    Complete,
    NackAddress,
    NackData,
    ArbitrationLost,
    Stop,
    RepeatStart,
    GeneralCall,
}

/// Terminal condition of a blocking slave transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveOutcome {
    /// The external master drove a stop; the engine is released.
    Stop,
    /// Repeat-start turnaround; the engine is still addressed and the
    /// next slave call serves the new direction.
    RepeatStart,
    /// A general-call command was latched instead of addressed traffic.
    GeneralCall,
}

/// Driver role, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Master,
    Slave,
}

/// Slave address width for both own-address decode and master targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveIdWidth {
    SevenBit,
    TenBit,
}

/// Bus-speed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cConfig {
    pub bus_hz: u32,
}

impl I2cConfig {
    /// Standard mode, 100 kHz.
    pub const STANDARD: I2cConfig = I2cConfig { bus_hz: 100_000 };
    /// Fast mode, 400 kHz. The controller supports nothing faster.
    pub const FAST: I2cConfig = I2cConfig { bus_hz: 400_000 };
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfig::STANDARD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineMode {
    Pio,
    Dma,
}

/// Read phase launched from the TCOMP handler once the addressing phase
/// finishes.
#[derive(Debug, Clone, Copy)]
struct PendingRead {
    len: usize,
    adr0: u8,
    hold_after: bool,
}

/// Peripheral clock feeding the bus-speed divider.
const PCLK_HZ: u32 = 16_000_000;

/// Master control bits common to every transaction.
const COMMON_MBITS: u16 = mcon::MASEN | mcon::IENCMP | mcon::IENNACK | mcon::IENALOST;

/// I2C driver, generic over the register block, DMA engine, interrupt
/// controller and suspend primitive. `N` bounds the driver-owned transfer
/// buffers.
pub struct I2c<R, D, I, W, const N: usize = 256>
where
    R: I2cRegisters,
    D: DmaEngine,
    I: InterruptControl,
    W: Idle,
{
    regs: R,
    dma: D,
    intc: I,
    idle: W,
    role: Role,
    engine: EngineMode,
    blocking: bool,
    id_width: SlaveIdWidth,
    callback: Option<fn(I2cEvent)>,

    phase: Phase,
    repeat_start: RepeatStart,
    window: AddressWindow,
    rewrite_adr0: u8,
    reading: bool,
    tx: Vec<u8, N>,
    tx_pos: usize,
    rx: Vec<u8, N>,
    rx_expected: usize,
    pending_read: Option<PendingRead>,
    complete: bool,
    outcome: TransferStatus,
    dma_complete: bool,
    dma_direction: Direction,
    scheduler: Option<PingPongScheduler>,
    stretch_on_repeat: bool,
    gc_command: Option<u8>,
}

impl<R, D, I, W, const N: usize> I2c<R, D, I, W, N>
where
    R: I2cRegisters,
    D: DmaEngine,
    I: InterruptControl,
    W: Idle,
{
    /// Bring the controller up in master role.
    pub fn master(regs: R, dma: D, intc: I, idle: W) -> Result<Self, I2cError<W::Error, D::Error>> {
        let mut i2c = Self::bare(regs, dma, intc, idle, Role::Master);
        i2c.regs.set_mcon(msta::RVAL);
        i2c.set_bus_speed(I2cConfig::STANDARD)?;
        i2c.intc.enable(IrqLine::I2cMaster);
        Ok(i2c)
    }

    /// Bring the controller up in slave role.
    pub fn slave(regs: R, dma: D, intc: I, idle: W) -> Result<Self, I2cError<W::Error, D::Error>> {
        let mut i2c = Self::bare(regs, dma, intc, idle, Role::Slave);
        i2c.regs.set_scon(0);
        i2c.intc.enable(IrqLine::I2cSlave);
        Ok(i2c)
    }

    fn bare(regs: R, dma: D, intc: I, idle: W, role: Role) -> Self {
        I2c {
            regs,
            dma,
            intc,
            idle,
            role,
            engine: EngineMode::Pio,
            blocking: true,
            id_width: SlaveIdWidth::SevenBit,
            callback: None,
            phase: Phase::Idle,
            repeat_start: RepeatStart::Idle,
            window: AddressWindow::empty(),
            rewrite_adr0: 0,
            reading: false,
            tx: Vec::new(),
            tx_pos: 0,
            rx: Vec::new(),
            rx_expected: 0,
            pending_read: None,
            complete: true,
            outcome: TransferStatus::Idle,
            dma_complete: false,
            dma_direction: Direction::MemoryToFifo,
            scheduler: None,
            stretch_on_repeat: false,
            gc_command: None,
        }
    }

    /// Select 7- or 10-bit addressing for subsequent transactions.
    pub fn set_slave_id_width(&mut self, width: SlaveIdWidth) {
        self.id_width = width;
    }

    /// Program the clock divider for the requested bus rate. Rates above
    /// fast mode are rejected.
    pub fn set_bus_speed(
        &mut self,
        config: I2cConfig,
    ) -> Result<(), I2cError<W::Error, D::Error>> {
        if config.bus_hz == 0 || config.bus_hz > I2cConfig::FAST.bus_hz {
            return Err(I2cError::BadParameter);
        }
        let half_period = PCLK_HZ / (2 * config.bus_hz);
        if half_period < 2 || half_period - 1 > 0xFF {
            return Err(I2cError::BadParameter);
        }
        let high = (half_period - 2) as u16;
        let low = (half_period - 1) as u16;
        self.regs.set_div(high << 8 | low);
        Ok(())
    }

    /// Select blocking or non-blocking calls. Blocking is incompatible
    /// with DMA mode.
    pub fn set_blocking_mode(&mut self, blocking: bool) -> Result<(), I2cError<W::Error, D::Error>> {
        if blocking && self.engine == EngineMode::Dma {
            return Err(I2cError::BadModeCombination);
        }
        self.blocking = blocking;
        Ok(())
    }

    /// Switch the transfer engine between PIO and DMA, claiming or
    /// releasing the role's channels.
    pub fn set_dma_mode(&mut self, enable: bool) -> Result<(), I2cError<W::Error, D::Error>> {
        if enable {
            if self.blocking {
                return Err(I2cError::BadModeCombination);
            }
            if self.engine == EngineMode::Dma {
                return Ok(());
            }
            match self.role {
                Role::Master => {
                    self.dma.init(DmaChannel::I2cMaster).map_err(I2cError::Dma)?;
                    self.intc.enable(IrqLine::DmaI2cMaster);
                }
                Role::Slave => {
                    self.dma.init(DmaChannel::I2cSlaveTx).map_err(I2cError::Dma)?;
                    self.dma.init(DmaChannel::I2cSlaveRx).map_err(I2cError::Dma)?;
                    self.intc.enable(IrqLine::DmaI2cSlaveTx);
                    self.intc.enable(IrqLine::DmaI2cSlaveRx);
                }
            }
            self.engine = EngineMode::Dma;
        } else if self.engine == EngineMode::Dma {
            match self.role {
                Role::Master => {
                    self.dma.uninit(DmaChannel::I2cMaster).map_err(I2cError::Dma)?;
                    self.intc.disable(IrqLine::DmaI2cMaster);
                }
                Role::Slave => {
                    self.dma.uninit(DmaChannel::I2cSlaveTx).map_err(I2cError::Dma)?;
                    self.dma.uninit(DmaChannel::I2cSlaveRx).map_err(I2cError::Dma)?;
                    self.intc.disable(IrqLine::DmaI2cSlaveTx);
                    self.intc.disable(IrqLine::DmaI2cSlaveRx);
                }
            }
            self.engine = EngineMode::Pio;
        }
        Ok(())
    }

    /// Install the event callback.
    pub fn register_callback(&mut self, callback: Option<fn(I2cEvent)>) {
        self.callback = callback;
    }

    /// Poll the current transaction. Only meaningful in non-blocking
    /// mode; blocking calls report their outcome directly.
    pub fn status(&mut self) -> Result<TransferStatus, I2cError<W::Error, D::Error>> {
        if self.blocking {
            return Err(I2cError::BadModeCombination);
        }
        Ok(if self.complete {
            self.outcome
        } else {
            TransferStatus::InProgress
        })
    }

    /// The current DMA descriptor chain has finished.
    pub fn dma_complete(&self) -> bool {
        self.dma_complete
    }

    /// Return and clear the latched general-call command, if any.
    pub fn general_call_command(&mut self) -> Option<u8> {
        self.gc_command.take()
    }

    /// Master transmit: optional data-address window, then the payload.
    ///
    /// With `repeat_start` the bus is held at the end instead of stopped,
    /// and the next transaction begins with a repeat-start. An empty
    /// payload with no window is an address-only probe: start, address
    /// byte, ack or nack, stop. Probes need the PIO engine, since there is
    /// nothing for a descriptor chain to move.
    pub fn master_transmit(
        &mut self,
        id: u16,
        data_address: u32,
        width: DataAddressWidth,
        data: &[u8],
        repeat_start: bool,
    ) -> Result<(), I2cError<W::Error, D::Error>> {
        self.require_role(Role::Master)?;
        self.check_idle()?;
        if data.len() > N {
            return Err(I2cError::BadParameter);
        }
        if data.is_empty() && width == DataAddressWidth::None && self.engine == EngineMode::Dma {
            return Err(I2cError::BadParameter);
        }
        let adr0 = self.encode_master_address(id, false)?;
        self.reset_transaction();
        let _ = self.tx.extend_from_slice(data);
        self.window = AddressWindow::new(data_address, width);
        self.rewrite_adr0 = adr0;
        if repeat_start {
            self.repeat_start.arm();
        }
        self.phase = Phase::Idle.transition(PhaseEvent::Launch {
            window: width != DataAddressWidth::None,
        });
        match self.engine {
            EngineMode::Pio => {
                self.regs.set_fsta(fsta::MFLUSH);
                self.regs.set_mcon(COMMON_MBITS | mcon::IENTX);
                self.pump_master_tx();
                self.regs.set_adr0(adr0);
                if self.blocking {
                    self.wait_master()?;
                }
            }
            EngineMode::Dma => {
                self.start_dma_tx(DmaChannel::I2cMaster, data.len())?;
                self.regs.set_fsta(fsta::MFLUSH);
                self.regs.set_mcon(COMMON_MBITS | mcon::TXDMA);
                self.regs.set_adr0(adr0);
            }
        }
        Ok(())
    }

    /// Blocking master receive into `buf`, with an optional data-address
    /// window sent first as a held write cycle. Returns the byte count.
    pub fn master_receive(
        &mut self,
        id: u16,
        data_address: u32,
        width: DataAddressWidth,
        buf: &mut [u8],
        repeat_start: bool,
    ) -> Result<usize, I2cError<W::Error, D::Error>> {
        if !self.blocking {
            return Err(I2cError::BadModeCombination);
        }
        self.master_receive_begin(id, data_address, width, buf.len(), repeat_start)?;
        self.wait_master()?;
        self.read_received(buf)
    }

    /// Launch a master receive without waiting. Poll with [`I2c::status`]
    /// and collect the bytes with [`I2c::read_received`].
    pub fn master_receive_begin(
        &mut self,
        id: u16,
        data_address: u32,
        width: DataAddressWidth,
        len: usize,
        repeat_start: bool,
    ) -> Result<(), I2cError<W::Error, D::Error>> {
        self.require_role(Role::Master)?;
        self.check_idle()?;
        if len == 0 || len > N {
            return Err(I2cError::BadParameter);
        }
        let read_adr0 = self.encode_master_address(id, true)?;
        self.reset_transaction();
        let next = PendingRead {
            len,
            adr0: read_adr0,
            hold_after: repeat_start,
        };
        if width != DataAddressWidth::None {
            // Addressing phase: a write cycle carrying the window, held
            // open so the data phase turns around with a repeat-start.
            self.window = AddressWindow::new(data_address, width);
            self.rewrite_adr0 = read_adr0;
            self.repeat_start.arm();
            self.pending_read = Some(next);
            self.phase = Phase::Idle.transition(PhaseEvent::Launch { window: true });
            let write_adr0 = read_adr0 & !1;
            match self.engine {
                EngineMode::Pio => {
                    self.regs.set_fsta(fsta::MFLUSH);
                    self.regs.set_mcon(COMMON_MBITS | mcon::IENTX);
                    self.pump_master_tx();
                    self.regs.set_adr0(write_adr0);
                }
                EngineMode::Dma => {
                    self.start_dma_tx(DmaChannel::I2cMaster, 0)?;
                    self.regs.set_fsta(fsta::MFLUSH);
                    self.regs.set_mcon(COMMON_MBITS | mcon::TXDMA);
                    self.regs.set_adr0(write_adr0);
                }
            }
        } else {
            self.phase = Phase::Idle.transition(PhaseEvent::Launch { window: false });
            self.start_read_phase(next);
        }
        Ok(())
    }

    /// Copy out the bytes collected by a completed receive. Returns the
    /// count copied.
    pub fn read_received(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, I2cError<W::Error, D::Error>> {
        if !self.complete {
            return Err(I2cError::Busy);
        }
        self.outcome_result()?;
        let n = self.rx.len().min(buf.len());
        buf[..n].copy_from_slice(&self.rx[..n]);
        Ok(n)
    }

    /// Slave transmit: answer an external master's read of `data`.
    ///
    /// The FIFO is prefilled synchronously before the engine is enabled,
    /// since the hardware raises no TX request until an address match.
    pub fn slave_transmit(
        &mut self,
        id: u16,
        data: &[u8],
    ) -> Result<(), I2cError<W::Error, D::Error>> {
        self.require_role(Role::Slave)?;
        if self.gc_command.is_some() {
            return Err(I2cError::GeneralCallPending);
        }
        self.check_idle()?;
        if data.is_empty() || data.len() > N {
            return Err(I2cError::BadParameter);
        }
        self.program_slave_id(id)?;
        self.reset_transaction();
        let _ = self.tx.extend_from_slice(data);
        let mut con = self.slave_base_con();
        match self.engine {
            EngineMode::Pio => {
                con |= scon::IENTX;
                while slave_tx_level(self.regs.fsta()) < fsta::LEVEL_FULL
                    && self.tx_pos < self.tx.len()
                {
                    let byte = self.tx[self.tx_pos];
                    self.tx_pos += 1;
                    self.regs.set_stx(byte);
                }
            }
            EngineMode::Dma => {
                con |= scon::TXDMA;
                self.start_dma_slave(DmaChannel::I2cSlaveTx, Direction::MemoryToFifo, data.len())?;
            }
        }
        self.regs.set_scon(con);
        if self.blocking {
            self.wait_slave()?;
        }
        Ok(())
    }

    /// Blocking slave receive into `buf`. Returns the terminal bus
    /// condition and the byte count actually received before it: a
    /// combined-format master ends the write half with a repeat-start
    /// rather than a stop, and the caller acts on the distinction.
    ///
    /// With `clock_stretch` the engine stretches SCL on a repeat-start,
    /// pausing the external master until the next slave call releases it.
    pub fn slave_receive(
        &mut self,
        id: u16,
        buf: &mut [u8],
        clock_stretch: bool,
    ) -> Result<(SlaveOutcome, usize), I2cError<W::Error, D::Error>> {
        if !self.blocking {
            return Err(I2cError::BadModeCombination);
        }
        self.slave_receive_begin(id, buf.len(), clock_stretch)?;
        self.wait_slave()?;
        let count = self.read_received(buf)?;
        Ok((self.slave_outcome(), count))
    }

    /// Arm a slave receive without waiting.
    pub fn slave_receive_begin(
        &mut self,
        id: u16,
        len: usize,
        clock_stretch: bool,
    ) -> Result<(), I2cError<W::Error, D::Error>> {
        self.require_role(Role::Slave)?;
        if self.gc_command.is_some() {
            return Err(I2cError::GeneralCallPending);
        }
        self.check_idle()?;
        if len == 0 || len > N {
            return Err(I2cError::BadParameter);
        }
        self.program_slave_id(id)?;
        self.reset_transaction();
        self.rx_expected = len;
        self.stretch_on_repeat = clock_stretch;
        let mut con = self.slave_base_con();
        match self.engine {
            EngineMode::Pio => con |= scon::IENRX,
            EngineMode::Dma => {
                con |= scon::RXDMA;
                self.start_dma_slave(DmaChannel::I2cSlaveRx, Direction::FifoToMemory, len)?;
            }
        }
        self.regs.set_scon(con);
        Ok(())
    }

    /// Master interrupt dispatch; wire to the master vector on target.
    pub fn master_interrupt(&mut self) {
        let status = self.regs.msta();

        if status & msta::NACKDATA != 0 {
            self.master_fault(TransferStatus::NackData, I2cEvent::NackData);
            return;
        }
        if status & msta::NACKADDR != 0 {
            self.master_fault(TransferStatus::NackAddress, I2cEvent::NackAddress);
            return;
        }
        if status & msta::ALOST != 0 {
            self.master_fault(TransferStatus::ArbitrationLost, I2cEvent::ArbitrationLost);
            return;
        }

        if status & msta::TCOMP != 0 {
            if let Some(next) = self.pending_read.take() {
                self.start_read_phase(next);
            } else {
                self.phase = self.phase.transition(PhaseEvent::Finished);
                if !self.complete {
                    self.finish(TransferStatus::Complete);
                    self.emit(if self.reading {
                        I2cEvent::MasterRxComplete
                    } else {
                        I2cEvent::MasterTxComplete
                    });
                }
            }
        }

        // One-shot repeat-start: rewrite the first address register on
        // the first FIFO interrupt of the sequence.
        if status & (msta::TXREQ | msta::RXREQ) != 0 && self.repeat_start.take() {
            self.regs.set_adr0(self.rewrite_adr0);
        }

        if self.engine == EngineMode::Pio {
            if status & msta::TXREQ != 0 && !self.reading {
                self.pump_master_tx();
            }
            if status & msta::RXREQ != 0 && self.reading {
                self.pump_master_rx();
            }
        }
    }

    /// Slave interrupt dispatch; wire to the slave vector on target.
    pub fn slave_interrupt(&mut self) {
        let status = self.regs.ssta();

        if status & ssta::RXREQ != 0 && self.engine == EngineMode::Pio {
            let byte = self.regs.srx();
            if self.rx.len() < self.rx_expected {
                let _ = self.rx.push(byte);
                if self.rx.len() == self.rx_expected {
                    self.emit(I2cEvent::SlaveRxComplete);
                }
            }
        }
        if status & ssta::TXREQ != 0 && self.engine == EngineMode::Pio && self.tx_pos < self.tx.len()
        {
            let byte = self.tx[self.tx_pos];
            self.tx_pos += 1;
            self.regs.set_stx(byte);
            if self.tx_pos == self.tx.len() {
                self.emit(I2cEvent::SlaveTxComplete);
            }
        }
        if status & ssta::REPSTART != 0 {
            // Turnaround: finish this half, optionally stretch the clock,
            // and leave the engine enabled for the re-address.
            if self.stretch_on_repeat {
                let con = self.regs.scon();
                self.regs.set_scon(con | scon::STRETCH);
            }
            self.tx_pos = self.tx.len();
            self.rx_expected = self.rx.len();
            self.finish(TransferStatus::RepeatStart);
            self.emit(I2cEvent::RepeatStart);
        }
        if status & ssta::STOP != 0 {
            self.tx_pos = self.tx.len();
            self.rx_expected = self.rx.len();
            self.regs.set_scon(0);
            self.finish(TransferStatus::Stop);
            self.emit(I2cEvent::Stop);
        }
        if status & ssta::GCINT != 0 {
            // The command byte came through the receive FIFO; route it to
            // the latch, not the receive buffer.
            self.regs.set_scon(0);
            let command = self.regs.srx();
            self.gc_command = Some(command);
            self.finish(TransferStatus::GeneralCall);
            self.emit(I2cEvent::GeneralCall(command));
        }
    }

    /// DMA interrupt dispatch for one of the driver's channels.
    pub fn dma_interrupt(&mut self, channel: DmaChannel) {
        let primary_done = self.dma.slot_done(channel, DescriptorSlot::Primary);
        let alternate_done = self.dma.slot_done(channel, DescriptorSlot::Alternate);

        if primary_done && alternate_done {
            // Both cycle fields read cleared: the chain is finished.
            if self.repeat_start.take() {
                self.regs.set_adr0(self.rewrite_adr0);
            }
            match channel {
                DmaChannel::I2cMaster => {
                    let bit = match self.dma_direction {
                        Direction::MemoryToFifo => mcon::TXDMA,
                        Direction::FifoToMemory => mcon::RXDMA,
                    };
                    let con = self.regs.mcon();
                    self.regs.set_mcon(con & !bit);
                }
                DmaChannel::I2cSlaveTx => {
                    let con = self.regs.scon();
                    self.regs.set_scon(con & !scon::TXDMA);
                }
                DmaChannel::I2cSlaveRx => {
                    let con = self.regs.scon();
                    self.regs.set_scon(con & !scon::RXDMA);
                }
            }
            self.scheduler = None;
            self.dma_complete = true;
            self.emit(I2cEvent::DmaComplete(channel));
        } else if primary_done != alternate_done {
            // One slot idle: refill it with the next chunk, or the stop
            // descriptor once the payload is covered.
            if let Some(scheduler) = &mut self.scheduler {
                let descriptor = scheduler.schedule();
                // The idle slot was consumed by the engine; resubmission
                // cannot collide.
                let _ = self.dma.submit(descriptor);
            }
        }
        // Both slots still active: spurious request, nothing to do.
    }

    /// Tear the driver down and return the collaborators. Refuses while a
    /// transaction is in flight, handing the driver back with the error.
    pub fn release(
        mut self,
    ) -> Result<(R, D, I, W), (Self, I2cError<W::Error, D::Error>)> {
        if !self.complete {
            return Err((self, I2cError::Busy));
        }
        if let Err(e) = self.set_dma_mode(false) {
            return Err((self, e));
        }
        match self.role {
            Role::Master => {
                self.regs.set_mcon(msta::RVAL);
                self.intc.disable(IrqLine::I2cMaster);
            }
            Role::Slave => {
                self.regs.set_scon(0);
                self.intc.disable(IrqLine::I2cSlave);
            }
        }
        Ok((self.regs, self.dma, self.intc, self.idle))
    }

    fn require_role(&self, role: Role) -> Result<(), I2cError<W::Error, D::Error>> {
        if self.role == role {
            Ok(())
        } else {
            Err(I2cError::WrongRole)
        }
    }

    fn check_idle(&self) -> Result<(), I2cError<W::Error, D::Error>> {
        if self.complete {
            Ok(())
        } else {
            Err(I2cError::Busy)
        }
    }

    fn reset_transaction(&mut self) {
        self.tx.clear();
        self.tx_pos = 0;
        self.rx.clear();
        self.rx_expected = 0;
        self.window = AddressWindow::empty();
        self.repeat_start.reset();
        self.pending_read = None;
        self.scheduler = None;
        self.complete = false;
        self.outcome = TransferStatus::InProgress;
        self.dma_complete = false;
        self.reading = false;
        self.phase = Phase::Idle;
    }

    fn finish(&mut self, outcome: TransferStatus) {
        if !self.complete {
            self.complete = true;
            self.outcome = outcome;
        }
    }

    fn outcome_result(&self) -> Result<(), I2cError<W::Error, D::Error>> {
        match self.outcome {
            TransferStatus::NackAddress => Err(I2cError::NackAddress),
            TransferStatus::NackData => Err(I2cError::NackData),
            TransferStatus::ArbitrationLost => Err(I2cError::ArbitrationLost),
            _ => Ok(()),
        }
    }

    fn emit(&self, event: I2cEvent) {
        if let Some(callback) = self.callback {
            callback(event);
        }
    }

    /// First master address byte for `id` in the configured width. In
    /// 10-bit mode the second address register must be programmed before
    /// ADR0, so it is written here.
    fn encode_master_address(
        &mut self,
        id: u16,
        read: bool,
    ) -> Result<u8, I2cError<W::Error, D::Error>> {
        match self.id_width {
            SlaveIdWidth::SevenBit => {
                if id > 0x7F {
                    return Err(I2cError::BadParameter);
                }
                Ok(((id as u8) << 1) | u8::from(read))
            }
            SlaveIdWidth::TenBit => {
                if id > 0x3FF {
                    return Err(I2cError::BadParameter);
                }
                self.regs.set_adr1((id & 0xFF) as u8);
                Ok(0xF0 | (((id & 0x300) >> 7) as u8) | u8::from(read))
            }
        }
    }

    fn program_slave_id(&mut self, id: u16) -> Result<(), I2cError<W::Error, D::Error>> {
        match self.id_width {
            SlaveIdWidth::SevenBit => {
                if id > 0x7F {
                    return Err(I2cError::BadParameter);
                }
                self.regs.set_id0((id as u8) << 1);
            }
            SlaveIdWidth::TenBit => {
                if id > 0x3FF {
                    return Err(I2cError::BadParameter);
                }
                self.regs.set_id0(0x78 | ((id >> 8) as u8));
                self.regs.set_id1(id as u8);
            }
        }
        Ok(())
    }

    fn slave_base_con(&self) -> u16 {
        let mut con = scon::SLVEN | scon::IENSTOP | scon::IENREPST | scon::GCEN;
        if self.id_width == SlaveIdWidth::TenBit {
            con |= scon::ADR10EN;
        }
        con
    }

    /// Stage descriptors for a master or addressing-phase transmit on the
    /// shared channel.
    fn start_dma_tx(
        &mut self,
        channel: DmaChannel,
        data_len: usize,
    ) -> Result<(), I2cError<W::Error, D::Error>> {
        self.dma_direction = Direction::MemoryToFifo;
        let mut staged = [0u8; 4];
        let window_len = self.window.drain_into(&mut staged);
        if window_len > 0 {
            self.phase = self.phase.transition(PhaseEvent::WindowDrained);
        }
        self.dma.reset_slots(channel);
        let mut scheduler =
            PingPongScheduler::new(channel, Direction::MemoryToFifo, window_len, data_len);
        self.dma.submit(scheduler.schedule()).map_err(I2cError::Dma)?;
        self.dma.submit(scheduler.schedule()).map_err(I2cError::Dma)?;
        self.scheduler = Some(scheduler);
        Ok(())
    }

    fn start_dma_slave(
        &mut self,
        channel: DmaChannel,
        direction: Direction,
        len: usize,
    ) -> Result<(), I2cError<W::Error, D::Error>> {
        self.dma_direction = direction;
        self.dma.reset_slots(channel);
        let mut scheduler = PingPongScheduler::new(channel, direction, 0, len);
        self.dma.submit(scheduler.schedule()).map_err(I2cError::Dma)?;
        self.dma.submit(scheduler.schedule()).map_err(I2cError::Dma)?;
        self.scheduler = Some(scheduler);
        Ok(())
    }

    /// Launch the data phase of a receive: program the expected count,
    /// switch the engine to receive and write the read-direction address.
    fn start_read_phase(&mut self, next: PendingRead) {
        self.reading = true;
        self.rx_expected = next.len;
        self.rewrite_adr0 = next.adr0;
        if next.hold_after {
            self.repeat_start.arm();
        }
        if next.len > mrxcnt::MAX_EXACT {
            self.regs.set_mrxcnt(mrxcnt::EXTEND);
        } else {
            self.regs.set_mrxcnt((next.len - 1) as u16);
        }
        match self.engine {
            EngineMode::Pio => {
                self.regs.set_mcon(COMMON_MBITS | mcon::IENRX);
            }
            EngineMode::Dma => {
                // The addressing chain may already have retired; the read
                // phase is a fresh chain on the shared channel.
                self.dma_complete = false;
                self.dma_direction = Direction::FifoToMemory;
                self.dma.reset_slots(DmaChannel::I2cMaster);
                let mut scheduler = PingPongScheduler::new(
                    DmaChannel::I2cMaster,
                    Direction::FifoToMemory,
                    0,
                    next.len,
                );
                // Slots were just reset; these submissions cannot collide.
                let _ = self.dma.submit(scheduler.schedule());
                let _ = self.dma.submit(scheduler.schedule());
                self.scheduler = Some(scheduler);
                self.regs.set_mcon(COMMON_MBITS | mcon::RXDMA);
            }
        }
        self.regs.set_adr0(next.adr0);
    }

    /// Fill the master TX FIFO: window bytes first, then payload. On
    /// exhaustion the TX request is disabled; the transaction itself
    /// completes at TCOMP once the engine drains the FIFO and stops (or
    /// holds the bus).
    fn pump_master_tx(&mut self) {
        while master_tx_level(self.regs.fsta()) < fsta::LEVEL_FULL {
            if let Some(byte) = self.window.next_byte() {
                self.regs.set_mtx(byte);
                if self.window.is_drained() {
                    self.phase = self.phase.transition(PhaseEvent::WindowDrained);
                }
            } else if self.tx_pos < self.tx.len() {
                let byte = self.tx[self.tx_pos];
                self.tx_pos += 1;
                self.regs.set_mtx(byte);
            } else {
                let con = self.regs.mcon();
                if con & mcon::IENTX != 0 {
                    self.regs.set_mcon(con & !mcon::IENTX);
                    self.phase = self.phase.transition(PhaseEvent::PayloadDrained);
                }
                break;
            }
        }
    }

    /// Drain the master RX FIFO. Bytes past the expected count (extended
    /// reads prefetch ahead) are discarded. Disabling the RX request once
    /// the count is met is what stops an extended read.
    fn pump_master_rx(&mut self) {
        while master_rx_level(self.regs.fsta()) > 0 {
            let byte = self.regs.mrx();
            if self.rx.len() < self.rx_expected {
                let _ = self.rx.push(byte);
            }
        }
        if self.rx.len() == self.rx_expected {
            let con = self.regs.mcon();
            if con & mcon::IENRX != 0 {
                self.regs.set_mcon(con & !mcon::IENRX);
                self.phase = self.phase.transition(PhaseEvent::PayloadDrained);
            }
        }
    }

    /// Terminal error path: reset the master engine to its power-on
    /// state, latch the outcome and complete the transaction so any
    /// waiter is released.
    fn master_fault(&mut self, outcome: TransferStatus, event: I2cEvent) {
        self.regs.set_mcon(msta::RVAL);
        self.phase = self.phase.transition(PhaseEvent::Fault);
        self.pending_read = None;
        self.scheduler = None;
        self.repeat_start.reset();
        self.finish(outcome);
        self.emit(event);
    }

    fn wait_master(&mut self) -> Result<(), I2cError<W::Error, D::Error>> {
        while !self.complete {
            self.master_interrupt();
            if self.complete {
                break;
            }
            if let Err(e) = self.idle.idle() {
                self.abandon();
                return Err(I2cError::WaitFailed(e));
            }
        }
        self.outcome_result()
    }

    fn wait_slave(&mut self) -> Result<(), I2cError<W::Error, D::Error>> {
        while !self.complete {
            self.slave_interrupt();
            if self.complete {
                break;
            }
            if let Err(e) = self.idle.idle() {
                self.abandon();
                return Err(I2cError::WaitFailed(e));
            }
        }
        self.outcome_result()
    }

    /// Abandon a blocking wait that can no longer make progress: quiesce
    /// the engine and release the single-flight latch so the driver stays
    /// usable and releasable.
    fn abandon(&mut self) {
        match self.role {
            Role::Master => self.regs.set_mcon(msta::RVAL),
            Role::Slave => self.regs.set_scon(0),
        }
        self.phase = self.phase.transition(PhaseEvent::Fault);
        self.pending_read = None;
        self.scheduler = None;
        self.repeat_start.reset();
        self.finish(TransferStatus::Idle);
    }

    fn slave_outcome(&self) -> SlaveOutcome {
        match self.outcome {
            TransferStatus::RepeatStart => SlaveOutcome::RepeatStart,
            TransferStatus::GeneralCall => SlaveOutcome::GeneralCall,
            _ => SlaveOutcome::Stop,
        }
    }
}

impl<WE: fmt::Debug, DE: fmt::Debug> embedded_hal::i2c::Error for I2cError<WE, DE> {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        match self {
            I2cError::NackAddress => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            I2cError::NackData => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            I2cError::ArbitrationLost => ErrorKind::ArbitrationLoss,
            _ => ErrorKind::Other,
        }
    }
}

impl<R, D, I, W, const N: usize> embedded_hal::i2c::ErrorType for I2c<R, D, I, W, N>
where
    R: I2cRegisters,
    D: DmaEngine,
    I: InterruptControl,
    W: Idle,
    W::Error: fmt::Debug,
    D::Error: fmt::Debug,
{
    type Error = I2cError<W::Error, D::Error>;
}

impl<R, D, I, W, const N: usize> embedded_hal::i2c::I2c for I2c<R, D, I, W, N>
where
    R: I2cRegisters,
    D: DmaEngine,
    I: InterruptControl,
    W: Idle,
    W::Error: fmt::Debug,
    D::Error: fmt::Debug,
{
    /// Adjacent operations of the same type share one bus transaction:
    /// consecutive writes are concatenated behind a single address byte,
    /// consecutive reads drain one programmed receive into the buffers in
    /// order. A direction change re-addresses with a repeat-start; only
    /// the final group drives a stop.
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [embedded_hal::i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        use embedded_hal::i2c::Operation;
        if !self.blocking {
            return Err(I2cError::BadModeCombination);
        }
        let count = operations.len();
        let mut start = 0;
        while start < count {
            let is_read = matches!(operations[start], Operation::Read(_));
            let mut end = start + 1;
            while end < count && matches!(operations[end], Operation::Read(_)) == is_read {
                end += 1;
            }
            let hold = end < count;
            if is_read {
                let total: usize = operations[start..end]
                    .iter()
                    .map(|op| match op {
                        Operation::Read(buffer) => buffer.len(),
                        Operation::Write(_) => 0,
                    })
                    .sum();
                if total > 0 {
                    self.master_receive_begin(
                        u16::from(address),
                        0,
                        DataAddressWidth::None,
                        total,
                        hold,
                    )?;
                    self.wait_master()?;
                    let mut offset = 0;
                    for op in operations[start..end].iter_mut() {
                        if let Operation::Read(buffer) = op {
                            let n = buffer.len();
                            buffer.copy_from_slice(&self.rx[offset..offset + n]);
                            offset += n;
                        }
                    }
                }
            } else {
                let mut bytes: Vec<u8, N> = Vec::new();
                for op in operations[start..end].iter() {
                    if let Operation::Write(chunk) = op {
                        bytes
                            .extend_from_slice(chunk)
                            .map_err(|_| I2cError::BadParameter)?;
                    }
                }
                self.master_transmit(
                    u16::from(address),
                    0,
                    DataAddressWidth::None,
                    &bytes,
                    hold,
                )?;
            }
            start = end;
        }
        Ok(())
    }
}
