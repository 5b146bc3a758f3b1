//! I2C register block abstraction
//!
//! One controller with independent master and slave engines sharing a pin
//! pair. Both engines are FIFO-based (two bytes deep each direction);
//! status registers combine level-sensitive FIFO-request bits with latched
//! event bits that clear on read.

/// Master control register (MCON) bits.
pub mod mcon {
    /// Master engine enable.
    pub const MASEN: u16 = 1 << 0;
    /// Internal loopback.
    pub const LOOPBACK: u16 = 1 << 2;
    /// Receive FIFO-request interrupt enable.
    pub const IENRX: u16 = 1 << 4;
    /// Transmit FIFO-request interrupt enable.
    pub const IENTX: u16 = 1 << 5;
    /// Arbitration-lost interrupt enable.
    pub const IENALOST: u16 = 1 << 6;
    /// NACK interrupt enable.
    pub const IENNACK: u16 = 1 << 7;
    /// Transaction-complete interrupt enable.
    pub const IENCMP: u16 = 1 << 8;
    /// Receive DMA request enable.
    pub const RXDMA: u16 = 1 << 10;
    /// Transmit DMA request enable.
    pub const TXDMA: u16 = 1 << 11;
}

/// Master status register (MSTA) bits.
pub mod msta {
    /// Transmit FIFO has room (level).
    pub const TXREQ: u16 = 1 << 2;
    /// Receive FIFO has data (level).
    pub const RXREQ: u16 = 1 << 3;
    /// Slave did not acknowledge the address byte (latched).
    pub const NACKADDR: u16 = 1 << 4;
    /// Arbitration lost (latched).
    pub const ALOST: u16 = 1 << 5;
    /// Master engine busy with a transaction.
    pub const BUSY: u16 = 1 << 6;
    /// Slave did not acknowledge a data byte (latched).
    pub const NACKDATA: u16 = 1 << 7;
    /// Transaction complete, stop driven (latched).
    pub const TCOMP: u16 = 1 << 8;
    /// Power-on reset value; writing it to MCON disables the engine.
    pub const RVAL: u16 = 0;
}

/// Slave control register (SCON) bits.
pub mod scon {
    /// Slave engine enable.
    pub const SLVEN: u16 = 1 << 0;
    /// Ten-bit own-address decode enable.
    pub const ADR10EN: u16 = 1 << 1;
    /// General-call decode enable.
    pub const GCEN: u16 = 1 << 2;
    /// Hardware general-call decode enable.
    pub const HGCEN: u16 = 1 << 3;
    /// Clock stretch: hold SCL low, pausing the external master.
    pub const STRETCH: u16 = 1 << 6;
    /// Stop-detected interrupt enable.
    pub const IENSTOP: u16 = 1 << 8;
    /// Receive FIFO-request interrupt enable.
    pub const IENRX: u16 = 1 << 9;
    /// Transmit FIFO-request interrupt enable.
    pub const IENTX: u16 = 1 << 10;
    /// Repeat-start interrupt enable.
    pub const IENREPST: u16 = 1 << 12;
    /// Receive DMA request enable.
    pub const RXDMA: u16 = 1 << 13;
    /// Transmit DMA request enable.
    pub const TXDMA: u16 = 1 << 14;
}

/// Slave status register (SSTA) bits.
pub mod ssta {
    /// Transmit FIFO has room during an addressed read (level).
    pub const TXREQ: u16 = 1 << 2;
    /// Receive FIFO has data (level).
    pub const RXREQ: u16 = 1 << 3;
    /// Slave engine busy with an addressed transaction.
    pub const BUSY: u16 = 1 << 6;
    /// General-call command received (latched).
    pub const GCINT: u16 = 1 << 7;
    /// Stop condition seen while addressed (latched).
    pub const STOP: u16 = 1 << 10;
    /// Repeat-start condition seen while addressed (latched).
    pub const REPSTART: u16 = 1 << 13;
}

/// FIFO status register (FSTA) fields.
pub mod fsta {
    /// Slave TX FIFO fill level, 0-2.
    pub const STX_MASK: u16 = 0x3 << 0;
    pub const STX_OFFSET: u16 = 0;
    /// Slave RX FIFO fill level, 0-2.
    pub const SRX_MASK: u16 = 0x3 << 2;
    pub const SRX_OFFSET: u16 = 2;
    /// Master TX FIFO fill level, 0-2.
    pub const MTX_MASK: u16 = 0x3 << 4;
    pub const MTX_OFFSET: u16 = 4;
    /// Master RX FIFO fill level, 0-2.
    pub const MRX_MASK: u16 = 0x3 << 6;
    pub const MRX_OFFSET: u16 = 6;
    /// Flush the slave TX FIFO while set.
    pub const SFLUSH: u16 = 1 << 8;
    /// Flush the master TX FIFO while set.
    pub const MFLUSH: u16 = 1 << 9;

    /// Fill-level field value meaning two bytes (full).
    pub const LEVEL_FULL: u16 = 2;
}

/// Receive-count register (MRXCNT) encoding.
pub mod mrxcnt {
    /// Exact counts program `n - 1`; counts above this use [`EXTEND`].
    pub const MAX_EXACT: usize = 256;
    /// Extended-read mode: the engine reads until software stops it.
    pub const EXTEND: u16 = 1 << 8;
}

/// I2C register block.
///
/// Status reads take `&mut self` because the latched event bits clear on
/// read, and FIFO data reads pop the FIFO.
pub trait I2cRegisters {
    fn mcon(&self) -> u16;
    fn set_mcon(&mut self, value: u16);

    /// Read master status; latched bits clear.
    fn msta(&mut self) -> u16;

    /// Pop one byte from the master receive FIFO.
    fn mrx(&mut self) -> u8;
    /// Push one byte into the master transmit FIFO.
    fn set_mtx(&mut self, value: u8);

    fn set_mrxcnt(&mut self, value: u16);
    fn set_div(&mut self, value: u16);

    /// First master address byte; writing it launches the start (or
    /// repeat-start) condition.
    fn set_adr0(&mut self, value: u8);
    /// Second master address byte, used for 10-bit addressing; must be
    /// written before ADR0.
    fn set_adr1(&mut self, value: u8);

    fn scon(&self) -> u16;
    fn set_scon(&mut self, value: u16);

    /// Read slave status; latched bits clear.
    fn ssta(&mut self) -> u16;

    /// Pop one byte from the slave receive FIFO.
    fn srx(&mut self) -> u8;
    /// Push one byte into the slave transmit FIFO.
    fn set_stx(&mut self, value: u8);

    /// Own-address registers for the slave engine.
    fn set_id0(&mut self, value: u8);
    fn set_id1(&mut self, value: u8);

    fn fsta(&self) -> u16;
    fn set_fsta(&mut self, value: u16);
}

/// Master TX FIFO fill level from an FSTA value.
pub fn master_tx_level(fsta_value: u16) -> u16 {
    (fsta_value & fsta::MTX_MASK) >> fsta::MTX_OFFSET
}

/// Master RX FIFO fill level from an FSTA value.
pub fn master_rx_level(fsta_value: u16) -> u16 {
    (fsta_value & fsta::MRX_MASK) >> fsta::MRX_OFFSET
}

/// Slave TX FIFO fill level from an FSTA value.
pub fn slave_tx_level(fsta_value: u16) -> u16 {
    (fsta_value & fsta::STX_MASK) >> fsta::STX_OFFSET
}

/// Slave RX FIFO fill level from an FSTA value.
pub fn slave_rx_level(fsta_value: u16) -> u16 {
    (fsta_value & fsta::SRX_MASK) >> fsta::SRX_OFFSET
}
