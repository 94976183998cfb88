use lcdsrv_protocol::{BusError, I2cBus};

/// Bus that drives no hardware and logs every transaction.
///
/// Selected with `--dry-run` or `backend = "trace"`, for running the gateway
/// on machines without the display attached.
#[derive(Debug, Default)]
pub struct TraceBus {
    transactions: u64,
    bytes: u64,
}

impl TraceBus {
    /// Create an idle trace bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions seen so far.
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Number of payload bytes seen so far, register bytes excluded.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl I2cBus for TraceBus {
    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<(), BusError> {
        self.transactions += 1;
        self.bytes += 1;
        tracing::debug!(
            address = %format!("{address:#04x}"),
            register = %format!("{register:#04x}"),
            value = %format!("{value:#04x}"),
            "I2C register write"
        );
        Ok(())
    }

    fn write_burst(&mut self, address: u8, register: u8, words: &[u8]) -> Result<(), BusError> {
        self.transactions += 1;
        self.bytes += words.len() as u64;
        tracing::trace!(
            address = %format!("{address:#04x}"),
            register = %format!("{register:#04x}"),
            len = words.len(),
            words = %hex::encode(words),
            "I2C burst"
        );
        Ok(())
    }
}
