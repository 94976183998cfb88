//! I2C bus backends for the display encoder.
//!
//! - [`LinuxI2cBus`]: the kernel's i2c-dev interface (`/dev/i2c-N`)
//! - [`TraceBus`]: no hardware, every transaction is logged

mod i2cdev;
mod trace;

pub use i2cdev::LinuxI2cBus;
pub use trace::TraceBus;

use lcdsrv_protocol::{BusError, I2cBus};

use crate::config::{DisplayBackend, DisplayConfig};

/// Boxed bus used by the daemon binary.
pub type DynBus = Box<dyn I2cBus + Send>;

/// Open the bus selected by the display configuration.
pub fn open(config: &DisplayConfig) -> Result<DynBus, BusError> {
    match config.backend {
        DisplayBackend::I2cdev => {
            let bus = LinuxI2cBus::open(config.bus_path())?;
            Ok(Box::new(bus))
        }
        DisplayBackend::Trace => {
            tracing::warn!("Display backend is 'trace': no hardware will be driven");
            Ok(Box::new(TraceBus::new()))
        }
    }
}
