//! # lcdsrv Daemon Library
//!
//! Network gateway for an HD44780-compatible character LCD wired through an
//! MCP23008 I2C port expander. Clients on TCP or a Unix socket send
//! CR LF terminated text lines; each line becomes a display operation that
//! is written to the bus before the next one is processed.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    Multiplexer (1 task)                   │
//! │                                                           │
//! │  ┌────────────┐   ┌────────────────┐   ┌───────────────┐  │
//! │  │  Listener  │──▶│ Session × N    │──▶│ DisplayEncoder│  │
//! │  │ TCP / Unix │   │ LineBuffer     │   │  + I2C bus    │  │
//! │  └────────────┘   └────────────────┘   └───────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lcdsrv::gateway::{Listener, Multiplexer};
//! use lcdsrv::{bus, Config, DisplayEncoder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(lcdsrv::config::default_config_path())?;
//!
//!     let mut display = DisplayEncoder::new(bus::open(&config.display)?, config.display.address);
//!     display.initialize()?;
//!
//!     let listener = Listener::bind(&config.listen).await?;
//!     let mut gateway = Multiplexer::new(listener, display, config.listen.max_clients);
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, validation and defaults
//! - [`bus`]: I2C bus backends
//! - [`gateway`]: Listener, client sessions and the event loop
//! - [`logging`]: Tracing subscriber setup
//! - [`pidfile`]: Single-instance PID file
//! - [`systemd`]: sd_notify readiness reporting

pub mod bus;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod pidfile;
pub mod systemd;

// Re-export protocol for convenience
pub use lcdsrv_protocol;
pub use lcdsrv_protocol::{BusError, Command, DisplayEncoder, I2cBus, LineBuffer};

pub use config::{Config, ConfigError, ListenMode};
pub use gateway::{GatewayError, Listener, Multiplexer};
pub use pidfile::{PidFile, PidFileError};
