pub mod config;
pub mod demo;
pub mod error;
pub mod log_line;
pub mod poller;
pub mod session;
pub mod tail;

pub use config::{DemoConfig, OpenClawConfig};
pub use demo::DemoTicker;
pub use error::SourceError;
pub use log_line::{LogSignal, classify_line};
pub use poller::{SessionIndex, SessionPoller};
pub use tail::LogTail;
