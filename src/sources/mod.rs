//! Reader implementations (spec.md §4.1). Each submits a
//! `ReaderDescription` to the component registry at load time via
//! `inventory::submit!`; importing this module (transitively, from
//! `lib.rs`) is what makes the `inventory::submit!` calls run.

mod composed;
mod database;
mod logfile;
mod polling;
mod serial;
mod socket;
mod text_file;
mod timeout;

pub use composed::ComposedReaderConfig;
pub use database::DatabaseReaderConfig;
pub use logfile::LogfileReaderConfig;
pub use polling::PollingReaderConfig;
pub use serial::SerialReaderConfig;
pub use socket::{TcpMode, TcpReaderConfig, UdpReaderConfig};
pub use text_file::TextFileReaderConfig;
pub use timeout::TimeoutReaderConfig;
