//! Writer implementations (spec.md §4.1). Each submits a
//! `WriterDescription` to the component registry at load time via
//! `inventory::submit!`; importing this module (transitively, from
//! `lib.rs`) is what makes the `inventory::submit!` calls run.

mod cached_data_server;
mod composed;
mod database;
mod email;
mod logfile;
mod logger_manager_writer;
mod socket;
mod text;

pub use cached_data_server::CachedDataWriterConfig;
pub use composed::ComposedWriterConfig;
pub use database::DatabaseWriterConfig;
pub use email::EmailWriterConfig;
pub use logfile::LogfileWriterConfig;
pub use logger_manager_writer::LoggerManagerWriterConfig;
pub use socket::{TcpWriterConfig, UdpWriterConfig};
pub use text::TextWriterConfig;
