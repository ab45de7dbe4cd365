pub mod config;
pub mod error;
pub mod lease;
pub mod options;
pub mod packet;
pub mod processor;
pub mod server;

pub use config::{AddressRange, ServerIdentity};
pub use error::{Error, Result};
pub use lease::{Binding, LeaseTable};
pub use options::{MessageType, OptionCode, Options};
pub use packet::DhcpMessage;
pub use processor::{Reply, process};
pub use server::DhcpServer;
