#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed DHCP message: {0}")]
    Malformed(String),

    #[error("unsupported DHCP message type: {0}")]
    UnsupportedType(u8),

    #[error("no available IP addresses in pool")]
    PoolExhausted,

    #[error("startup failed: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, Error>;
