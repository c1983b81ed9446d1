mod cli;
mod error;
mod handler;
mod packet;
mod session;
mod transport;

pub use crate::cli::Cli;
pub use crate::error::{BackendError, ErrorCode, TftpError};
pub use crate::handler::{FsHandler, Handler};
pub use crate::packet::TftpPacket;
pub use crate::session::{negotiate, Negotiated, Session, SessionConfig, TransferSummary};
pub use crate::transport::{Transport, UdpTransport};

pub const DEF_BLOCK_SIZE: u16 = 512; // RFC 1350
pub const MIN_BLOCK_SIZE: u16 = 8; // RFC 2348
pub const MAX_BLOCK_SIZE: u16 = 65464; // RFC 2348

/// Receive buffer size: a full DATA packet at the largest block size.
pub const MAX_DATAGRAM_SIZE: usize = MAX_BLOCK_SIZE as usize + 4;

pub const DEF_TIMEOUT_SEC: u64 = 3;
pub const MIN_TIMEOUT_SEC: u64 = 1; // RFC 2349
pub const MAX_TIMEOUT_SEC: u64 = 255; // RFC 2349

/// Total sends of one packet before a step gives up.
pub const MAX_SEND_ATTEMPTS: u8 = 3;
