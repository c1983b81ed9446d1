use anstyle::AnsiColor;
use clap::builder::styling::Styles;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionConfig;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Cyan.on_default())
    .placeholder(AnsiColor::Red.on_default());

#[derive(Parser, Debug)]
#[command(name = "tftpd")]
#[command(about = "A read-only TFTP server", long_about = None)]
#[command(styles = STYLES)]
pub struct Cli {
    /// Listen ip
    #[arg(short, long, default_value = "0.0.0.0")]
    pub ip: IpAddr,

    /// Listen port
    #[arg(short, long, default_value_t = 69)]
    pub port: u16,

    /// Directory files are served from
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,

    /// Timeout (s) until a packet is sent again, unless negotiated
    #[arg(short, long, default_value_t = crate::DEF_TIMEOUT_SEC,
          value_parser = clap::value_parser!(u64).range(1..=255))]
    pub timeout: u64,

    /// Times a packet is sent before the transfer is abandoned
    #[arg(short, long, default_value_t = crate::MAX_SEND_ATTEMPTS,
          value_parser = clap::value_parser!(u8).range(1..))]
    pub retry: u8,

    /// Block size used when the client does not negotiate one
    #[arg(short, long, default_value_t = crate::DEF_BLOCK_SIZE,
          value_parser = clap::value_parser!(u16).range(8..=65464))]
    pub blksize: u16,
}

impl Cli {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            block_size: self.blksize,
            timeout: Duration::from_secs(self.timeout),
            max_attempts: self.retry,
        }
    }
}
