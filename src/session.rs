//! Per-request TFTP session.
//!
//! A [`Session`] is created for one inbound request and drives it to the
//! end: option negotiation, the lock-step DATA/ACK loop and error reporting.
//! Every step that expects an answer from the peer goes through
//! [`Session::send_and_await`], which owns the timeout and retransmission
//! policy.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::error::{ErrorCode, TftpError};
use crate::handler::Handler;
use crate::packet::TftpPacket;
use crate::transport::Transport;

/// Parameters a session starts with, before any option negotiation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub block_size: u16,
    pub timeout: Duration,
    /// Total number of times one packet is sent before giving up.
    pub max_attempts: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            block_size: crate::DEF_BLOCK_SIZE,
            timeout: Duration::from_secs(crate::DEF_TIMEOUT_SEC),
            max_attempts: crate::MAX_SEND_ATTEMPTS,
        }
    }
}

/// Result of option negotiation, applied to the session only as a whole.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub block_size: Option<u16>,
    pub timeout: Option<Duration>,
    /// Options echoed back in the OACK, with their clamped values.
    pub accepted: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub blocks: u64,
    pub bytes: u64,
}

/// Validate the requested transfer options.
///
/// `blksize` is clamped to the RFC 2348 range and `timeout` to the RFC 2349
/// range. Unknown options are dropped. A value that is not an integer fails
/// the whole negotiation.
pub fn negotiate(requested: &HashMap<String, String>) -> Result<Negotiated, TftpError> {
    let mut negotiated = Negotiated::default();

    if let Some(value) = requested.get("blksize") {
        let size = parse_option("blksize", value)?.clamp(
            i64::from(crate::MIN_BLOCK_SIZE),
            i64::from(crate::MAX_BLOCK_SIZE),
        ) as u16;
        negotiated.block_size = Some(size);
        negotiated
            .accepted
            .insert("blksize".to_string(), size.to_string());
    }

    if let Some(value) = requested.get("timeout") {
        let secs = parse_option("timeout", value)?
            .clamp(crate::MIN_TIMEOUT_SEC as i64, crate::MAX_TIMEOUT_SEC as i64) as u64;
        negotiated.timeout = Some(Duration::from_secs(secs));
        negotiated
            .accepted
            .insert("timeout".to_string(), secs.to_string());
    }

    Ok(negotiated)
}

fn parse_option(name: &str, value: &str) -> Result<i64, TftpError> {
    value
        .parse()
        .map_err(|e| TftpError::Negotiation(format!("invalid {name} value {value:?}: {e}")))
}

fn ack_validator(block: u16) -> impl Fn(&TftpPacket) -> bool {
    move |pkt| matches!(pkt, TftpPacket::ACK(n) if *n == block)
}

pub struct Session<T, H> {
    transport: T,
    handler: Arc<H>,
    peer: SocketAddr,
    block_size: u16,
    timeout: Duration,
    max_attempts: u8,
}

impl<T: Transport, H: Handler> Session<T, H> {
    pub fn new(transport: T, handler: Arc<H>, peer: SocketAddr, config: &SessionConfig) -> Self {
        Self {
            transport,
            handler,
            peer,
            block_size: config.block_size,
            timeout: config.timeout,
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the exchange started by `request` to completion.
    pub async fn serve(mut self, request: TftpPacket) -> Result<TransferSummary, TftpError> {
        let result = match request {
            TftpPacket::RRQ {
                filename, options, ..
            } => {
                tracing::info!(%filename, ?options, "read request");
                self.serve_rrq(&filename, &options).await
            }
            TftpPacket::WRQ { filename, .. } => {
                tracing::info!(%filename, "write request");
                self.serve_wrq().await
            }
            other => {
                tracing::debug!(packet = ?other, "not a request");
                Err(self.fail(TftpError::IllegalOperation).await)
            }
        };

        match &result {
            Ok(summary) => tracing::info!(
                blocks = summary.blocks,
                bytes = summary.bytes,
                "transfer complete"
            ),
            Err(TftpError::Timeout) => tracing::warn!("peer stopped answering"),
            Err(err) => tracing::warn!(%err, "transfer aborted"),
        }
        result
    }

    pub async fn serve_rrq(
        &mut self,
        filename: &str,
        options: &HashMap<String, String>,
    ) -> Result<TransferSummary, TftpError> {
        let mut reader = match self.handler.read_file(self.peer, filename).await {
            Ok(reader) => reader,
            Err(err) => return Err(self.fail(err.into()).await),
        };

        if !options.is_empty() {
            self.negotiate_options(options).await?;
        }

        self.send_file(&mut reader).await
    }

    /// Uploads are refused.
    pub async fn serve_wrq(&mut self) -> Result<TransferSummary, TftpError> {
        Err(self.fail(TftpError::Unsupported).await)
    }

    /// Send `packet` and wait for a reply accepted by `accept`.
    ///
    /// Replies that are not accepted are dropped while the timer keeps
    /// running. When it expires the same packet is sent again, up to the
    /// configured number of attempts, after which the step fails with
    /// [`TftpError::Timeout`].
    pub async fn send_and_await<F>(
        &mut self,
        packet: &TftpPacket,
        accept: F,
    ) -> Result<TftpPacket, TftpError>
    where
        F: Fn(&TftpPacket) -> bool,
    {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tracing::debug!(attempt, "retransmitting");
            }
            self.transport.write(packet).await?;

            let deadline = Instant::now() + self.timeout;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }

                match self.transport.read(deadline - now).await {
                    Ok(reply) if accept(&reply) => return Ok(reply),
                    // Error packets are never answered, only dropped.
                    Ok(TftpPacket::ERROR { code, msg }) => tracing::debug!(
                        code,
                        kind = ?ErrorCode::from_u16(code),
                        %msg,
                        "ignoring error from peer"
                    ),
                    Ok(reply) => tracing::trace!(?reply, "ignoring unexpected packet"),
                    Err(TftpError::Timeout) => break,
                    Err(err) => return Err(self.fail(err).await),
                }
            }
        }

        Err(TftpError::Timeout)
    }

    async fn negotiate_options(
        &mut self,
        options: &HashMap<String, String>,
    ) -> Result<(), TftpError> {
        let negotiated = match negotiate(options) {
            Ok(negotiated) => negotiated,
            Err(err) => return Err(self.fail(err).await),
        };

        if let Some(size) = negotiated.block_size {
            self.block_size = size;
        }
        if let Some(timeout) = negotiated.timeout {
            self.timeout = timeout;
        }

        // An OACK goes out even when no option was accepted.
        tracing::debug!(accepted = ?negotiated.accepted, "sending OACK");
        let oack = TftpPacket::OACK(negotiated.accepted);
        self.send_and_await(&oack, ack_validator(0)).await?;
        Ok(())
    }

    async fn send_file<R>(&mut self, reader: &mut R) -> Result<TransferSummary, TftpError>
    where
        R: AsyncRead + Unpin,
    {
        let block_size = usize::from(self.block_size);
        let mut buf = vec![0; block_size];
        let mut summary = TransferSummary::default();
        let mut block: u16 = 1;

        loop {
            let n = match read_block(reader, &mut buf).await {
                Ok(n) => n,
                Err(err) => return Err(self.fail(TftpError::Read(err)).await),
            };

            let data = TftpPacket::DATA {
                block,
                data: buf[..n].to_vec(),
            };
            self.send_and_await(&data, ack_validator(block)).await?;
            summary.blocks += 1;
            summary.bytes += n as u64;

            // A short block, possibly empty, ends the transfer.
            if n < block_size {
                return Ok(summary);
            }
            block = block.wrapping_add(1);
        }
    }

    /// Report `err` to the peer once and hand it back.
    async fn fail(&mut self, err: TftpError) -> TftpError {
        let packet = TftpPacket::error(err.error_code(), &err);
        if let Err(write_err) = self.transport.write(&packet).await {
            tracing::debug!(%write_err, "could not deliver error packet");
        }
        err
    }
}

/// Read until `buf` is full or the stream ends.
async fn read_block<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn blksize_is_clamped() {
        for (requested, expected) in [
            ("0", 8),
            ("-5", 8),
            ("8", 8),
            ("1428", 1428),
            ("65464", 65464),
            ("65465", 65464),
            ("4000000", 65464),
        ] {
            let negotiated = negotiate(&opts(&[("blksize", requested)])).unwrap();
            assert_eq!(negotiated.block_size, Some(expected), "blksize {requested}");
            assert_eq!(negotiated.accepted["blksize"], expected.to_string());
        }
    }

    #[test]
    fn timeout_is_clamped() {
        for (requested, expected) in [("0", 1), ("1", 1), ("7", 7), ("255", 255), ("256", 255)] {
            let negotiated = negotiate(&opts(&[("timeout", requested)])).unwrap();
            assert_eq!(negotiated.timeout, Some(Duration::from_secs(expected)));
            assert_eq!(negotiated.accepted["timeout"], expected.to_string());
        }
    }

    #[test]
    fn unknown_options_are_dropped() {
        let negotiated = negotiate(&opts(&[("tsize", "0"), ("windowsize", "8")])).unwrap();
        assert_eq!(negotiated, Negotiated::default());
    }

    #[test]
    fn non_numeric_values_fail() {
        for requested in [
            opts(&[("blksize", "big")]),
            opts(&[("timeout", "")]),
            opts(&[("blksize", "1024"), ("timeout", "soon")]),
        ] {
            let err = negotiate(&requested).unwrap_err();
            assert!(matches!(err, TftpError::Negotiation(_)));
            assert_eq!(err.error_code(), ErrorCode::OptionNegotiation);
        }
    }

    #[tokio::test]
    async fn read_block_joins_short_reads() {
        let (mut tx, mut rx) = tokio::io::duplex(4);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(b"abcdefghij").await.unwrap();
        });

        let mut buf = [0u8; 8];
        assert_eq!(read_block(&mut rx, &mut buf).await.unwrap(), 8);
        assert_eq!(&buf, b"abcdefgh");
        assert_eq!(read_block(&mut rx, &mut buf).await.unwrap(), 2);
        assert_eq!(read_block(&mut rx, &mut buf).await.unwrap(), 0);
    }
}
