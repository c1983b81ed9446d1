use std::collections::HashMap;
use std::str;

use crate::error::{ErrorCode, TftpError};

const OP_RRQ: u16 = 1;
const OP_WRQ: u16 = 2;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;
const OP_OACK: u16 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum TftpPacket {
    RRQ {
        filename: String,
        mode: String,
        options: HashMap<String, String>,
    },
    WRQ {
        filename: String,
        mode: String,
        options: HashMap<String, String>,
    },
    DATA {
        block: u16,
        data: Vec<u8>,
    },
    ACK(u16),
    ERROR {
        code: u16,
        msg: String,
    },
    OACK(HashMap<String, String>),
}

impl TftpPacket {
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len_hint());

        match self {
            TftpPacket::RRQ {
                filename,
                mode,
                options,
            } => {
                bytes.extend_from_slice(&OP_RRQ.to_be_bytes());
                put_request(&mut bytes, filename, mode, options);
            }
            TftpPacket::WRQ {
                filename,
                mode,
                options,
            } => {
                bytes.extend_from_slice(&OP_WRQ.to_be_bytes());
                put_request(&mut bytes, filename, mode, options);
            }
            TftpPacket::DATA { block, data } => {
                bytes.extend_from_slice(&OP_DATA.to_be_bytes());
                bytes.extend_from_slice(&block.to_be_bytes());
                bytes.extend_from_slice(data);
            }
            TftpPacket::ACK(block) => {
                bytes.extend_from_slice(&OP_ACK.to_be_bytes());
                bytes.extend_from_slice(&block.to_be_bytes());
            }
            TftpPacket::ERROR { code, msg } => {
                bytes.extend_from_slice(&OP_ERROR.to_be_bytes());
                bytes.extend_from_slice(&code.to_be_bytes());
                put_cstr(&mut bytes, msg);
            }
            TftpPacket::OACK(options) => {
                bytes.extend_from_slice(&OP_OACK.to_be_bytes());
                put_options(&mut bytes, options);
            }
        }
        bytes
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, TftpError> {
        if buf.len() < 2 {
            return Err(malformed("packet length too short"));
        }

        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let body = &buf[2..];
        let pkt = match opcode {
            OP_RRQ | OP_WRQ => {
                let (filename, rest) = read_cstr(body)?;
                let (mode, rest) = read_cstr(rest)?;
                let options = read_options(rest)?;
                if opcode == OP_RRQ {
                    TftpPacket::RRQ {
                        filename,
                        mode: mode.to_ascii_lowercase(),
                        options,
                    }
                } else {
                    TftpPacket::WRQ {
                        filename,
                        mode: mode.to_ascii_lowercase(),
                        options,
                    }
                }
            }
            OP_DATA => TftpPacket::DATA {
                block: read_u16(body)?,
                data: body[2..].to_vec(),
            },
            OP_ACK => TftpPacket::ACK(read_u16(body)?),
            OP_ERROR => {
                let code = read_u16(body)?;
                // Some clients omit the trailing NUL on the message.
                let msg = match read_cstr(&body[2..]) {
                    Ok((msg, _)) => msg,
                    Err(_) => String::from_utf8_lossy(&body[2..]).into_owned(),
                };
                TftpPacket::ERROR { code, msg }
            }
            OP_OACK => TftpPacket::OACK(read_options(body)?),
            _ => return Err(malformed(format!("invalid opcode: {opcode}"))),
        };

        Ok(pkt)
    }

    /// Build an error packet from a code and any displayable message.
    pub fn error(code: ErrorCode, msg: impl ToString) -> Self {
        TftpPacket::ERROR {
            code: code.as_u16(),
            msg: msg.to_string(),
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            TftpPacket::DATA { data, .. } => 4 + data.len(),
            _ => 64,
        }
    }
}

fn malformed(msg: impl Into<String>) -> TftpError {
    TftpError::Malformed(msg.into())
}

fn put_cstr(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
}

fn put_options(bytes: &mut Vec<u8>, options: &HashMap<String, String>) {
    for (key, value) in options {
        put_cstr(bytes, key);
        put_cstr(bytes, value);
    }
}

fn put_request(bytes: &mut Vec<u8>, filename: &str, mode: &str, options: &HashMap<String, String>) {
    put_cstr(bytes, filename);
    put_cstr(bytes, mode);
    put_options(bytes, options);
}

fn read_u16(buf: &[u8]) -> Result<u16, TftpError> {
    match buf {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(malformed("packet length too short")),
    }
}

/// Split a NUL terminated string off the front of `buf`.
fn read_cstr(buf: &[u8]) -> Result<(String, &[u8]), TftpError> {
    let pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| malformed("missing string terminator"))?;
    let s = str::from_utf8(&buf[..pos])
        .map_err(|_| malformed("invalid string encoding"))?
        .to_string();
    Ok((s, &buf[pos + 1..]))
}

// Option names are case-insensitive (RFC 2347), keys are stored lowercased.
fn read_options(mut buf: &[u8]) -> Result<HashMap<String, String>, TftpError> {
    let mut options = HashMap::new();
    while !buf.is_empty() {
        let (key, rest) = read_cstr(buf)?;
        let (value, rest) = read_cstr(rest)?;
        options.insert(key.to_ascii_lowercase(), value);
        buf = rest;
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rrq_with_options() {
        let raw = b"\x00\x01boot.img\0OCTET\0BLKSIZE\01428\0timeout\05\0";
        let pkt = TftpPacket::deserialize(raw).unwrap();
        let TftpPacket::RRQ {
            filename,
            mode,
            options,
        } = pkt
        else {
            panic!("expected RRQ");
        };
        assert_eq!(filename, "boot.img");
        assert_eq!(mode, "octet");
        assert_eq!(options.get("blksize").map(String::as_str), Some("1428"));
        assert_eq!(options.get("timeout").map(String::as_str), Some("5"));
    }

    #[test]
    fn encodes_data_and_error() {
        let data = TftpPacket::DATA {
            block: 0x0102,
            data: vec![9, 8, 7],
        };
        assert_eq!(data.serialize(), vec![0, 3, 1, 2, 9, 8, 7]);

        let err = TftpPacket::error(ErrorCode::FileNotFound, "gone");
        assert_eq!(err.serialize(), b"\x00\x05\x00\x01gone\0".to_vec());
    }

    #[test]
    fn empty_data_block_is_valid() {
        let pkt = TftpPacket::deserialize(&[0, 3, 0, 7]).unwrap();
        assert_eq!(
            pkt,
            TftpPacket::DATA {
                block: 7,
                data: vec![]
            }
        );
    }

    #[test]
    fn oack_survives_the_wire() {
        let mut options = HashMap::new();
        options.insert("blksize".to_string(), "1024".to_string());
        let oack = TftpPacket::OACK(options);
        assert_eq!(TftpPacket::deserialize(&oack.serialize()).unwrap(), oack);
    }

    #[test]
    fn long_request_fits_receive_buffer() {
        let filename = format!("images/{}/vmlinuz", "x".repeat(1500));
        let mut options = HashMap::new();
        options.insert("blksize".to_string(), "65464".to_string());
        let rrq = TftpPacket::RRQ {
            filename: filename.clone(),
            mode: "octet".to_string(),
            options,
        };
        let bytes = rrq.serialize();
        assert!(bytes.len() > 1024);

        let mut buf = vec![0u8; crate::MAX_DATAGRAM_SIZE];
        buf[..bytes.len()].copy_from_slice(&bytes);
        assert_eq!(TftpPacket::deserialize(&buf[..bytes.len()]).unwrap(), rrq);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            TftpPacket::deserialize(&[0]),
            Err(TftpError::Malformed(_))
        ));
        assert!(matches!(
            TftpPacket::deserialize(&[0, 9, 0, 0]),
            Err(TftpError::Malformed(_))
        ));
        assert!(matches!(
            TftpPacket::deserialize(&[0, 4, 1]),
            Err(TftpError::Malformed(_))
        ));
        // option value without terminator
        assert!(TftpPacket::deserialize(b"\x00\x01f\0octet\0blksize\0512").is_err());
    }
}
