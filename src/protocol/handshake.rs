use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use super::packet::{capabilities::*, Packet};

pub const NATIVE_PASSWORD_PLUGIN: &str = "mysql_native_password";

/// MySQL initial handshake packet (server -> client)
///
/// `connection_id` is the server-side session id; it is the value
/// `CONNECTION_ID()` returns and the target accepted by `KILL`.
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data_part1: [u8; 8],
    pub capability_flags: u32,
    pub auth_plugin_data_part2: Vec<u8>,
}

impl InitialHandshake {
    /// Get full auth plugin data (20 bytes)
    pub fn auth_plugin_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(20);
        data.extend_from_slice(&self.auth_plugin_data_part1);
        data.extend_from_slice(&self.auth_plugin_data_part2);
        data
    }

    /// Parse from packet payload, returning None on truncated input
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut buf = payload;
        if buf.remaining() < 1 {
            return None;
        }

        // protocol version
        buf.advance(1);

        let null_pos = buf.iter().position(|&b| b == 0)?;
        let server_version = String::from_utf8_lossy(&buf[..null_pos]).to_string();
        buf.advance(null_pos + 1);

        // connection id (4) + scramble part 1 (8) + filler (1) + lower caps (2)
        if buf.remaining() < 15 {
            return None;
        }
        let connection_id = buf.get_u32_le();

        let mut auth_plugin_data_part1 = [0u8; 8];
        auth_plugin_data_part1.copy_from_slice(&buf[..8]);
        buf.advance(8);
        buf.advance(1);

        let capability_flags_lower = buf.get_u16_le() as u32;

        // Pre-4.1 servers stop here
        if buf.remaining() < 16 {
            return Some(Self {
                server_version,
                connection_id,
                auth_plugin_data_part1,
                capability_flags: capability_flags_lower,
                auth_plugin_data_part2: Vec::new(),
            });
        }

        // character set (1) + status flags (2)
        buf.advance(3);
        let capability_flags_upper = buf.get_u16_le() as u32;
        let capability_flags = capability_flags_lower | (capability_flags_upper << 16);
        let auth_plugin_data_len = buf.get_u8();
        buf.advance(10);

        let mut auth_plugin_data_part2 = Vec::new();
        if capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            let len = std::cmp::max(13, (auth_plugin_data_len as usize).saturating_sub(8))
                .min(buf.remaining());
            let data_len = buf.iter().take(len).position(|&b| b == 0).unwrap_or(len);
            auth_plugin_data_part2.extend_from_slice(&buf[..data_len]);
        }

        // Plugin name ignored; non-native plugins arrive as an auth switch
        Some(Self {
            server_version,
            connection_id,
            auth_plugin_data_part1,
            capability_flags,
            auth_plugin_data_part2,
        })
    }
}

/// MySQL handshake response packet (client -> server)
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capability_flags: u32,
    pub max_packet_size: u32,
    pub character_set: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub auth_plugin_name: String,
}

impl HandshakeResponse {
    /// Encode to packet
    pub fn encode(&self, sequence_id: u8) -> Packet {
        let mut buf = BytesMut::new();

        buf.put_u32_le(self.capability_flags);
        buf.put_u32_le(self.max_packet_size);
        buf.put_u8(self.character_set);

        // Reserved (23 bytes)
        buf.extend_from_slice(&[0u8; 23]);

        buf.extend_from_slice(self.username.as_bytes());
        buf.put_u8(0);

        if self.capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            buf.put_u8(self.auth_response.len() as u8);
            buf.extend_from_slice(&self.auth_response);
        } else {
            buf.extend_from_slice(&self.auth_response);
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_CONNECT_WITH_DB != 0 {
            if let Some(ref db) = self.database {
                buf.extend_from_slice(db.as_bytes());
            }
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_PLUGIN_AUTH != 0 {
            buf.extend_from_slice(self.auth_plugin_name.as_bytes());
            buf.put_u8(0);
        }

        Packet::new(sequence_id, buf.freeze())
    }
}

/// Auth switch request (0xFE) sent by the server after the handshake response
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    pub plugin_name: String,
    pub plugin_data: Vec<u8>,
}

impl AuthSwitchRequest {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.first() != Some(&0xFE) {
            return None;
        }
        let buf = &payload[1..];
        let null_pos = buf.iter().position(|&b| b == 0)?;
        let plugin_name = String::from_utf8_lossy(&buf[..null_pos]).to_string();
        let mut plugin_data = buf[null_pos + 1..].to_vec();
        if plugin_data.last() == Some(&0) {
            plugin_data.pop();
        }
        Some(Self {
            plugin_name,
            plugin_data,
        })
    }
}

/// Compute mysql_native_password auth response
pub fn compute_auth_response(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    // SHA1(password)
    let hash1 = Sha1::digest(password.as_bytes());
    // SHA1(SHA1(password))
    let hash2 = Sha1::digest(hash1);

    // SHA1(auth_data + SHA1(SHA1(password)))
    let mut hasher = Sha1::new();
    hasher.update(auth_data);
    hasher.update(hash2);
    let hash3 = hasher.finalize();

    hash1
        .iter()
        .zip(hash3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// ERR packet
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    pub fn new(error_code: u16, sql_state: &str, error_message: &str) -> Self {
        Self {
            error_code,
            sql_state: sql_state.to_string(),
            error_message: error_message.to_string(),
        }
    }

    /// Parse from packet payload
    pub fn parse(payload: &[u8], capabilities: u32) -> Option<Self> {
        if payload.is_empty() || payload[0] != 0xFF {
            return None;
        }

        let mut buf = &payload[1..];
        if buf.len() < 2 {
            return None;
        }

        let error_code = buf.get_u16_le();

        let (sql_state, error_message) =
            if capabilities & CLIENT_PROTOCOL_41 != 0 && buf.len() >= 6 && buf[0] == b'#' {
                buf.advance(1);
                let sql_state = String::from_utf8_lossy(&buf[..5]).to_string();
                buf.advance(5);
                (sql_state, String::from_utf8_lossy(buf).to_string())
            } else {
                ("HY000".to_string(), String::from_utf8_lossy(buf).to_string())
            };

        Some(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

impl std::fmt::Display for ErrPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, '{}')", self.error_code, self.error_message)
    }
}

/// Check if packet is OK packet
pub fn is_ok_packet(payload: &Bytes) -> bool {
    !payload.is_empty() && payload[0] == 0x00
}

/// Check if packet is ERR packet
pub fn is_err_packet(payload: &Bytes) -> bool {
    !payload.is_empty() && payload[0] == 0xFF
}

/// Check if packet is EOF packet
///
/// The checker never negotiates CLIENT_DEPRECATE_EOF, so an 0xFE header on a
/// short payload is always an EOF marker.
pub fn is_eof_packet(payload: &Bytes) -> bool {
    !payload.is_empty() && payload[0] == 0xFE && payload.len() < 9
}
