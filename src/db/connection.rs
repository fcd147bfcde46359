use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::config::DatabaseConfig;
use crate::protocol::resultset::{first_column, read_lenenc_int};
use crate::protocol::{
    capabilities, compute_auth_response, is_eof_packet, is_err_packet, is_ok_packet,
    AuthSwitchRequest, Command, ErrPacket, HandshakeResponse, InitialHandshake, Packet,
    PacketCodec, NATIVE_PASSWORD_PLUGIN,
};

use super::{ConnectionHandle, Connector, Session};

/// Opens a new MySQL session per call against one aggregator endpoint
#[derive(Debug, Clone)]
pub struct MysqlConnector {
    config: DatabaseConfig,
}

impl MysqlConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for MysqlConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, ConnectionError> {
        let session = MysqlSession::connect(&self.config).await?;
        Ok(Box::new(session))
    }
}

/// A single MySQL session over the text protocol
///
/// Every statement commits on its own; the checker never opens a transaction.
pub struct MysqlSession {
    framed: Framed<TcpStream, PacketCodec>,
    connection_id: u32,
    capabilities: u32,
    closed: bool,
}

impl MysqlSession {
    /// Connect and authenticate
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        let addr = config.addr();
        debug!(addr = %addr, "Connecting to aggregator");

        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to connect to aggregator");
            ConnectionError::Connect(e.to_string())
        })?;
        stream
            .set_nodelay(true)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut framed = Framed::new(stream, PacketCodec::default());

        let handshake_packet = Self::next_packet(&mut framed).await?;
        if is_err_packet(&handshake_packet.payload) {
            let err = ErrPacket::parse(&handshake_packet.payload, 0)
                .map(|e| e.error_message)
                .unwrap_or_else(|| "server refused connection".into());
            return Err(ConnectionError::Connect(err));
        }

        let handshake = InitialHandshake::parse(&handshake_packet.payload)
            .ok_or_else(|| ConnectionError::Protocol("Invalid server handshake".into()))?;

        debug!(
            server_version = %handshake.server_version,
            connection_id = handshake.connection_id,
            "Received server handshake"
        );

        let caps = capabilities::DEFAULT_CAPABILITIES & handshake.capability_flags;
        let response = HandshakeResponse {
            capability_flags: caps,
            max_packet_size: 16 * 1024 * 1024,
            character_set: 0x21, // utf8_general_ci
            username: config.user.clone(),
            auth_response: compute_auth_response(&config.password, &handshake.auth_plugin_data()),
            database: None,
            auth_plugin_name: NATIVE_PASSWORD_PLUGIN.to_string(),
        };

        framed
            .send(response.encode(handshake_packet.sequence_id.wrapping_add(1)))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut reply = Self::next_packet(&mut framed).await?;

        if let Some(switch) = AuthSwitchRequest::parse(&reply.payload) {
            if switch.plugin_name != NATIVE_PASSWORD_PLUGIN {
                return Err(ConnectionError::Auth(format!(
                    "Unsupported auth plugin: {}",
                    switch.plugin_name
                )));
            }
            debug!("Server requested auth switch");
            let scramble = compute_auth_response(&config.password, &switch.plugin_data);
            framed
                .send(Packet::new(reply.sequence_id.wrapping_add(1), scramble))
                .await
                .map_err(|e| ConnectionError::Io(e.to_string()))?;
            reply = Self::next_packet(&mut framed).await?;
        }

        if is_err_packet(&reply.payload) {
            let err = ErrPacket::parse(&reply.payload, caps)
                .unwrap_or_else(|| ErrPacket::new(1045, "28000", "Access denied"));
            error!(
                error_code = err.error_code,
                error_message = %err.error_message,
                "Aggregator authentication failed"
            );
            return Err(ConnectionError::Auth(err.error_message));
        }

        if !is_ok_packet(&reply.payload) {
            return Err(ConnectionError::Protocol(
                "Expected OK packet after authentication".into(),
            ));
        }

        debug!(connection_id = handshake.connection_id, "Authenticated");

        Ok(Self {
            framed,
            connection_id: handshake.connection_id,
            capabilities: caps,
            closed: false,
        })
    }

    async fn next_packet(
        framed: &mut Framed<TcpStream, PacketCodec>,
    ) -> Result<Packet, ConnectionError> {
        match framed.next().await {
            Some(Ok(packet)) => Ok(packet),
            Some(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            None => Err(ConnectionError::Disconnected),
        }
    }

    async fn send(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        self.framed.send(packet).await.map_err(|e| {
            self.closed = true;
            ConnectionError::Io(e.to_string())
        })
    }

    async fn recv(&mut self) -> Result<Packet, ConnectionError> {
        let result = Self::next_packet(&mut self.framed).await;
        if result.is_err() {
            self.closed = true;
        }
        result
    }

    fn server_error(&self, payload: &[u8]) -> ConnectionError {
        let err = ErrPacket::parse(payload, self.capabilities)
            .unwrap_or_else(|| ErrPacket::new(0, "HY000", "malformed error packet"));
        ConnectionError::Database(err.to_string())
    }

    /// Send a COM_QUERY and return the first column of the first row
    async fn query(&mut self, sql: &str) -> Result<Option<String>, ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Disconnected);
        }

        self.send(Packet::command(Command::Query, sql.as_bytes()))
            .await?;

        let first = self.recv().await?;
        if is_err_packet(&first.payload) {
            return Err(self.server_error(&first.payload));
        }
        if is_ok_packet(&first.payload) {
            // Statement without a result set (e.g. KILL)
            return Ok(None);
        }

        let (column_count, _) = read_lenenc_int(&first.payload)
            .map_err(|e| ConnectionError::Protocol(format!("column count: {}", e)))?;

        for _ in 0..column_count {
            self.recv().await?;
        }

        let eof = self.recv().await?;
        if !is_eof_packet(&eof.payload) {
            return Err(ConnectionError::Protocol(
                "Expected EOF after column definitions".into(),
            ));
        }

        let row = self.recv().await?;
        if is_eof_packet(&row.payload) {
            return Ok(None);
        }
        if is_err_packet(&row.payload) {
            return Err(self.server_error(&row.payload));
        }

        let value = first_column(&row.payload)
            .map_err(|e| ConnectionError::Protocol(format!("row: {}", e)))?;

        self.drain_rows().await?;
        Ok(value)
    }

    /// Consume remaining rows up to the terminating EOF
    async fn drain_rows(&mut self) -> Result<(), ConnectionError> {
        loop {
            let packet = self.recv().await?;
            if is_eof_packet(&packet.payload) {
                return Ok(());
            }
            if is_err_packet(&packet.payload) {
                return Err(self.server_error(&packet.payload));
            }
        }
    }
}

#[async_trait]
impl Session for MysqlSession {
    fn handle(&self) -> ConnectionHandle {
        ConnectionHandle(self.connection_id as u64)
    }

    async fn query_first_value(&mut self, sql: &str) -> Result<Option<String>, ConnectionError> {
        self.query(sql).await
    }

    async fn execute(&mut self, sql: &str) -> Result<(), ConnectionError> {
        self.query(sql).await.map(|_| ())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.framed.send(Packet::command(Command::Quit, &[])).await {
            debug!(connection_id = self.connection_id, error = %e, "COM_QUIT failed");
        }
    }
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Database(String),

    #[error("Connection disconnected")]
    Disconnected,
}
