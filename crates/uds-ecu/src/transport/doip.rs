//! DoIP (ISO 13400-2) diagnostic server over TCP
//!
//! Implements the subset an external tester needs to reach the ECU: routing
//! activation, alive check and diagnostic messages. Each TCP connection gets
//! its own [`EcuSession`], so session state never leaks between testers.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uds_core::{EcuProfile, EcuSession, ServiceCatalog};

use super::TransportError;

/// Protocol version sent in every header
pub const PROTOCOL_VERSION: u8 = 0x02;
/// Generic header: version, inverse version, payload type (2), payload length (4)
pub const HEADER_LEN: usize = 8;
/// Largest payload accepted from a tester
pub const MAX_PAYLOAD_LEN: u32 = 0x0001_0000;

/// DoIP payload types
pub mod payload_type {
    pub const GENERIC_NACK: u16 = 0x0000;
    pub const ROUTING_ACTIVATION_REQUEST: u16 = 0x0005;
    pub const ROUTING_ACTIVATION_RESPONSE: u16 = 0x0006;
    pub const ALIVE_CHECK_REQUEST: u16 = 0x0007;
    pub const ALIVE_CHECK_RESPONSE: u16 = 0x0008;
    pub const DIAGNOSTIC_MESSAGE: u16 = 0x8001;
    pub const DIAGNOSTIC_ACK: u16 = 0x8002;
    pub const DIAGNOSTIC_NACK: u16 = 0x8003;
}

/// Generic header NACK codes
pub mod generic_nack {
    pub const INCORRECT_PATTERN: u8 = 0x00;
    pub const UNKNOWN_PAYLOAD_TYPE: u8 = 0x01;
    pub const MESSAGE_TOO_LARGE: u8 = 0x02;
    pub const INVALID_PAYLOAD_LENGTH: u8 = 0x04;
}

/// Diagnostic message ACK / NACK codes
pub mod diagnostic_ack {
    pub const ACK: u8 = 0x00;
    pub const UNKNOWN_TARGET_ADDRESS: u8 = 0x03;
}

const ROUTING_SUCCESSFULLY_ACTIVATED: u8 = 0x10;

/// One DoIP message (header fields plus payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoipMessage {
    pub payload_type: u16,
    pub payload: Bytes,
}

impl DoipMessage {
    pub fn new(payload_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            payload_type,
            payload: payload.into(),
        }
    }

    pub fn generic_nack(code: u8) -> Self {
        Self::new(payload_type::GENERIC_NACK, vec![code])
    }

    /// Diagnostic message family payload: `[source(2), target(2), data..]`
    fn diagnostic(payload_type: u16, source: u16, target: u16, data: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(4 + data.len());
        buf.put_u16(source);
        buf.put_u16(target);
        buf.put_slice(data);
        Self::new(payload_type, buf.freeze())
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(!PROTOCOL_VERSION);
        buf.put_u16(self.payload_type);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Validate a generic header and return `(payload_type, payload_length)`
    ///
    /// Versions 0x01 to 0x03 are accepted as long as the inverse byte matches.
    pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<(u16, u32), TransportError> {
        let mut buf = &header[..];
        let version = buf.get_u8();
        let inverse = buf.get_u8();
        if inverse != !version || !(0x01..=0x03).contains(&version) {
            return Err(TransportError::InvalidHeader(format!(
                "version 0x{:02X}, inverse 0x{:02X}",
                version, inverse
            )));
        }

        let payload_type = buf.get_u16();
        let length = buf.get_u32();
        if length > MAX_PAYLOAD_LEN {
            return Err(TransportError::PayloadTooLarge(length));
        }
        Ok((payload_type, length))
    }

    /// Read one message; `None` on a clean end of stream between messages
    pub async fn read<R>(reader: &mut R) -> Result<Option<Self>, TransportError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let (payload_type, length) = Self::parse_header(&header)?;
        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::ConnectionClosed
            } else {
                TransportError::Io(e)
            }
        })?;

        Ok(Some(Self::new(payload_type, payload)))
    }
}

/// Build the replies for one incoming message
pub fn respond(message: &DoipMessage, logical_address: u16, session: &EcuSession) -> Vec<DoipMessage> {
    let mut payload: &[u8] = &message.payload;

    match message.payload_type {
        payload_type::ROUTING_ACTIVATION_REQUEST => {
            // source address, activation type, 4 reserved bytes
            if payload.len() < 7 {
                return vec![DoipMessage::generic_nack(generic_nack::INVALID_PAYLOAD_LENGTH)];
            }
            let tester = payload.get_u16();
            info!(tester = format!("0x{:04X}", tester), "Routing activated");

            let mut buf = BytesMut::with_capacity(9);
            buf.put_u16(tester);
            buf.put_u16(logical_address);
            buf.put_u8(ROUTING_SUCCESSFULLY_ACTIVATED);
            buf.put_u32(0);
            vec![DoipMessage::new(
                payload_type::ROUTING_ACTIVATION_RESPONSE,
                buf.freeze(),
            )]
        }
        payload_type::ALIVE_CHECK_REQUEST => vec![DoipMessage::new(
            payload_type::ALIVE_CHECK_RESPONSE,
            logical_address.to_be_bytes().to_vec(),
        )],
        payload_type::DIAGNOSTIC_MESSAGE => {
            if payload.len() < 4 {
                return vec![DoipMessage::generic_nack(generic_nack::INVALID_PAYLOAD_LENGTH)];
            }
            let source = payload.get_u16();
            let target = payload.get_u16();

            if target != logical_address {
                warn!(
                    target = format!("0x{:04X}", target),
                    "Diagnostic message for unknown target"
                );
                return vec![DoipMessage::diagnostic(
                    payload_type::DIAGNOSTIC_NACK,
                    target,
                    source,
                    &[diagnostic_ack::UNKNOWN_TARGET_ADDRESS],
                )];
            }

            let mut replies = vec![DoipMessage::diagnostic(
                payload_type::DIAGNOSTIC_ACK,
                logical_address,
                source,
                &[diagnostic_ack::ACK],
            )];

            let response = session.handle(payload);
            if !response.is_empty() {
                replies.push(DoipMessage::diagnostic(
                    payload_type::DIAGNOSTIC_MESSAGE,
                    logical_address,
                    source,
                    &response,
                ));
            }
            replies
        }
        other => {
            warn!(payload_type = format!("0x{:04X}", other), "Unsupported payload type");
            vec![DoipMessage::generic_nack(generic_nack::UNKNOWN_PAYLOAD_TYPE)]
        }
    }
}

/// Serve one tester connection until it closes
///
/// A malformed header is answered with a generic NACK and ends the connection.
pub async fn handle_connection<S>(
    stream: S,
    logical_address: u16,
    session: EcuSession,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    loop {
        let message = match DoipMessage::read(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(TransportError::InvalidHeader(reason)) => {
                warn!(%reason, "Invalid DoIP header, closing connection");
                let nack = DoipMessage::generic_nack(generic_nack::INCORRECT_PATTERN);
                writer.write_all(&nack.encode()).await?;
                return Ok(());
            }
            Err(TransportError::PayloadTooLarge(length)) => {
                warn!(length, "DoIP payload too large, closing connection");
                let nack = DoipMessage::generic_nack(generic_nack::MESSAGE_TOO_LARGE);
                writer.write_all(&nack.encode()).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        debug!(
            payload_type = format!("0x{:04X}", message.payload_type),
            len = message.payload.len(),
            "Received DoIP message"
        );

        for reply in respond(&message, logical_address, &session) {
            writer.write_all(&reply.encode()).await?;
        }
        writer.flush().await?;
    }
}

/// TCP listener handing each connection its own ECU session
pub struct DoipServer {
    listener: TcpListener,
    logical_address: u16,
    catalog: Arc<ServiceCatalog>,
    profile: Arc<EcuProfile>,
}

impl DoipServer {
    pub async fn bind(
        addr: &str,
        logical_address: u16,
        catalog: Arc<ServiceCatalog>,
        profile: Arc<EcuProfile>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            logical_address,
            catalog,
            profile,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails
    pub async fn serve(self) -> Result<(), TransportError> {
        info!(
            addr = %self.local_addr()?,
            logical_address = format!("0x{:04X}", self.logical_address),
            "DoIP server listening"
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let session = EcuSession::new(Arc::clone(&self.catalog), Arc::clone(&self.profile));
            let logical_address = self.logical_address;

            tokio::spawn(async move {
                info!(%peer, "Tester connected");
                match handle_connection(stream, logical_address, session).await {
                    Ok(()) => info!(%peer, "Tester disconnected"),
                    Err(e) => warn!(%peer, error = %e, "Connection ended with error"),
                }
            });
        }
    }
}
