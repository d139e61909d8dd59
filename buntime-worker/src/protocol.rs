//! Framed wire protocol to a worker's child process (spec §6).
//!
//! Messages are length-prefixed JSON over the child's stdin/stdout, which
//! preserves message boundaries regardless of how the OS chooses to chunk
//! the underlying pipe reads/writes. Request and response bodies stream as
//! a sequence of messages rather than one message per call: each carries a
//! `body` chunk and an `end_of_body` flag, so neither side has to buffer a
//! whole request or response in memory.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

/// One message on the wire, tagged by kind in its serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// child → host, first message after spawn.
    Ready { worker_id: Uuid },
    /// host → child, one per chunk of the request (method/url/headers are
    /// only meaningful on the first chunk; later chunks leave them empty).
    Request {
        id: Uuid,
        method: String,
        url: String,
        headers: Vec<(String, String)>,
        remote_addr: Option<String>,
        #[serde(with = "body_as_base64")]
        body: Vec<u8>,
        end_of_body: bool,
    },
    /// child → host, one per chunk of the response.
    Response {
        id: Uuid,
        status: u16,
        headers: Vec<(String, String)>,
        #[serde(with = "body_as_base64")]
        body: Vec<u8>,
        end_of_body: bool,
    },
    /// child → host, liveness heartbeat while READY.
    Idle,
    /// either direction, best-effort error report.
    Error {
        id: Option<Uuid>,
        kind: String,
        message: String,
    },
    /// host → child, request graceful exit.
    Terminate,
    /// either direction, one bridged WebSocket data frame, sent only after
    /// a `Request`/`Response` pair has completed an upgrade handshake
    /// (status 101). The socket is bound to this worker for the
    /// connection's lifetime (spec §4.2 WebSocket upgrade).
    WsFrame {
        id: Uuid,
        kind: WsFrameKind,
        #[serde(with = "body_as_base64")]
        data: Vec<u8>,
    },
    /// either direction, graceful close of a bridged WebSocket connection.
    WsClose {
        id: Uuid,
        code: Option<u16>,
        reason: String,
    },
}

/// The kind of payload a bridged [`WireMessage::WsFrame`] carries, mirroring
/// the data-frame variants of `axum::extract::ws::Message` (control frames
/// other than ping/pong are represented by `WsClose`, not a `WsFrameKind`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WsFrameKind {
    Text,
    Binary,
    Ping,
    Pong,
}

/// JSON doesn't round-trip raw bytes; carry body chunks as base64 rather
/// than lossily coercing them through `String`.
mod body_as_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Build the length-delimited framing shared by both ends of the pipe.
/// 16 MiB caps a single frame well above any realistic header block or
/// body chunk, guarding against a runaway child wedging the host's framer.
pub fn frame<T>(io: T) -> Framed<T, LengthDelimitedCodec>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(
        io,
        LengthDelimitedCodec::builder()
            .max_frame_length(16 * 1024 * 1024)
            .new_codec(),
    )
}

pub async fn write_message<T>(
    framed: &mut Framed<T, LengthDelimitedCodec>,
    msg: &WireMessage,
) -> std::io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(msg)?;
    framed.send(Bytes::from(bytes)).await
}

/// Reads the next message, or `Ok(None)` on clean EOF (the child closed its
/// side of the pipe).
pub async fn read_message<T>(
    framed: &mut Framed<T, LengthDelimitedCodec>,
) -> std::io::Result<Option<WireMessage>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        None => Ok(None),
        Some(Err(e)) => Err(e),
        Some(Ok(bytes)) => {
            let msg = serde_json::from_slice(&bytes)?;
            Ok(Some(msg))
        }
    }
}
