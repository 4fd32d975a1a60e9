//! Wire formats spoken on the launchpad sockets.
//!
//! Three channels exist:
//!
//! - **Registration** (candidate → daemon, pool socket): a fixed
//!   [`REGISTRATION_LEN`]-byte ASCII record `"<pid> <worker-pid>"`, NUL padded.
//! - **Candidate channel** (same connection, after registration): the daemon
//!   writes one hand-off, a 4-byte big-endian length followed by a JSON
//!   [`LaunchRequest`]. The candidate answers with native-endian `i32` status
//!   codes (see [`LaunchStatus`]).
//! - **Launch channel** (client → daemon, launch socket): `cmd: i32 | len: i32 |
//!   payload` in native byte order. The payload is a JSON [`LaunchBundle`]. The
//!   daemon replies with one native `i32`: the launched pid, or a negative
//!   [`reply`] code.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use wrt_core::{AppId, LaunchRequest, LaunchStatus, RequestKind};

use crate::error::{LaunchpadError, LaunchpadResult};

/// Size of a candidate registration record.
pub const REGISTRATION_LEN: usize = 32;

/// Largest hand-off payload accepted by a candidate.
pub const MAX_HANDOFF_LEN: usize = 1_048_576;

/// Largest launch packet payload accepted by the daemon.
pub const MAX_LAUNCH_PAYLOAD: usize = 65_536;

/// Negative reply codes on the launch channel.
pub mod reply {
    /// The request was valid but no process could be started.
    pub const LAUNCH_FAILED: i32 = -1;
    /// The launch packet could not be decoded.
    pub const MALFORMED_REQUEST: i32 = -2;
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// A candidate's announcement on the pool socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// The candidate process.
    pub pid: Pid,
    /// Its dependent worker process, if it started one.
    pub worker_pid: Option<Pid>,
}

impl Registration {
    /// Encode into the fixed-size record. A missing worker is written as `0`.
    #[must_use]
    pub fn encode(&self) -> [u8; REGISTRATION_LEN] {
        let text = format!(
            "{} {}",
            self.pid.as_raw(),
            self.worker_pid.map_or(0, Pid::as_raw)
        );
        let mut record = [0u8; REGISTRATION_LEN];
        // Two i32 values and a space always fit.
        let len = text.len().min(REGISTRATION_LEN);
        record[..len].copy_from_slice(&text.as_bytes()[..len]);
        record
    }

    /// Parse a registration record.
    ///
    /// Text stops at the first NUL. The worker field may be absent or `0`.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchpadError::PoolProtocol`] if the record is not ASCII,
    /// the pid is not positive, or extra fields follow.
    pub fn parse(record: &[u8]) -> LaunchpadResult<Self> {
        let end = record
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(record.len());
        let text = std::str::from_utf8(&record[..end])
            .map_err(|_| LaunchpadError::PoolProtocol("registration is not ASCII".into()))?;

        let mut fields = text.split_ascii_whitespace();
        let pid = match fields.next().map(str::parse::<i32>) {
            Some(Ok(pid)) if pid > 0 => Pid::from_raw(pid),
            _ => {
                return Err(LaunchpadError::PoolProtocol(format!(
                    "invalid candidate pid in registration {text:?}"
                )));
            },
        };
        let worker_pid = match fields.next().map(str::parse::<i32>) {
            None | Some(Ok(0)) => None,
            Some(Ok(worker)) if worker > 0 => Some(Pid::from_raw(worker)),
            _ => {
                return Err(LaunchpadError::PoolProtocol(format!(
                    "invalid worker pid in registration {text:?}"
                )));
            },
        };
        if fields.next().is_some() {
            return Err(LaunchpadError::PoolProtocol(format!(
                "trailing fields in registration {text:?}"
            )));
        }
        Ok(Self { pid, worker_pid })
    }
}

// ---------------------------------------------------------------------------
// Candidate channel
// ---------------------------------------------------------------------------

/// Daemon-side codec for a registered candidate's connection.
///
/// Decodes status codes and encodes hand-off requests. Wrapped in
/// [`tokio_util::codec::Framed`] so a partially read status survives a
/// cancelled `select!` branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateCodec;

impl Decoder for CandidateCodec {
    type Item = i32;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<i32>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        Ok(Some(src.get_i32_ne()))
    }
}

impl Encoder<LaunchRequest> for CandidateCodec {
    type Error = std::io::Error;

    fn encode(&mut self, request: LaunchRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = request.to_json().map_err(std::io::Error::other)?;
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|&len| len as usize <= MAX_HANDOFF_LEN)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("hand-off payload of {} bytes is too large", payload.len()),
                )
            })?;
        dst.reserve(payload.len().saturating_add(4));
        dst.put_u32(len);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

/// Block until the daemon hands off a request.
///
/// # Errors
///
/// Returns an I/O error if the connection closes, or
/// [`LaunchpadError::PoolProtocol`] if the payload is oversized or invalid.
pub fn read_handoff(stream: &mut impl Read) -> LaunchpadResult<LaunchRequest> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_HANDOFF_LEN {
        return Err(LaunchpadError::PoolProtocol(format!(
            "hand-off payload of {len} bytes exceeds {MAX_HANDOFF_LEN}"
        )));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    LaunchRequest::from_json(&payload)
        .map_err(|e| LaunchpadError::PoolProtocol(format!("invalid hand-off payload: {e}")))
}

/// Write a status code on the candidate channel.
///
/// # Errors
///
/// Returns an I/O error if the write fails.
pub fn write_status(stream: &mut impl Write, status: LaunchStatus) -> std::io::Result<()> {
    stream.write_all(&status.code().to_ne_bytes())?;
    stream.flush()
}

// ---------------------------------------------------------------------------
// Launch channel
// ---------------------------------------------------------------------------

/// JSON payload of a launch packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchBundle {
    /// Application to run.
    pub app_id: AppId,
    /// Opaque arguments.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// Read one launch packet and build the request it describes.
///
/// `caller_pid` comes from the connection's peer credentials.
///
/// # Errors
///
/// Returns [`LaunchpadError::MalformedPacket`] for an unknown command, a
/// negative or oversized length, or an invalid payload, and an I/O error if
/// the connection closes early.
pub async fn read_launch_request<R>(reader: &mut R, caller_pid: i32) -> LaunchpadResult<LaunchRequest>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).await?;
    let mut header = &header[..];
    let cmd = header.get_i32_ne();
    let len = header.get_i32_ne();

    let kind = RequestKind::from_code(cmd)
        .ok_or_else(|| LaunchpadError::MalformedPacket(format!("unknown command {cmd}")))?;
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= MAX_LAUNCH_PAYLOAD)
        .ok_or_else(|| LaunchpadError::MalformedPacket(format!("invalid payload length {len}")))?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let bundle: LaunchBundle = serde_json::from_slice(&payload)
        .map_err(|e| LaunchpadError::MalformedPacket(format!("invalid payload: {e}")))?;

    let mut request = LaunchRequest::new(bundle.app_id, kind).with_caller(caller_pid);
    request.args = bundle.args;
    Ok(request)
}

/// Write a launch packet for `request`. The caller pid is not sent; the
/// daemon reads it from the socket.
///
/// # Errors
///
/// Returns [`LaunchpadError::MalformedPacket`] if the payload is too large,
/// or an I/O error if the write fails.
pub async fn write_launch_request<W>(writer: &mut W, request: &LaunchRequest) -> LaunchpadResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bundle = LaunchBundle {
        app_id: request.app_id.clone(),
        args: request.args.clone(),
    };
    let payload = serde_json::to_vec(&bundle).map_err(wrt_core::CoreError::from)?;
    let len = i32::try_from(payload.len())
        .ok()
        .filter(|&len| len as usize <= MAX_LAUNCH_PAYLOAD)
        .ok_or_else(|| {
            LaunchpadError::MalformedPacket(format!(
                "payload of {} bytes exceeds {MAX_LAUNCH_PAYLOAD}",
                payload.len()
            ))
        })?;

    let mut packet = BytesMut::with_capacity(payload.len().saturating_add(8));
    packet.put_i32_ne(request.kind.code());
    packet.put_i32_ne(len);
    packet.extend_from_slice(&payload);
    writer.write_all(&packet).await?;
    writer.flush().await?;
    Ok(())
}

/// Write the daemon's reply.
///
/// # Errors
///
/// Returns an I/O error if the write fails.
pub async fn write_reply<W>(writer: &mut W, code: i32) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&code.to_ne_bytes()).await?;
    writer.flush().await
}

/// Read the daemon's reply.
///
/// # Errors
///
/// Returns an I/O error if the connection closes before four bytes arrive.
pub async fn read_reply<R>(reader: &mut R) -> std::io::Result<i32>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(i32::from_ne_bytes(buf))
}
