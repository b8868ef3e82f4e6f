//! Local command socket.
//!
//! Clients send frames made of a 4-byte big-endian length followed by a
//! UTF-8 JSON command request `{"type": <string>, "args": {...}}`. Each
//! request is answered with one frame holding `{"ok": bool, "msg": str}`.

use std::io;
use std::sync::Arc;

use domain::{Command, CommandRequest, DomainError, Portfolio, PortfolioCommand};
use messagebus::PortfolioBus;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use unit_of_work::UnitOfWorkFactory;

use crate::AppState;
use crate::error::ApiError;

/// Largest accepted request body.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("frame of {0} bytes exceeds the size limit")]
    TooLarge(usize),

    #[error("failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Reply sent for every request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    pub msg: String,
}

/// Reads one frame. Returns `None` when the peer closed between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(FrameError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {filled} of 4 header bytes"),
                )));
            }
            n => filled += n,
        }
    }

    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len as usize));
    }

    let mut body = vec![0; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge(body.len()))?;
    writer.write_u32(len).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Decodes one request body and dispatches the command.
pub async fn handle_request<F>(bus: &PortfolioBus<F>, body: &[u8]) -> Reply
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    match dispatch(bus, body).await {
        Ok(name) => Reply {
            ok: true,
            msg: format!("Command '{name}' handled."),
        },
        Err(e) => {
            tracing::info!(error = %e, "command request rejected");
            Reply {
                ok: false,
                msg: e.to_string(),
            }
        }
    }
}

async fn dispatch<F>(bus: &PortfolioBus<F>, body: &[u8]) -> Result<&'static str, ApiError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let request = CommandRequest::from_slice(body).map_err(DomainError::from)?;
    let command = PortfolioCommand::from_request(request)?;
    let name = command.name();
    tracing::debug!(
        command = name,
        correlation_id = %command.correlation_id(),
        "command received"
    );

    bus.execute(command).await?;
    Ok(name)
}

/// Answers request frames until the peer disconnects.
pub async fn handle_connection<S, F>(
    mut stream: S,
    bus: &PortfolioBus<F>,
) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    while let Some(body) = read_frame(&mut stream).await? {
        let reply = handle_request(bus, &body).await;
        write_frame(&mut stream, &serde_json::to_vec(&reply)?).await?;
    }
    Ok(())
}

/// Binds the socket, replacing a stale socket file left by a previous run.
///
/// Refuses to remove anything at `path` that is not a socket.
#[cfg(unix)]
pub fn bind(path: &str) -> io::Result<tokio::net::UnixListener> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            std::fs::remove_file(path)?;
            tracing::debug!(path, "removed stale command socket");
        }
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{path} exists and is not a socket"),
            ));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::net::UnixListener::bind(path)
}

/// Accepts connections forever, one task per client.
#[cfg(unix)]
pub async fn serve<F>(listener: tokio::net::UnixListener, state: Arc<AppState<F>>)
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to accept command connection");
                continue;
            }
        };

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &state.bus).await {
                tracing::warn!(error = %e, "command connection closed with error");
            }
        });
    }
}
