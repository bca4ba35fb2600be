//! Byte sources feeding the session
//!
//! Every producer stream runs in its own task and forwards raw chunks.
//! Decoding happens in the session, which owns the viewer.

use crate::session::SessionEvent;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};

/// Register a stream with the session and forward its bytes until EOF.
pub async fn pump<R>(mut reader: R, label: String, primary: bool, chunk: usize, events: mpsc::Sender<SessionEvent>)
where
    R: AsyncRead + Unpin,
{
    let (reply, registered) = oneshot::channel();
    if events
        .send(SessionEvent::Opened { label: label.clone(), primary, reply })
        .await
        .is_err()
    {
        return;
    }
    let Ok(source) = registered.await else {
        return;
    };

    let mut buf = vec![0u8; chunk.max(1)];
    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => SessionEvent::Closed { source },
            Ok(n) => SessionEvent::Data {
                source,
                bytes: buf[..n].to_vec(),
            },
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => SessionEvent::Failed {
                source,
                message: e.to_string(),
            },
        };
        let done = !matches!(event, SessionEvent::Data { .. });
        if events.send(event).await.is_err() || done {
            break;
        }
    }
    log::debug!("{} finished", label);
}

pub fn spawn_stdin(chunk: usize, events: mpsc::Sender<SessionEvent>) {
    tokio::spawn(pump(tokio::io::stdin(), "stdin".to_string(), true, chunk, events));
}

pub async fn spawn_file(path: &Path, chunk: usize, events: mpsc::Sender<SessionEvent>) -> std::io::Result<()> {
    let file = tokio::fs::File::open(path).await?;
    let label = path.display().to_string();
    tokio::spawn(pump(file, label, true, chunk, events));
    Ok(())
}

/// Socket location for a share name.
///
/// A name containing `/` is used as the path itself.
pub fn share_socket_path(name: &str) -> PathBuf {
    if name.contains('/') {
        PathBuf::from(name)
    } else {
        std::env::temp_dir().join(format!("mpl_outboard-{}.sock", name))
    }
}

#[cfg(unix)]
pub use self::unix::*;

#[cfg(unix)]
mod unix {
    use super::pump;
    use crate::control::ControlCommand;
    use crate::error::{CliError, CliResult};
    use crate::session::SessionEvent;
    use std::path::{Path, PathBuf};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{UnixListener, UnixStream};
    use tokio::sync::{mpsc, oneshot};

    /// Removes the socket file when the listener goes away
    #[derive(Debug)]
    pub struct SocketGuard {
        path: PathBuf,
    }

    impl SocketGuard {
        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for SocketGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    /// Bind `path`, replacing a stale socket nobody answers on.
    pub fn bind(path: &Path) -> std::io::Result<(UnixListener, SocketGuard)> {
        if path.exists() {
            log::debug!("removing stale socket {}", path.display());
            let _ = std::fs::remove_file(path);
        }
        let listener = UnixListener::bind(path)?;
        Ok((
            listener,
            SocketGuard {
                path: path.to_path_buf(),
            },
        ))
    }

    /// Outcome of trying to take a share name
    pub enum ShareRole {
        /// No viewer answered; this process now serves the name
        Server(UnixListener, SocketGuard),
        /// Another viewer owns the name
        Client(UnixStream),
    }

    pub async fn claim_share(name: &str) -> CliResult<ShareRole> {
        let path = super::share_socket_path(name);
        if let Ok(stream) = UnixStream::connect(&path).await {
            log::info!("viewer '{}' already running at {}", name, path.display());
            return Ok(ShareRole::Client(stream));
        }
        let (listener, guard) = bind(&path).map_err(|e| CliError::share(name, e.to_string()))?;
        log::info!("serving share '{}' on {}", name, path.display());
        Ok(ShareRole::Server(listener, guard))
    }

    /// Send this process's stdin to the viewer that owns the share.
    pub async fn forward_stdin(mut stream: UnixStream) -> std::io::Result<u64> {
        let mut stdin = tokio::io::stdin();
        let copied = tokio::io::copy(&mut stdin, &mut stream).await?;
        stream.shutdown().await?;
        log::info!("forwarded {} bytes to shared viewer", copied);
        Ok(copied)
    }

    /// Accept producer connections; each one becomes its own source.
    pub async fn accept_producers(listener: UnixListener, chunk: usize, events: mpsc::Sender<SessionEvent>) {
        let mut accepted = 0u64;
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    accepted += 1;
                    let label = format!("producer connection {}", accepted);
                    tokio::spawn(pump(stream, label, false, chunk, events.clone()));
                }
                Err(err) => {
                    log::warn!("share accept failed: {}", err);
                }
            }
            if events.is_closed() {
                break;
            }
        }
    }

    /// Serve line-based navigation commands.
    pub async fn serve_control(listener: UnixListener, events: mpsc::Sender<SessionEvent>) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    tokio::spawn(handle_control(stream, events.clone()));
                }
                Err(err) => {
                    log::warn!("control accept failed: {}", err);
                }
            }
            if events.is_closed() {
                break;
            }
        }
    }

    async fn handle_control(stream: UnixStream, events: mpsc::Sender<SessionEvent>) {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match ControlCommand::parse(&line) {
                Ok(command) => {
                    let (reply, answered) = oneshot::channel();
                    if events.send(SessionEvent::Control { command, reply }).await.is_err() {
                        break;
                    }
                    match answered.await {
                        Ok(text) => text,
                        Err(_) => break,
                    }
                }
                Err(e) => format!("error: {}", e),
            };
            if writer.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                break;
            }
        }
    }
}
