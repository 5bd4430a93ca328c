use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines, ReadHalf, WriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::protocol::{JsonRpcError, Notification, Request, RequestId, Response};
use crate::api::ApiHandler;

/// Notifications buffered per client before updates are dropped for it.
const NOTIFICATION_BUFFER: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum IpcServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, IpcServerError>;

type Reader = Lines<BufReader<ReadHalf<UnixStream>>>;
type Writer = BufWriter<WriteHalf<UnixStream>>;

pub struct IpcServer {
    socket_path: String,
    api_handler: Arc<ApiHandler>,
}

impl IpcServer {
    pub fn new(socket_path: String, api_handler: Arc<ApiHandler>) -> Self {
        Self {
            socket_path,
            api_handler,
        }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    pub async fn start(self: Arc<Self>) -> Result<()> {
        let path = Path::new(&self.socket_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("IPC server listening on {}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        tracing::debug!("New client connected");

        let (read_half, write_half) = tokio::io::split(stream);
        // `next_line` is cancel-safe, so a notification never tears a request.
        let mut reader = BufReader::new(read_half).lines();
        let mut writer = BufWriter::new(write_half);

        // Every committed change reaches the client as a full snapshot. A slow
        // client misses intermediate snapshots rather than stalling the store.
        let (notif_tx, mut notif_rx) = mpsc::channel::<Notification>(NOTIFICATION_BUFFER);
        let _subscription = self.api_handler.store().subscribe(move |snapshot| {
            match notif_tx.try_send(Notification::timers_changed(snapshot)?) {
                Ok(()) | Err(TrySendError::Closed(_)) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("IPC: client lagging, dropping timer snapshot");
                    Ok(())
                }
            }
        });

        loop {
            tokio::select! {
                result = Self::read_line_from(&mut reader) => {
                    match result {
                        Ok(line) => {
                            let response = self.handle_line(&line).await;
                            if let Err(e) = Self::write_message_to(&mut writer, &response).await {
                                tracing::error!("Failed to write response: {}", e);
                                break;
                            }
                        }
                        Err(IpcServerError::Closed) => {
                            tracing::debug!("Client disconnected");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("Failed to read request: {}", e);
                            break;
                        }
                    }
                }
                Some(notification) = notif_rx.recv() => {
                    if let Err(e) = Self::write_message_to(&mut writer, &notification).await {
                        tracing::warn!("Failed to send notification: {}", e);
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn read_line_from(reader: &mut Reader) -> Result<String> {
        reader.next_line().await?.ok_or(IpcServerError::Closed)
    }

    async fn write_message_to<T: serde::Serialize>(writer: &mut Writer, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line.trim()) {
            Ok(request) => {
                tracing::debug!("handler: received request: {}", request.method);
                self.handle_request(request).await
            }
            Err(e) => Response::error(JsonRpcError::parse_error(e.to_string()), RequestId::Null),
        }
    }

    async fn handle_request(&self, request: Request) -> Response {
        if let Err(error) = request.validate() {
            return Response::error(error, request.id);
        }

        match self
            .api_handler
            .handle(&request.method, request.params)
            .await
        {
            Ok(result) => Response::success(result, request.id),
            Err(error) => {
                tracing::debug!("Request {} failed: {}", request.method, error);
                Response::error(error.into(), request.id)
            }
        }
    }
}
