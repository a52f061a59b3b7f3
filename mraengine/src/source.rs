//! Source readers feeding a zone pipeline.

use futures_util::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mramodel::PlaybackSource;

use crate::error::EngineError;
use crate::pipes::PcmPipes;

const READ_BUFFER: usize = 32 * 1024;

/// Reads the playback source and forwards raw byte chunks to the session
/// loop until EOF, error, or cancellation.
pub(crate) async fn run_source(
    source: PlaybackSource,
    pipes: PcmPipes,
    token: CancellationToken,
    data_tx: mpsc::Sender<Vec<u8>>,
) -> Result<(), EngineError> {
    match source {
        PlaybackSource::File { path } => {
            let mut file = tokio::fs::File::open(&path).await?;
            let mut buffer = vec![0u8; READ_BUFFER];
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    read = file.read(&mut buffer) => {
                        let n = read?;
                        if n == 0 {
                            break;
                        }
                        if data_tx.send(buffer[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(())
        }

        PlaybackSource::Http { url, headers, .. } => {
            let client = reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .map_err(|e| EngineError::Http(e.to_string()))?;
            let mut request = client.get(&url);
            for (name, value) in &headers {
                request = request.header(name, value);
            }
            let response = request
                .send()
                .await
                .map_err(|e| EngineError::Http(e.to_string()))?
                .error_for_status()
                .map_err(|e| EngineError::Http(e.to_string()))?;

            let mut stream = response.bytes_stream();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = stream.next() => {
                        match next {
                            Some(Ok(bytes)) => {
                                if data_tx.send(bytes.to_vec()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                return Err(EngineError::Http(e.to_string()));
                            }
                            None => break,
                        }
                    }
                }
            }
            Ok(())
        }

        PlaybackSource::PcmPipe { label } => {
            let mut rx = pipes.open(&label)?;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    data = rx.recv() => {
                        match data {
                            Some(bytes) => {
                                if data_tx.send(bytes).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            pipes.close(&label);
            debug!(label, "pcm source drained");
            Ok(())
        }
    }
}
