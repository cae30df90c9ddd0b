//! Image sources.

use crate::{OtaError, OtaResult};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Chunked image delivery; an `Err` item aborts the download.
pub type ImageStream = mpsc::Receiver<OtaResult<Vec<u8>>>;

/// Where firmware images come from.
pub trait ImageSource: Send {
    /// Start fetching `url`; chunks arrive on the returned stream until
    /// completion (channel close) or failure (an `Err` item).
    fn open(&self, url: &str) -> ImageStream;
}

/// Streamed HTTPS fetch, pinned to the trust-root CA when one is present.
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    /// Build the client. `pinned_ca_der` narrows the accepted server
    /// certificates to the factory CA.
    pub fn new(pinned_ca_der: Option<&[u8]>) -> OtaResult<Self> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(der) = pinned_ca_der {
            let cert = reqwest::Certificate::from_der(der)
                .map_err(|e| OtaError::ManifestInvalid(format!("pinned CA: {e}")))?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| OtaError::DownloadIncomplete(format!("client build: {e}")))?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpImageSource {
    fn open(&self, url: &str) -> ImageStream {
        let (tx, rx) = mpsc::channel(8);
        let client = self.client.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let response = match client.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "Image fetch failed to start");
                    let _ = tx
                        .send(Err(OtaError::DownloadIncomplete(err.to_string())))
                        .await;
                    return;
                }
            };
            let mut response = match response.error_for_status() {
                Ok(response) => response,
                Err(err) => {
                    let _ = tx
                        .send(Err(OtaError::DownloadIncomplete(err.to_string())))
                        .await;
                    return;
                }
            };
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => {
                        if tx.send(Ok(chunk.to_vec())).await.is_err() {
                            debug!("Image consumer went away, stopping fetch");
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        let _ = tx
                            .send(Err(OtaError::DownloadIncomplete(err.to_string())))
                            .await;
                        return;
                    }
                }
            }
        });
        rx
    }
}

/// Canned image source for tests: a chunk list, optionally cut short by a
/// transport error.
#[derive(Default, Clone)]
pub struct MemoryImageSource {
    chunks: Vec<Vec<u8>>,
    fail_after: Option<usize>,
}

impl MemoryImageSource {
    pub fn new(image: &[u8], chunk_size: usize) -> Self {
        let chunks = image
            .chunks(chunk_size.max(1))
            .map(|c| c.to_vec())
            .collect();
        Self {
            chunks,
            fail_after: None,
        }
    }

    /// Deliver only the first `count` chunks, then a transport error.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

impl ImageSource for MemoryImageSource {
    fn open(&self, _url: &str) -> ImageStream {
        let (tx, rx) = mpsc::channel(self.chunks.len() + 1);
        let mut delivered = 0usize;
        for chunk in &self.chunks {
            if let Some(limit) = self.fail_after {
                if delivered >= limit {
                    let _ = tx.try_send(Err(OtaError::DownloadIncomplete(
                        "connection reset".into(),
                    )));
                    return rx;
                }
            }
            let _ = tx.try_send(Ok(chunk.clone()));
            delivered += 1;
        }
        rx
    }
}
