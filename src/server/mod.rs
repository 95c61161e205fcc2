//! Ephemeral asset server
//!
//! Serves one expanded template and its data object over HTTP on
//! `127.0.0.1` for as long as the template stays loaded. `start` only returns
//! once the socket is bound, so its URL is safe to hand to the browser.

pub mod routes;

pub use routes::{normalize_path, router, AssetState, DATA_ENDPOINT, INDEX_FILE};

use crate::error::{Result, ServerError};
use crate::logger::SharedLogger;
use crate::template::TemplateSource;
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// How long `stop` waits for in-flight connections to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running asset server
pub struct AssetServer {
    addr: SocketAddr,
    url: Url,
    state: Arc<AssetState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl AssetServer {
    /// Bind `127.0.0.1:port` (0 = OS-assigned) and start serving
    #[instrument(skip(data, source, logger))]
    pub async fn start(
        data: Value,
        source: Arc<dyn TemplateSource>,
        port: u16,
        logger: SharedLogger,
    ) -> Result<Self> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = tokio::net::TcpListener::bind(requested)
            .await
            .map_err(|source| ServerError::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: requested,
            source,
        })?;

        let url = Url::parse(&format!("http://{}:{}/", Ipv4Addr::LOCALHOST, addr.port()))
            .map_err(|e| ServerError::Bind {
                addr,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            })?;

        let state = Arc::new(AssetState::new(source, data, logger));
        let app = router(state.clone());
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        info!("Asset server listening on {}", url);

        Ok(Self {
            addr,
            url,
            state,
            shutdown: Some(shutdown),
            task,
        })
    }

    /// Port the server is actually bound to
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Bound socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, `http://127.0.0.1:<port>/`
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Server state (expansion cache)
    pub fn state(&self) -> &Arc<AssetState> {
        &self.state
    }

    /// Close the listening socket and wait for the server to finish
    #[instrument(skip(self), fields(port = self.addr.port()))]
    pub async fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task).await {
            Ok(Ok(Ok(()))) => {
                debug!("Asset server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(ServerError::Shutdown(e.to_string()).into()),
            Ok(Err(e)) => Err(ServerError::Shutdown(e.to_string()).into()),
            Err(_) => {
                warn!("Asset server did not drain within {:?}; aborting", SHUTDOWN_GRACE);
                self.task.abort();
                Err(ServerError::Shutdown(format!(
                    "connections still open after {:?}",
                    SHUTDOWN_GRACE
                ))
                .into())
            }
        }
    }
}

impl Drop for AssetServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            self.task.abort();
        }
    }
}
