//! Loopback listener that receives the sign-in redirect
//!
//! Binds a local address, serves the callback path with axum, and hands the
//! full callback URL (redirect URI plus query) to `wait`. The server shuts
//! down as soon as one callback arrives or the wait times out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::Uri;
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info};

use crate::error::{Error, Result};

const SIGNED_IN_PAGE: &str =
    "<html><body><p>Sign-in received. You can close this window.</p></body></html>";

#[derive(Clone)]
struct CallbackState {
    redirect_uri: Arc<str>,
    tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

pub struct CallbackListener {
    redirect_uri: String,
    local_addr: SocketAddr,
    callback_rx: oneshot::Receiver<String>,
    shutdown_tx: oneshot::Sender<()>,
}

impl CallbackListener {
    /// Bind `addr` (port 0 picks a free port) and start serving `path`.
    pub async fn bind(addr: SocketAddr, path: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Listener(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Listener(e.to_string()))?;
        let redirect_uri = format!("http://{local_addr}{path}");

        let (callback_tx, callback_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = CallbackState {
            redirect_uri: redirect_uri.as_str().into(),
            tx: Arc::new(Mutex::new(Some(callback_tx))),
        };
        let app = Router::new()
            .route(path, get(callback_handler))
            .with_state(state);

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                debug!(error = %e, "callback listener stopped with error");
            }
        });

        info!(%local_addr, "callback listener ready");
        Ok(Self {
            redirect_uri,
            local_addr,
            callback_rx,
            shutdown_tx,
        })
    }

    /// Redirect URI to register with the sign-in request.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the browser to hit the callback path, then stop the server.
    pub async fn wait(self, timeout: Duration) -> Result<String> {
        let received = tokio::time::timeout(timeout, self.callback_rx).await;
        let _ = self.shutdown_tx.send(());
        match received {
            Ok(Ok(callback)) => Ok(callback),
            Ok(Err(_)) => Err(Error::Listener("callback listener stopped".into())),
            Err(_) => Err(Error::CallbackTimeout(timeout.as_secs())),
        }
    }
}

async fn callback_handler(State(state): State<CallbackState>, uri: Uri) -> Html<&'static str> {
    let callback = match uri.query() {
        Some(query) => format!("{}?{query}", state.redirect_uri),
        None => state.redirect_uri.to_string(),
    };
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(callback);
    }
    Html(SIGNED_IN_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receives_callback_url() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap(), "/callback")
            .await
            .unwrap();
        let redirect_uri = listener.redirect_uri().to_string();
        assert_eq!(
            redirect_uri,
            format!("http://{}/callback", listener.local_addr())
        );

        let hit = format!("{redirect_uri}?code=abc&state=xyz");
        let request = tokio::spawn(async move { reqwest::get(&hit).await.unwrap().status() });

        let callback = listener.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(callback, format!("{redirect_uri}?code=abc&state=xyz"));
        assert!(request.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn times_out_without_callback() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap(), "/callback")
            .await
            .unwrap();
        let err = listener
            .wait(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CallbackTimeout(_)));
    }
}
