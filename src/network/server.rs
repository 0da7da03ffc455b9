//! HTTP Server
//!
//! Accepts connections and serves each one on its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{RelayError, Result};
use crate::logdb::LogDb;

use super::router;

/// HTTP front end of a [`LogDb`]
pub struct Server {
    listener: TcpListener,
    db: Arc<LogDb>,
}

impl Server {
    /// Bind to the configured listen address
    pub async fn bind(db: Arc<LogDb>) -> Result<Self> {
        let addr = db.config().listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::Network(format!("bind {}: {}", addr, e)))?;
        Ok(Self { listener, db })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` flips to true
    ///
    /// Runs the heartbeat that answers parked binlog pulls with no data, and
    /// answers whatever is still parked on the way out.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let Server { listener, db } = self;
        info!(addr = %listener.local_addr()?, "HTTP server started");

        let heartbeat = tokio::spawn(heartbeat(
            Arc::clone(&db),
            db.config().heartbeat_interval,
            shutdown.clone(),
        ));

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    let io = TokioIo::new(stream);
                    let db = Arc::clone(&db);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let db = Arc::clone(&db);
                            async move { router::route(req, db).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            if !e.is_incomplete_message() {
                                warn!(remote = %remote_addr, error = %e, "HTTP connection error");
                            }
                        }
                    });
                }
                _ = shutdown.changed() => break,
            }
        }

        let _ = heartbeat.await;
        let answered = db.answer_parked_empty();
        info!(answered, "HTTP server stopped");
        Ok(())
    }
}

async fn heartbeat(db: Arc<LogDb>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    // First tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                db.answer_parked_empty();
            }
            _ = shutdown.changed() => break,
        }
    }
}
