//! Request routing

use std::convert::Infallible;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request};
use tracing::debug;

use crate::logdb::LogDb;
use crate::protocol::{BINLOG_PATH, DATA_PREFIX, RANGE_PREFIX};

use super::handlers;
use super::response::{self, HttpResponse};

/// Route an incoming request to its handler
pub async fn route(req: Request<Incoming>, db: Arc<LogDb>) -> Result<HttpResponse, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!(method = %method, path = %path, "routing request");

    let response = if let Some(key) = path.strip_prefix(DATA_PREFIX) {
        handlers::data(req, db, key.as_bytes().to_vec()).await
    } else if let Some(start) = path.strip_prefix(RANGE_PREFIX) {
        match method {
            Method::GET => handlers::range_get(req, db, start).await,
            _ => response::method_not_allowed(),
        }
    } else if path == BINLOG_PATH {
        match method {
            Method::GET => handlers::binlog(req, db).await,
            _ => response::method_not_allowed(),
        }
    } else {
        response::not_found()
    };

    Ok(response)
}
