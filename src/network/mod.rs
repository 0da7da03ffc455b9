//! Network Module
//!
//! HTTP front end: the data API and the master side of replication.
//!
//! ## Architecture
//! - One tokio task accepts connections
//! - One task per connection, served by hyper's HTTP/1 codec
//! - Store and binlog work runs on the blocking pool
//! - A heartbeat task answers parked binlog pulls with no data

mod handlers;
mod response;
mod router;
mod server;

pub use response::HttpResponse;
pub use server::Server;
