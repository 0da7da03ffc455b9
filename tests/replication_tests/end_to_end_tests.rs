//! End-to-end tests over real HTTP connections

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use relaykv::binlog::{binlog_path, Frames, LogFile, LogRecord};
use relaykv::network::Server;
use relaykv::protocol::{KvEntries, LogPos, SyncPos, NEXT_INFO, ORIGIN_ID, REQ_INFO};
use relaykv::replication::SlaveSync;
use relaykv::{LogDb, MasterAddr};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{node_config, open_db};

// =============================================================================
// Helper Functions
// =============================================================================

const MASTER_ID: i32 = 1;
const SLAVE_ID: i32 = 2;

struct Node {
    db: Arc<LogDb>,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    async fn start(db: Arc<LogDb>) -> Self {
        let server = Server::bind(Arc::clone(&db)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown, rx) = watch::channel(false);

        let mut tasks = Vec::new();
        let server_rx = rx.clone();
        tasks.push(tokio::spawn(async move {
            server.run(server_rx).await.unwrap();
        }));
        if db.slave_status().is_some() {
            let sync = SlaveSync::new(Arc::clone(&db)).unwrap();
            tasks.push(tokio::spawn(sync.run(rx)));
        }

        Self {
            db,
            addr,
            shutdown,
            tasks,
        }
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for task in self.tasks {
            tokio::time::timeout(Duration::from_secs(10), task)
                .await
                .unwrap()
                .unwrap();
        }
        self.db.close().unwrap();
    }
}

fn master_db(temp: &TempDir, heartbeat: Duration) -> Arc<LogDb> {
    open_db(
        node_config(temp.path(), MASTER_ID)
            .listen_addr("127.0.0.1:0")
            .heartbeat_interval(heartbeat)
            .build(),
    )
}

fn slave_db(temp: &TempDir, master: SocketAddr) -> Arc<LogDb> {
    open_db(
        node_config(temp.path(), SLAVE_ID)
            .listen_addr("127.0.0.1:0")
            .master(MasterAddr::new("127.0.0.1", master.port()))
            .reconnect_delay(Duration::from_millis(100))
            .flush_slave_interval(Duration::ZERO)
            .build(),
    )
}

async fn request(
    addr: SocketAddr,
    method: Method,
    uri: &str,
    headers: &[(&'static str, String)],
    body: &str,
) -> (StatusCode, HeaderMap, Bytes) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(HOST, addr.to_string());
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let req = builder.body(Full::new(Bytes::from(body.to_string()))).unwrap();

    let response = sender.send_request(req).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, body)
}

async fn get(addr: SocketAddr, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    request(addr, Method::GET, uri, &[], "").await
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).unwrap().to_str().unwrap()
}

// =============================================================================
// Data API Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_data_api() {
    let temp = TempDir::new().unwrap();
    let node = Node::start(master_db(&temp, Duration::from_secs(10))).await;
    let addr = node.addr;

    let (status, _, _) = get(addr, "/d/user:1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = request(addr, Method::POST, "/d/user:1", &[], "alice").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, body) = get(addr, "/d/user:1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"alice");

    let (status, _, _) = request(addr, Method::PUT, "/d/user:1", &[], "bob").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node.db.get(b"user:1").unwrap(), Some(b"bob".to_vec()));

    let (status, _, _) = request(addr, Method::DELETE, "/d/user:1", &[], "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(addr, "/d/user:1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = request(addr, Method::PATCH, "/d/user:1", &[], "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, _, _) = get(addr, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(addr, "/d/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    node.stop().await;
}

// =============================================================================
// Master Endpoint Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_range_get_endpoint() {
    let temp = TempDir::new().unwrap();
    let node = Node::start(master_db(&temp, Duration::from_secs(10))).await;
    node.db.write(b"a", b"1").unwrap();
    node.db.write(b"b", b"2").unwrap();
    let tail = node.db.tail_position().unwrap();

    let req_info = SyncPos::initial().to_header();
    let (status, headers, body) = request(
        node.addr,
        Method::GET,
        "/range-get/?inc=1",
        &[(REQ_INFO, req_info.clone())],
        "",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header(&headers, ORIGIN_ID), MASTER_ID.to_string());
    assert_eq!(header(&headers, REQ_INFO), req_info);
    let next = SyncPos::parse_header(header(&headers, NEXT_INFO)).unwrap();
    assert_eq!(next, SyncPos::tailing(tail));

    let pairs: Vec<(Vec<u8>, Option<Vec<u8>>)> = KvEntries::new(&body)
        .map(|e| {
            let (k, v) = e.unwrap();
            (k.to_vec(), v.map(|v| v.to_vec()))
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            (b"a".to_vec(), Some(b"1".to_vec())),
            (b"b".to_vec(), Some(b"2".to_vec())),
        ]
    );

    node.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binlog_endpoint_errors() {
    let temp = TempDir::new().unwrap();
    let node = Node::start(master_db(&temp, Duration::from_secs(10))).await;
    node.db.write(b"a", b"1").unwrap();

    let (status, _, _) = get(node.addr, "/binlog/?f=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, _) = get(node.addr, "/binlog/?f=1&off=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, _) = get(node.addr, "/binlog/?f=9&off=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, headers, body) = get(node.addr, "/binlog/?f=00001&off=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(Frames::new(&body).count(), 1);
    assert_eq!(
        header(&headers, NEXT_INFO),
        SyncPos::tailing(LogPos::new(1, 48)).to_header()
    );

    node.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binlog_disabled_is_unavailable() {
    let temp = TempDir::new().unwrap();
    let db = open_db(
        relaykv::Config::builder()
            .data_dir(temp.path().join("data"))
            .listen_addr("127.0.0.1:0")
            .build(),
    );
    let node = Node::start(db).await;

    let (status, _, _) = get(node.addr, "/binlog/?f=1&off=0").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    node.stop().await;
}

// =============================================================================
// Long-Poll Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_long_poll_delivers_new_frame() {
    let temp = TempDir::new().unwrap();
    let node = Node::start(master_db(&temp, Duration::from_secs(60))).await;
    node.db.write(b"before", b"0").unwrap();
    let end = node.db.tail_position().unwrap();

    let addr = node.addr;
    let uri = SyncPos::tailing(end).request_uri();
    let pull = tokio::spawn(async move { get(addr, &uri).await });

    eventually("pull to park", || {
        let db = Arc::clone(&node.db);
        async move { db.parked_count() == 1 }
    })
    .await;
    assert!(!pull.is_finished());

    node.db.write(b"after", b"1").unwrap();

    let (status, headers, body) = tokio::time::timeout(Duration::from_secs(10), pull)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let payloads: Vec<&[u8]> = Frames::new(&body).map(|f| f.unwrap()).collect();
    assert_eq!(payloads.len(), 1);
    let record = LogRecord::decode(payloads[0]).unwrap();
    assert_eq!(record.key, b"after");
    assert_eq!(record.origin_id, MASTER_ID);

    assert_eq!(header(&headers, REQ_INFO), SyncPos::tailing(end).to_header());
    assert_eq!(
        header(&headers, NEXT_INFO),
        SyncPos::tailing(node.db.tail_position().unwrap()).to_header()
    );

    node.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeat_answers_parked_pull() {
    let temp = TempDir::new().unwrap();
    let node = Node::start(master_db(&temp, Duration::from_millis(200))).await;
    let end = node.db.tail_position().unwrap();

    let (status, headers, body) = tokio::time::timeout(
        Duration::from_secs(10),
        get(node.addr, &SyncPos::tailing(end).request_uri()),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(header(&headers, NEXT_INFO), header(&headers, REQ_INFO));

    node.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_answers_parked_pull() {
    let temp = TempDir::new().unwrap();
    let node = Node::start(master_db(&temp, Duration::from_secs(60))).await;
    let end = node.db.tail_position().unwrap();

    let addr = node.addr;
    let uri = SyncPos::tailing(end).request_uri();
    let pull = tokio::spawn(async move { get(addr, &uri).await });
    eventually("pull to park", || {
        let db = Arc::clone(&node.db);
        async move { db.parked_count() == 1 }
    })
    .await;

    node.stop().await;

    let (status, _, body) = tokio::time::timeout(Duration::from_secs(10), pull)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

// =============================================================================
// Master / Slave Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bootstrap_then_tail() {
    let master_dir = TempDir::new().unwrap();
    let slave_dir = TempDir::new().unwrap();

    let master = Node::start(master_db(&master_dir, Duration::from_secs(1))).await;
    master.db.write(b"a", b"1").unwrap();

    let slave = Node::start(slave_db(&slave_dir, master.addr)).await;

    // Bootstrap copies a→1
    eventually("bootstrap copy", || {
        let db = Arc::clone(&slave.db);
        async move { db.get(b"a").unwrap() == Some(b"1".to_vec()) }
    })
    .await;
    eventually("slave to tail the binlog", || {
        let db = Arc::clone(&slave.db);
        async move { db.slave_pos().map(|p| p.bootstrap_done).unwrap_or(false) }
    })
    .await;

    // Tailing delivers b→2
    master.db.write(b"b", b"2").unwrap();
    eventually("tailed write", || {
        let db = Arc::clone(&slave.db);
        async move { db.get(b"b").unwrap() == Some(b"2".to_vec()) }
    })
    .await;

    // Deletes replicate too
    master.db.remove(b"a").unwrap();
    eventually("tailed delete", || {
        let db = Arc::clone(&slave.db);
        async move { db.get(b"a").unwrap().is_none() }
    })
    .await;

    // Replicated records keep the master's origin id in the slave's binlog
    let mut file = LogFile::open(&binlog_path(&slave_dir.path().join("binlog"), 1), true).unwrap();
    let origins: Vec<i32> = file
        .frames(0)
        .map(|f| LogRecord::decode(&f.unwrap().1).unwrap().origin_id)
        .collect();
    assert_eq!(origins.len(), 3);
    assert!(origins.iter().all(|&origin| origin == MASTER_ID));

    slave.stop().await;
    master.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slave_reconnects_and_resumes() {
    let master_dir = TempDir::new().unwrap();
    let slave_dir = TempDir::new().unwrap();

    let master = Node::start(master_db(&master_dir, Duration::from_secs(1))).await;
    let master_addr = master.addr;
    master.db.write(b"k1", b"v1").unwrap();

    let slave = Node::start(slave_db(&slave_dir, master_addr)).await;
    eventually("first copy", || {
        let db = Arc::clone(&slave.db);
        async move { db.get(b"k1").unwrap().is_some() }
    })
    .await;
    eventually("slave to tail the binlog", || {
        let db = Arc::clone(&slave.db);
        async move { db.slave_pos().map(|p| p.bootstrap_done).unwrap_or(false) }
    })
    .await;
    slave.stop().await;

    // Writes while the slave is down
    master.db.write(b"k2", b"v2").unwrap();
    master.db.write(b"k3", b"v3").unwrap();

    let slave = Node::start(slave_db(&slave_dir, master_addr)).await;
    let saved = slave.db.slave_pos().unwrap();
    assert!(saved.bootstrap_done);

    eventually("catch-up", || {
        let db = Arc::clone(&slave.db);
        async move { db.get(b"k3").unwrap() == Some(b"v3".to_vec()) }
    })
    .await;
    assert_eq!(slave.db.get(b"k2").unwrap(), Some(b"v2".to_vec()));

    slave.stop().await;
    master.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bootstrap_resumes_after_non_ascii_keys() {
    let master_dir = TempDir::new().unwrap();
    let slave_dir = TempDir::new().unwrap();

    // One pair per range batch, so every key below ends up as a resume key
    let master_db = open_db(
        node_config(master_dir.path(), MASTER_ID)
            .listen_addr("127.0.0.1:0")
            .heartbeat_interval(Duration::from_secs(1))
            .batch_count(1)
            .build(),
    );
    let master = Node::start(master_db).await;

    let (status, _, _) = request(master.addr, Method::POST, "/d/caf%C3%A9", &[], "latte").await;
    assert_eq!(status, StatusCode::OK);

    let keys: Vec<(Vec<u8>, &[u8])> = vec![
        ("caf\u{e9}".as_bytes().to_vec(), &b"1"[..]),
        (b"key with spaces".to_vec(), &b"2"[..]),
        (b"raw\xff\x00bytes".to_vec(), &b"3"[..]),
        (b"100%".to_vec(), &b"4"[..]),
        (b"zz".to_vec(), &b"5"[..]),
    ];
    for (key, value) in &keys {
        master.db.write(key, value).unwrap();
    }

    let slave = Node::start(slave_db(&slave_dir, master.addr)).await;
    eventually("bootstrap past every key", || {
        let db = Arc::clone(&slave.db);
        async move { db.slave_pos().map(|p| p.bootstrap_done).unwrap_or(false) }
    })
    .await;

    for (key, value) in &keys {
        assert_eq!(slave.db.get(key).unwrap().as_deref(), Some(*value));
    }
    // The data route keeps its raw path bytes as the key
    assert_eq!(slave.db.get(b"caf%C3%A9").unwrap(), Some(b"latte".to_vec()));

    slave.stop().await;
    master.stop().await;
}
