//! End-to-end reconciliation against in-process fleet, kubelet and
//! Kubernetes API servers.
//!
//! The daemon's own flag handling builds the settings; the real fleet,
//! health and kube clients talk to canned servers over local sockets.

use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};

use nodereg_health::HttpProber;
use nodereg_reconcile::{Reconciler, TickReport};
use nodereg_registry::KubeRegistry;
use noderegd::{Cli, Settings};

/// A request as seen by a canned server.
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    body: String,
}

type Handler = Arc<dyn Fn(&Seen) -> (&'static str, String) + Send + Sync>;

/// Read one HTTP/1 request, headers and body.
async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Option<Seen> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(Seen { method, path, body })
}

async fn respond<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    handler: Handler,
    log: Arc<Mutex<Vec<Seen>>>,
) {
    let Some(seen) = read_request(&mut stream).await else {
        return;
    };
    let (status, body) = handler(&seen);
    log.lock().unwrap().push(seen);
    let resp = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(resp.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn serve_tcp(handler: Handler) -> (u16, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(respond(stream, handler.clone(), seen.clone()));
        }
    });
    (port, log)
}

fn serve_unix(listener: UnixListener, handler: Handler) -> Arc<Mutex<Vec<Seen>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(respond(stream, handler.clone(), seen.clone()));
        }
    });
    log
}

const MACHINES: &str = r#"{"machines":[
    {"id":"m1","primaryIP":"127.0.0.1","metadata":{"role":"kubernetes","zone":"fleet"}},
    {"id":"m2","primaryIP":"127.0.0.2","metadata":{"role":"etcd"}}
]}"#;

fn not_found(name: &str) -> String {
    format!(
        r#"{{"kind":"Status","apiVersion":"v1","metadata":{{}},"status":"Failure","message":"nodes \"{name}\" not found","reason":"NotFound","code":404}}"#
    )
}

/// A Kubernetes API that knows no nodes and accepts every create.
fn empty_kube_api() -> Handler {
    Arc::new(|req: &Seen| match req.method.as_str() {
        "GET" => {
            let path = req.path.split('?').next().unwrap_or_default();
            let name = path.rsplit('/').next().unwrap_or_default().to_string();
            ("404 Not Found", not_found(&name))
        }
        "POST" => ("201 Created", req.body.clone()),
        _ => ("405 Method Not Allowed", "{}".to_string()),
    })
}

fn settings(args: &[&str], env: Vec<(String, String)>) -> Settings {
    let mut argv = vec!["noderegd"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().into_settings(env).unwrap()
}

fn build(settings: Settings) -> Reconciler {
    let registry = KubeRegistry::connect(&settings.kube).unwrap();
    Reconciler::new(
        settings.reconcile,
        Arc::new(settings.fleet),
        Arc::new(registry),
        Arc::new(HttpProber::new(settings.health_port, settings.health_timeout)),
    )
}

#[tokio::test]
async fn fleet_machine_is_registered_as_node() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("fleet.sock");
    let fleet_log = serve_unix(
        UnixListener::bind(&socket).unwrap(),
        Arc::new(|_: &Seen| ("200 OK", MACHINES.to_string())),
    );
    let (health_port, health_log) =
        serve_tcp(Arc::new(|_: &Seen| ("200 OK", "ok".to_string()))).await;
    let (api_port, api_log) = serve_tcp(empty_kube_api()).await;

    let fleet = format!("unix://{}", socket.display());
    let api = format!("http://127.0.0.1:{api_port}");
    let port = health_port.to_string();
    let env = vec![("NODE_REGISTER_ZONE".to_string(), "operator".to_string())];
    let reconciler = build(settings(
        &["--fleet", &fleet, "--api", &api, "--port", &port, "--health-timeout", "2s"],
        env,
    ));

    let report = reconciler.tick().await;
    assert_eq!(
        report,
        TickReport {
            members: 2,
            skipped: 1,
            created: 1,
            ..Default::default()
        }
    );

    assert_eq!(fleet_log.lock().unwrap()[0].path, "/fleet/v1/machines");

    let probes = health_log.lock().unwrap().clone();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].path, "/healthz");

    let calls = api_log.lock().unwrap().clone();
    let methods: Vec<&str> = calls.iter().map(|c| c.method.as_str()).collect();
    assert_eq!(methods, vec!["GET", "GET", "POST"]);
    assert!(calls[0].path.starts_with("/api/v1/nodes/127.0.0.1"));
    assert!(calls[2].path.starts_with("/api/v1/nodes"));

    let node: serde_json::Value = serde_json::from_str(&calls[2].body).unwrap();
    assert_eq!(node["kind"], "Node");
    assert_eq!(node["metadata"]["name"], "127.0.0.1");
    assert_eq!(node["metadata"]["labels"]["role"], "kubernetes");
    assert_eq!(node["metadata"]["labels"]["zone"], "operator");
}

#[tokio::test]
async fn unhealthy_machine_is_not_registered() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("fleet.sock");
    serve_unix(
        UnixListener::bind(&socket).unwrap(),
        Arc::new(|_: &Seen| ("200 OK", MACHINES.to_string())),
    );
    let (health_port, _) = serve_tcp(Arc::new(|_: &Seen| {
        ("503 Service Unavailable", "down".to_string())
    }))
    .await;
    let (api_port, api_log) = serve_tcp(empty_kube_api()).await;

    let fleet = format!("unix://{}", socket.display());
    let api = format!("http://127.0.0.1:{api_port}");
    let port = health_port.to_string();
    let reconciler = build(settings(
        &["--fleet", &fleet, "--api", &api, "--port", &port],
        Vec::new(),
    ));

    let report = reconciler.tick().await;
    assert_eq!(report.unhealthy, 1);
    assert_eq!(report.created, 0);
    assert!(api_log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn standalone_registers_only_itself() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("fleet.sock");
    serve_unix(
        UnixListener::bind(&socket).unwrap(),
        Arc::new(|_: &Seen| {
            (
                "200 OK",
                r#"{"machines":[
                    {"id":"m0","primaryIP":"127.0.0.3","metadata":{"role":"kubernetes"}},
                    {"id":"m1","primaryIP":"127.0.0.1","metadata":{"role":"kubernetes"}}
                ]}"#
                .to_string(),
            )
        }),
    );
    let (health_port, health_log) =
        serve_tcp(Arc::new(|_: &Seen| ("200 OK", "ok".to_string()))).await;
    let (api_port, api_log) = serve_tcp(empty_kube_api()).await;

    let fleet = format!("unix://{}", socket.display());
    let api = format!("http://127.0.0.1:{api_port}");
    let port = health_port.to_string();
    let reconciler = build(settings(
        &[
            "--fleet", &fleet, "--api", &api, "--port", &port, "--standalone", "--address",
            "127.0.0.1",
        ],
        Vec::new(),
    ));

    let report = reconciler.tick().await;
    assert_eq!(report.members, 1);
    assert_eq!(report.created, 1);
    assert_eq!(health_log.lock().unwrap().len(), 1);
    assert!(
        api_log
            .lock()
            .unwrap()
            .iter()
            .all(|c| !c.path.contains("127.0.0.3"))
    );
}
