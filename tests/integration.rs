use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep};

use rax_share::auth::PermissiveIdentityPolicy;
use rax_share::engines::{ftp, sftp::SftpHandler};
use rax_share::http::HttpHandler;
use rax_share::ingest::IngestHandler;
use rax_share::protocol::Protocol;
use rax_share::server::ProtocolListener;
use rax_share::storage::DirectoryRoot;

const PAYLOAD: &[u8; 16] = b"0123456789abcdef";

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

fn policy(dir: &Path) -> rax_share::auth::SharedPolicy {
    PermissiveIdentityPolicy::shared(DirectoryRoot::open(dir).unwrap())
}

// Helper to reserve distinct free ports on loopback
fn free_ports(count: usize) -> Vec<u16> {
    let listeners: Vec<_> = (0..count)
        .map(|_| std::net::TcpListener::bind(loopback(0)).unwrap())
        .collect();
    listeners
        .iter()
        .map(|l| l.local_addr().unwrap().port())
        .collect()
}

// Helper to connect, retrying while the listener comes up
async fn connect(addr: SocketAddr) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => sleep(Duration::from_millis(100)).await,
            Err(e) => panic!("Failed to connect to {}: {}", addr, e),
        }
    }
}

// Helper to send one raw HTTP request and split the response
async fn http(addr: SocketAddr, request: &[u8]) -> (u16, String, Vec<u8>) {
    let mut stream = connect(addr).await;
    stream.write_all(request).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head");
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let body = raw[split + 4..].to_vec();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    (status, head, body)
}

fn put(path: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "PUT {} HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n",
        path,
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

fn get(path: &str) -> Vec<u8> {
    format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path).into_bytes()
}

async fn http_upload_scenario(addr: SocketAddr, dir: &Path) {
    let (status, _, _) = http(addr, &put("/abc", PAYLOAD)).await;
    assert_eq!(status, 201);
    assert_eq!(std::fs::read(dir.join("abc")).unwrap(), PAYLOAD);

    let (status, _, body) = http(addr, &get("/abc")).await;
    assert_eq!(status, 200);
    assert_eq!(body, PAYLOAD);

    let (status, _, _) = http(addr, &put("/", PAYLOAD)).await;
    assert_eq!(status, 405);

    let (status, _, _) = http(addr, &put("/missingdir/abc", PAYLOAD)).await;
    assert_eq!(status, 404);
    assert!(!dir.join("missingdir").exists());
}

async fn start_http(dir: &Path) -> SocketAddr {
    let listener =
        ProtocolListener::bind(Protocol::Http, loopback(0), HttpHandler::new(policy(dir)))
            .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.serve());
    addr
}

async fn start_ingest(dir: &Path, idle: Duration) -> SocketAddr {
    let handler = IngestHandler::new(policy(dir)).with_idle_timeout(idle);
    let listener = ProtocolListener::bind(Protocol::Ingest, loopback(0), handler).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.serve());
    addr
}

// Helper to wait until the ingest listener has closed exactly `count` files
async fn wait_for_files(dir: &Path, count: usize, len: u64) -> Vec<std::path::PathBuf> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let files: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        let done = files.len() == count
            && files
                .iter()
                .all(|f| std::fs::metadata(f).map(|m| m.len() == len).unwrap_or(false));
        if done || Instant::now() > deadline {
            return files;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn http_put_get_and_rejections() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_http(dir.path()).await;

    http_upload_scenario(addr, dir.path()).await;
}

#[tokio::test]
async fn http_head_and_escape_attempts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.txt"), b"hello").unwrap();
    let addr = start_http(dir.path()).await;

    let (status, head, body) =
        http(addr, b"HEAD /file.txt HTTP/1.1\r\nHost: test\r\n\r\n").await;
    assert_eq!(status, 200);
    assert!(head.contains("Content-Length: 5"));
    assert!(body.is_empty());

    let (status, _, _) = http(addr, &get("/../../etc/passwd")).await;
    assert_eq!(status, 403);

    let (status, _, _) = http(addr, &put("/../escaped", PAYLOAD)).await;
    assert_eq!(status, 403);
    assert!(!dir.path().parent().unwrap().join("escaped").exists());

    let (status, _, _) = http(addr, b"DELETE /file.txt HTTP/1.1\r\n\r\n").await;
    assert_eq!(status, 501);
    assert!(dir.path().join("file.txt").exists());

    let (status, _, _) = http(addr, b"PUT /nolength HTTP/1.1\r\n\r\n").await;
    assert_eq!(status, 411);
}

#[tokio::test]
async fn http_serves_listing_and_redirects_directories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub").join("inner.txt"), b"x").unwrap();
    let addr = start_http(dir.path()).await;

    let (status, head, _) = http(addr, &get("/sub")).await;
    assert_eq!(status, 301);
    assert!(head.contains("Location: /sub/"));

    let (status, _, body) = http(addr, &get("/sub/")).await;
    assert_eq!(status, 200);
    assert!(String::from_utf8_lossy(&body).contains("inner.txt"));
}

#[tokio::test]
async fn concurrent_http_connections_are_served_independently() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_http(dir.path()).await;

    // A client that connects and says nothing must not block others.
    let _idle = connect(addr).await;

    let uploads = (0..8).map(|i| {
        let path = format!("/file{}", i);
        async move { http(addr, &put(&path, PAYLOAD)).await.0 }
    });
    let statuses = spawn_all(uploads).await;
    assert!(statuses.iter().all(|s| *s == 201));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 8);
}

async fn spawn_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut out = Vec::new();
    for handle in handles {
        out.push(handle.await.unwrap());
    }
    out
}

#[tokio::test]
async fn ingest_writes_fragmented_stream_to_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_ingest(dir.path(), Duration::from_secs(5)).await;

    let mut stream = connect(addr).await;
    for chunk in PAYLOAD.chunks(5) {
        stream.write_all(chunk).await.unwrap();
        sleep(Duration::from_millis(20)).await;
    }
    drop(stream);

    let files = wait_for_files(dir.path(), 1, PAYLOAD.len() as u64).await;
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn ingest_idle_connection_leaves_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_ingest(dir.path(), Duration::from_millis(300)).await;

    let mut stream = connect(addr).await;
    // The server closes on idle timeout; EOF on our side confirms it.
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server should close idle connection")
        .unwrap_or(0);
    assert_eq!(n, 0);

    let files = wait_for_files(dir.path(), 1, 0).await;
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::metadata(&files[0]).unwrap().len(), 0);
}

#[tokio::test]
async fn sftp_listener_speaks_ssh() {
    let dir = tempfile::tempdir().unwrap();
    let handler = SftpHandler::new(policy(dir.path()), None);
    let listener = ProtocolListener::bind(Protocol::Sftp, loopback(0), handler).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.serve());

    let stream = connect(addr).await;
    let mut reader = BufReader::new(stream);
    let mut banner = String::new();
    reader.read_line(&mut banner).await.unwrap();
    assert!(banner.starts_with("SSH-2.0-"), "banner: {:?}", banner);
}

#[tokio::test]
async fn ftp_listener_greets() {
    let dir = tempfile::tempdir().unwrap();
    let addr = loopback(free_ports(1)[0]);
    tokio::spawn(ftp::serve(addr, policy(dir.path())));

    let stream = connect(addr).await;
    let mut reader = BufReader::new(stream);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();
    assert!(greeting.starts_with("220 "), "greeting: {:?}", greeting);
    assert!(greeting.trim_end().len() > 4, "greeting: {:?}", greeting);
}

#[tokio::test]
async fn ftp_reports_taken_port_as_bind_failure() {
    let dir = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind(loopback(0)).unwrap();
    let addr = taken.local_addr().unwrap();

    let result = ftp::serve(addr, policy(dir.path())).await;
    assert!(matches!(
        result,
        Err(rax_share::error::ListenerError::Bind { .. })
    ));
}

#[cfg(unix)]
mod supervised {
    use super::*;
    use std::process::Stdio;
    use tokio::process::{Child, Command};

    struct Running {
        child: Child,
        ports: Vec<(Protocol, u16)>,
    }

    // Helper to start the compiled binary as supervisor, SMB disabled
    async fn start_supervisor(dir: &Path) -> Running {
        let ports = free_ports(4);
        let ports = vec![
            (Protocol::Http, ports[0]),
            (Protocol::Ftp, ports[1]),
            (Protocol::Sftp, ports[2]),
            (Protocol::Ingest, ports[3]),
        ];

        let mut command = Command::new(env!("CARGO_BIN_EXE_rax-share"));
        command
            .current_dir(dir)
            .arg("-d")
            .arg(dir)
            .args(["-l", "127.0.0.1", "--only", "http,ftp,sftp,ingest"])
            .env_remove("RUST_LOG")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (protocol, port) in &ports {
            command.arg(format!("--{}", protocol.as_arg()));
            command.arg(port.to_string());
        }

        let child = command.spawn().unwrap();
        for (_, port) in &ports {
            drop(connect(loopback(*port)).await);
        }
        Running { child, ports }
    }

    async fn wait_until_closed(ports: &[(Protocol, u16)]) {
        let deadline = Instant::now() + Duration::from_secs(15);
        for (protocol, port) in ports {
            while TcpStream::connect(loopback(*port)).await.is_ok() {
                assert!(
                    Instant::now() < deadline,
                    "{} still listening on {}",
                    protocol,
                    port
                );
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    const GRACE_PERIOD: Duration = Duration::from_secs(5);

    fn signal(child: &Child, name: &str) {
        signal_pid(child.id().expect("supervisor pid"), name);
    }

    fn signal_pid(pid: u32, name: &str) {
        let status = std::process::Command::new("kill")
            .args([name, &pid.to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }

    // Helper to find the listener processes started by the supervisor
    #[cfg(target_os = "linux")]
    fn listener_pids(supervisor: &Child) -> Vec<u32> {
        let parent = supervisor.id().expect("supervisor pid");
        std::fs::read_dir("/proc")
            .unwrap()
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
            .filter(|pid| {
                let ppid = std::fs::read_to_string(format!("/proc/{}/stat", pid))
                    .ok()
                    .and_then(|stat| {
                        stat.rsplit(')')
                            .next()?
                            .split_whitespace()
                            .nth(1)?
                            .parse::<u32>()
                            .ok()
                    });
                ppid == Some(parent)
            })
            .collect()
    }

    #[tokio::test]
    async fn terminate_stops_every_listener_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut running = start_supervisor(dir.path()).await;

        let http_port = running.ports[0].1;
        http_upload_scenario(loopback(http_port), dir.path()).await;

        signal(&running.child, "-TERM");
        let status = tokio::time::timeout(Duration::from_secs(15), running.child.wait())
            .await
            .expect("supervisor exits within the grace period")
            .unwrap();
        assert_eq!(status.code(), Some(0));

        wait_until_closed(&running.ports).await;
    }

    #[tokio::test]
    async fn interrupt_stops_every_listener_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut running = start_supervisor(dir.path()).await;

        signal(&running.child, "-INT");
        let status = tokio::time::timeout(Duration::from_secs(15), running.child.wait())
            .await
            .expect("supervisor exits after an interrupt")
            .unwrap();
        assert_eq!(status.code(), Some(0));

        wait_until_closed(&running.ports).await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn listeners_ignore_interrupts() {
        let dir = tempfile::tempdir().unwrap();
        let mut running = start_supervisor(dir.path()).await;

        let pids = listener_pids(&running.child);
        assert_eq!(pids.len(), running.ports.len(), "listener pids: {:?}", pids);
        for pid in &pids {
            signal_pid(*pid, "-INT");
        }
        sleep(Duration::from_millis(500)).await;

        for (protocol, port) in &running.ports {
            assert!(
                TcpStream::connect(loopback(*port)).await.is_ok(),
                "{} stopped serving after an interrupt",
                protocol
            );
        }
        http_upload_scenario(loopback(running.ports[0].1), dir.path()).await;
        assert!(running.child.try_wait().unwrap().is_none());

        // No listener exited, so the shutdown is clean.
        signal(&running.child, "-TERM");
        let status = tokio::time::timeout(Duration::from_secs(15), running.child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(0));
    }

    #[tokio::test]
    async fn terminate_during_upload_finishes_within_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let mut running = start_supervisor(dir.path()).await;
        let http_port = running.ports[0].1;

        let mut upload = connect(loopback(http_port)).await;
        upload
            .write_all(b"PUT /big HTTP/1.1\r\nHost: test\r\nContent-Length: 1000000\r\n\r\n")
            .await
            .unwrap();
        upload.write_all(&[7u8; 4096]).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !dir.path().join("big").exists() {
            assert!(Instant::now() < deadline, "upload never started");
            sleep(Duration::from_millis(20)).await;
        }

        let stopping = Instant::now();
        signal(&running.child, "-TERM");
        let status = tokio::time::timeout(Duration::from_secs(15), running.child.wait())
            .await
            .expect("supervisor exits")
            .unwrap();
        assert!(
            stopping.elapsed() < GRACE_PERIOD,
            "took {:?} to stop",
            stopping.elapsed()
        );
        assert_eq!(status.code(), Some(0));

        wait_until_closed(&running.ports[..1]).await;
        drop(upload);
    }

    #[tokio::test]
    async fn listeners_exit_when_supervisor_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let mut running = start_supervisor(dir.path()).await;

        signal(&running.child, "-KILL");
        let _ = running.child.wait().await;

        wait_until_closed(&running.ports).await;
    }

    #[tokio::test]
    async fn port_conflict_fails_one_listener_only() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind(loopback(0)).unwrap();
        let taken_port = taken.local_addr().unwrap().port();
        let http_port = free_ports(1)[0];

        let mut child = Command::new(env!("CARGO_BIN_EXE_rax-share"))
            .current_dir(dir.path())
            .arg("-d")
            .arg(dir.path())
            .args(["-l", "127.0.0.1", "--only", "http,ingest"])
            .args(["--http", &http_port.to_string()])
            .args(["--ingest", &taken_port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        // HTTP keeps serving although INGEST could not bind.
        http_upload_scenario(loopback(http_port), dir.path()).await;

        signal(&child, "-TERM");
        let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(1));
        drop(taken);
    }

    #[tokio::test]
    async fn invalid_directory_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let status = Command::new(env!("CARGO_BIN_EXE_rax-share"))
            .current_dir(dir.path())
            .arg("-d")
            .arg(dir.path().join("does-not-exist"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .unwrap();
        assert_eq!(status.code(), Some(2));
    }
}
