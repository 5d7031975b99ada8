//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use latency_proxy::config::{BackendConfig, ProxyConfig};
use latency_proxy::http::HttpServer;
use latency_proxy::lifecycle::Shutdown;
use latency_proxy::probe::LatencyProber;
use latency_proxy::upstream::backend::Backend;
use latency_proxy::upstream::selection::select_fastest;
use latency_proxy::upstream::snapshot::SelectedBackend;

/// Probe path used by all test configs. Mocks that simulate failures
/// still answer it so they survive startup probing.
pub const PROBE_PATH: &str = "/healthz";

/// Read one HTTP/1.1 request off the socket: returns (head, body).
pub async fn read_http_request(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];

    let header_end = loop {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&tmp[..n]);
    }

    Some((head, body))
}

/// Write a complete HTTP/1.1 response and close the connection.
pub async fn write_response(socket: &mut TcpStream, status: u16, body: &[u8]) {
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nx-upstream: mock\r\nConnection: close\r\n\r\n",
        status_text,
        body.len()
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(body).await;
    let _ = socket.shutdown().await;
}

/// Mock backend that answers every request with 200 and `body`, after
/// `delay`. The delay also applies to probes, which is what makes it a
/// slow candidate.
pub async fn start_mock_backend(delay: Duration, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        if read_http_request(&mut socket).await.is_none() {
                            return;
                        }
                        tokio::time::sleep(delay).await;
                        write_response(&mut socket, 200, body.as_bytes()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Programmable mock backend: `f` decides (status, body) per request.
/// Probe requests are answered directly and never reach `f`.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some((head, _)) = read_http_request(&mut socket).await else {
                            return;
                        };
                        if head.starts_with(&format!("GET {PROBE_PATH}")) {
                            write_response(&mut socket, 200, b"probe").await;
                            return;
                        }
                        let (status, body) = f().await;
                        write_response(&mut socket, status, body.as_bytes()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Mock backend that abruptly closes the first `failures` proxied
/// connections without sending a response, then serves 200 "ok".
/// Probe requests always succeed and are not counted.
#[allow(dead_code)]
pub async fn start_flaky_backend(failures: u32) -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        let Some((head, _)) = read_http_request(&mut socket).await else {
                            return;
                        };
                        if head.starts_with(&format!("GET {PROBE_PATH}")) {
                            write_response(&mut socket, 200, b"probe").await;
                            return;
                        }
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        if n <= failures {
                            // Close before any response bytes: a transport
                            // failure from the proxy's point of view.
                            drop(socket);
                        } else {
                            write_response(&mut socket, 200, b"ok").await;
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, attempts)
}

/// Mock backend that echoes the request head and body back in the
/// response body.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let Some((head, body)) = read_http_request(&mut socket).await else {
                            return;
                        };
                        let mut echo = head.into_bytes();
                        echo.extend_from_slice(&body);
                        write_response(&mut socket, 200, &echo).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Mock backend that consumes the request body and responds with the
/// number of body bytes received.
#[allow(dead_code)]
pub async fn start_sink_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let Some((_, body)) = read_http_request(&mut socket).await else {
                            return;
                        };
                        let count = body.len().to_string();
                        write_response(&mut socket, 200, count.as_bytes()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A test config pointing at the given backends, listening on an
/// ephemeral port.
pub fn proxy_config(backend_addrs: &[SocketAddr]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.probe.path = PROBE_PATH.to_string();
    config.probe.timeout_ms = 2000;
    for (i, addr) in backend_addrs.iter().enumerate() {
        config.backends.push(BackendConfig {
            name: format!("b{}", i + 1),
            address: format!("http://{addr}"),
        });
    }
    config
}

/// Probe, select, and serve: the startup sequence under test, on an
/// ephemeral port. Returns the proxy address and the shutdown handle
/// the test must keep alive.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let backends: Vec<Arc<Backend>> = config
        .backends
        .iter()
        .map(|b| Arc::new(Backend::new(&b.name, &b.address).unwrap()))
        .collect();

    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
    let client: Client<HttpConnector, Body> =
        Client::builder(TokioExecutor::new()).build(connector);

    let prober = LatencyProber::new(client.clone(), &config.probe);
    let results = prober.probe_all(&backends).await;
    let chosen = select_fastest(&results, config.selection.on_all_unreachable).unwrap();
    let selected = Arc::new(SelectedBackend::new(chosen));

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = HttpServer::new(&config, selected, client);
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (addr, shutdown)
}
