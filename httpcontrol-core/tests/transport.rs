use std::io::{Read, Write};
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use http::{Method, Request, Uri};
use httpcontrol_core::{AttemptStats, Config, Transport};
use hyper::body::{Bytes, HttpBody};

fn get_uri(addr: &str, path: &str) -> Uri {
    Uri::builder().scheme("http").authority(addr).path_and_query(path).build().expect("build uri")
}

fn request(method: Method, uri: Uri) -> Request<Bytes> {
    Request::builder().method(method).uri(uri).body(Bytes::new()).expect("build request")
}

async fn drain(mut body: impl HttpBody<Data = Bytes, Error = hyper::Error> + Unpin) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.data().await {
        out.extend_from_slice(&chunk.expect("read body chunk"));
    }
    out
}

#[tokio::test]
async fn successful_round_trip_reads_full_body() {
    let _ = tracing_subscriber::fmt::try_init();

    static ADDR: &str = "127.0.0.1:19801";
    tokio::spawn(async {
        let app = Router::new().route("/", get(|| async { "hello" }));
        axum::Server::bind(&ADDR.parse().unwrap()).serve(app.into_make_service()).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let transport = Transport::new(Config::default());
    let response = transport.round_trip(request(Method::GET, get_uri(ADDR, "/"))).await.expect("request succeeds");
    assert_eq!(response.status(), 200);

    let (_, body) = response.into_parts();
    assert_eq!(drain(body).await, b"hello");

    transport.close();
}

#[tokio::test]
async fn server_error_status_is_not_retried() {
    let _ = tracing_subscriber::fmt::try_init();

    static ADDR: &str = "127.0.0.1:19802";
    tokio::spawn(async {
        let app = Router::new().route(
            "/",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "broken") }),
        );
        axum::Server::bind(&ADDR.parse().unwrap()).serve(app.into_make_service()).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let config = Config {
        max_tries: 3,
        stats: Some(Arc::new(move |stats: &AttemptStats<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(stats.error.is_none(), "a 5xx status is a response, not a transport error");
        })),
        ..Config::default()
    };

    let transport = Transport::new(config);
    let response = transport.round_trip(request(Method::GET, get_uri(ADDR, "/"))).await.expect("request succeeds");
    assert_eq!(response.status(), 500);
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "a 5xx body is a successful attempt, never retried");

    transport.close();
}

#[tokio::test]
async fn connection_refused_retries_idempotent_method_up_to_max_tries() {
    let _ = tracing_subscriber::fmt::try_init();

    // Bind then immediately drop, so the port is refusing connections.
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let config = Config {
        max_tries: 3,
        stats: Some(Arc::new(move |_: &AttemptStats<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        ..Config::default()
    };

    let transport = Transport::new(config);
    let err =
        transport.round_trip(request(Method::GET, get_uri(&addr.to_string(), "/"))).await.expect_err("refused");
    assert!(err.to_string().contains("dial"), "connect errors mention dialing: {err}");
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "GET is idempotent, retried to the cap");

    transport.close();
}

#[tokio::test]
async fn connection_refused_is_not_retried_for_post() {
    let _ = tracing_subscriber::fmt::try_init();

    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let config = Config {
        max_tries: 3,
        stats: Some(Arc::new(move |_: &AttemptStats<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        ..Config::default()
    };

    let transport = Transport::new(config);
    let _ = transport.round_trip(request(Method::POST, get_uri(&addr.to_string(), "/"))).await.expect_err("refused");
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "POST is never retried automatically");

    transport.close();
}

/// A bare listener that accepts the connection but never writes a
/// response, used to exercise the header timer without any HTTP
/// framework in the way.
fn spawn_silent_server() -> std::net::SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 1024];
            // Read the request so the peer doesn't see a reset, then
            // go silent forever instead of writing a response.
            let _ = stream.read(&mut buf);
            std::thread::sleep(Duration::from_secs(30));
        }
    });
    addr
}

#[tokio::test]
async fn response_header_timeout_force_closes_and_is_reported() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_silent_server();

    let config = Config { response_header_timeout: Some(Duration::from_millis(80)), ..Config::default() };
    let transport = Transport::new(config);

    let start = std::time::Instant::now();
    let err = transport
        .round_trip(request(Method::GET, get_uri(&addr.to_string(), "/")))
        .await
        .expect_err("server never responds");
    assert!(start.elapsed() < Duration::from_secs(5), "the timer, not the OS, ended the attempt");
    assert!(err.to_string().contains("use of closed network connection"));

    transport.close();
}

/// A listener that writes a valid status line and headers for a
/// large body, then a few bytes of body, then stalls — so a header
/// timer is satisfied but a whole-request timer is not.
fn spawn_stalling_body_server() -> std::net::SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n");
            let _ = stream.write_all(b"partial");
            let _ = stream.flush();
            std::thread::sleep(Duration::from_secs(30));
        }
    });
    addr
}

#[tokio::test]
async fn whole_request_timeout_fires_while_reading_body_and_is_not_retried() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = spawn_stalling_body_server();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let config = Config {
        request_timeout: Some(Duration::from_millis(150)),
        max_tries: 3,
        stats: Some(Arc::new(move |_: &AttemptStats<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        ..Config::default()
    };
    let transport = Transport::new(config);

    let response = transport
        .round_trip(request(Method::GET, get_uri(&addr.to_string(), "/")))
        .await
        .expect("headers arrive before the body stalls");

    let (_, body) = response.into_parts();
    let mut body = body;
    let mut read_err = None;
    while let Some(chunk) = body.data().await {
        if let Err(e) = chunk {
            read_err = Some(e);
            break;
        }
    }
    assert!(read_err.is_some(), "the stalled body read should fail once the request timer fires");
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "a body-phase timeout is never retried");

    transport.close();
}
