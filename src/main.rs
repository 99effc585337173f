mod args;

use anyhow::{Context, Result};
use clap::Parser;
use httpcontrol_core::{AttemptStats, Config, Transport};
use hyper::body::{Bytes, HttpBody};

use crate::args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = Config {
        connect_timeout: args.dial_timeout,
        response_header_timeout: args.response_header_timeout,
        request_timeout: args.request_timeout,
        max_tries: args.max_tries,
        disable_keep_alives: args.disable_keep_alives,
        stats: Some(std::sync::Arc::new(report_attempt)),
        ..Config::default()
    };

    let transport = Transport::new(config);

    let request = http::Request::builder()
        .method(args.method)
        .uri(args.url)
        .body(Bytes::new())
        .context("building request")?;

    let response = transport.round_trip(request).await.context("request failed")?;
    let status = response.status();

    let (_, mut body) = response.into_parts();
    let mut received = 0usize;
    while let Some(chunk) = body.data().await {
        received += chunk.context("reading response body")?.len();
    }

    println!("{status} ({received} bytes)");
    transport.close();
    Ok(())
}

fn report_attempt(stats: &AttemptStats<'_>) {
    match (stats.response, stats.error) {
        (Some(response), _) => {
            println!("attempt {}: {} in {:?}", stats.retry.count, response.status, stats.duration);
        },
        (None, Some(error)) => {
            println!(
                "attempt {}: {error} in {:?} (retrying: {})",
                stats.retry.count, stats.duration, stats.retry.pending
            );
        },
        (None, None) => unreachable!("an attempt always has a response or an error"),
    }
}
