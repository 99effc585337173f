#[macro_use]
extern crate tracing;

mod conn;
mod config;
mod dialer;
mod error;
mod killswitch;
mod pool;
mod retry;
mod stats;
mod timeout;
mod transport;
mod usage;

pub use http;

pub use self::config::Config;
pub use self::error::Error;
pub use self::pool::TimedBody;
pub use self::stats::{AttemptStats, Observer, RetryState};
pub use self::transport::Transport;
