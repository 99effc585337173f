use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::Error;
use crate::killswitch::KillSwitch;

/// Establishes a single TCP connection with a bounded connect
/// deadline.
///
/// A successful connection is returned with no further deadlines
/// set — those are imposed later by the Timeout Controller. The raw
/// socket is published to `kill` before this returns, so the
/// controller can force-close it without needing mutable access to
/// the live stream.
pub(crate) async fn dial(
    addr: SocketAddr,
    connect_timeout: Option<Duration>,
    kill: &KillSwitch,
) -> Result<TcpStream, Error> {
    let connect = TcpStream::connect(addr);

    let stream = match connect_timeout {
        Some(dur) => match timeout(dur, connect).await {
            Ok(result) => result.map_err(|e| Error::connect(addr, e))?,
            Err(_) => {
                return Err(Error::connect(
                    addr,
                    io_timeout("i/o timeout"),
                ));
            },
        },
        None => connect.await.map_err(|e| Error::connect(addr, e))?,
    };

    publish(stream, kill).map_err(|e| Error::connect(addr, e))
}

fn io_timeout(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, msg)
}

/// Duplicates the stream's raw socket into the kill switch, then
/// rewraps the original stream for async use.
fn publish(stream: TcpStream, kill: &KillSwitch) -> std::io::Result<TcpStream> {
    let _ = stream.set_nodelay(true);

    let std_stream = stream.into_std()?;
    let clone = std_stream.try_clone()?;
    kill.bind(clone);

    std_stream.set_nonblocking(true)?;
    TcpStream::from_std(std_stream)
}
