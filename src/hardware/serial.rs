// src/hardware/serial.rs - Serial link to the roaster controller board
use super::protocol::{self, LineBuffer, Request};
use async_trait::async_trait;
use roastero_shared::{HardwareError, RoasterHardware, SerialConfig};
use serial2_tokio::SerialPort;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Byte stream to the controller board.
trait BoardStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> BoardStream for T {}

/// Open port plus any bytes read past the last complete response.
struct Link {
    port: Box<dyn BoardStream>,
    pending: LineBuffer,
}

impl Link {
    fn new(port: impl BoardStream + 'static) -> Self {
        Self { port: Box::new(port), pending: LineBuffer::new() }
    }
}

/// Roaster reached over a serial port. Every exchange is bounded by
/// `response_timeout`. The protocol carries no request ids, so any failure
/// that can leave a reply in flight drops the link and the next `connect`
/// reopens the port.
pub struct SerialRoaster {
    port_name: String,
    baud: u32,
    response_timeout: Duration,
    link: Mutex<Option<Link>>,
}

impl SerialRoaster {
    pub fn new(port_name: &str, baud: u32, response_timeout: Duration) -> Self {
        Self {
            port_name: port_name.to_string(),
            baud,
            response_timeout,
            link: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(&config.port, config.baud, config.io_timeout())
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Already attached to `stream`, as if `connect` had succeeded.
    #[cfg(test)]
    fn attached(stream: impl BoardStream + 'static, response_timeout: Duration) -> Self {
        let roaster = Self::new("attached", 115200, response_timeout);
        *roaster.link.try_lock().expect("fresh link lock") = Some(Link::new(stream));
        roaster
    }

    /// Send `request` and parse its reply.
    async fn exchange<T>(
        &self,
        request: Request,
        parse: fn(&str) -> Result<T, HardwareError>,
    ) -> Result<T, HardwareError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(HardwareError::NotConnected)?;

        let result = match timeout(self.response_timeout, Self::round_trip(link, request)).await {
            Ok(result) => result.and_then(|line| parse(&line)),
            Err(_) => Err(HardwareError::Timeout),
        };
        match result {
            Ok(value) => Ok(value),
            // The board answered and is in step with us.
            Err(e @ HardwareError::Rejected(_)) => Err(e),
            Err(e) => {
                // A late or unexpected reply would be taken as the answer to
                // the next request.
                tracing::warn!("Serial exchange on {} failed: {}; closing port", self.port_name, e);
                *guard = None;
                Err(e)
            }
        }
    }

    async fn round_trip(link: &mut Link, request: Request) -> Result<String, HardwareError> {
        let frame = request.encode();
        tracing::trace!("Roaster <- {}", frame.trim_end());
        let bytes = frame.as_bytes();
        let mut written = 0;
        while written < bytes.len() {
            match link.port.write(&bytes[written..]).await? {
                0 => {
                    return Err(HardwareError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "serial port accepted no bytes",
                    )));
                }
                n => written += n,
            }
        }
        link.port.flush().await?;

        let mut buf = [0u8; 64];
        loop {
            if let Some(line) = link.pending.next_line() {
                tracing::trace!("Roaster -> {}", line);
                return Ok(line);
            }
            let n = link.port.read(&mut buf).await?;
            if n == 0 {
                return Err(HardwareError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "serial port closed",
                )));
            }
            link.pending.extend(&buf[..n]);
        }
    }
}

#[async_trait]
impl RoasterHardware for SerialRoaster {
    async fn connect(&self) -> Result<(), HardwareError> {
        let mut guard = self.link.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        tracing::info!("Connecting to roaster on {} at {} baud", self.port_name, self.baud);
        let port = SerialPort::open(&self.port_name, self.baud)?;
        *guard = Some(Link::new(port));
        tracing::info!("Connected to roaster successfully");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HardwareError> {
        let mut guard = self.link.lock().await;
        if guard.take().is_some() {
            tracing::info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }

    async fn read_current_temperature(&self) -> Result<i32, HardwareError> {
        self.exchange(Request::ReadTemp, protocol::parse_temperature).await
    }

    async fn read_connection_status(&self) -> Result<bool, HardwareError> {
        self.exchange(Request::ReadStatus, protocol::parse_status).await
    }

    async fn send_power(&self, level: u8) -> Result<(), HardwareError> {
        self.exchange(Request::SetPower(level), protocol::parse_ack).await
    }

    async fn send_igniter_state(&self, on: bool) -> Result<(), HardwareError> {
        self.exchange(Request::SetIgniter(on), protocol::parse_ack).await
    }

    async fn send_fan_speed(&self, speed: u8) -> Result<(), HardwareError> {
        self.exchange(Request::SetFan(speed), protocol::parse_ack).await
    }
}

impl std::fmt::Debug for SerialRoaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRoaster")
            .field("port_name", &self.port_name)
            .field("baud", &self.baud)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calls_before_connect_report_not_connected() {
        let roaster = SerialRoaster::new("/dev/null-roaster", 115200, Duration::from_millis(50));
        assert!(matches!(
            roaster.read_current_temperature().await,
            Err(HardwareError::NotConnected)
        ));
        assert!(matches!(roaster.send_power(0).await, Err(HardwareError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_to_missing_port_fails() {
        let roaster = SerialRoaster::new("/dev/does-not-exist-roaster", 115200, Duration::from_millis(50));
        assert!(matches!(roaster.connect().await, Err(HardwareError::Io(_))));
        assert!(roaster.disconnect().await.is_ok());
    }

    /// Answers each request line with the matching scripted reply.
    async fn scripted_board(board: tokio::io::DuplexStream, replies: Vec<&'static str>) {
        let (read, mut write) = tokio::io::split(board);
        let mut lines = tokio::io::AsyncBufReadExt::lines(tokio::io::BufReader::new(read));
        for reply in replies {
            if lines.next_line().await.unwrap().is_none() {
                return;
            }
            write.write_all(reply.as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_exchanges_over_attached_stream() {
        let (host, board) = tokio::io::duplex(256);
        let roaster = SerialRoaster::attached(host, Duration::from_secs(1));
        let board = tokio::spawn(scripted_board(
            board,
            vec!["TEMP 372\n", "STATUS OK\n", "ok\n", "error fan stalled\n", "ok\n"],
        ));

        assert_eq!(roaster.read_current_temperature().await.unwrap(), 372);
        assert!(roaster.read_connection_status().await.unwrap());
        roaster.send_power(55).await.unwrap();
        // A rejected command keeps the link.
        assert!(matches!(roaster.send_fan_speed(4).await, Err(HardwareError::Rejected(_))));
        roaster.send_igniter_state(true).await.unwrap();
        board.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_not_taken_for_the_next_answer() {
        let (host, mut board) = tokio::io::duplex(256);
        let roaster = SerialRoaster::attached(host, Duration::from_millis(50));

        assert!(matches!(roaster.read_current_temperature().await, Err(HardwareError::Timeout)));
        // The host side is already closed, so this write may fail.
        let _ = board.write_all(b"TEMP 372\n").await;

        // The stale reply must not answer READ STATUS; the link is gone instead.
        assert!(matches!(roaster.read_connection_status().await, Err(HardwareError::NotConnected)));
    }

    #[tokio::test]
    async fn test_unexpected_reply_drops_link() {
        let (host, board) = tokio::io::duplex(256);
        let roaster = SerialRoaster::attached(host, Duration::from_secs(1));
        let board = tokio::spawn(scripted_board(board, vec!["STATUS OK\n"]));

        assert!(matches!(roaster.read_current_temperature().await, Err(HardwareError::Protocol(_))));
        assert!(matches!(roaster.send_power(0).await, Err(HardwareError::NotConnected)));
        board.await.unwrap();
    }
}
