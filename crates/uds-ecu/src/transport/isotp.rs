//! ISO-TP transport over Linux SocketCAN
//!
//! A single physical tester address, so the whole bus shares one
//! [`EcuSession`]. The socket is polled non-blocking on a blocking task and
//! the loop stops when `running` is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socketcan::ExtendedId;
use socketcan_isotp::IsoTpSocket;
use tracing::{debug, error, info};
use uds_core::EcuSession;

use super::TransportError;

pub struct IsoTpServer {
    interface: String,
    rx_id: u32,
    tx_id: u32,
    session: Arc<EcuSession>,
    running: Arc<AtomicBool>,
}

impl IsoTpServer {
    /// `rx_id` is the ID the tester sends to, `tx_id` the ID the ECU answers from
    pub fn new(interface: &str, rx_id: u32, tx_id: u32, session: Arc<EcuSession>) -> Self {
        Self {
            interface: interface.to_string(),
            rx_id,
            tx_id,
            session,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag checked by the receive loop; clear it to stop
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    fn open(&self) -> Result<IsoTpSocket, TransportError> {
        let open_failed = |reason: String| TransportError::OpenFailed {
            interface: self.interface.clone(),
            reason,
        };

        let rx_id = ExtendedId::new(self.rx_id)
            .ok_or_else(|| TransportError::InvalidCanId(format!("0x{:X}", self.rx_id)))?;
        let tx_id = ExtendedId::new(self.tx_id)
            .ok_or_else(|| TransportError::InvalidCanId(format!("0x{:X}", self.tx_id)))?;

        let socket = IsoTpSocket::open(&self.interface, rx_id, tx_id)
            .map_err(|e| open_failed(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| open_failed(e.to_string()))?;
        Ok(socket)
    }

    /// Serve requests until [`running`](Self::running) is cleared
    pub async fn serve(&self) -> anyhow::Result<()> {
        let mut socket = self.open()?;
        let running = self.running();
        let session = Arc::clone(&self.session);

        info!(
            interface = %self.interface,
            rx_id = format!("0x{:08X}", self.rx_id),
            tx_id = format!("0x{:08X}", self.tx_id),
            "ISO-TP transport listening"
        );

        tokio::task::spawn_blocking(move || {
            while running.load(Ordering::SeqCst) {
                match socket.read() {
                    Ok(data) if !data.is_empty() => {
                        debug!(request = ?data, "Received UDS request");
                        let response = session.handle(data);

                        if !response.is_empty() {
                            debug!(response = ?response, "Sending UDS response");
                            if let Err(e) = socket.write(&response) {
                                error!(?e, "Failed to send response");
                            }
                        }
                    }
                    Ok(_) => std::thread::sleep(Duration::from_millis(1)),
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        error!(?e, "Socket read error");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        })
        .await?;

        info!("ISO-TP transport stopped");
        Ok(())
    }
}
