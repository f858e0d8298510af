//! Status collection: one fetch and decode per scrape.

use tracing::{debug, warn};

use crate::client::ProtocolClient;
use crate::protocol::{decode_status, StatusField, FIELD_COUNT};

/// Decoded result of one scrape. Never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    reachable: bool,
    fields: [i64; FIELD_COUNT],
}

impl StatusSnapshot {
    /// Snapshot for a target that could not be read. All fields are 0.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            fields: [0; FIELD_COUNT],
        }
    }

    /// Snapshot decoded from a complete status payload.
    pub fn from_payload(payload: &str) -> Self {
        Self {
            reachable: true,
            fields: decode_status(payload),
        }
    }

    pub fn reachable(&self) -> bool {
        self.reachable
    }

    pub fn get(&self, field: StatusField) -> i64 {
        self.fields[field.index()]
    }

    /// Fields paired with their values, in payload order.
    pub fn iter(&self) -> impl Iterator<Item = (StatusField, i64)> + '_ {
        StatusField::ALL.iter().map(|&field| (field, self.get(field)))
    }
}

/// Collects a [`StatusSnapshot`] from one target.
#[derive(Debug, Clone)]
pub struct StatusCollector {
    address: String,
    client: ProtocolClient,
}

impl StatusCollector {
    pub fn new(address: impl Into<String>, client: ProtocolClient) -> Self {
        Self {
            address: address.into(),
            client,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Run one exchange against the target and decode the result.
    ///
    /// Any transport failure yields [`StatusSnapshot::unreachable`].
    pub async fn collect(&self) -> StatusSnapshot {
        match self.client.fetch(&self.address).await {
            Ok(payload) => StatusSnapshot::from_payload(&payload),
            Err(e) => {
                debug!(
                    server = %self.address,
                    error = %e,
                    partial = e.partial_payload().unwrap_or_default(),
                    "Status fetch failed"
                );
                warn!(server = %self.address, "Status server unreachable");
                StatusSnapshot::unreachable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Start a server that answers every connection with `payload`.
    async fn start_status_server(payload: &'static [u8], declared: u8) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut handshake = [0u8; 1];
                    let mut request = [0u8; 5];
                    stream.read_exact(&mut handshake).await?;
                    stream.write_all(&[0x01]).await?;
                    stream.read_exact(&mut request).await?;
                    stream.write_all(&[declared]).await?;
                    stream.write_all(payload).await?;
                    Ok::<_, std::io::Error>(())
                });
            }
        });

        addr
    }

    fn collector(addr: String) -> StatusCollector {
        StatusCollector::new(addr, ProtocolClient::new(Duration::from_secs(2)))
    }

    #[test]
    fn test_unreachable_snapshot_is_zeroed() {
        let snapshot = StatusSnapshot::unreachable();
        assert!(!snapshot.reachable());
        assert!(snapshot.iter().all(|(_, value)| value == 0));
        assert_eq!(snapshot.iter().count(), FIELD_COUNT);
    }

    #[test]
    fn test_snapshot_from_payload() {
        let snapshot = StatusSnapshot::from_payload("3;10;2;0;0;0;0;0;0;0;0");
        assert!(snapshot.reachable());
        assert_eq!(snapshot.get(StatusField::QueryQueueSize), 3);
        assert_eq!(snapshot.get(StatusField::DatabaseConnectionsMax), 10);
        assert_eq!(snapshot.get(StatusField::DatabaseConnectionsActive), 2);
        for field in &StatusField::ALL[3..] {
            assert_eq!(snapshot.get(*field), 0);
        }
    }

    #[tokio::test]
    async fn test_collect_decodes_payload() {
        let payload = b"3;10;2;0;0;0;0;0;0;0;0";
        let addr = start_status_server(payload, payload.len() as u8).await;

        let snapshot = collector(addr).collect().await;
        assert_eq!(snapshot, StatusSnapshot::from_payload("3;10;2;0;0;0;0;0;0;0;0"));
        assert_eq!(snapshot.get(StatusField::QueryQueueSize), 3);
    }

    #[tokio::test]
    async fn test_collect_non_numeric_field() {
        let payload = b"x;10;2;0;0;0;0;0;0;0;0";
        let addr = start_status_server(payload, payload.len() as u8).await;

        let snapshot = collector(addr).collect().await;
        assert!(snapshot.reachable());
        assert_eq!(snapshot.get(StatusField::QueryQueueSize), 0);
        assert_eq!(snapshot.get(StatusField::DatabaseConnectionsMax), 10);
        assert_eq!(snapshot.get(StatusField::DatabaseConnectionsActive), 2);
    }

    #[tokio::test]
    async fn test_collect_short_read_is_unreachable() {
        let addr = start_status_server(b"3;10;2", 22).await;

        let snapshot = collector(addr).collect().await;
        assert_eq!(snapshot, StatusSnapshot::unreachable());
    }

    #[tokio::test]
    async fn test_collect_connect_error_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let snapshot = collector(addr).collect().await;
        assert_eq!(snapshot, StatusSnapshot::unreachable());
    }

    #[tokio::test]
    async fn test_collect_is_idempotent() {
        let payload = b"7;32;5;4;2;1;100;8;3;0;250";
        let addr = start_status_server(payload, payload.len() as u8).await;
        let collector = collector(addr);

        let first = collector.collect().await;
        let second = collector.collect().await;
        let third = collector.collect().await;
        assert!(first.reachable());
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(first.get(StatusField::ThreadpoolDatabaseTotal), 250);
    }
}
