//! Liveness monitor
//!
//! Periodically sweeps the peer table and reports transitions as a single
//! aggregated peer-list update.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::PeerTable;
use crate::events::EventSink;

/// Periodic Online -> Offline sweep
pub struct LivenessMonitor {
    table: Arc<PeerTable>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    offline_after: Duration,
}

impl LivenessMonitor {
    pub fn new(
        table: Arc<PeerTable>,
        sink: Arc<dyn EventSink>,
        interval: Duration,
        offline_after: Duration,
    ) -> Self {
        Self {
            table,
            sink,
            interval,
            offline_after,
        }
    }

    /// Run one sweep; returns whether any peer went offline
    pub async fn sweep_once(&self) -> bool {
        let gone = self.table.sweep(self.offline_after);
        if gone.is_empty() {
            return false;
        }

        for record in &gone {
            tracing::info!("Peer {} ({}) went offline", record.display_name, record.key());
            self.sink
                .on_log(format!("Peer {} went offline", record.display_name))
                .await;
        }

        // One update per sweep, however many peers changed
        self.sink.on_peer_list_update(self.table.snapshot()).await;
        true
    }

    /// Sweep on a fixed interval until the running flag clears
    pub async fn run(self, mut running: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.interval);
        // The first tick completes immediately
        timer.tick().await;

        while *running.borrow() {
            tokio::select! {
                _ = timer.tick() => {
                    self.sweep_once().await;
                }
                changed = running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Liveness monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, EngineEvent};
    use std::net::SocketAddr;

    #[tokio::test]
    async fn test_one_aggregated_update_per_sweep() {
        let table = Arc::new(PeerTable::new());
        for port in 6000..6003 {
            table.upsert(SocketAddr::from(([10, 0, 0, 1], port)), "p");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        table.upsert(SocketAddr::from(([10, 0, 0, 2], 6000)), "fresh");

        let (sink, mut rx) = ChannelSink::new(32);
        let monitor = LivenessMonitor::new(
            table.clone(),
            Arc::new(sink),
            Duration::from_secs(2),
            Duration::from_millis(50),
        );

        assert!(monitor.sweep_once().await);
        drop(monitor);

        let mut logs = 0;
        let mut updates = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Log(_) => logs += 1,
                EngineEvent::PeerListUpdate(peers) => updates.push(peers),
                EngineEvent::Message(_) => panic!("unexpected message"),
            }
        }
        assert_eq!(logs, 3);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].len(), 4);
        assert_eq!(updates[0].iter().filter(|p| p.is_online()).count(), 1);
    }

    #[tokio::test]
    async fn test_quiet_sweep_emits_nothing() {
        let table = Arc::new(PeerTable::new());
        table.upsert(SocketAddr::from(([10, 0, 0, 3], 6000)), "live");

        let (sink, mut rx) = ChannelSink::new(8);
        let monitor = LivenessMonitor::new(
            table,
            Arc::new(sink),
            Duration::from_secs(2),
            Duration::from_secs(15),
        );

        assert!(!monitor.sweep_once().await);
        drop(monitor);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_when_flag_clears() {
        let (sink, _rx) = ChannelSink::new(8);
        let monitor = LivenessMonitor::new(
            Arc::new(PeerTable::new()),
            Arc::new(sink),
            Duration::from_millis(10),
            Duration::from_secs(15),
        );
        let (running_tx, running_rx) = watch::channel(true);
        let task = tokio::spawn(monitor.run(running_rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        running_tx.send(false).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
