pub use video_tokio_transport::TokioWebSocketTransportFactory;
pub use videocore::net::{NORMAL_CLOSURE, Transport, TransportEvent, TransportFactory};

#[cfg(test)]
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc};
    use videocore::codec::{
        CallSnapshot, HealthCheckResponse, JoinResponse, ParticipantCount, SfuDataEvent,
        SfuRequest, decode_request, encode_event,
    };

    /// One connection handed out by [`MockTransportFactory`].
    pub struct MockConnection {
        pub url: String,
        events: mpsc::Sender<TransportEvent>,
        sent: Mutex<Vec<Vec<u8>>>,
        closed: AtomicBool,
        auto_join: bool,
        answer_health_checks: bool,
    }

    impl MockConnection {
        pub fn push_event(&self, event: &SfuDataEvent) {
            let frame = encode_event(event).unwrap();
            self.push_raw(frame);
        }

        pub fn push_raw(&self, frame: Vec<u8>) {
            let _ = self
                .events
                .try_send(TransportEvent::DataReceived(Bytes::from(frame)));
        }

        /// Simulates the server or the network closing the connection.
        pub fn close(&self, code: Option<u16>) {
            let _ = self.events.try_send(TransportEvent::Disconnected {
                code,
                reason: "closed by test".to_string(),
            });
        }

        pub fn sent_requests(&self) -> Vec<SfuRequest> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|frame| decode_request(frame).unwrap())
                .collect()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockConnection {
        async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error> {
            if self.is_closed() {
                anyhow::bail!("mock connection is closed");
            }
            self.sent.lock().unwrap().push(data.to_vec());
            match decode_request(data) {
                Ok(SfuRequest::Join(_)) if self.auto_join => {
                    self.push_event(&SfuDataEvent::JoinResponse(JoinResponse {
                        call_state: Some(CallSnapshot {
                            participant_count: Some(ParticipantCount {
                                total: 2,
                                anonymous: 0,
                            }),
                            ..Default::default()
                        }),
                        reconnected: false,
                        fast_reconnect_deadline_seconds: 30,
                    }));
                }
                Ok(SfuRequest::HealthCheck(_)) if self.answer_health_checks => {
                    self.push_event(&SfuDataEvent::HealthCheckResponse(
                        HealthCheckResponse::default(),
                    ));
                }
                _ => {}
            }
            Ok(())
        }

        async fn disconnect(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Script {
        fail_next: usize,
        attempts: usize,
        connect_delay: Duration,
        auto_join: bool,
        answer_health_checks: bool,
        connections: Vec<Arc<MockConnection>>,
    }

    /// Scriptable factory: fails on demand, records every connection it opens
    /// and answers join and health-check requests unless told otherwise.
    pub struct MockTransportFactory {
        script: Mutex<Script>,
        opened: Notify,
    }

    impl Default for MockTransportFactory {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransportFactory {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(Script {
                    fail_next: 0,
                    attempts: 0,
                    connect_delay: Duration::ZERO,
                    auto_join: true,
                    answer_health_checks: true,
                    connections: Vec::new(),
                }),
                opened: Notify::new(),
            }
        }

        pub fn fail_next(&self, count: usize) {
            self.script.lock().unwrap().fail_next = count;
        }

        pub fn set_connect_delay(&self, delay: Duration) {
            self.script.lock().unwrap().connect_delay = delay;
        }

        pub fn set_auto_join(&self, enabled: bool) {
            self.script.lock().unwrap().auto_join = enabled;
        }

        pub fn set_answer_health_checks(&self, enabled: bool) {
            self.script.lock().unwrap().answer_health_checks = enabled;
        }

        /// Every `create_transport` call, failed ones included.
        pub fn attempts(&self) -> usize {
            self.script.lock().unwrap().attempts
        }

        pub fn connections(&self) -> Vec<Arc<MockConnection>> {
            self.script.lock().unwrap().connections.clone()
        }

        pub fn connection(&self, index: usize) -> Arc<MockConnection> {
            self.connections()[index].clone()
        }

        pub async fn wait_for_connections(&self, count: usize) {
            loop {
                let opened = self.opened.notified();
                if self.connections().len() >= count {
                    return;
                }
                opened.await;
            }
        }
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn create_transport(
            &self,
            url: &str,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            let delay = {
                let mut script = self.script.lock().unwrap();
                script.attempts += 1;
                script.connect_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let (tx, rx) = mpsc::channel(100);
            let connection = {
                let mut script = self.script.lock().unwrap();
                if script.fail_next > 0 {
                    script.fail_next -= 1;
                    anyhow::bail!("connection refused");
                }
                let connection = Arc::new(MockConnection {
                    url: url.to_string(),
                    events: tx.clone(),
                    sent: Mutex::new(Vec::new()),
                    closed: AtomicBool::new(false),
                    auto_join: script.auto_join,
                    answer_health_checks: script.answer_health_checks,
                });
                script.connections.push(connection.clone());
                connection
            };
            let _ = tx.try_send(TransportEvent::Connected);
            self.opened.notify_waiters();
            Ok((connection, rx))
        }
    }
}
