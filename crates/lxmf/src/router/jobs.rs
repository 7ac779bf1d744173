//! Background tasks a running `Router` needs (§5 "LXMRouter: outbound
//! processor"): a periodic drain of `pending_outbound`, mirroring
//! `reticulum::transport::jobs`'s `tokio::select!`-against-cancellation
//! idiom.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reticulum::transport::TransportEvent;

use super::{Router, RouterEvent};

const INTERVAL_OUTBOUND_PROCESSOR: Duration = Duration::from_secs(1);

/// Spawn the outbound processor loop and a task that folds `Transport`
/// events into the router (announce wake-ups, link data, resource
/// completions). Returns both handles so the caller can `abort()` them for
/// a faster shutdown than waiting on `cancel` alone.
pub fn spawn(
    router: Router,
    transport_events: tokio::sync::mpsc::Receiver<TransportEvent>,
    on_event: impl Fn(RouterEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let on_event = std::sync::Arc::new(on_event);

    vec![
        spawn_outbound_processor(router.clone(), on_event.clone(), cancel.clone()),
        spawn_transport_event_loop(router, transport_events, on_event, cancel),
    ]
}

fn spawn_outbound_processor(
    router: Router,
    on_event: std::sync::Arc<impl Fn(RouterEvent) + Send + Sync + 'static>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(INTERVAL_OUTBOUND_PROCESSOR) => {
                    for event in router.process_outbound() {
                        on_event(event);
                    }
                }
            }
        }
    })
}

fn spawn_transport_event_loop(
    router: Router,
    mut transport_events: tokio::sync::mpsc::Receiver<TransportEvent>,
    on_event: std::sync::Arc<impl Fn(RouterEvent) + Send + Sync + 'static>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = transport_events.recv() => {
                    let Some(event) = event else { break };
                    for router_event in router.handle_transport_event(&event) {
                        on_event(router_event);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reticulum::hash::AddressHash;
    use reticulum::identity::PrivateIdentity;
    use reticulum::transport::config::TransportConfig;
    use reticulum::transport::Transport;

    #[tokio::test]
    async fn cancelling_token_stops_both_spawned_tasks() {
        let transport = Transport::with_config(AddressHash::digest(b"node"), TransportConfig::default());
        let router = Router::new(transport, PrivateIdentity::new_random()).expect("router");
        let (_tx, rx) = tokio::sync::mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handles = spawn(router, rx, |_event| {}, cancel.clone());
        cancel.cancel();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle).await.expect("task exited in time").unwrap();
        }
    }
}
