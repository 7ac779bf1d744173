//! Long-lived background tasks Transport runs: inbound dispatch, link
//! liveness, interface cleanup, packet-cache/path eviction, announce
//! retransmit, and resource retry. Each loop is `tokio::select!`ed against a
//! shared `CancellationToken` so a parent cancel drains every task well
//! within the one-second shutdown budget.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::iface::RxMessage;
use crate::resource::manager::ResourceEvent;

use super::{Transport, TransportEvent};

const INTERVAL_LINKS_CHECK: Duration = Duration::from_secs(1);
const INTERVAL_OUTPUT_LINK_KEEP: Duration = Duration::from_secs(5);
const INTERVAL_IFACE_CLEANUP: Duration = Duration::from_secs(10);
const INTERVAL_ANNOUNCES_RETRANSMIT: Duration = Duration::from_secs(1);
const INTERVAL_TRIM_MEMORY: Duration = Duration::from_secs(90);
const INTERVAL_RESOURCE_RETRY: Duration = Duration::from_secs(10);

/// Spawn every background task and return their handles, so the caller can
/// `tokio::join!`/`abort()` them directly if it needs to wait for or force a
/// faster teardown than the cancellation token alone provides.
pub fn spawn(
    transport: Transport,
    inbound_rx: Receiver<RxMessage>,
    on_event: impl Fn(TransportEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let on_event = std::sync::Arc::new(on_event);

    vec![
        spawn_inbound_dispatch(transport.clone(), inbound_rx, on_event.clone(), cancel.clone()),
        spawn_link_check(transport.clone(), on_event.clone(), cancel.clone()),
        spawn_link_keepalive(transport.clone(), cancel.clone()),
        spawn_interface_cleanup(transport.clone(), cancel.clone()),
        spawn_trim_memory(transport.clone(), on_event.clone(), cancel.clone()),
        spawn_announce_retransmit(transport.clone(), cancel.clone()),
        spawn_resource_retry(transport, on_event, cancel),
    ]
}

fn spawn_inbound_dispatch(
    transport: Transport,
    mut inbound_rx: Receiver<RxMessage>,
    on_event: std::sync::Arc<impl Fn(TransportEvent) + Send + Sync + 'static>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound_rx.recv() => {
                    let Some(message) = message else { break };
                    for event in transport.inbound(&message.bytes, message.interface) {
                        on_event(event);
                    }
                }
            }
        }
    })
}

fn spawn_link_check(
    transport: Transport,
    on_event: std::sync::Arc<impl Fn(TransportEvent) + Send + Sync + 'static>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(INTERVAL_LINKS_CHECK) => {
                    transport.0.link_table.lock().expect("link table poisoned").check_staleness(Instant::now());
                    let closed = transport.0.link_table.lock().expect("link table poisoned").remove_closed();
                    for link_id in closed {
                        on_event(TransportEvent::LinkClosed {
                            link_id,
                            reason: crate::destination::link::TeardownReason::Timeout,
                        });
                    }
                }
            }
        }
    })
}

fn spawn_link_keepalive(transport: Transport, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(INTERVAL_OUTPUT_LINK_KEEP) => {
                    let due = transport.0.link_table.lock().expect("link table poisoned").due_for_keepalive(Instant::now());
                    for link_id in due {
                        let packet = {
                            let link_table = transport.0.link_table.lock().expect("link table poisoned");
                            link_table.get(&link_id).map(|link| link.keepalive_packet())
                        };
                        if let Some(packet) = packet {
                            transport.outbound(packet);
                        }
                    }
                }
            }
        }
    })
}

fn spawn_interface_cleanup(transport: Transport, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(INTERVAL_IFACE_CLEANUP) => {
                    transport.0.interfaces.lock().expect("interface table poisoned").cleanup();
                }
            }
        }
    })
}

fn spawn_trim_memory(
    transport: Transport,
    on_event: std::sync::Arc<impl Fn(TransportEvent) + Send + Sync + 'static>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(INTERVAL_TRIM_MEMORY) => {
                    for event in transport.trim_memory() {
                        on_event(event);
                    }
                }
            }
        }
    })
}

fn spawn_announce_retransmit(transport: Transport, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(INTERVAL_ANNOUNCES_RETRANSMIT) => {
                    transport.process_announce_queue();
                }
            }
        }
    })
}

fn spawn_resource_retry(
    transport: Transport,
    on_event: std::sync::Arc<impl Fn(TransportEvent) + Send + Sync + 'static>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(INTERVAL_RESOURCE_RETRY) => {
                    let mut resources = transport.0.resources.lock().expect("resource table poisoned");
                    let now = Instant::now();
                    let events: Vec<ResourceEvent> =
                        resources.values_mut().flat_map(|manager| manager.sweep_timeouts(now)).collect();
                    drop(resources);
                    for event in events {
                        on_event(TransportEvent::Resource(event));
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::AddressHash;
    use crate::transport::config::TransportConfig;

    #[tokio::test]
    async fn cancelling_token_stops_every_spawned_task() {
        let transport = Transport::with_config(AddressHash::digest(b"node"), TransportConfig::default());
        let (_tx, rx) = tokio::sync::mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handles = spawn(transport, rx, |_event| {}, cancel.clone());
        cancel.cancel();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle).await.expect("task exited in time").unwrap();
        }
    }
}
