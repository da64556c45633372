use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::devices::{DeviceCommand, DeviceInfo, DeviceTransport};
use crate::error::DeviceError;
use crate::kernel::event::Event;

/// Sends one batch concurrently, each command under its own timeout. A slow or failing device
/// costs at most `timeout` and never blocks the others. Returns the failures, already logged.
pub async fn send_batch(
    transport: &Arc<dyn DeviceTransport>,
    batch: Vec<DeviceCommand>,
    timeout: Duration,
) -> Vec<DeviceError> {
    let mut set = JoinSet::new();
    for command in batch {
        let transport = Arc::clone(transport);
        set.spawn(async move {
            match tokio::time::timeout(timeout, transport.send(&command)).await {
                Ok(result) => result,
                Err(_) => Err(DeviceError::Timeout(command.device_id.clone())),
            }
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("[Dispatch] Command dropped: {}", e);
                failures.push(e);
            }
            Err(e) => warn!("[Dispatch] Send task failed: {}", e),
        }
    }
    failures
}

/// Drains command batches produced by the reactor until the channel closes or shutdown is
/// requested.
pub async fn run_dispatcher(
    transport: Arc<dyn DeviceTransport>,
    mut rx: mpsc::Receiver<Vec<DeviceCommand>>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    info!("[Dispatch] Dispatcher started. Per-command timeout: {:?}", timeout);
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = rx.recv() => match batch {
                Some(b) => b,
                None => break,
            },
        };
        debug!("[Dispatch] Sending {} command(s)", batch.len());
        send_batch(&transport, batch, timeout).await;
    }
    debug!("[Dispatch] Dispatcher stopped");
}

/// Periodically asks the transport for its device list and forwards changes into the reactor.
pub async fn run_device_watch(
    transport: Arc<dyn DeviceTransport>,
    tx: mpsc::Sender<Event>,
    every: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let mut cadence = tokio::time::interval(every);
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last: Option<Vec<DeviceInfo>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = cadence.tick() => {}
        }

        let devices = match tokio::time::timeout(timeout, transport.list_devices()).await {
            Ok(Ok(devices)) => devices,
            Ok(Err(e)) => {
                debug!("[Devices] Listing failed: {}", e);
                continue;
            }
            Err(_) => {
                debug!("[Devices] Listing timed out");
                continue;
            }
        };

        if last.as_ref() == Some(&devices) {
            continue;
        }
        info!("[Devices] {} device(s) known", devices.len());
        last = Some(devices.clone());
        if tx.send(Event::DevicesChanged(devices)).await.is_err() {
            break;
        }
    }
}
