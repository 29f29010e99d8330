//! Per-connection read and write pumps.
//!
//! Each connection runs exactly one of each. They never talk to each other
//! directly: the read pump feeds the manager, the manager feeds the outbound
//! queue, and the write pump drains it.

use agora_protocol::{codec, Envelope};
use agora_transport::{ConnectionId, FrameReader, FrameWriter};
use tracing::{debug, warn};

use crate::manager::ManagerHandle;
use crate::metrics;
use crate::queue::OutboundReceiver;

/// Forward every inbound frame to the manager as a broadcast.
///
/// On end-of-stream or a transport error the pump submits a single
/// disconnect for `id`, closes the reader, and returns.
pub async fn read_pump<R>(mut reader: R, id: ConnectionId, name: String, manager: ManagerHandle)
where
    R: FrameReader,
{
    loop {
        match reader.recv().await {
            Ok(Some(text)) => {
                let frame = match codec::encode(&Envelope::chat(name.as_str(), text)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(client = %id, error = %e, "Dropping message that failed to encode");
                        metrics::record_error("encode");
                        continue;
                    }
                };

                metrics::record_message(frame.len(), "inbound");
                if manager.broadcast(frame).await.is_err() {
                    debug!(client = %id, "Manager stopped");
                    break;
                }
            }
            Ok(None) => {
                debug!(client = %id, "Stream closed by peer");
                break;
            }
            Err(e) => {
                warn!(client = %id, error = %e, "Read failed");
                metrics::record_error("transport");
                break;
            }
        }
    }

    // Ignored by the manager if it already dropped this client
    let _ = manager.disconnect(id.clone()).await;

    if let Err(e) = reader.close().await {
        debug!(client = %id, error = %e, "Reader close failed");
    }
}

/// Drain the outbound queue to the writer.
///
/// Returns once the manager closes the queue, after sending a close frame,
/// or as soon as a write fails.
pub async fn write_pump<W>(mut writer: W, mut queue: OutboundReceiver, id: ConnectionId)
where
    W: FrameWriter,
{
    while let Some(frame) = queue.recv().await {
        let len = frame.len();
        if let Err(e) = writer.send(frame).await {
            debug!(client = %id, error = %e, "Write failed");
            metrics::record_error("transport");
            break;
        }
        metrics::record_message(len, "outbound");
    }

    if let Err(e) = writer.close().await {
        debug!(client = %id, error = %e, "Writer close failed");
    }
    debug!(client = %id, "Write pump finished");
}
