//! Agent execution context: listener, bounded inbox, FIFO dispatcher.

use super::behavior::{Behavior, BehaviorContext};
use crate::descriptor::ResourceLimits;
use crate::transport::{Ack, Message};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Everything one agent needs to run.
pub(crate) struct AgentProgram {
    pub context: BehaviorContext,
    pub behaviors: Vec<Arc<dyn Behavior>>,
    pub limits: ResourceLimits,
}

/// Serve the agent until `cancel` fires.
///
/// `ready` is signalled once the inbox and dispatcher are in place. Returning
/// without cancellation, by error or by panic, is a fault.
pub(crate) async fn run(
    listener: TcpListener,
    program: AgentProgram,
    ready: oneshot::Sender<()>,
    cancel: CancellationToken,
) -> Result<(), String> {
    let AgentProgram {
        context,
        behaviors,
        limits,
    } = program;

    let (inbox, queue) = mpsc::channel::<Message>(limits.max_inbox);
    let dispatcher = dispatch(queue, behaviors, context.clone());
    tokio::pin!(dispatcher);

    let mut connections = JoinSet::new();
    let _ = ready.send(());
    debug!(did = %context.did, "Execution context ready");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| format!("accept failed: {}", e))?;
                trace!(did = %context.did, peer = %peer, "Accepted connection");
                connections.spawn(serve_connection(
                    stream,
                    context.clone(),
                    inbox.clone(),
                    limits.max_payload_bytes,
                ));
            }
            _ = &mut dispatcher => {
                return Err("dispatcher stopped unexpectedly".to_string());
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
    debug!(did = %context.did, "Execution context stopped");
    Ok(())
}

/// Process the inbox in arrival order.
async fn dispatch(
    mut queue: mpsc::Receiver<Message>,
    behaviors: Vec<Arc<dyn Behavior>>,
    context: BehaviorContext,
) {
    while let Some(message) = queue.recv().await {
        let Some(behavior) = behaviors.iter().find(|b| b.handles(&message.action)) else {
            debug!(
                did = %context.did,
                action = %message.action,
                "No behavior handles action; message dropped"
            );
            continue;
        };
        if let Err(e) = behavior.handle(&context, &message).await {
            warn!(
                did = %context.did,
                behavior = behavior.name(),
                message_id = %message.id,
                error = %e,
                "Behavior failed to handle message"
            );
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    context: BehaviorContext,
    inbox: mpsc::Sender<Message>,
    max_payload_bytes: usize,
) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(max_payload_bytes));

    while let Some(frame) = framed.next().await {
        let (ack, close) = match frame {
            Ok(line) => (admit(&line, &context, &inbox), false),
            Err(LinesCodecError::MaxLineLengthExceeded) => (
                Ack::Rejected {
                    reason: format!("frame exceeds {} bytes", max_payload_bytes),
                },
                true,
            ),
            Err(LinesCodecError::Io(e)) => {
                trace!(did = %context.did, error = %e, "Connection error");
                return;
            }
        };

        let reply = match serde_json::to_string(&ack) {
            Ok(reply) => reply,
            Err(_) => return,
        };
        if framed.send(reply).await.is_err() || close {
            return;
        }
    }
}

fn admit(line: &str, context: &BehaviorContext, inbox: &mpsc::Sender<Message>) -> Ack {
    let message: Message = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            return Ack::Rejected {
                reason: format!("undecodable frame: {}", e),
            }
        }
    };
    if message.recipient != context.did {
        return Ack::Rejected {
            reason: format!("addressed to {}, this is {}", message.recipient, context.did),
        };
    }

    let message_id = message.id.clone();
    match inbox.try_send(message) {
        Ok(()) => Ack::Accepted { message_id },
        Err(mpsc::error::TrySendError::Full(_)) => Ack::Busy,
        Err(mpsc::error::TrySendError::Closed(_)) => Ack::Rejected {
            reason: "agent is stopping".to_string(),
        },
    }
}
