use crate::actor::ActorClient;
use crate::grpc;
use tokio::sync::mpsc;
use tonic::codec::Streaming;

/// Forwards queued requests onto the stream until the queue closes. Dropping `wire` on return
/// half-closes the send direction.
pub(crate) async fn run_send_pump(
    logger: slog::Logger,
    mut queue: mpsc::UnboundedReceiver<grpc::ModifyRequest>,
    wire: mpsc::UnboundedSender<grpc::ModifyRequest>,
) {
    while let Some(request) = queue.recv().await {
        slog::debug!(logger, "ClientWire - {:?}", request);
        if wire.send(request).is_err() {
            slog::warn!(logger, "Modify stream is gone, dropping queued requests");
            return;
        }
    }
    slog::info!(logger, "Send queue closed, half-closing Modify stream");
}

/// Hands every response to the session actor, then reports how the stream ended.
pub(crate) async fn run_receive_pump(
    logger: slog::Logger,
    mut responses: Streaming<grpc::ModifyResponse>,
    actor: ActorClient,
) {
    let stream_error = loop {
        match responses.message().await {
            Ok(Some(response)) => {
                slog::debug!(logger, "ClientWire - {:?}", response);
                if actor.server_response(response).await.is_err() {
                    return;
                }
            }
            Ok(None) => break None,
            Err(status) => break Some(status.to_string()),
        }
    };

    let _ = actor.stream_ended(stream_error).await;
}
