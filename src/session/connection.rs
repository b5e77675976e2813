use crate::api::{AckType, Persistence, SessionError};
use crate::grpc;
use crate::grpc::gribi_client::GribiClient as GrpcGribiClient;
use crate::grpc::session_parameters::{AckType as ProtoAckType, PersistenceMode, RedundancyMode};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::codec::Streaming;
use tonic::transport::{Channel, Endpoint};

/// Connection is an established Modify stream whose session parameters the server has accepted.
pub(crate) struct Connection {
    pub rpc: GrpcGribiClient<Channel>,
    /// Requests written here go straight onto the stream. Dropping it half-closes the stream.
    pub wire_tx: mpsc::UnboundedSender<grpc::ModifyRequest>,
    pub responses: Streaming<grpc::ModifyResponse>,
}

pub(crate) async fn connect(
    logger: &slog::Logger,
    target: &str,
    persistence: Persistence,
    ack_type: AckType,
    connect_timeout: Duration,
) -> Result<Connection, SessionError> {
    let endpoint = Endpoint::from_shared(target.to_string())?;

    slog::info!(logger, "Connecting to {} ...", target);
    let channel = match tokio::time::timeout(connect_timeout, endpoint.connect()).await {
        Ok(Ok(channel)) => channel,
        Ok(Err(e)) => return Err(SessionError::Connection(format!("{:?}", e))),
        Err(_) => return Err(connect_timed_out(connect_timeout)),
    };
    let mut rpc = GrpcGribiClient::new(channel);

    // Session parameters must be the first message on the stream.
    let (wire_tx, wire_rx) = mpsc::unbounded_channel();
    let request = grpc::ModifyRequest {
        operation: vec![],
        election_id: None,
        params: Some(session_parameters(persistence, ack_type)),
    };
    slog::debug!(logger, "ClientWire - {:?}", request);
    let _ = wire_tx.send(request);

    let handshake = async {
        let mut responses = rpc.modify(UnboundedReceiverStream::new(wire_rx)).await?.into_inner();
        let first = responses.message().await?;
        Ok::<_, tonic::Status>((responses, first))
    };
    let (responses, first) = match tokio::time::timeout(connect_timeout, handshake).await {
        Ok(Ok(handshake)) => handshake,
        Ok(Err(status)) => {
            return Err(SessionError::Connection(format!(
                "Session parameters rejected: {}",
                status
            )))
        }
        Err(_) => return Err(connect_timed_out(connect_timeout)),
    };

    match first {
        Some(response) if response.session_params_result.is_some() => {
            slog::debug!(logger, "ClientWire - {:?}", response);
            slog::info!(logger, "Session established with {}", target);
        }
        Some(response) => {
            return Err(SessionError::Connection(format!(
                "Expected session parameters acknowledgement, got {:?}",
                response
            )))
        }
        None => {
            return Err(SessionError::Connection(
                "Stream closed before session parameters were acknowledged".to_string(),
            ))
        }
    }

    Ok(Connection {
        rpc,
        wire_tx,
        responses,
    })
}

fn session_parameters(persistence: Persistence, ack_type: AckType) -> grpc::SessionParameters {
    let persistence = match persistence {
        Persistence::Delete => PersistenceMode::Delete,
        Persistence::Preserve => PersistenceMode::Preserve,
    };
    let ack_type = match ack_type {
        AckType::Rib => ProtoAckType::RibAck,
        AckType::RibAndFib => ProtoAckType::RibAndFibAck,
    };

    grpc::SessionParameters {
        redundancy: RedundancyMode::SinglePrimary as i32,
        persistence: persistence as i32,
        ack_type: ack_type as i32,
    }
}

fn connect_timed_out(connect_timeout: Duration) -> SessionError {
    SessionError::Connection(format!("Timed out after {:?}", connect_timeout))
}
