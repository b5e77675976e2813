use crate::api::{FlushError, FlushOutcome, FlushTarget};
use crate::grpc;
use crate::grpc::flush_response_error::Status as FlushErrorStatus;
use crate::grpc::gribi_client::GribiClient as GrpcGribiClient;
use prost::Message;
use tonic::transport::Channel;
use tonic::Code;

/// Issues a Flush. The device rejects a flush whose election id is below the primary's with
/// `FAILED_PRECONDITION`, and puts the reason in the status details.
pub(crate) async fn flush(
    logger: &slog::Logger,
    rpc: &mut GrpcGribiClient<Channel>,
    target: FlushTarget,
    election: grpc::flush_request::Election,
) -> Result<FlushOutcome, FlushError> {
    let request = grpc::FlushRequest {
        network_instance: Some(target.into()),
        election: Some(election),
    };

    slog::debug!(logger, "ClientWire - {:?}", request);
    let rpc_result = rpc.flush(request).await;
    slog::debug!(logger, "ClientWire - {:?}", rpc_result);

    match rpc_result {
        Ok(response) => convert_flush_result(response.into_inner().result),
        Err(status) if status.code() == Code::FailedPrecondition => Err(convert_flush_error(&status)),
        Err(status) => Err(FlushError::Rpc(status.to_string())),
    }
}

fn convert_flush_result(result: i32) -> Result<FlushOutcome, FlushError> {
    match grpc::flush_response::FlushResult::from_i32(result) {
        Some(grpc::flush_response::FlushResult::Ok) => Ok(FlushOutcome::Ok),
        Some(grpc::flush_response::FlushResult::NonZeroReferenceRemain) => Ok(FlushOutcome::NonZeroReferenceRemain),
        _ => Err(FlushError::UnspecifiedResult),
    }
}

fn convert_flush_error(status: &tonic::Status) -> FlushError {
    let reason = grpc::FlushResponseError::decode(status.details())
        .ok()
        .and_then(|e| FlushErrorStatus::from_i32(e.status));

    match reason {
        Some(FlushErrorStatus::NotPrimary) => FlushError::NotPrimary,
        Some(FlushErrorStatus::NoSuchNetworkInstance) => FlushError::NoSuchNetworkInstance,
        _ => FlushError::Rpc(status.to_string()),
    }
}
