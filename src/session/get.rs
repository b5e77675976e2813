use crate::api::{GetError, NetworkInstanceSelector, ProgrammedEntry};
use crate::entry::{AftType, Entry};
use crate::grpc;
use crate::grpc::gribi_client::GribiClient as GrpcGribiClient;
use tonic::transport::Channel;

/// Reads the device's programmed entries. The response stream is drained completely.
pub(crate) async fn get(
    logger: &slog::Logger,
    rpc: &mut GrpcGribiClient<Channel>,
    selector: NetworkInstanceSelector,
    aft: AftType,
) -> Result<Vec<ProgrammedEntry>, GetError> {
    let request = grpc::GetRequest {
        network_instance: Some(selector.into()),
        aft: grpc::AftType::from(aft) as i32,
    };

    slog::debug!(logger, "ClientWire - {:?}", request);
    let mut stream = rpc
        .get(request)
        .await
        .map_err(|status| GetError::Rpc(status.to_string()))?
        .into_inner();

    let mut entries = Vec::new();
    while let Some(response) = stream.message().await.map_err(|status| GetError::Rpc(status.to_string()))? {
        slog::debug!(logger, "ClientWire - {:?}", response);
        for aft_entry in response.entry {
            let rib_programmed = aft_entry.rib_programmed;
            let fib_programmed = aft_entry.fib_programmed;
            let (network_instance, entry) = Entry::from_aft_entry(aft_entry).map_err(GetError::MalformedEntry)?;
            entries.push(ProgrammedEntry {
                network_instance,
                entry,
                rib_programmed,
                fib_programmed,
            });
        }
    }

    Ok(entries)
}
