use crate::api::{ElectionId, FlushOutcome, OperationType};
use crate::entry::Entry;
use crate::grpc;
use crate::grpc::gribi_server::{Gribi, GribiServer};
use crate::server::aft_store::{AftStore, NextHopGroupTelemetry, PendingOperation};
use crate::server::arbiter::{ElectionArbiter, SessionId};
use bytes::Bytes;
use prost::Message;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, Instant};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status, Streaming};

type ModifyResponseStream = ReceiverStream<Result<grpc::ModifyResponse, Status>>;
type GetResponseStream = ReceiverStream<Result<grpc::GetResponse, Status>>;

const SESSION_OUTBOUND_BUFFER: usize = 64;
const GET_RESPONSE_CHUNK: usize = 64;

#[derive(Clone, Debug)]
pub struct DeviceOptions {
    pub default_network_instance: String,
    /// Acknowledge each operation separately and in reverse order, to exercise clients that assume
    /// acknowledgements arrive in submission order.
    pub reorder_acknowledgements: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptions {
            default_network_instance: "DEFAULT".to_string(),
            reorder_acknowledgements: false,
        }
    }
}

struct DeviceState {
    arbiter: ElectionArbiter,
    store: AftStore,
    next_session_id: SessionId,
}

/// State shared by every RPC handler and the `DeviceHandle`. The lock is never held across an
/// await point.
struct Shared {
    state: Mutex<DeviceState>,
    changes_tx: watch::Sender<u64>,
    // Keeps the channel open so publishing never fails.
    changes_rx: watch::Receiver<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_change(&self) {
        let next = self.changes_rx.borrow().wrapping_add(1);
        let _ = self.changes_tx.send(next);
    }
}

#[derive(Copy, Clone, Debug)]
struct SessionConfig {
    id: SessionId,
    purge_on_close: bool,
    fib_ack: bool,
}

/// GribiDevice is an in-process gRIBI server with a single-primary election, a RIB that enforces
/// referential integrity, and a FIB that is programmed synchronously. It stands in for a router in
/// tests.
pub struct GribiDevice {
    logger: slog::Logger,
    options: DeviceOptions,
    shared: Arc<Shared>,
}

impl GribiDevice {
    /// Binds `addr` and serves until the returned handle is dropped. Bind to port 0 to let the OS
    /// pick a free port; `DeviceHandle::target()` has the address to connect to.
    pub async fn spawn(logger: slog::Logger, addr: SocketAddr, options: DeviceOptions) -> io::Result<DeviceHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let logger = logger.new(slog::o!("Device" => local_addr.to_string()));

        let (changes_tx, changes_rx) = watch::channel(0);
        let shared = Arc::new(Shared {
            state: Mutex::new(DeviceState {
                arbiter: ElectionArbiter::default(),
                store: AftStore::new(&options.default_network_instance),
                next_session_id: 1,
            }),
            changes_tx,
            changes_rx,
        });

        let device = GribiDevice {
            logger: logger.clone(),
            options,
            shared: shared.clone(),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_logger = logger.clone();
        tokio::spawn(async move {
            slog::info!(server_logger, "Listening on '{:?}'", local_addr);
            let result = Server::builder()
                .add_service(GribiServer::new(device))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    // Sent or dropped, either way it's time to stop.
                    let _ = shutdown_rx.await;
                })
                .await;
            slog::info!(server_logger, "Server has exited: {:?}", result);
        });

        Ok(DeviceHandle {
            logger,
            local_addr,
            shared,
            _shutdown_tx: shutdown_tx,
        })
    }

    fn open_session(&self, params: grpc::SessionParameters) -> Result<SessionConfig, Status> {
        let redundancy = grpc::session_parameters::RedundancyMode::from_i32(params.redundancy);
        if redundancy != Some(grpc::session_parameters::RedundancyMode::SinglePrimary) {
            return Err(Status::failed_precondition("Only SINGLE_PRIMARY redundancy is supported"));
        }
        let persistence = grpc::session_parameters::PersistenceMode::from_i32(params.persistence)
            .ok_or_else(|| Status::invalid_argument("Unknown persistence mode"))?;
        let ack_type = grpc::session_parameters::AckType::from_i32(params.ack_type)
            .ok_or_else(|| Status::invalid_argument("Unknown acknowledgement type"))?;

        let mut state = self.shared.lock();
        let id = state.next_session_id;
        state.next_session_id += 1;

        Ok(SessionConfig {
            id,
            purge_on_close: persistence == grpc::session_parameters::PersistenceMode::Delete,
            fib_ack: ack_type == grpc::session_parameters::AckType::RibAndFibAck,
        })
    }

    fn handle_flush(&self, request: grpc::FlushRequest) -> Result<grpc::FlushResponse, Status> {
        let mut state = self.shared.lock();

        match request.election {
            Some(grpc::flush_request::Election::Id(id)) => {
                if !state.arbiter.may_flush(ElectionId::from(id)) {
                    return Err(flush_rejected(grpc::flush_response_error::Status::NotPrimary));
                }
            }
            Some(grpc::flush_request::Election::ElectionOverride(_)) => {}
            None => return Err(Status::invalid_argument("Flush needs an election id or an override")),
        }

        let target = match request.network_instance {
            Some(grpc::flush_request::NetworkInstance::Name(name)) => Some(name),
            Some(grpc::flush_request::NetworkInstance::All(_)) => None,
            None => return Err(Status::invalid_argument("Flush needs a network instance")),
        };

        let outcome = state
            .store
            .flush(target.as_deref())
            .map_err(|_| flush_rejected(grpc::flush_response_error::Status::NoSuchNetworkInstance))?;
        drop(state);
        self.shared.publish_change();

        let result = match outcome {
            FlushOutcome::Ok => grpc::flush_response::FlushResult::Ok,
            FlushOutcome::NonZeroReferenceRemain => grpc::flush_response::FlushResult::NonZeroReferenceRemain,
        };
        Ok(grpc::FlushResponse {
            result: result as i32,
            timestamp: now_nanos(),
        })
    }
}

#[async_trait::async_trait]
impl Gribi for GribiDevice {
    type ModifyStream = ModifyResponseStream;
    type GetStream = GetResponseStream;

    async fn modify(
        &self,
        request: Request<Streaming<grpc::ModifyRequest>>,
    ) -> Result<Response<Self::ModifyStream>, Status> {
        let mut inbound = request.into_inner();
        let first = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("Stream closed before session parameters"))?;
        slog::debug!(self.logger, "ServerWire - {:?}", first);

        let params = session_parameters(first)?;
        let session = self.open_session(params)?;
        slog::info!(self.logger, "Session {} opened: {:?}", session.id, session);

        let (outbound_tx, outbound_rx) = mpsc::channel(SESSION_OUTBOUND_BUFFER);
        let accepted = grpc::ModifyResponse {
            result: Vec::new(),
            election_id: None,
            session_params_result: Some(grpc::SessionParametersResult {
                status: grpc::session_parameters_result::Status::Ok as i32,
            }),
        };
        slog::debug!(self.logger, "ServerWire - {:?}", accepted);
        // The receiver is still in our hands, so this can't fail.
        let _ = outbound_tx.send(Ok(accepted)).await;

        let runner = SessionRunner {
            logger: self.logger.new(slog::o!("Session" => session.id)),
            shared: self.shared.clone(),
            reorder_acknowledgements: self.options.reorder_acknowledgements,
            default_network_instance: self.options.default_network_instance.clone(),
            session,
        };
        tokio::spawn(runner.run(inbound, outbound_tx));

        Ok(Response::new(ReceiverStream::new(outbound_rx)))
    }

    async fn get(&self, request: Request<grpc::GetRequest>) -> Result<Response<Self::GetStream>, Status> {
        let request = request.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", request);

        let network_instance = match request.network_instance {
            Some(grpc::get_request::NetworkInstance::Name(name)) => Some(name),
            Some(grpc::get_request::NetworkInstance::All(_)) => None,
            None => return Err(Status::invalid_argument("Get needs a network instance")),
        };
        let aft = grpc::AftType::from_i32(request.aft).ok_or_else(|| Status::invalid_argument("Unknown AFT type"))?;

        let entries = self.shared.lock().store.get(network_instance.as_deref(), aft);
        let chunks: Vec<grpc::GetResponse> = entries
            .chunks(GET_RESPONSE_CHUNK)
            .map(|chunk| grpc::GetResponse { entry: chunk.to_vec() })
            .collect();

        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            slog::debug!(self.logger, "ServerWire - {:?}", chunk);
            // Sized to fit every chunk.
            let _ = tx.try_send(Ok(chunk));
        }

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn flush(&self, request: Request<grpc::FlushRequest>) -> Result<Response<grpc::FlushResponse>, Status> {
        let request = request.into_inner();
        slog::debug!(self.logger, "ServerWire - {:?}", request);

        let result = self.handle_flush(request);
        slog::debug!(self.logger, "ServerWire - {:?}", result);
        result.map(Response::new)
    }
}

/// SessionRunner owns one Modify stream after the session parameters were accepted.
struct SessionRunner {
    logger: slog::Logger,
    shared: Arc<Shared>,
    reorder_acknowledgements: bool,
    default_network_instance: String,
    session: SessionConfig,
}

impl SessionRunner {
    async fn run(
        self,
        mut inbound: Streaming<grpc::ModifyRequest>,
        outbound: mpsc::Sender<Result<grpc::ModifyResponse, Status>>,
    ) {
        'stream: loop {
            let request = match inbound.message().await {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(status) => {
                    slog::info!(self.logger, "Inbound stream failed: {:?}", status);
                    break;
                }
            };
            slog::debug!(self.logger, "ServerWire - {:?}", request);

            for response in self.handle_request(request) {
                slog::debug!(self.logger, "ServerWire - {:?}", response);
                if outbound.send(Ok(response)).await.is_err() {
                    slog::info!(self.logger, "Client went away");
                    break 'stream;
                }
            }
        }

        self.close();
    }

    fn handle_request(&self, request: grpc::ModifyRequest) -> Vec<grpc::ModifyResponse> {
        let mut responses = Vec::new();
        let mut state = self.shared.lock();

        if request.params.is_some() {
            slog::warn!(self.logger, "Ignoring session parameters sent after the first message");
        }

        if let Some(election_id) = request.election_id {
            let highest = state.arbiter.update(self.session.id, ElectionId::from(election_id));
            responses.push(grpc::ModifyResponse {
                result: Vec::new(),
                election_id: Some(highest.into()),
                session_params_result: None,
            });
        }

        if request.operation.is_empty() {
            return responses;
        }

        let mut failed = Vec::new();
        let mut accepted = Vec::new();
        for op in request.operation {
            match self.authorize(&state.arbiter, op) {
                Ok(pending) => accepted.push(pending),
                Err((id, reason)) => failed.push((id, reason)),
            }
        }

        let applied = state.store.apply_batch(accepted, self.session.id);
        drop(state);
        self.shared.publish_change();

        let mut programmed = Vec::new();
        for (id, outcome) in applied {
            match outcome {
                Ok(()) => programmed.push(id),
                Err(e) => failed.push((id, e.to_string())),
            }
        }
        slog::info!(
            self.logger,
            "Applied batch: {} programmed, {} failed",
            programmed.len(),
            failed.len()
        );

        let mut rib_results: Vec<grpc::AftResult> = failed
            .into_iter()
            .map(|(id, reason)| aft_result(id, grpc::aft_result::Status::Failed, reason))
            .collect();
        rib_results.extend(
            programmed
                .iter()
                .map(|id| aft_result(*id, grpc::aft_result::Status::RibProgrammed, String::new())),
        );
        responses.extend(self.acknowledgements(rib_results));

        if self.session.fib_ack {
            let fib_results = programmed
                .iter()
                .map(|id| aft_result(*id, grpc::aft_result::Status::FibProgrammed, String::new()))
                .collect();
            responses.extend(self.acknowledgements(fib_results));
        }

        responses
    }

    /// Decodes an operation and checks that this session may apply it. On failure returns the
    /// operation id with the reason.
    fn authorize(
        &self,
        arbiter: &ElectionArbiter,
        op: grpc::AftOperation,
    ) -> Result<PendingOperation, (u64, String)> {
        let id = op.id;
        let op_type = match grpc::aft_operation::Operation::from_i32(op.op) {
            Some(grpc::aft_operation::Operation::Add) => OperationType::Add,
            Some(grpc::aft_operation::Operation::Replace) => OperationType::Replace,
            Some(grpc::aft_operation::Operation::Delete) => OperationType::Delete,
            Some(grpc::aft_operation::Operation::Invalid) | None => {
                return Err((id, format!("Invalid operation type {}", op.op)));
            }
        };

        if !arbiter.may_program(self.session.id, op.election_id.map(ElectionId::from)) {
            return Err((id, "Client is not the primary".to_string()));
        }

        let entry = op.entry.ok_or_else(|| (id, "Operation carries no entry".to_string()))?;
        let network_instance = if op.network_instance.is_empty() {
            self.default_network_instance.clone()
        } else {
            op.network_instance
        };

        Ok(PendingOperation {
            id,
            op_type,
            entry: Entry::from_operation_entry(entry, &network_instance),
            network_instance,
        })
    }

    fn acknowledgements(&self, results: Vec<grpc::AftResult>) -> Vec<grpc::ModifyResponse> {
        let response = |result: Vec<grpc::AftResult>| grpc::ModifyResponse {
            result,
            election_id: None,
            session_params_result: None,
        };

        if results.is_empty() {
            Vec::new()
        } else if self.reorder_acknowledgements {
            results.into_iter().rev().map(|r| response(vec![r])).collect()
        } else {
            vec![response(results)]
        }
    }

    fn close(self) {
        let mut state = self.shared.lock();
        state.arbiter.remove_session(self.session.id);

        if self.session.purge_on_close {
            let removed = state.store.purge_owner(self.session.id);
            slog::info!(self.logger, "Session closed, purged {} entries", removed);
        } else {
            slog::info!(self.logger, "Session closed, entries preserved");
        }
        drop(state);
        self.shared.publish_change();
    }
}

/// DeviceHandle controls a running `GribiDevice`. Dropping it stops the server.
pub struct DeviceHandle {
    logger: slog::Logger,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    _shutdown_tx: oneshot::Sender<()>,
}

impl DeviceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The URI clients connect to.
    pub fn target(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    pub fn highest_election_id(&self) -> Option<ElectionId> {
        self.shared.lock().arbiter.highest()
    }

    /// Number of entries installed in `network_instance`, of any type.
    pub fn entry_count(&self, network_instance: &str) -> usize {
        self.shared.lock().store.entry_count(network_instance)
    }

    pub fn set_interface_enabled(&self, interface: &str, enabled: bool) {
        let changed = self.shared.lock().store.set_interface_enabled(interface, enabled);
        if changed {
            slog::info!(self.logger, "Interface {} enabled={}", interface, enabled);
            self.shared.publish_change();
        }
    }

    pub fn next_hop_group_telemetry(&self, network_instance: &str, id: u64) -> Option<NextHopGroupTelemetry> {
        self.shared.lock().store.next_hop_group_telemetry(network_instance, id)
    }

    /// Waits until the group's backup state is `backup_active`. Returns `None` if that doesn't happen
    /// within `timeout`.
    pub async fn await_backup_active(
        &self,
        network_instance: &str,
        id: u64,
        backup_active: bool,
        timeout: Duration,
    ) -> Option<NextHopGroupTelemetry> {
        let deadline = Instant::now() + timeout;
        let mut changes = self.shared.changes_rx.clone();

        loop {
            if let Some(telemetry) = self.next_hop_group_telemetry(network_instance, id) {
                if telemetry.backup_active == backup_active {
                    return Some(telemetry);
                }
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                _ => return None,
            }
        }
    }
}

/// The first message of a Modify stream opens the session and must carry nothing else.
fn session_parameters(first: grpc::ModifyRequest) -> Result<grpc::SessionParameters, Status> {
    let params = first
        .params
        .ok_or_else(|| Status::failed_precondition("First message must carry session parameters"))?;
    if first.election_id.is_some() || !first.operation.is_empty() {
        return Err(Status::invalid_argument(
            "Session parameters must be sent alone, before any election id or operation",
        ));
    }
    Ok(params)
}

fn aft_result(id: u64, status: grpc::aft_result::Status, error_details: String) -> grpc::AftResult {
    grpc::AftResult {
        id,
        status: status as i32,
        timestamp: now_nanos(),
        error_details,
    }
}

fn flush_rejected(reason: grpc::flush_response_error::Status) -> Status {
    let details = grpc::FlushResponseError { status: reason as i32 };
    let mut buf = Vec::with_capacity(details.encoded_len());
    match details.encode(&mut buf) {
        Ok(()) => Status::with_details(
            Code::FailedPrecondition,
            format!("Flush rejected: {:?}", reason),
            Bytes::from(buf),
        ),
        Err(e) => Status::internal(format!("Failed to encode flush error: {}", e)),
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
