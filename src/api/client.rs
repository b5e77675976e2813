use crate::actor::{self, ActorClient};
use crate::api::errors::ModifyError;
use crate::api::event_bus::{ElectionEventListener, ElectionStatus};
use crate::api::options::GribiOptionsValidated;
use crate::api::types::{AckType, DeviceProfile, ElectionId, OperationId};
use crate::api::wiring::SessionOptions;
use crate::api::{
    AwaitError, ElectionError, FlushAuthority, FlushError, FlushOutcome, FlushTarget, GetError,
    NetworkInstanceSelector, OperationDetails, OperationResult, OperationType, ProgrammedEntry, ProgrammingResult,
    SessionError,
};
use crate::entry::{AftType, Batch, Entry};
use crate::expected::AftCache;
use crate::grpc;
use crate::grpc::gribi_client::GribiClient as GrpcGribiClient;
use crate::session::{self, WaitCondition};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tonic::transport::Channel;

/// GribiClient is one programming session against one device.
///
/// Lifecycle: `start()` connects and declares the session parameters, `start_sending()` begins
/// flushing queued requests onto the wire, `stop()` ends the session. Writes are fire-and-forget;
/// their outcome is observed with one of the `await_*` calls.
pub struct GribiClient {
    logger: slog::Logger,
    target: String,
    session_options: SessionOptions,
    profile: DeviceProfile,
    options: GribiOptionsValidated,

    next_operation_id: u64,
    queue_tx: Option<mpsc::UnboundedSender<grpc::ModifyRequest>>,
    queue_rx: Option<mpsc::UnboundedReceiver<grpc::ModifyRequest>>,
    // Moves into the session actor on `start()`.
    election: Option<session::ElectionCoordinator>,
    election_listener: watch::Receiver<ElectionStatus>,
    session: Option<Session>,
    stopped: bool,

    // Submitted but unacknowledged operations, recorded in `expected` once they succeed.
    unconfirmed: HashMap<OperationId, (OperationType, Entry)>,
    expected: AftCache,
}

struct Session {
    rpc: GrpcGribiClient<Channel>,
    actor: ActorClient,
    // Both are handed to the pumps by `start_sending()`.
    wire_tx: Option<mpsc::UnboundedSender<grpc::ModifyRequest>>,
    responses: Option<tonic::codec::Streaming<grpc::ModifyResponse>>,
    tasks: Vec<JoinHandle<()>>,
}

impl GribiClient {
    pub(super) fn new(
        logger: slog::Logger,
        target: String,
        session_options: SessionOptions,
        profile: DeviceProfile,
        options: GribiOptionsValidated,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (election, election_listener) = session::new_election_coordinator(
            logger.new(slog::o!("Component" => "Election")),
            session_options.initial_election_id,
        );
        let expected = AftCache::new(profile.default_network_instance.clone());

        GribiClient {
            logger,
            target,
            session_options,
            profile,
            options,
            next_operation_id: 1,
            queue_tx: Some(queue_tx),
            queue_rx: Some(queue_rx),
            election: Some(election),
            election_listener,
            session: None,
            stopped: false,
            unconfirmed: HashMap::new(),
            expected,
        }
    }

    // ------- Session lifecycle --------

    /// Connects, opens the Modify stream, and waits for the device to accept the session
    /// parameters. The initial election id is queued but not sent until `start_sending()`.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.stopped {
            return Err(SessionError::Stopped);
        }
        if self.session.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let connection = session::connect(
            &self.logger,
            &self.target,
            self.session_options.persistence,
            self.requested_ack_type(),
            self.options.connect_timeout,
        )
        .await?;

        let election = self.election.take().ok_or(SessionError::AlreadyStarted)?;
        let mut correlator = session::ResultCorrelator::new(
            self.logger.new(slog::o!("Component" => "Correlator")),
            self.done_level(),
        );
        correlator.on_session_parameters_ok();

        let (actor, session_actor) = actor::create(
            self.logger.new(slog::o!("Component" => "SessionActor")),
            self.options.mailbox_size,
            correlator,
            election,
        );
        tokio::spawn(session_actor.run_event_loop());

        // Registered now so it's always the first election update the correlator expects.
        actor
            .register_election_update(self.session_options.initial_election_id)
            .await?;

        self.session = Some(Session {
            rpc: connection.rpc,
            actor,
            wire_tx: Some(connection.wire_tx),
            responses: Some(connection.responses),
            tasks: Vec::new(),
        });

        Ok(())
    }

    /// Sends the initial election id, then starts the send and receive pumps. Requests queued
    /// since `start()` go out right after the election id, in submission order.
    pub async fn start_sending(&mut self) -> Result<(), SessionError> {
        if self.stopped {
            return Err(SessionError::Stopped);
        }
        let session = self.session.as_mut().ok_or(SessionError::NotStarted)?;
        if session.wire_tx.is_none() || session.responses.is_none() || self.queue_rx.is_none() {
            return Err(SessionError::AlreadyStarted);
        }
        let taken = (session.wire_tx.take(), session.responses.take(), self.queue_rx.take());
        let (wire_tx, responses, queue_rx) = match taken {
            (Some(wire_tx), Some(responses), Some(queue_rx)) => (wire_tx, responses, queue_rx),
            _ => return Err(SessionError::AlreadyStarted),
        };

        let initial_election_id = self.session_options.initial_election_id;
        let request = grpc::ModifyRequest {
            operation: vec![],
            election_id: Some(initial_election_id.into()),
            params: None,
        };
        slog::debug!(self.logger, "ClientWire - {:?}", request);
        wire_tx
            .send(request)
            .map_err(|_| SessionError::Connection("Modify stream closed before sending started".to_string()))?;

        let send_logger = self.logger.new(slog::o!("Component" => "SendPump"));
        let receive_logger = self.logger.new(slog::o!("Component" => "ReceivePump"));
        session
            .tasks
            .push(tokio::spawn(session::run_send_pump(send_logger, queue_rx, wire_tx)));
        session.tasks.push(tokio::spawn(session::run_receive_pump(
            receive_logger,
            responses,
            session.actor.clone(),
        )));

        slog::info!(self.logger, "Sending started with election id {}", initial_election_id);
        Ok(())
    }

    /// Half-closes the stream, gives the server `stop_grace_period` to close its side, then tears
    /// the session down. Calling it again does nothing.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        // Closing the queue lets the send pump drain, then drop the stream's send side.
        self.queue_tx = None;

        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Ok(()),
        };
        session.wire_tx = None;
        session.responses = None;

        if !session.tasks.is_empty() {
            match session
                .actor
                .await_condition(WaitCondition::Closed, self.options.stop_grace_period)
                .await
            {
                Ok(_) => slog::info!(self.logger, "Session closed by server"),
                Err(e) => slog::info!(self.logger, "Session did not close cleanly: {}", e),
            }
        }
        for task in session.tasks.drain(..) {
            task.abort();
        }

        Ok(())
    }

    // ------- Elections --------

    /// Sends `election_id` as-is. There is no guarantee it's higher than anything the server knows,
    /// which is what makes it useful for exercising stale clients.
    pub async fn update_election_id(&mut self, election_id: ElectionId) -> Result<(), SessionError> {
        self.send_election_id(election_id).await.map(|_| ())
    }

    /// Asks the server for its current (highest) election id by re-sending ours and reading the
    /// echo. Never lowers this client's own id.
    pub async fn learn_election_id(&mut self, timeout: Duration) -> Result<ElectionId, ElectionError> {
        let current = self.election_status().client_election_id;
        let seq = self.send_election_id(current).await?;
        let actor = self.started_session()?.actor.clone();
        actor.await_condition(WaitCondition::control(seq), timeout).await?;

        actor
            .election_status()
            .await?
            .server_election_id
            .ok_or(ElectionError::NoElectionIdEcho)
    }

    /// Makes this client primary: learns the server's election id, requests one strictly above
    /// everything seen so far, and checks the server echoes it back. Each of the two round trips
    /// gets `timeout`.
    pub async fn become_leader(&mut self, timeout: Duration) -> Result<ElectionId, ElectionError> {
        let previous = self.election_status();
        let learned = self.learn_election_id(timeout).await?;
        let candidate = session::next_leader_candidate(learned, &previous);

        let seq = self.send_election_id(candidate).await?;
        let actor = self.started_session()?.actor.clone();
        actor.await_condition(WaitCondition::control(seq), timeout).await?;

        let status = actor.election_status().await?;
        match status.server_election_id {
            Some(_) if status.is_primary => {
                slog::info!(self.logger, "Became primary with election id {}", candidate);
                Ok(candidate)
            }
            Some(server) => Err(ElectionError::NotPrimary {
                requested: candidate,
                server,
            }),
            None => Err(ElectionError::NoElectionIdEcho),
        }
    }

    pub fn election_status(&self) -> ElectionStatus {
        self.election_listener.borrow().clone()
    }

    pub fn is_primary(&self) -> bool {
        self.election_listener.borrow().is_primary
    }

    pub fn election_events(&self) -> ElectionEventListener {
        ElectionEventListener::new(self.election_listener.clone())
    }

    async fn send_election_id(&mut self, election_id: ElectionId) -> Result<u64, SessionError> {
        let actor = self.active_session()?.actor.clone();
        let seq = actor.register_election_update(election_id).await?;
        self.enqueue(grpc::ModifyRequest {
            operation: vec![],
            election_id: Some(election_id.into()),
            params: None,
        })?;
        Ok(seq)
    }

    // ------- Programming --------

    /// Submits every operation of `batch` in one request. Returns the assigned operation ids in
    /// batch order.
    pub async fn modify(&mut self, batch: Batch) -> Result<Vec<OperationId>, SessionError> {
        let actor = self.active_session()?.actor.clone();
        if batch.is_empty() {
            return Ok(vec![]);
        }

        // Ids and unconfirmed entries are only committed once the request is queued.
        let default_network_instance = self.profile.default_network_instance.clone();
        let mut next_operation_id = self.next_operation_id;
        let mut submitted = Vec::with_capacity(batch.len());
        let mut registrations = Vec::with_capacity(batch.len());
        let mut operations = Vec::with_capacity(batch.len());
        for (op_type, entry) in batch.into_operations() {
            let id = OperationId::new(next_operation_id);
            next_operation_id += 1;

            operations.push(entry.to_operation(id, op_type, &default_network_instance));
            registrations.push((
                id,
                OperationDetails {
                    op_type,
                    key: entry.key(&default_network_instance),
                },
            ));
            submitted.push((id, op_type, entry));
        }

        actor.register_operations(registrations).await?;
        self.enqueue(grpc::ModifyRequest {
            operation: operations,
            election_id: None,
            params: None,
        })?;

        self.next_operation_id = next_operation_id;
        let mut ids = Vec::with_capacity(submitted.len());
        for (id, op_type, entry) in submitted {
            self.unconfirmed.insert(id, (op_type, entry));
            ids.push(id);
        }
        Ok(ids)
    }

    pub async fn add_entry(&mut self, entry: impl Into<Entry>) -> Result<OperationId, ModifyError> {
        let mut batch = Batch::new();
        batch.add(entry)?;
        self.modify_one(batch).await
    }

    pub async fn replace_entry(&mut self, entry: impl Into<Entry>) -> Result<OperationId, ModifyError> {
        let mut batch = Batch::new();
        batch.replace(entry)?;
        self.modify_one(batch).await
    }

    /// Deletes one entry by its natural key.
    pub async fn delete_entry(&mut self, entry: impl Into<Entry>) -> Result<OperationId, ModifyError> {
        let mut batch = Batch::new();
        batch.delete(entry)?;
        self.modify_one(batch).await
    }

    async fn modify_one(&mut self, batch: Batch) -> Result<OperationId, ModifyError> {
        let ids = self.modify(batch).await?;
        ids.into_iter().next().ok_or(ModifyError::Session(SessionError::SessionExited))
    }

    fn enqueue(&self, request: grpc::ModifyRequest) -> Result<(), SessionError> {
        self.queue_tx
            .as_ref()
            .ok_or(SessionError::Stopped)?
            .send(request)
            .map_err(|_| SessionError::SessionExited)
    }

    // ------- Results --------

    /// Waits until every operation and election update submitted before this call is resolved.
    pub async fn await_results(&mut self, timeout: Duration) -> Result<Vec<OperationResult>, AwaitError> {
        let actor = self.started_session()?.actor.clone();
        let result = actor.await_outstanding(timeout).await;
        self.confirm_awaited(&result);
        result
    }

    /// Waits until each of `ids` has a final result. Ids that were never submitted count as resolved.
    pub async fn await_all(
        &mut self,
        ids: &[OperationId],
        timeout: Duration,
    ) -> Result<Vec<OperationResult>, AwaitError> {
        let actor = self.started_session()?.actor.clone();
        let result = actor
            .await_condition(WaitCondition::operations(ids.iter().copied()), timeout)
            .await;
        self.confirm_awaited(&result);
        result
    }

    /// Waits until the server closes the Modify stream.
    pub async fn await_close(&mut self, timeout: Duration) -> Result<Vec<OperationResult>, AwaitError> {
        let actor = self.started_session()?.actor.clone();
        let result = actor.await_condition(WaitCondition::Closed, timeout).await;
        self.confirm_awaited(&result);
        result
    }

    /// Everything observed on the stream so far, in arrival order.
    pub async fn results(&mut self) -> Result<Vec<OperationResult>, SessionError> {
        let results = self.started_session()?.actor.results().await?;
        self.confirm(&results);
        Ok(results)
    }

    /// What this client believes it has programmed, built from acknowledged operations.
    pub fn expected(&self) -> &AftCache {
        &self.expected
    }

    pub fn expected_mut(&mut self) -> &mut AftCache {
        &mut self.expected
    }

    // An operation is recorded in the expected AFT at its first successful acknowledgement.
    fn confirm_awaited(&mut self, result: &Result<Vec<OperationResult>, AwaitError>) {
        match result {
            Ok(results) => self.confirm(results),
            Err(e) => {
                if let Some(partial) = e.partial_results() {
                    self.confirm(partial);
                }
            }
        }
    }

    fn confirm(&mut self, results: &[OperationResult]) {
        for r in results {
            let (id, programming_result) = match (r.operation_id, r.programming_result) {
                (Some(id), Some(programming_result)) => (id, programming_result),
                _ => continue,
            };
            match programming_result {
                ProgrammingResult::InstalledInRib | ProgrammingResult::InstalledInFib => {
                    if let Some((op_type, entry)) = self.unconfirmed.remove(&id) {
                        self.expected.record(op_type, &entry);
                    }
                }
                ProgrammingResult::ProgrammingFailed => {
                    self.unconfirmed.remove(&id);
                }
                ProgrammingResult::Pending => {}
            }
        }
    }

    // ------- Flush & Get --------

    /// Removes every entry in `target`. Rejected with `FlushError::NotPrimary` unless the
    /// authority is at least the current primary's election id.
    pub async fn flush(&mut self, target: FlushTarget, authority: FlushAuthority) -> Result<FlushOutcome, FlushError> {
        let mut rpc = self.started_session()?.rpc.clone();
        let election = match authority {
            FlushAuthority::ElectionId(id) => grpc::flush_request::Election::Id(id.into()),
            FlushAuthority::CurrentElectionId => {
                grpc::flush_request::Election::Id(self.election_status().client_election_id.into())
            }
            FlushAuthority::Override => grpc::flush_request::Election::ElectionOverride(grpc::Empty {}),
        };

        let outcome = tokio::time::timeout(
            self.options.rpc_timeout,
            session::flush(&self.logger, &mut rpc, target.clone(), election),
        )
        .await
        .map_err(|_| FlushError::Rpc(format!("Timed out after {:?}", self.options.rpc_timeout)))??;

        if outcome == FlushOutcome::Ok {
            match &target {
                FlushTarget::NetworkInstance(name) => self.expected.clear_network_instance(name),
                FlushTarget::AllNetworkInstances => self.expected.clear(),
            }
        }
        Ok(outcome)
    }

    pub async fn get(
        &self,
        selector: NetworkInstanceSelector,
        aft: AftType,
    ) -> Result<Vec<ProgrammedEntry>, GetError> {
        let mut rpc = self.started_session()?.rpc.clone();
        tokio::time::timeout(
            self.options.rpc_timeout,
            session::get(&self.logger, &mut rpc, selector, aft),
        )
        .await
        .map_err(|_| GetError::Rpc(format!("Timed out after {:?}", self.options.rpc_timeout)))?
    }

    // ------- Helpers --------

    pub fn default_network_instance(&self) -> &str {
        &self.profile.default_network_instance
    }

    fn requested_ack_type(&self) -> AckType {
        if self.session_options.fib_ack {
            AckType::RibAndFib
        } else {
            AckType::Rib
        }
    }

    // A device that only ever acknowledges RIB installation must not be waited on for FIB.
    fn done_level(&self) -> AckType {
        if self.profile.rib_ack_only {
            AckType::Rib
        } else {
            self.requested_ack_type()
        }
    }

    fn started_session(&self) -> Result<&Session, SessionError> {
        self.session.as_ref().ok_or(SessionError::NotStarted)
    }

    fn active_session(&self) -> Result<&Session, SessionError> {
        if self.stopped {
            return Err(SessionError::Stopped);
        }
        self.started_session()
    }
}
