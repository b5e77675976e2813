use crate::api::{
    AwaitError, ElectionId, ElectionStatus, OperationDetails, OperationId, OperationResult, SessionError, TimeoutError,
};
use crate::grpc;
use crate::session::{ElectionCoordinator, ResultCorrelator, WaitCondition};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;

pub(crate) fn create(
    logger: slog::Logger,
    mailbox_size: usize,
    correlator: ResultCorrelator,
    election: ElectionCoordinator,
) -> (ActorClient, SessionActor) {
    let (tx, rx) = mpsc::channel(mailbox_size);
    let client = ActorClient { sender: tx };
    let actor = SessionActor {
        logger,
        receiver: rx,
        correlator,
        election,
        waiters: Vec::new(),
    };

    (client, actor)
}

type AwaitResult = Result<Vec<OperationResult>, AwaitError>;

#[derive(Debug)]
enum Event {
    // Submission path. Always sent before the request itself is queued, so a response can never
    // overtake its registration.
    RegisterOperations(Vec<(OperationId, OperationDetails)>),
    RegisterElectionUpdate(ElectionId, Callback<u64>),

    // Receive pump.
    ServerResponse(grpc::ModifyResponse),
    StreamEnded(Option<String>),

    // Waiters.
    Await(WaitCondition, Callback<AwaitResult>),
    AwaitOutstanding(Callback<AwaitResult>),

    // Snapshots.
    Results(Callback<Vec<OperationResult>>),
    ElectionStatus(Callback<ElectionStatus>),
}

#[derive(Debug)]
struct Callback<T>(oneshot::Sender<T>);

impl<T> Callback<T> {
    fn send(self, message: T) {
        let _ = self.0.send(message);
    }

    fn is_abandoned(&self) -> bool {
        self.0.is_closed()
    }
}

/// ActorClient is the handle the rest of the session uses to talk to the session actor. Every call
/// fails with `SessionExited` once the actor task is gone.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub async fn register_operations(
        &self,
        operations: Vec<(OperationId, OperationDetails)>,
    ) -> Result<(), SessionError> {
        self.send(Event::RegisterOperations(operations)).await
    }

    /// Returns the sequence number to wait on for the echo.
    pub async fn register_election_update(&self, election_id: ElectionId) -> Result<u64, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::RegisterElectionUpdate(election_id, Callback(tx))).await?;
        rx.await.map_err(|_| SessionError::SessionExited)
    }

    pub async fn server_response(&self, response: grpc::ModifyResponse) -> Result<(), SessionError> {
        self.send(Event::ServerResponse(response)).await
    }

    pub async fn stream_ended(&self, error: Option<String>) -> Result<(), SessionError> {
        self.send(Event::StreamEnded(error)).await
    }

    /// Waits for `condition`. On timeout the waiter is abandoned, the session keeps running, and the
    /// results observed so far are returned in the error.
    pub async fn await_condition(&self, condition: WaitCondition, timeout: Duration) -> AwaitResult {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Await(condition, Callback(tx))).await?;
        self.wait(rx, timeout).await
    }

    /// Waits for everything submitted before this call.
    pub async fn await_outstanding(&self, timeout: Duration) -> AwaitResult {
        let (tx, rx) = oneshot::channel();
        self.send(Event::AwaitOutstanding(Callback(tx))).await?;
        self.wait(rx, timeout).await
    }

    pub async fn results(&self) -> Result<Vec<OperationResult>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Results(Callback(tx))).await?;
        rx.await.map_err(|_| SessionError::SessionExited)
    }

    pub async fn election_status(&self) -> Result<ElectionStatus, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::ElectionStatus(Callback(tx))).await?;
        rx.await.map_err(|_| SessionError::SessionExited)
    }

    async fn wait(&self, rx: oneshot::Receiver<AwaitResult>, timeout: Duration) -> AwaitResult {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::SessionExited.into()),
            Err(_) => {
                let partial = self.results().await?;
                Err(AwaitError::Timeout(TimeoutError { partial }))
            }
        }
    }

    async fn send(&self, event: Event) -> Result<(), SessionError> {
        self.sender.send(event).await.map_err(|_| SessionError::SessionExited)
    }
}

/// SessionActor owns the correlation and election state of one Modify session.
pub(crate) struct SessionActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    correlator: ResultCorrelator,
    election: ElectionCoordinator,
    waiters: Vec<(WaitCondition, Callback<AwaitResult>)>,
}

impl SessionActor {
    pub async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
            self.resolve_waiters();
        }
        slog::debug!(self.logger, "Session actor exiting");
    }

    // This must NOT be async. Anything that waits goes through a waiter.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::RegisterOperations(operations) => {
                self.correlator.register_operations(operations);
            }
            Event::RegisterElectionUpdate(election_id, callback) => {
                self.election.record_sent(election_id);
                callback.send(self.correlator.register_election_update());
            }
            Event::ServerResponse(response) => {
                if let Some(election_id) = &response.election_id {
                    self.election.record_echo(ElectionId::from(election_id.clone()));
                }
                self.correlator.on_response(response);
            }
            Event::StreamEnded(error) => {
                self.correlator.on_stream_ended(error);
            }
            Event::Await(condition, callback) => {
                self.waiters.push((condition, callback));
            }
            Event::AwaitOutstanding(callback) => {
                let condition = self.correlator.outstanding_condition();
                self.waiters.push((condition, callback));
            }
            Event::Results(callback) => {
                callback.send(self.correlator.results());
            }
            Event::ElectionStatus(callback) => {
                callback.send(self.election.status());
            }
        }
    }

    fn resolve_waiters(&mut self) {
        let waiters = std::mem::take(&mut self.waiters);
        for (condition, callback) in waiters {
            if callback.is_abandoned() {
                continue;
            }
            match self.correlator.check(&condition) {
                Some(result) => callback.send(result),
                None => self.waiters.push((condition, callback)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AckType, EntryKey, OperationType};
    use crate::session;

    fn test_actor() -> ActorClient {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let correlator = ResultCorrelator::new(logger.clone(), AckType::Rib);
        let (election, _) = session::new_election_coordinator(logger.clone(), ElectionId::from_low(1));
        let (client, actor) = create(logger, 8, correlator, election);
        tokio::spawn(actor.run_event_loop());
        client
    }

    fn programmed(id: u64) -> grpc::ModifyResponse {
        grpc::ModifyResponse {
            result: vec![grpc::AftResult {
                id,
                status: grpc::aft_result::Status::RibProgrammed as i32,
                timestamp: 0,
                error_details: String::new(),
            }],
            election_id: None,
            session_params_result: None,
        }
    }

    #[tokio::test]
    async fn waiter_resolves_when_results_arrive() -> Result<(), AwaitError> {
        let actor = test_actor();
        let details = OperationDetails {
            op_type: OperationType::Add,
            key: EntryKey::NextHopGroup {
                network_instance: "DEFAULT".into(),
                id: 42,
            },
        };
        actor.register_operations(vec![(OperationId::new(1), details)]).await?;

        let waiter = {
            let actor = actor.clone();
            tokio::spawn(async move { actor.await_outstanding(Duration::from_secs(5)).await })
        };
        actor.server_response(programmed(1)).await?;

        let results = waiter.await.expect("waiter task panicked")?;
        assert_eq!(results.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn timeout_returns_partial_results() -> Result<(), SessionError> {
        let actor = test_actor();
        let ids = vec![(1, 1), (2, 2)]
            .into_iter()
            .map(|(id, index)| {
                (
                    OperationId::new(id),
                    OperationDetails {
                        op_type: OperationType::Add,
                        key: EntryKey::NextHop {
                            network_instance: "DEFAULT".into(),
                            index,
                        },
                    },
                )
            })
            .collect();
        actor.register_operations(ids).await?;
        actor.server_response(programmed(1)).await?;

        match actor.await_outstanding(Duration::from_millis(50)).await {
            Err(AwaitError::Timeout(e)) => assert_eq!(e.partial.len(), 1),
            other => panic!("Unexpected {:?}", other),
        }

        // The session survives the timeout.
        actor.server_response(programmed(2)).await?;
        assert_eq!(actor.results().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn election_status_follows_echoes() -> Result<(), SessionError> {
        let actor = test_actor();
        let seq = actor.register_election_update(ElectionId::from_low(5)).await?;
        assert_eq!(seq, 1);
        assert!(!actor.election_status().await?.is_primary);

        actor
            .server_response(grpc::ModifyResponse {
                result: vec![],
                election_id: Some(grpc::Uint128 { high: 0, low: 5 }),
                session_params_result: None,
            })
            .await?;
        assert!(actor.election_status().await?.is_primary);
        Ok(())
    }
}
