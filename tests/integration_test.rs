use gribi::{
    has_result, AftType, Batch, CheckOption, DeviceHandle, DeviceOptions, DeviceProfile, ElectionId, FlushAuthority,
    FlushError, FlushOutcome, FlushTarget, GribiClient, GribiClientConfig, GribiDevice, GribiOptions, Ipv4Entry,
    NetworkInstanceSelector, NextHop, NextHopGroup, OperationResult, Persistence, ProgrammingResult, ResultMatcher,
    SessionOptions,
};
use slog::Drain;
use std::error::Error;
use tokio::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT: &str = "DEFAULT";

#[tokio::test]
async fn election_id_never_goes_backwards() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;

    let mut first = start_client(&device, "first", session_with_id(10)).await?;
    let first_id = first.become_leader(TIMEOUT).await?;
    assert!(first_id > ElectionId::from_low(10));
    assert!(first.is_primary());
    assert_eq!(device.highest_election_id(), Some(first_id));

    let mut second = start_client(&device, "second", session_with_id(5)).await?;
    second.await_results(TIMEOUT).await?;
    assert!(!second.is_primary());
    assert_eq!(second.election_status().server_election_id, Some(first_id));

    // Even with the primary gone, a lower id doesn't win.
    first.stop().await?;
    second.update_election_id(first_id.decrement()).await?;
    second.await_results(TIMEOUT).await?;
    assert!(!second.is_primary());
    assert_eq!(device.highest_election_id(), Some(first_id));

    let second_id = second.become_leader(TIMEOUT).await?;
    assert!(second_id > first_id);
    assert!(second.is_primary());
    assert!(second.election_events().current().is_primary);
    assert_eq!(device.highest_election_id(), Some(second_id));

    second.stop().await?;
    Ok(())
}

#[tokio::test]
async fn referential_integrity_with_reordered_acks() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions {
        reorder_acknowledgements: true,
        ..DeviceOptions::default()
    })
    .await?;
    let mut client = start_client(&device, "client", SessionOptions::default()).await?;
    client.become_leader(TIMEOUT).await?;

    // Dependents first. The device resolves the batch regardless of order.
    let mut batch = Batch::new();
    batch
        .add_ipv4(Ipv4Entry::new("198.51.100.0/24", 42))?
        .add_next_hop_group(NextHopGroup::new(42).with_next_hop(1, 1))?
        .add_next_hop(NextHop::new(1).with_ip_address("203.0.113.1"))?;
    let ids = client.modify(batch).await?;
    let results = client.await_all(&ids, TIMEOUT).await?;

    for id in &ids {
        let matcher = ResultMatcher::new()
            .with_operation_id(*id)
            .with_programming_result(ProgrammingResult::InstalledInRib);
        assert!(has_result(&results, &matcher, &[]), "{:?} not installed: {:?}", id, results);
    }
    assert!(has_result(
        &results,
        &ResultMatcher::new()
            .with_ipv4_operation("198.51.100.0/24")
            .with_network_instance(DEFAULT)
            .with_programming_result(ProgrammingResult::InstalledInRib),
        &[CheckOption::IgnoreOperationId]
    ));

    // A prefix pointing at a group that doesn't exist.
    let dangling = client.add_entry(Ipv4Entry::new("192.0.2.0/24", 99)).await?;
    // A next hop still in use.
    let in_use = client.delete_entry(NextHop::new(1)).await?;
    let results = client.await_all(&[dangling, in_use], TIMEOUT).await?;
    assert_failed(&results, dangling);
    assert_failed(&results, in_use);

    assert_eq!(device.entry_count(DEFAULT), 3);
    let programmed = client.get(NetworkInstanceSelector::All, AftType::All).await?;
    assert_eq!(programmed.len(), 3);
    assert!(client.expected().diff(&programmed).is_empty());

    client.stop().await?;
    Ok(())
}

#[tokio::test]
async fn flush_is_idempotent() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;
    let mut client = start_client(&device, "client", SessionOptions::default()).await?;
    client.become_leader(TIMEOUT).await?;

    program_route(&mut client).await?;
    client.await_results(TIMEOUT).await?;
    assert_eq!(client.expected().len(), 3);

    let target = FlushTarget::NetworkInstance(DEFAULT.to_string());
    assert_eq!(
        client.flush(target.clone(), FlushAuthority::CurrentElectionId).await?,
        FlushOutcome::Ok
    );
    assert_eq!(
        client.flush(target, FlushAuthority::CurrentElectionId).await?,
        FlushOutcome::Ok
    );

    let programmed = client
        .get(NetworkInstanceSelector::Named(DEFAULT.to_string()), AftType::All)
        .await?;
    assert!(programmed.is_empty());
    assert!(client.expected().is_empty());

    let unknown = client
        .flush(
            FlushTarget::NetworkInstance("VRF-UNKNOWN".to_string()),
            FlushAuthority::Override,
        )
        .await;
    assert!(matches!(unknown, Err(FlushError::NoSuchNetworkInstance)));

    client.stop().await?;
    Ok(())
}

#[tokio::test]
async fn non_primary_cannot_change_anything() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;

    let mut primary = start_client(&device, "primary", session_with_id(20)).await?;
    let primary_id = primary.become_leader(TIMEOUT).await?;
    primary.add_entry(NextHop::new(1)).await?;
    primary.await_results(TIMEOUT).await?;

    let mut stale = start_client(&device, "stale", session_with_id(3)).await?;
    let rejected = stale.add_entry(NextHop::new(2)).await?;
    let results = stale.await_results(TIMEOUT).await?;
    assert!(!stale.is_primary());
    assert_failed(&results, rejected);

    let flush = stale
        .flush(FlushTarget::AllNetworkInstances, FlushAuthority::CurrentElectionId)
        .await;
    assert!(matches!(flush, Err(FlushError::NotPrimary)));

    // The primary itself can't write with an outdated per-entry election id.
    let outdated = primary
        .add_entry(NextHop::new(3).with_election_id(primary_id.decrement()))
        .await?;
    let results = primary.await_all(&[outdated], TIMEOUT).await?;
    assert_failed(&results, outdated);

    assert_eq!(device.entry_count(DEFAULT), 1);

    // Failover: the stale client takes over and may now flush.
    let takeover_id = stale.become_leader(TIMEOUT).await?;
    assert!(takeover_id > primary_id);
    assert!(stale.is_primary());
    let flush = stale
        .flush(FlushTarget::AllNetworkInstances, FlushAuthority::CurrentElectionId)
        .await?;
    assert_eq!(flush, FlushOutcome::Ok);
    assert_eq!(device.entry_count(DEFAULT), 0);

    // The old primary is locked out.
    let locked_out = primary.add_entry(NextHop::new(4)).await?;
    let results = primary.await_all(&[locked_out], TIMEOUT).await?;
    assert_failed(&results, locked_out);
    assert_eq!(device.entry_count(DEFAULT), 0);

    stale.stop().await?;
    primary.stop().await?;
    Ok(())
}

#[tokio::test]
async fn tying_the_primary_election_id_does_not_make_primary() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;

    let mut first = start_client(&device, "first", session_with_id(1)).await?;
    let first_id = first.become_leader(TIMEOUT).await?;

    let mut second = start_client(&device, "second", session_with_id(1)).await?;
    second.await_results(TIMEOUT).await?;
    second.update_election_id(first_id).await?;
    second.await_results(TIMEOUT).await?;
    assert_eq!(second.election_status().client_election_id, first_id);
    assert_eq!(second.election_status().server_election_id, Some(first_id));
    assert!(!second.is_primary());
    assert!(first.is_primary());

    let rejected = second.add_entry(NextHop::new(9)).await?;
    let results = second.await_all(&[rejected], TIMEOUT).await?;
    assert_failed(&results, rejected);

    let accepted = first.add_entry(NextHop::new(9)).await?;
    first.await_all(&[accepted], TIMEOUT).await?;
    assert_eq!(device.entry_count(DEFAULT), 1);

    second.stop().await?;
    first.stop().await?;
    Ok(())
}

#[tokio::test]
async fn stop_is_idempotent_and_close_is_observed() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;
    let mut client = start_client(&device, "client", SessionOptions::default()).await?;
    client.become_leader(TIMEOUT).await?;
    let id = client.add_entry(NextHop::new(1)).await?;
    client.await_all(&[id], TIMEOUT).await?;

    client.stop().await?;
    client.await_close(TIMEOUT).await?;
    client.stop().await?;

    assert!(client.add_entry(NextHop::new(2)).await.is_err());
    // Preserve persistence keeps what the session programmed.
    assert_eq!(device.entry_count(DEFAULT), 1);
    Ok(())
}

#[tokio::test]
async fn polled_results_confirm_expected_entries() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;
    let mut client = start_client(&device, "client", SessionOptions::default()).await?;
    client.become_leader(TIMEOUT).await?;

    program_route(&mut client).await?;
    wait_for_entry_count(&device, 3, TIMEOUT).await;

    let deadline = Instant::now() + TIMEOUT;
    loop {
        let results = client.results().await?;
        let installed = ResultMatcher::new()
            .with_ipv4_operation("198.51.100.0/24")
            .with_network_instance(DEFAULT)
            .with_programming_result(ProgrammingResult::InstalledInRib);
        if has_result(&results, &installed, &[CheckOption::IgnoreOperationId]) {
            break;
        }
        assert!(Instant::now() < deadline, "Route never acknowledged: {:?}", results);
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(client.expected().len(), 3);

    client.stop().await?;
    Ok(())
}

#[tokio::test]
async fn backup_group_takes_over_when_interface_goes_down() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;
    let mut client = start_client(&device, "client", SessionOptions::default()).await?;
    client.become_leader(TIMEOUT).await?;

    let mut batch = Batch::new();
    batch
        .add_next_hop(NextHop::new(1).with_interface_ref("port2").with_ip_address("203.0.113.1"))?
        .add_next_hop(NextHop::new(2).with_interface_ref("port3").with_ip_address("203.0.113.5"))?
        .add_next_hop_group(NextHopGroup::new(100).with_next_hop(2, 1))?
        .add_next_hop_group(NextHopGroup::new(42).with_next_hop(1, 1).with_backup_next_hop_group(100))?
        .add_ipv4(Ipv4Entry::new("198.51.100.0/24", 42))?;
    client.modify(batch).await?;
    let results = client.await_results(TIMEOUT).await?;
    assert!(!results.iter().any(|r| r.programming_result == Some(ProgrammingResult::ProgrammingFailed)));

    let telemetry = device.next_hop_group_telemetry(DEFAULT, 42);
    assert!(matches!(telemetry, Some(t) if !t.backup_active));

    device.set_interface_enabled("port2", false);
    let telemetry = device.await_backup_active(DEFAULT, 42, true, TIMEOUT).await;
    assert_eq!(telemetry.and_then(|t| t.backup_next_hop_group), Some(100));

    device.set_interface_enabled("port2", true);
    assert!(device.await_backup_active(DEFAULT, 42, false, TIMEOUT).await.is_some());

    client.stop().await?;
    Ok(())
}

#[tokio::test]
async fn route_is_programmed_in_fib() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;
    let session = SessionOptions {
        fib_ack: true,
        ..SessionOptions::default()
    };
    let mut client = start_client(&device, "client", session).await?;
    client.become_leader(TIMEOUT).await?;

    program_route(&mut client).await?;
    let results = client.await_results(Duration::from_secs(60)).await?;

    let opts = [CheckOption::IgnoreOperationId];
    let installed = ResultMatcher::new().with_programming_result(ProgrammingResult::InstalledInFib);
    assert!(has_result(&results, &installed.clone().with_next_hop_operation(1), &opts));
    assert!(has_result(&results, &installed.clone().with_next_hop_group_operation(42), &opts));
    assert!(has_result(&results, &installed.with_ipv4_operation("198.51.100.0/24"), &opts));

    let groups = client
        .get(NetworkInstanceSelector::Named(DEFAULT.to_string()), AftType::NextHopGroup)
        .await?;
    assert_eq!(groups.len(), 1);
    assert!(groups[0].fib_programmed);
    assert!(matches!(&groups[0].entry, gribi::Entry::NextHopGroup(nhg) if nhg.id() == 42));

    client.stop().await?;
    Ok(())
}

#[tokio::test]
async fn delete_persistence_purges_on_disconnect() -> Result<(), Box<dyn Error>> {
    let device = spawn_device(DeviceOptions::default()).await?;

    let session = SessionOptions {
        persistence: Persistence::Delete,
        ..SessionOptions::default()
    };
    let mut client = start_client(&device, "ephemeral", session).await?;
    client.become_leader(TIMEOUT).await?;
    program_route(&mut client).await?;
    client.await_results(TIMEOUT).await?;
    assert_eq!(device.entry_count(DEFAULT), 3);

    client.stop().await?;
    wait_for_entry_count(&device, 0, TIMEOUT).await;

    let mut client = start_client(&device, "durable", SessionOptions::default()).await?;
    client.become_leader(TIMEOUT).await?;
    program_route(&mut client).await?;
    client.await_results(TIMEOUT).await?;
    client.stop().await?;

    sleep(Duration::from_millis(200)).await;
    assert_eq!(device.entry_count(DEFAULT), 3);
    Ok(())
}

// ------- Helpers --------

async fn spawn_device(options: DeviceOptions) -> Result<DeviceHandle, Box<dyn Error>> {
    let logger = create_root_logger_for_stdout("device".to_string());
    let device = GribiDevice::spawn(logger, "127.0.0.1:0".parse()?, options).await?;
    Ok(device)
}

async fn start_client(
    device: &DeviceHandle,
    name: &str,
    session: SessionOptions,
) -> Result<GribiClient, Box<dyn Error>> {
    let mut client = gribi::create_gribi_client(GribiClientConfig {
        target: device.target(),
        logger: create_root_logger_for_stdout(name.to_string()),
        session,
        profile: DeviceProfile::default(),
        options: GribiOptions::default(),
    })?;
    client.start().await?;
    client.start_sending().await?;
    Ok(client)
}

fn session_with_id(low: u64) -> SessionOptions {
    SessionOptions {
        initial_election_id: ElectionId::from_low(low),
        ..SessionOptions::default()
    }
}

async fn program_route(client: &mut GribiClient) -> Result<(), Box<dyn Error>> {
    let mut batch = Batch::new();
    batch
        .add_next_hop(NextHop::new(1).with_interface_ref("port2").with_ip_address("203.0.113.1"))?
        .add_next_hop_group(NextHopGroup::new(42).with_next_hop(1, 1))?
        .add_ipv4(Ipv4Entry::new("198.51.100.0/24", 42))?;
    client.modify(batch).await?;
    Ok(())
}

fn assert_failed(results: &[OperationResult], id: gribi::OperationId) {
    let matcher = ResultMatcher::new()
        .with_operation_id(id)
        .with_programming_result(ProgrammingResult::ProgrammingFailed);
    assert!(has_result(results, &matcher, &[]), "{:?} did not fail: {:?}", id, results);
}

async fn wait_for_entry_count(device: &DeviceHandle, count: usize, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while device.entry_count(DEFAULT) != count {
        if Instant::now() > deadline {
            panic!("Device still has {} entries", device.entry_count(DEFAULT));
        }
        sleep(Duration::from_millis(50)).await;
    }
}

fn create_root_logger_for_stdout(name: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Name" => name))
}

async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
