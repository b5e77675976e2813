//! The moving parts of one gRIBI session: transport setup, the two stream pumps, and the pure state
//! (result correlation and election tracking) that the session actor owns.
mod connection;
mod correlator;
mod election;
mod flush;
mod get;
mod pumps;

pub(crate) use connection::connect;
pub(crate) use correlator::ResultCorrelator;
pub(crate) use correlator::WaitCondition;
pub(crate) use election::new as new_election_coordinator;
pub(crate) use election::next_leader_candidate;
pub(crate) use election::ElectionCoordinator;
pub(crate) use flush::flush;
pub(crate) use get::get;
pub(crate) use pumps::run_receive_pump;
pub(crate) use pumps::run_send_pump;
