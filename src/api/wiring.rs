use crate::api::client::GribiClient;
use crate::api::options::GribiOptionsValidated;
use crate::api::types::{DeviceProfile, ElectionId, Persistence};
use crate::GribiOptions;
use std::convert::TryFrom;
use tonic::codegen::http::{uri, Uri};

pub struct GribiClientConfig {
    /// Address of the device's gRIBI server, e.g. "http://192.0.2.1:9340".
    pub target: String,
    pub logger: slog::Logger,
    pub session: SessionOptions,
    pub profile: DeviceProfile,
    pub options: GribiOptions,
}

/// What the client declares to the device when the Modify stream opens.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub persistence: Persistence,
    /// Ask the device to acknowledge hardware (FIB) installation, and treat that as "done".
    pub fib_ack: bool,
    pub initial_election_id: ElectionId,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            persistence: Persistence::Preserve,
            fib_ack: false,
            initial_election_id: ElectionId::from_low(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GribiClientCreationError {
    #[error("Illegal options for configuring client: {0}")]
    IllegalClientOptions(String),
    #[error("Invalid target URI")]
    InvalidTarget(#[from] uri::InvalidUri),
}

/// Builds a client. Nothing is connected until `GribiClient::start()`.
pub fn create_gribi_client(config: GribiClientConfig) -> Result<GribiClient, GribiClientCreationError> {
    config.target.parse::<Uri>()?;

    let options = GribiOptionsValidated::try_from(config.options)
        .map_err(|e| GribiClientCreationError::IllegalClientOptions(e.to_string()))?;
    if config.session.initial_election_id.is_zero() {
        return Err(GribiClientCreationError::IllegalClientOptions(
            "Initial election id must be non-zero".to_string(),
        ));
    }
    if config.profile.default_network_instance.is_empty() {
        return Err(GribiClientCreationError::IllegalClientOptions(
            "Default network instance name must not be empty".to_string(),
        ));
    }

    let logger = config.logger.new(slog::o!("Target" => config.target.clone()));

    Ok(GribiClient::new(
        logger,
        config.target,
        config.session,
        config.profile,
        options,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn config(target: &str) -> GribiClientConfig {
        GribiClientConfig {
            target: target.to_string(),
            logger: slog::Logger::root(slog::Discard, slog::o!()),
            session: SessionOptions::default(),
            profile: DeviceProfile::default(),
            options: GribiOptions::default(),
        }
    }

    #[test]
    fn creation_validates_config() {
        assert!(create_gribi_client(config("http://127.0.0.1:9340")).is_ok());
        assert!(matches!(
            create_gribi_client(config("http://[::1")),
            Err(GribiClientCreationError::InvalidTarget(_))
        ));

        let mut zero_election = config("http://127.0.0.1:9340");
        zero_election.session.initial_election_id = ElectionId::from_low(0);
        assert!(matches!(
            create_gribi_client(zero_election),
            Err(GribiClientCreationError::IllegalClientOptions(_))
        ));

        let mut bad_options = config("http://127.0.0.1:9340");
        bad_options.options.stop_grace_period = Some(Duration::from_secs(120));
        assert!(matches!(
            create_gribi_client(bad_options),
            Err(GribiClientCreationError::IllegalClientOptions(_))
        ));
    }
}
