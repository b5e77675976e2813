//! This mod is meant to hold most of the code for the library's client-facing API.
mod client;
mod errors;
mod event_bus;
mod flush;
mod options;
mod results;
mod types;
mod wiring;

pub use client::GribiClient;
pub use errors::AwaitError;
pub use errors::ElectionError;
pub use errors::FlushError;
pub use errors::GetError;
pub use errors::ModifyError;
pub use errors::SessionError;
pub use errors::TimeoutError;
pub use event_bus::ElectionEventListener;
pub use event_bus::ElectionStatus;
pub use flush::FlushAuthority;
pub use flush::FlushOutcome;
pub use flush::FlushTarget;
pub use options::GribiOptions;
pub use results::EntryKey;
pub use results::NetworkInstanceSelector;
pub use results::OperationDetails;
pub use results::OperationResult;
pub use results::OperationType;
pub use results::ProgrammedEntry;
pub use results::ProgrammingResult;
pub use types::AckType;
pub use types::DeviceProfile;
pub use types::ElectionId;
pub use types::OperationId;
pub use types::Persistence;
pub use wiring::create_gribi_client;
pub use wiring::GribiClientConfig;
pub use wiring::GribiClientCreationError;
pub use wiring::SessionOptions;
