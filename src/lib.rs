mod actor;
mod api;
mod chk;
mod entry;
mod expected;
mod server;
mod session;
mod grpc {
    include!("../generated/gribi.rs");
}

pub use api::create_gribi_client;
pub use api::AckType;
pub use api::AwaitError;
pub use api::DeviceProfile;
pub use api::ElectionError;
pub use api::ElectionEventListener;
pub use api::ElectionId;
pub use api::ElectionStatus;
pub use api::EntryKey;
pub use api::FlushAuthority;
pub use api::FlushError;
pub use api::FlushOutcome;
pub use api::FlushTarget;
pub use api::GetError;
pub use api::GribiClient;
pub use api::GribiClientConfig;
pub use api::GribiClientCreationError;
pub use api::GribiOptions;
pub use api::ModifyError;
pub use api::NetworkInstanceSelector;
pub use api::OperationDetails;
pub use api::OperationId;
pub use api::OperationResult;
pub use api::OperationType;
pub use api::Persistence;
pub use api::ProgrammedEntry;
pub use api::ProgrammingResult;
pub use api::SessionError;
pub use api::SessionOptions;
pub use api::TimeoutError;
pub use chk::has_result;
pub use chk::CheckOption;
pub use chk::ResultMatcher;
pub use entry::AftType;
pub use entry::Batch;
pub use entry::EncapsulationHeader;
pub use entry::Entry;
pub use entry::EntryError;
pub use entry::Ipv4Entry;
pub use entry::NextHop;
pub use entry::NextHopGroup;
pub use expected::AftCache;
pub use expected::AftMismatch;
pub use server::DeviceHandle;
pub use server::DeviceOptions;
pub use server::GribiDevice;
pub use server::NextHopGroupTelemetry;

// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
//
// This keeps the `crate::{root_mod}` root_mod only responsible for exporting types to the rest of
// crate, and allows me to organize my root_mod impl however I want.
