mod aft_store;
mod arbiter;
mod server;

pub use aft_store::NextHopGroupTelemetry;
pub use server::DeviceHandle;
pub use server::DeviceOptions;
pub use server::GribiDevice;
