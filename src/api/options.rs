use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct GribiOptions {
    pub connect_timeout: Option<Duration>,
    /// Deadline for Flush and Get.
    pub rpc_timeout: Option<Duration>,
    /// How long `stop()` waits for the server to close the stream before giving up on it.
    pub stop_grace_period: Option<Duration>,
    pub mailbox_size: Option<usize>,
}

pub(super) struct GribiOptionsValidated {
    pub connect_timeout: Duration,
    pub rpc_timeout: Duration,
    pub stop_grace_period: Duration,
    pub mailbox_size: usize,
}

impl GribiOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.stop_grace_period >= self.rpc_timeout {
            return Err("Stop grace period must be less than the RPC timeout");
        }
        if self.mailbox_size == 0 {
            return Err("Mailbox size must be non-zero");
        }

        Ok(())
    }
}

impl TryFrom<GribiOptions> for GribiOptionsValidated {
    type Error = &'static str;

    fn try_from(options: GribiOptions) -> Result<Self, Self::Error> {
        let values = GribiOptionsValidated {
            connect_timeout: options.connect_timeout.unwrap_or(Duration::from_secs(10)),
            rpc_timeout: options.rpc_timeout.unwrap_or(Duration::from_secs(60)),
            stop_grace_period: options.stop_grace_period.unwrap_or(Duration::from_secs(2)),
            mailbox_size: options.mailbox_size.unwrap_or(64),
        };

        values.validate()?;
        Ok(values)
    }
}
