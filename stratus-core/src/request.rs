//! Request lifecycle driver
//!
//! Day-2 actions and catalog requests are asynchronous: the service hands
//! back a request id that moves through SUBMITTED/IN_PROGRESS to SUCCESSFUL,
//! FAILED or REJECTED. The waiter polls at a fixed interval until a terminal
//! phase or the caller's wait budget runs out. Polling blocks the calling
//! operation; actions against one deployment are deliberately serialized
//! because the service does not guarantee concurrent actions compose.

use std::time::Duration;

use tracing::{debug, info};

use crate::api::{ProvisioningClient, RequestPhase};
use crate::error::{Error, Result};

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Polls one asynchronous request until it terminates or times out
#[derive(Debug, Clone)]
pub struct RequestWaiter {
    poll_interval: Duration,
}

impl Default for RequestWaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestWaiter {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Wait for `request_id` to finish, polling up to
    /// `wait_timeout / poll_interval` times.
    ///
    /// Returns as soon as a terminal phase is observed. A terminal failure
    /// carries the service's completion details verbatim; exhausting the
    /// budget yields [`Error::RequestTimedOut`], after which the remote
    /// request may still complete and the local state must be refreshed.
    pub async fn wait(
        &self,
        client: &dyn ProvisioningClient,
        request_id: &str,
        wait_timeout: Duration,
    ) -> Result<()> {
        let interval_ms = self.poll_interval.as_millis().max(1);
        let polls = wait_timeout.as_millis() / interval_ms;
        let mut last_phase = RequestPhase::Unknown;

        for _ in 0..polls {
            tokio::time::sleep(self.poll_interval).await;
            let status = client.request_status(request_id).await?;
            last_phase = status.phase;
            debug!(request_id, phase = %status.phase, "polled request status");

            match status.phase {
                RequestPhase::Successful => {
                    info!(request_id, "request completed successfully");
                    return Ok(());
                }
                RequestPhase::Failed | RequestPhase::Rejected => {
                    return Err(Error::RequestFailed {
                        request_id: request_id.to_string(),
                        phase: status.phase,
                        details: status.completion.details.unwrap_or_default(),
                    });
                }
                // SUBMITTED, IN_PROGRESS and unrecognized phases keep polling
                _ => {}
            }
        }

        Err(Error::RequestTimedOut {
            request_id: request_id.to_string(),
            phase: last_phase,
            waited_secs: wait_timeout.as_secs(),
        })
    }
}
