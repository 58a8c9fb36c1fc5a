//! Pipeline entry points for checker operations.
//!
//! - `diff`: snapshot comparison
//! - `schedule`: sleep between rounds
//! - `poller`: the round loop and its fatal-shutdown path

pub mod diff;
pub mod poller;
pub mod schedule;

pub use diff::{DiffResult, Transition, calculate_diff, has_changed};
pub use poller::{Poller, RoundOutcome};

use crate::error::Result;

/// Run the poller and own the only fatal-shutdown path.
///
/// On error the diagnostics are logged, the last page is dumped and the
/// prober released before the error is returned. Restarting the process is
/// left to the supervisor.
pub async fn run_checker(poller: &mut Poller, once: bool) -> Result<()> {
    let result = if once {
        poller.run_round().await.map(|_| ())
    } else {
        poller.run().await
    };

    match result {
        Ok(()) => {
            poller.close().await;
            Ok(())
        }
        Err(e) => {
            poller.shutdown_after(&e).await;
            Err(e)
        }
    }
}
