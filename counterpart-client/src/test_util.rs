//! Helpers shared by the runtime tests.

use std::time::Duration;

use tokio::sync::watch;

/// Upper bound for any single wait in a test (virtual time when paused).
pub(crate) const WAIT: Duration = Duration::from_secs(120);

/// Wait until the cell satisfies `pred` and return the matching value.
pub(crate) async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(WAIT, rx.wait_for(|v| pred(v)))
        .await
        .expect("timed out waiting for value")
        .expect("sender dropped");
    value.clone()
}
