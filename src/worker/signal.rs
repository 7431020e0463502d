use tokio_util::sync::CancellationToken;

/// Cooperative stop request shared by a pool and its workers.
///
/// Workers look at it once per loop iteration, before pulling the next
/// task. Raising it never interrupts a `process` call or a write that is
/// already running; it only keeps new work from starting.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this signal to stop; idempotent
    pub fn raise(&self) {
        self.token.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is raised
    pub async fn raised(&self) {
        self.token.cancelled().await
    }
}
