use tokio_util::sync::CancellationToken;

/// Cancellation signal shared between a long-running copy and whoever may abort it
/// (the Ctrl-C handler in the CLI).
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(CancellationToken);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}
