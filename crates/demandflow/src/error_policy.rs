//! Error-deferral policy shared by `concat` and `merge`.

use crate::error::FlowError;

/// How a multi-source combinator reacts to a failing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// The first failure terminates the combinator and cancels the rest.
    #[default]
    Immediate,
    /// Failures are captured and the failing source is treated as
    /// completed; once every source is done the combinator fails with
    /// [`FlowError::Aggregate`] if anything was captured.
    Deferred,
}

/// Accumulates failures for one combinator run according to an
/// [`ErrorMode`].
#[derive(Debug)]
pub(crate) struct ErrorCollector {
    mode: ErrorMode,
    captured: Vec<FlowError>,
}

impl ErrorCollector {
    pub(crate) fn new(mode: ErrorMode) -> Self {
        Self {
            mode,
            captured: Vec::new(),
        }
    }

    /// Records a source failure. In immediate mode the failure is handed
    /// back so the caller can propagate it with `?`.
    pub(crate) fn capture(&mut self, source: usize, error: FlowError) -> Result<(), FlowError> {
        match self.mode {
            ErrorMode::Immediate => Err(error),
            ErrorMode::Deferred => {
                tracing::warn!(source, %error, "deferring source failure");
                self.captured.push(error);
                Ok(())
            }
        }
    }

    /// Outcome once every source reached a terminal state.
    pub(crate) fn finish(self) -> Result<(), FlowError> {
        if self.captured.is_empty() {
            Ok(())
        } else {
            Err(FlowError::Aggregate(self.captured))
        }
    }
}
