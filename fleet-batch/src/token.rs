//! Per-repository outcome records handed from mappers to the orchestrator.

use std::fmt;

/// Deferred commit or rollback action. Returns `false` on failure.
pub type Completion = Box<dyn FnOnce() -> bool + Send + 'static>;

/// A completion that does nothing and succeeds.
pub fn noop() -> Completion {
    Box::new(|| true)
}

/// Saved pre-mutation state bound into a commit/rollback pair.
pub struct Checkpoint {
    pub commit: Completion,
    pub rollback: Completion,
}

impl Checkpoint {
    /// Nothing to undo.
    pub fn none() -> Self {
        Self {
            commit: noop(),
            rollback: noop(),
        }
    }
}

/// Outcome of mapping one repository.
///
/// Created once per mapped repository and consumed exactly once by either
/// its commit or its rollback; the type system enforces the "exactly once".
pub struct ResultToken<T> {
    pub name: String,
    pub ok: bool,
    pub results: T,
    /// Why `ok` is false, when there is a single reason worth showing.
    pub error: Option<String>,
    commit: Completion,
    rollback: Completion,
}

impl<T: Default> ResultToken<T> {
    /// A successful token with no-op commit and rollback.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            results: T::default(),
            error: None,
            commit: noop(),
            rollback: noop(),
        }
    }

    /// A failed token with nothing to undo.
    pub fn failed(name: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut token = Self::new(name);
        token.fail(error);
        token
    }
}

impl<T> ResultToken<T> {
    pub fn with_results(mut self, results: T) -> Self {
        self.results = results;
        self
    }

    /// Bind the commit and rollback of `checkpoint` to this token.
    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.commit = checkpoint.commit;
        self.rollback = checkpoint.rollback;
    }

    /// Mark the token not-ok. The first recorded error wins.
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.ok = false;
        if self.error.is_none() {
            self.error = Some(error.to_string());
        }
    }

    /// Split into the caller-visible report and the action for this phase.
    pub(crate) fn settle(self, commit: bool) -> (TokenReport<T>, Completion) {
        let action = if commit { self.commit } else { self.rollback };
        (
            TokenReport {
                name: self.name,
                ok: self.ok,
                results: self.results,
                error: self.error,
            },
            action,
        )
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultToken")
            .field("name", &self.name)
            .field("ok", &self.ok)
            .field("results", &self.results)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// What is left of a token once its commit or rollback has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReport<T> {
    pub name: String,
    pub ok: bool,
    pub results: T,
    pub error: Option<String>,
}
