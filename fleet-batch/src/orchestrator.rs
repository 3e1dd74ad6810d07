//! Parallel transactional map-reduce over a set of repositories.
//!
//! ## `Orchestrator::run`: two joins
//!
//! 1. Map: one task per repository, admitted by a bounded worker pool and
//!    guarded by an optional timeout. Each task yields one [`ResultToken`].
//! 2. Reduce join: wait for exactly one token per repository; the batch is
//!    ok iff every token is ok, whatever order they arrive in.
//! 3. Commit/rollback join: run every token's commit (batch ok) or every
//!    token's rollback (batch not ok) concurrently and wait for all of them.
//!
//! If any commit or rollback reports failure the repositories are left in
//! mutually inconsistent states. That surfaces as
//! [`FleetError::Inconsistent`] and is never retried.
//!
//! A mapper that outlives its timeout is not abandoned: blocking tasks cannot
//! be cancelled, so its token is awaited for one more timeout period and then
//! marked failed with its real checkpoint kept. If it still has not finished,
//! its mutation cannot be undone and the batch is inconsistent.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use fleet_core::{FleetError, Phase, RepoHandle, RepoSet, Settings};

use crate::token::{Checkpoint, ResultToken, TokenReport};

/// Outcome of one batch, sorted by repository name.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub ok: bool,
    pub results: Vec<TokenReport<T>>,
}

impl<T> BatchReport<T> {
    /// Reports whose mapper did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &TokenReport<T>> {
        self.results.iter().filter(|r| !r.ok)
    }

    /// A rolled-back batch becomes [`FleetError::OperationFailed`] naming
    /// every repository that failed.
    pub fn into_result(self) -> Result<Self, FleetError> {
        if self.ok {
            return Ok(self);
        }
        let repos: Vec<&str> = self.failures().map(|r| r.name.as_str()).collect();
        let first = self
            .failures()
            .find_map(|r| r.error.as_deref())
            .unwrap_or("operation failed");
        Err(FleetError::failed(
            repos.join(", "),
            format!("rolled back after: {first}"),
        ))
    }
}

/// Runs mappers across repositories with all-or-nothing outcome.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    max_workers: usize,
    task_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(max_workers: usize, task_timeout: Option<Duration>) -> Self {
        Self {
            max_workers: max_workers.max(1),
            task_timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_workers, settings.task_timeout())
    }

    /// Map `mapper` over `repos`, reduce, then commit or roll back every token.
    ///
    /// `observe` sees each token as it arrives (arrival order is unspecified)
    /// and is meant for progress logging.
    pub async fn run<T, M, O>(
        &self,
        repos: &RepoSet,
        mapper: M,
        mut observe: O,
    ) -> Result<BatchReport<T>, FleetError>
    where
        T: Default + Send + 'static,
        M: Fn(&str, &RepoHandle) -> ResultToken<T> + Send + Sync + 'static,
        O: FnMut(&ResultToken<T>),
    {
        let mapper = Arc::new(mapper);
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<ResultToken<T>>();

        for (name, repo) in repos {
            let name = name.clone();
            let repo = Arc::clone(repo);
            let mapper = Arc::clone(&mapper);
            let permits = Arc::clone(&permits);
            let tx = tx.clone();
            let limit = self.task_timeout;
            tokio::spawn(async move {
                let token = map_one(name, repo, mapper, permits, limit).await;
                let _ = tx.send(token);
            });
        }
        drop(tx);

        let (ok, tokens) = reduce(&mut rx, repos.len(), &mut observe).await;
        settle(ok, tokens).await
    }
}

async fn map_one<T, M>(
    name: String,
    repo: RepoHandle,
    mapper: Arc<M>,
    permits: Arc<Semaphore>,
    limit: Option<Duration>,
) -> ResultToken<T>
where
    T: Default + Send + 'static,
    M: Fn(&str, &RepoHandle) -> ResultToken<T> + Send + Sync + 'static,
{
    let Ok(_permit) = permits.acquire_owned().await else {
        return ResultToken::failed(name, "worker pool closed");
    };

    let task_name = name.clone();
    let mut task = tokio::task::spawn_blocking(move || mapper(&task_name, &repo));
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => return overdue(name, task, limit).await,
        },
        None => task.await,
    };

    match joined {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(repo = %name, error = %e, "task panicked");
            ResultToken::failed(name, format!("task panicked: {e}"))
        }
    }
}

/// Wait one more `limit` for a mapper that missed its deadline. A late token
/// keeps its checkpoint so the batch rollback undoes its work; a token that
/// never arrives fails both commit and rollback.
async fn overdue<T>(
    name: String,
    task: JoinHandle<ResultToken<T>>,
    limit: Duration,
) -> ResultToken<T>
where
    T: Default + Send + 'static,
{
    tracing::warn!(repo = %name, timeout_ms = limit.as_millis() as u64, "task timed out");
    let reason = format!("timed out after {limit:?}");
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(mut token)) => {
            token.ok = false;
            token.error = Some(reason);
            token
        }
        Ok(Err(e)) => {
            tracing::error!(repo = %name, error = %e, "task panicked");
            ResultToken::failed(name, format!("task panicked: {e}"))
        }
        Err(_) => {
            tracing::error!(repo = %name, "task still running; its changes cannot be undone");
            let mut token = ResultToken::failed(name, reason);
            token.set_checkpoint(Checkpoint {
                commit: Box::new(|| false),
                rollback: Box::new(|| false),
            });
            token
        }
    }
}

/// Consume exactly `expected` tokens. Overall ok is the AND of every token's
/// `ok`; the returned tokens are sorted by name.
async fn reduce<T, O>(
    rx: &mut mpsc::UnboundedReceiver<ResultToken<T>>,
    expected: usize,
    observe: &mut O,
) -> (bool, Vec<ResultToken<T>>)
where
    O: FnMut(&ResultToken<T>),
{
    let mut ok = true;
    let mut tokens = Vec::with_capacity(expected);
    while tokens.len() < expected {
        let Some(token) = rx.recv().await else {
            break;
        };
        observe(&token);
        ok = ok && token.ok;
        tokens.push(token);
    }
    if tokens.len() < expected {
        tracing::error!(expected, received = tokens.len(), "tasks vanished before reporting");
        ok = false;
    }
    tokens.sort_by(|a, b| a.name.cmp(&b.name));
    (ok, tokens)
}

async fn settle<T>(ok: bool, tokens: Vec<ResultToken<T>>) -> Result<BatchReport<T>, FleetError>
where
    T: Send + 'static,
{
    let phase = if ok { Phase::Commit } else { Phase::Rollback };
    let mut running = JoinSet::new();
    let mut results = Vec::with_capacity(tokens.len());

    for token in tokens {
        let (report, action) = token.settle(ok);
        let name = report.name.clone();
        running.spawn_blocking(move || {
            let done = catch_unwind(AssertUnwindSafe(action)).unwrap_or(false);
            (name, done)
        });
        results.push(report);
    }

    let mut failed = Vec::new();
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok((_, true)) => {}
            Ok((name, false)) => failed.push(name),
            Err(e) => failed.push(format!("<{e}>")),
        }
    }

    if !failed.is_empty() {
        failed.sort();
        tracing::error!(%phase, repos = ?failed, "unable to {phase} all batch operations");
        return Err(FleetError::Inconsistent {
            phase,
            repos: failed,
        });
    }

    Ok(BatchReport { ok, results })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
