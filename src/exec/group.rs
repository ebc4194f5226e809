// ABOUTME: Parallel fan-out of commands and functions over an ordered set of hosts.
// ABOUTME: Captures per-host failures as HostResults and aggregates them only on request.

use super::command::{Command, CommandResult, RunOptions};
use super::error::{Error, Result};
use super::host::Host;
use super::sink::{OutputSink, TracingSink};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::Level;

/// The outcome of one host's share of a group operation.
#[derive(Debug)]
pub struct HostResult<T> {
    host: Host,
    result: Result<T>,
}

impl<T> HostResult<T> {
    pub fn new(host: Host, result: Result<T>) -> Self {
        Self { host, result }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// The captured error, if this host failed.
    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    /// The value, or the error that replaced it.
    pub fn result(&self) -> std::result::Result<&T, &Error> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Result<T> {
        self.result
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// An ordered collection of hosts operated on in parallel.
///
/// Result lists always have one entry per host, in the group's order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostGroup {
    hosts: Vec<Host>,
}

impl HostGroup {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Host> {
        self.hosts.iter()
    }

    /// A new group with only the hosts matching `pred`.
    pub fn filter<P>(&self, pred: P) -> HostGroup
    where
        P: Fn(&Host) -> bool,
    {
        HostGroup::new(self.hosts.iter().filter(|h| pred(h)).cloned().collect())
    }

    /// Run `cmd` over ssh on every host at once.
    pub async fn run(
        &self,
        cmd: impl Into<Command>,
        opts: &RunOptions,
    ) -> Result<Vec<HostResult<CommandResult>>> {
        let cmd = Arc::new(cmd.into());
        let opts = Arc::new(opts.clone());
        let sink = Arc::clone(&opts.sink);
        let check = opts.check;
        self.fan_out(
            move |host: Host| {
                let cmd = Arc::clone(&cmd);
                let opts = Arc::clone(&opts);
                async move { host.run(cmd.as_ref().clone(), &opts).await }
            },
            check,
            sink,
        )
        .await
    }

    /// Run `cmd` locally once per host, all at once, prefixed by each host.
    pub async fn run_local(
        &self,
        cmd: impl Into<Command>,
        opts: &RunOptions,
    ) -> Result<Vec<HostResult<CommandResult>>> {
        let cmd = Arc::new(cmd.into());
        let opts = Arc::new(opts.clone());
        let sink = Arc::clone(&opts.sink);
        let check = opts.check;
        self.fan_out(
            move |host: Host| {
                let cmd = Arc::clone(&cmd);
                let opts = Arc::clone(&opts);
                async move { host.run_local(cmd.as_ref().clone(), &opts).await }
            },
            check,
            sink,
        )
        .await
    }

    /// Call `func` for every host at once and collect what each returns.
    ///
    /// Errors (and panics) stay scoped to their host and are logged under its
    /// prefix as they happen. With `check`, every failure is logged again
    /// once all hosts are done, and the call fails with
    /// [`Error::GroupExecutionFailed`].
    pub async fn run_function<F, Fut, T, E>(&self, func: F, check: bool) -> Result<Vec<HostResult<T>>>
    where
        F: Fn(Host) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<Error> + Send + 'static,
    {
        self.fan_out(func, check, Arc::new(TracingSink)).await
    }

    async fn fan_out<F, Fut, T, E>(
        &self,
        func: F,
        check: bool,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Vec<HostResult<T>>>
    where
        F: Fn(Host) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<Error> + Send + 'static,
    {
        let func = Arc::new(func);
        let workers: Vec<_> = self
            .hosts
            .iter()
            .map(|host| {
                let func = Arc::clone(&func);
                let sink = Arc::clone(&sink);
                let host = host.clone();
                tokio::spawn(async move {
                    let prefix = host.prefix().to_string();
                    let result = func(host).await.map_err(Into::into);
                    if let Err(e) = &result {
                        sink.line(&prefix, Level::ERROR, &e.to_string());
                    }
                    result
                })
            })
            .collect();

        let outcomes = join_all(workers).await;

        let results: Vec<HostResult<T>> = self
            .hosts
            .iter()
            .zip(outcomes)
            .map(|(host, outcome)| {
                let result = outcome.unwrap_or_else(|join_error| {
                    tracing::debug!("worker for {} aborted: {}", host.prefix(), join_error);
                    let e = Error::WorkerPanicked {
                        host: host.prefix().to_string(),
                    };
                    sink.line(host.prefix(), Level::ERROR, &e.to_string());
                    Err(e)
                });
                HostResult::new(host.clone(), result)
            })
            .collect();

        if check {
            check_results_with(&results, sink.as_ref())?;
        }
        Ok(results)
    }
}

impl From<Vec<Host>> for HostGroup {
    fn from(hosts: Vec<Host>) -> Self {
        HostGroup::new(hosts)
    }
}

impl<'a> IntoIterator for &'a HostGroup {
    type Item = &'a Host;
    type IntoIter = std::slice::Iter<'a, Host>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

/// Log every failed host and fail if there was at least one.
pub fn check_results<T>(results: &[HostResult<T>]) -> Result<()> {
    check_results_with(results, &TracingSink)
}

fn check_results_with<T>(results: &[HostResult<T>], sink: &dyn OutputSink) -> Result<()> {
    let mut failed_count = 0;
    for result in results {
        if let Some(e) = result.error() {
            sink.line(result.host().prefix(), Level::ERROR, &format!("failed with: {e}"));
            failed_count += 1;
        }
    }
    if failed_count > 0 {
        return Err(Error::GroupExecutionFailed { failed_count });
    }
    Ok(())
}
