//! Local concurrent execution backend.
//!
//! Runs a bounded pool of workers, each independently preparing resources,
//! spawning the external process, and converting its exit status into a
//! result. Workers share the parameter stream and pull from it lazily, so
//! the stream is never buffered in full and backpressure is bounded by the
//! pool size.

use std::collections::BTreeMap;
use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cleanup::HandlerList;
use crate::error::{Result, SweepRunError};
use crate::executor::{BoxFuture, ParamStream, Processor, RunStream, lookup_command};
use crate::params::{ParamSet, ParamValue};
use crate::prepare::{PreparedFile, prepare_input, prepare_output};
use crate::process::ProcessTemplate;
use crate::result::RunResult;

/// Executor running processes concurrently on the local machine.
///
/// Cleanup of an invocation's files is deferred: on success its handlers
/// are merged into an executor-wide registry drained at
/// [`LocalExecutor::shutdown`], so result files outlive the worker that
/// produced them; on failure they run immediately, before the error
/// surfaces through the stream.
///
/// # Example
///
/// ```no_run
/// use sweeprun::{LocalExecutor, ProcessTemplate, Processor};
///
/// # async fn example() -> sweeprun::Result<()> {
/// let template = ProcessTemplate::builder().command("true").build()?;
/// let executor = LocalExecutor::builder().workers(4).build()?;
///
/// let params = (0..3).map(|i| {
///     std::collections::BTreeMap::from([("i".to_string(), sweeprun::ParamValue::from(i))])
/// });
/// let mut stream = executor.process(template, Box::new(params)).await?;
/// while let Some(outcome) = stream.next().await {
///     let (params, result) = outcome?;
///     println!("{params:?} exited with {}", result.exit_code());
/// }
/// executor.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct LocalExecutor {
    workers: usize,
    temp_dir: PathBuf,
    /// Executor-wide cleanup registry, drained once at shutdown.
    cleanup: Arc<Mutex<HandlerList>>,
    /// Worker tasks of all sweeps started through this executor.
    tasks: Mutex<JoinSet<()>>,
}

impl LocalExecutor {
    /// Creates a new executor builder.
    #[must_use]
    pub fn builder() -> LocalExecutorBuilder {
        LocalExecutorBuilder::default()
    }

    /// Number of worker slots.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Waits for all workers of started sweeps to finish, then drains the
    /// executor-wide cleanup registry.
    ///
    /// Call this only after the result streams have been consumed; workers
    /// block on the stream's backpressure until then.
    ///
    /// # Errors
    ///
    /// Returns the first cleanup handler failure.
    pub async fn shutdown(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("worker task failed: {e}");
            }
        }
        self.cleanup.lock().await.run()
    }
}

impl Processor for LocalExecutor {
    fn process(
        &self,
        template: ProcessTemplate,
        params: ParamStream,
    ) -> BoxFuture<'_, Result<RunStream>> {
        Box::pin(async move {
            let template = Arc::new(template);
            let params = Arc::new(Mutex::new(params));
            let (tx, rx) = mpsc::channel(self.workers);

            let mut tasks = self.tasks.lock().await;
            for worker_id in 0..self.workers {
                let template = Arc::clone(&template);
                let params = Arc::clone(&params);
                let shared_cleanup = Arc::clone(&self.cleanup);
                let temp_dir = self.temp_dir.clone();
                let tx = tx.clone();

                tasks.spawn(async move {
                    debug!("worker {worker_id} started");
                    loop {
                        let next = { params.lock().await.next() };
                        let Some(param_set) = next else { break };

                        let message = match run_one(&template, &param_set, &temp_dir).await {
                            Ok((result, handlers)) => {
                                shared_cleanup.lock().await.merge(handlers);
                                Ok((param_set, result))
                            }
                            Err(e) => {
                                debug!("invocation failed: {e}");
                                Err(e.for_params(param_set))
                            }
                        };

                        if tx.send(message).await.is_err() {
                            debug!("worker {worker_id}: consumer dropped, stopping");
                            break;
                        }
                    }
                    debug!("worker {worker_id} finished");
                });
            }

            Ok(RunStream::new(rx))
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Builder for [`LocalExecutor`].
#[derive(Debug, Default)]
pub struct LocalExecutorBuilder {
    workers: Option<usize>,
    temp_dir: Option<PathBuf>,
}

impl LocalExecutorBuilder {
    /// Sets the number of concurrently running processes. Defaults to 1.
    #[must_use]
    pub const fn workers(mut self, count: usize) -> Self {
        self.workers = Some(count);
        self
    }

    /// Directory for temporary files. Defaults to the system temp
    /// directory.
    #[must_use]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Builds the executor.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::InvalidConfig`] for a zero worker count.
    pub fn build(self) -> Result<LocalExecutor> {
        let workers = self.workers.unwrap_or(1);
        if workers == 0 {
            return Err(SweepRunError::InvalidConfig {
                reason: "worker count must be at least one".to_string(),
            });
        }

        Ok(LocalExecutor {
            workers,
            temp_dir: self.temp_dir.unwrap_or_else(std::env::temp_dir),
            cleanup: Arc::new(Mutex::new(HandlerList::new())),
            tasks: Mutex::new(JoinSet::new()),
        })
    }
}

/// Runs one invocation: prepare, spawn, scope-exit, classify.
///
/// On success the invocation's cleanup handlers are returned to the caller
/// for merging into the executor-wide registry. On any failure they are
/// drained here, after the scope handlers ran, so a failed invocation
/// never leaks files.
async fn run_one(
    template: &ProcessTemplate,
    params: &ParamSet,
    temp_dir: &Path,
) -> Result<(RunResult, HandlerList)> {
    let mut exit_handlers = HandlerList::new();
    let mut cleanup_handlers = HandlerList::new();

    let outcome = run_process(
        template,
        params,
        &mut exit_handlers,
        &mut cleanup_handlers,
        temp_dir,
    )
    .await;

    // Scope exit runs unconditionally, before classification; a missing
    // pinned output surfaces here as a process failure.
    let exit_outcome = exit_handlers.run();

    let result = match (outcome, exit_outcome) {
        (Ok(result), Ok(())) => result,
        (Err(e), _) | (Ok(_), Err(e)) => {
            drain_cleanup(&mut cleanup_handlers);
            return Err(e);
        }
    };

    if let Err(e) = template.failure_mode().classify(&result) {
        drain_cleanup(&mut cleanup_handlers);
        return Err(e);
    }

    Ok((result, cleanup_handlers))
}

fn drain_cleanup(handlers: &mut HandlerList) {
    if let Err(e) = handlers.run() {
        warn!("cleanup after failed invocation itself failed: {e}");
    }
}

async fn run_process(
    template: &ProcessTemplate,
    params: &ParamSet,
    exit_handlers: &mut HandlerList,
    cleanup_handlers: &mut HandlerList,
    temp_dir: &Path,
) -> Result<RunResult> {
    let io = template.resolve_io(params)?;

    let mut stdin_redirect = Stdio::null();
    let mut stdin_file = None;
    if let Some(spec) = &io.stdin {
        let prepared = prepare_input(spec, cleanup_handlers, temp_dir)?;
        stdin_redirect = Stdio::from(File::open(&prepared.open_path)?);
        stdin_file = Some(prepared);
    }

    let mut stdout_redirect = Stdio::null();
    let mut stdout_file = None;
    if let Some(spec) = &io.stdout {
        let prepared = prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir)?;
        stdout_redirect = Stdio::from(open_for_capture(&prepared)?);
        stdout_file = Some(prepared);
    }

    let mut stderr_redirect = Stdio::null();
    let mut stderr_file = None;
    if let Some(spec) = &io.stderr {
        let prepared = prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir)?;
        stderr_redirect = Stdio::from(open_for_capture(&prepared)?);
        stderr_file = Some(prepared);
    }

    // The log descriptor is realized for result symmetry with the batch
    // backend; nothing writes to it locally.
    let log_file = io
        .log
        .as_ref()
        .map(|spec| prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir))
        .transpose()?;

    let inputs: Vec<PreparedFile> = io
        .inputs
        .iter()
        .map(|spec| prepare_input(spec, cleanup_handlers, temp_dir))
        .collect::<Result<_>>()?;

    let outputs: Vec<PreparedFile> = io
        .outputs
        .iter()
        .map(|spec| prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir))
        .collect::<Result<_>>()?;

    let augmented = augment_with_file_params(params, inputs.iter().chain(outputs.iter()));
    let invocation = template.resolve_invocation(&augmented)?;
    let command_path = lookup_command(&invocation.command)?;

    debug!("spawning {} for {params:?}", command_path.display());

    let mut cmd = Command::new(&command_path);
    cmd.args(&invocation.args)
        .env_clear()
        .envs(&invocation.env)
        .stdin(stdin_redirect)
        .stdout(stdout_redirect)
        .stderr(stderr_redirect);
    if let Some(dir) = &invocation.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;
    let status = child.wait().await?;

    let Some(exit_code) = status.code() else {
        let signal = status.signal();
        return Err(SweepRunError::ProcessFailed {
            reason: match signal {
                Some(n) => format!("process terminated by signal {n}"),
                None => "process terminated without exit code".to_string(),
            },
            exit_code: None,
            signal,
        });
    };

    debug!("process exited with code {exit_code}");

    Ok(RunResult {
        exit_code,
        stdin: stdin_file.map(|f| f.accessor()),
        stdout: stdout_file.map(|f| f.accessor()),
        stderr: stderr_file.map(|f| f.accessor()),
        log: log_file.map(|f| f.accessor()),
        input_files: accessors_by_name(&inputs),
        output_files: accessors_by_name(&outputs),
    })
}

fn open_for_capture(prepared: &PreparedFile) -> Result<File> {
    Ok(std::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&prepared.open_path)?)
}

/// Merges `__file_<name>` synthetic parameters into a copy of `params` so
/// argument and environment templates can reference realized file paths.
pub(crate) fn augment_with_file_params<'a>(
    params: &ParamSet,
    files: impl Iterator<Item = &'a PreparedFile>,
) -> ParamSet {
    let mut augmented = params.clone();
    for file in files {
        augmented.insert(
            format!("__file_{}", file.name),
            ParamValue::Str(file.process_path.display().to_string()),
        );
    }
    augmented
}

fn accessors_by_name(files: &[PreparedFile]) -> BTreeMap<String, crate::result::FileAccessor> {
    files
        .iter()
        .map(|file| (file.name.clone(), file.accessor()))
        .collect()
}
