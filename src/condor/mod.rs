//! HTCondor batch execution backend.
//!
//! Translates one process template plus a stream of parameter sets into a
//! single cluster submission (one proc per parameter set), polls the
//! scheduler until every proc completed, and demultiplexes per-proc
//! results.
//!
//! Files travel one of two ways. In transfer mode every input and output
//! file is staged through a local intermediary with a collision-free
//! basename (a temp file, or a temp symlink at a pre-existing source), so
//! execution needs no shared filesystem; output basenames are paired with
//! their final local path through an explicit remap table. In no-transfer
//! mode files are prepared at addressable local paths and passed by
//! absolute path.

pub mod ads;
pub mod schedd;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cleanup::HandlerList;
use crate::condor::ads::{
    JobState, StatusCounts, SubmitRecord, args_to_str, environment_to_str, file_remaps_to_str,
    files_to_str,
};
use crate::condor::schedd::{CondorCli, Schedd};
use crate::error::{Result, SweepRunError};
use crate::executor::{BoxFuture, ParamStream, Processor, RunStream, lookup_command};
use crate::params::{ParamSet, ParamValue, Resolvable};
use crate::prepare::{PreparedFile, make_temp_file, make_temp_link, prepare_input, prepare_output};
use crate::process::ProcessTemplate;
use crate::result::RunResult;

/// A process template wrapped with batch-specific settings: extra submit
/// commands and the file-transfer strategy.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    process: ProcessTemplate,
    commands: BTreeMap<String, Resolvable<String>>,
    transfer_files: Resolvable<bool>,
}

impl JobTemplate {
    /// Creates a new job template builder.
    #[must_use]
    pub fn builder() -> JobTemplateBuilder {
        JobTemplateBuilder::default()
    }

    /// The wrapped process template.
    #[must_use]
    pub const fn process(&self) -> &ProcessTemplate {
        &self.process
    }
}

impl From<ProcessTemplate> for JobTemplate {
    fn from(process: ProcessTemplate) -> Self {
        Self {
            process,
            commands: BTreeMap::new(),
            transfer_files: Resolvable::Literal(true),
        }
    }
}

/// Builder for [`JobTemplate`].
#[derive(Debug, Default)]
pub struct JobTemplateBuilder {
    process: Option<ProcessTemplate>,
    commands: BTreeMap<String, Resolvable<String>>,
    transfer_files: Option<Resolvable<bool>>,
}

impl JobTemplateBuilder {
    /// Sets the process to execute. Required.
    #[must_use]
    pub fn process(mut self, process: ProcessTemplate) -> Self {
        self.process = Some(process);
        self
    }

    /// Adds one extra submit command. Values are resolved against each
    /// parameter set, with realized file paths available as
    /// `__file_<name>` parameters.
    #[must_use]
    pub fn submit_command(
        mut self,
        key: impl Into<String>,
        value: impl Into<Resolvable<String>>,
    ) -> Self {
        self.commands.insert(key.into(), value.into());
        self
    }

    /// Whether the scheduler's file transfer mechanism is used. Defaults
    /// to `true`; may be parameter-dependent.
    #[must_use]
    pub fn transfer_files(mut self, transfer: impl Into<Resolvable<bool>>) -> Self {
        self.transfer_files = Some(transfer.into());
        self
    }

    /// Finalizes the job template.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::TemplateInvalid`] when no process is set.
    pub fn build(self) -> Result<JobTemplate> {
        let Some(process) = self.process else {
            return Err(SweepRunError::TemplateInvalid {
                reason: "job template needs a process".to_string(),
            });
        };

        Ok(JobTemplate {
            process,
            commands: self.commands,
            transfer_files: self
                .transfer_files
                .unwrap_or(Resolvable::Literal(true)),
        })
    }
}

/// Executor submitting sweeps to an HTCondor queue.
///
/// Known gap carried over from observed behavior: the poll loop has no
/// terminal timeout and no held-job escalation. A held or stuck proc keeps
/// the loop running at the capped interval until the queue changes.
///
/// # Example
///
/// ```no_run
/// use sweeprun::{CondorExecutor, ProcessTemplate, Processor};
///
/// # async fn example() -> sweeprun::Result<()> {
/// let template = ProcessTemplate::builder().command("simulate").build()?;
/// let executor = CondorExecutor::builder().build();
///
/// let params = (0..10).map(|i| {
///     std::collections::BTreeMap::from([("seed".to_string(), sweeprun::ParamValue::from(i))])
/// });
/// let results = executor
///     .process(template, Box::new(params))
///     .await?
///     .try_collect()
///     .await?;
/// executor.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct CondorExecutor {
    schedd: Arc<dyn Schedd>,
    temp_dir: PathBuf,
    poll_first: Duration,
    poll_max: Duration,
    /// Executor-wide cleanup registry, drained once at shutdown.
    cleanup: Mutex<HandlerList>,
}

impl CondorExecutor {
    /// Creates a new executor builder.
    #[must_use]
    pub fn builder() -> CondorExecutorBuilder {
        CondorExecutorBuilder::default()
    }

    /// Executes a job template (process plus batch settings) once per
    /// parameter set.
    ///
    /// # Errors
    ///
    /// Returns an error when cluster assembly, submission, polling, or
    /// any proc of the cluster fails.
    pub async fn process_job(&self, job: JobTemplate, params: ParamStream) -> Result<RunStream> {
        let results = self.run_job(&job, params).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(results.len().max(1));
        for pair in results {
            if tx.try_send(Ok(pair)).is_err() {
                warn!("dropped a batch result while filling the stream");
            }
        }
        Ok(RunStream::new(rx))
    }

    /// Drains the executor-wide cleanup registry.
    ///
    /// Call after the results of all sweeps have been consumed.
    ///
    /// # Errors
    ///
    /// Returns the first cleanup handler failure.
    pub async fn shutdown(&self) -> Result<()> {
        self.cleanup.lock().await.run()
    }

    async fn run_job(
        &self,
        job: &JobTemplate,
        params: ParamStream,
    ) -> Result<Vec<(ParamSet, RunResult)>> {
        if job.process.has_working_dir() {
            return Err(SweepRunError::TemplateInvalid {
                reason: "the batch backend does not support a working directory".to_string(),
            });
        }

        let mut assembly = assemble_cluster(job, params, &self.temp_dir);

        if let Some(error) = assembly.error.take() {
            fail_scope(&mut assembly);
            return Err(error);
        }

        if assembly.records.is_empty() {
            // Nothing to submit; an empty stream yields an empty sweep.
            return Ok(Vec::new());
        }

        let cluster_id = match self.schedd.submit(assembly.records.clone()).await {
            Ok(id) => id,
            Err(e) => {
                fail_scope(&mut assembly);
                return Err(e);
            }
        };

        info!(
            "submitted cluster {cluster_id} with {} procs",
            assembly.procs.len()
        );

        // From here on the cluster is removed from the queue on every exit
        // path; completed procs stay queryable until then through the
        // leave_in_queue guard.
        let outcome = match self.poll_until_complete(cluster_id).await {
            Ok(states) => demux_results(job, &assembly.procs, &states),
            Err(e) => Err(e),
        };

        if let Err(e) = self.schedd.remove(cluster_id).await {
            warn!("failed to remove cluster {cluster_id} from the queue: {e}");
        }

        let exit_outcome = assembly.exit_handlers.run();

        match (outcome, exit_outcome) {
            (Ok(results), Ok(())) => {
                self.cleanup.lock().await.merge(assembly.cleanup_handlers);
                Ok(results)
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                drain_cleanup(&mut assembly.cleanup_handlers);
                Err(e)
            }
        }
    }

    async fn poll_until_complete(&self, cluster_id: u64) -> Result<BTreeMap<usize, JobState>> {
        let mut job_states = BTreeMap::new();

        for sleep_time in poll_sleep_times(self.poll_first, self.poll_max) {
            tokio::time::sleep(sleep_time).await;

            let ads = self.schedd.query(cluster_id, &JobState::PROJECTION).await?;

            job_states.clear();
            for ad in &ads {
                let state = JobState::from_ad(ad)?;
                let proc_id = usize::try_from(state.proc_id).map_err(|_| {
                    SweepRunError::SubmissionError {
                        reason: format!("proc id {} out of range", state.proc_id),
                    }
                })?;
                job_states.insert(proc_id, state);
            }

            let counts = StatusCounts::from_states(job_states.values());
            info!("cluster {cluster_id}: {counts}");

            if counts.completed == counts.total() {
                break;
            }
        }

        Ok(job_states)
    }
}

impl Processor for CondorExecutor {
    fn process(
        &self,
        template: ProcessTemplate,
        params: ParamStream,
    ) -> BoxFuture<'_, Result<RunStream>> {
        Box::pin(async move { self.process_job(JobTemplate::from(template), params).await })
    }

    fn name(&self) -> &'static str {
        "condor"
    }
}

/// Builder for [`CondorExecutor`].
#[derive(Default)]
pub struct CondorExecutorBuilder {
    schedd: Option<Arc<dyn Schedd>>,
    temp_dir: Option<PathBuf>,
    poll_first: Option<Duration>,
    poll_max: Option<Duration>,
}

impl CondorExecutorBuilder {
    /// Sets the scheduler interface. Defaults to [`CondorCli`].
    #[must_use]
    pub fn schedd(mut self, schedd: Arc<dyn Schedd>) -> Self {
        self.schedd = Some(schedd);
        self
    }

    /// Directory for temporary files, symlinks, and staging files.
    /// Defaults to the system temp directory.
    #[must_use]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// First and maximum poll sleep interval. Sleeps double from the
    /// first value and stay at the maximum once reached. Defaults to
    /// 10 and 600 seconds.
    #[must_use]
    pub const fn poll_interval(mut self, first: Duration, max: Duration) -> Self {
        self.poll_first = Some(first);
        self.poll_max = Some(max);
        self
    }

    /// Builds the executor.
    #[must_use]
    pub fn build(self) -> CondorExecutor {
        CondorExecutor {
            schedd: self
                .schedd
                .unwrap_or_else(|| Arc::new(CondorCli::new())),
            temp_dir: self.temp_dir.unwrap_or_else(std::env::temp_dir),
            poll_first: self.poll_first.unwrap_or(Duration::from_secs(10)),
            poll_max: self.poll_max.unwrap_or(Duration::from_secs(600)),
            cleanup: Mutex::new(HandlerList::new()),
        }
    }
}

/// Everything produced while realizing one cluster: submission records,
/// per-proc file descriptors, and the two handler registries of this
/// scope.
struct ClusterAssembly {
    records: Vec<SubmitRecord>,
    procs: Vec<ProcInfo>,
    exit_handlers: HandlerList,
    cleanup_handlers: HandlerList,
    error: Option<SweepRunError>,
}

/// Prepared files of one proc, kept for result assembly after polling.
struct ProcInfo {
    params: ParamSet,
    stdin: Option<PreparedFile>,
    stdout: Option<PreparedFile>,
    stderr: Option<PreparedFile>,
    log: Option<PreparedFile>,
    inputs: Vec<PreparedFile>,
    outputs: Vec<PreparedFile>,
}

impl ProcInfo {
    fn new(params: ParamSet) -> Self {
        Self {
            params,
            stdin: None,
            stdout: None,
            stderr: None,
            log: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn result(&self, exit_code: i32) -> RunResult {
        let by_name = |files: &[PreparedFile]| {
            files
                .iter()
                .map(|file| (file.name.clone(), file.accessor()))
                .collect()
        };

        RunResult {
            exit_code,
            stdin: self.stdin.as_ref().map(PreparedFile::accessor),
            stdout: self.stdout.as_ref().map(PreparedFile::accessor),
            stderr: self.stderr.as_ref().map(PreparedFile::accessor),
            log: self.log.as_ref().map(PreparedFile::accessor),
            input_files: by_name(&self.inputs),
            output_files: by_name(&self.outputs),
        }
    }
}

/// Realizes the whole parameter stream into submission records.
///
/// The scheduler's binding layer is known to crash on an empty item
/// stream, so when realizing the very first parameter set fails, a
/// placeholder record is still emitted before the error is surfaced.
fn assemble_cluster(job: &JobTemplate, params_it: ParamStream, temp_dir: &Path) -> ClusterAssembly {
    let mut records = Vec::new();
    let mut procs = Vec::new();
    let mut exit_handlers = HandlerList::new();
    let mut cleanup_handlers = HandlerList::new();
    let mut error = None;

    for params in params_it {
        match build_record(
            job,
            &params,
            temp_dir,
            &mut exit_handlers,
            &mut cleanup_handlers,
        ) {
            Ok((record, info)) => {
                debug!("assembled proc {} for {params:?}", procs.len());
                records.push(record);
                procs.push(info);
            }
            Err(e) => {
                if records.is_empty() {
                    records.push(placeholder_record());
                }
                error = Some(e.for_params(params));
                break;
            }
        }
    }

    ClusterAssembly {
        records,
        procs,
        exit_handlers,
        cleanup_handlers,
        error,
    }
}

fn placeholder_record() -> SubmitRecord {
    SubmitRecord::from([("executable".to_string(), "/bin/ls".to_string())])
}

fn build_record(
    job: &JobTemplate,
    params: &ParamSet,
    temp_dir: &Path,
    exit_handlers: &mut HandlerList,
    cleanup_handlers: &mut HandlerList,
) -> Result<(SubmitRecord, ProcInfo)> {
    let io = job.process.resolve_io(params)?;
    let mut info = ProcInfo::new(params.clone());
    let mut data = SubmitRecord::new();

    if let Some(spec) = &io.stdin {
        let prepared = prepare_input(spec, cleanup_handlers, temp_dir)?;
        data.insert("input".to_string(), path_str(&prepared.open_path));
        info.stdin = Some(prepared);
    }
    if let Some(spec) = &io.stdout {
        let prepared = prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir)?;
        data.insert("output".to_string(), path_str(&prepared.open_path));
        info.stdout = Some(prepared);
    }
    if let Some(spec) = &io.stderr {
        let prepared = prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir)?;
        data.insert("error".to_string(), path_str(&prepared.open_path));
        info.stderr = Some(prepared);
    }
    if let Some(spec) = &io.log {
        let prepared = prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir)?;
        data.insert("log".to_string(), path_str(&prepared.open_path));
        info.log = Some(prepared);
    }

    let transfer = job.transfer_files.resolve(params)?;

    if transfer {
        for spec in &io.inputs {
            // A pre-existing source keeps its path; a fresh symlink in the
            // temp directory supplies the collision-free basename the
            // transfer mechanism needs.
            let mut prepared = prepare_input(spec, cleanup_handlers, temp_dir)?;
            if !prepared.temporary {
                let link = make_temp_link(&prepared.open_path, temp_dir)?;
                exit_handlers.push_remove_file(link.clone());
                prepared = prepared.with_process_path(link);
            }
            info.inputs.push(prepared);
        }
        for spec in &io.outputs {
            // Pinned outputs also go through a staging temp file so their
            // remote basename cannot collide.
            let mut prepared = prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir)?;
            if !prepared.temporary {
                let staging = make_temp_file(temp_dir)?;
                exit_handlers.push_remove_file(staging.clone());
                prepared = prepared.with_process_path(staging);
            }
            info.outputs.push(prepared);
        }

        data.insert("should_transfer_files".to_string(), "YES".to_string());
        data.insert("transfer_executable".to_string(), "True".to_string());
        data.insert("transfer_input".to_string(), "True".to_string());
        data.insert("transfer_output".to_string(), "True".to_string());
        data.insert("transfer_error".to_string(), "True".to_string());
        data.insert(
            "transfer_input_files".to_string(),
            files_to_str(info.inputs.iter().map(|file| path_str(&file.process_path))),
        );
        data.insert(
            "transfer_output_files".to_string(),
            files_to_str(info.outputs.iter().map(|file| basename(&file.process_path))),
        );
        data.insert(
            "transfer_output_remaps".to_string(),
            file_remaps_to_str(
                &info
                    .outputs
                    .iter()
                    .map(|file| (basename(&file.process_path), path_str(&file.open_path)))
                    .collect::<Vec<_>>(),
            ),
        );
        data.insert(
            "when_to_transfer_output".to_string(),
            "ON_EXIT".to_string(),
        );
    } else {
        for spec in &io.inputs {
            info.inputs
                .push(prepare_input(spec, cleanup_handlers, temp_dir)?);
        }
        for spec in &io.outputs {
            info.outputs
                .push(prepare_output(spec, exit_handlers, cleanup_handlers, temp_dir)?);
        }

        data.insert("should_transfer_files".to_string(), "NO".to_string());
        data.insert("transfer_executable".to_string(), "False".to_string());
        data.insert("transfer_input".to_string(), "False".to_string());
        data.insert("transfer_output".to_string(), "False".to_string());
        data.insert("transfer_error".to_string(), "False".to_string());
    }

    // In transfer mode the process sees only the travelling basename.
    let mut augmented = params.clone();
    for file in info.inputs.iter().chain(info.outputs.iter()) {
        let visible = if transfer {
            basename(&file.process_path)
        } else {
            path_str(&file.process_path)
        };
        augmented.insert(format!("__file_{}", file.name), ParamValue::Str(visible));
    }

    let invocation = job.process.resolve_invocation(&augmented)?;

    data.insert("universe".to_string(), "vanilla".to_string());
    data.insert(
        "executable".to_string(),
        path_str(&lookup_command(&invocation.command)?),
    );
    data.insert("arguments".to_string(), args_to_str(&invocation.args));
    data.insert(
        "environment".to_string(),
        environment_to_str(&invocation.env),
    );
    data.insert("leave_in_queue".to_string(), "JobStatus != 3".to_string());

    for (key, value) in &job.commands {
        data.insert(key.clone(), value.resolve(&augmented)?);
    }

    Ok((data, info))
}

fn demux_results(
    job: &JobTemplate,
    procs: &[ProcInfo],
    states: &BTreeMap<usize, JobState>,
) -> Result<Vec<(ParamSet, RunResult)>> {
    let mut results = Vec::with_capacity(procs.len());

    for (proc_id, info) in procs.iter().enumerate() {
        let state = states
            .get(&proc_id)
            .ok_or_else(|| SweepRunError::SubmissionError {
                reason: format!("no final status for proc {proc_id}"),
            })?;

        if state.exit_by_signal {
            let reason = match state.exit_signal {
                Some(signal) => format!("process terminated by signal {signal}"),
                None => "process terminated by unknown signal".to_string(),
            };
            return Err(SweepRunError::ProcessFailed {
                reason,
                exit_code: None,
                signal: state.exit_signal,
            }
            .for_params(info.params.clone()));
        }

        let Some(exit_code) = state.exit_code else {
            return Err(SweepRunError::SubmissionError {
                reason: format!("completed proc {proc_id} has no exit code"),
            }
            .for_params(info.params.clone()));
        };

        let result = info.result(exit_code);
        job.process
            .failure_mode()
            .classify(&result)
            .map_err(|e| e.for_params(info.params.clone()))?;

        results.push((info.params.clone(), result));
    }

    Ok(results)
}

fn fail_scope(assembly: &mut ClusterAssembly) {
    if let Err(e) = assembly.exit_handlers.run() {
        warn!("scope handler failed during cluster abort: {e}");
    }
    drain_cleanup(&mut assembly.cleanup_handlers);
}

fn drain_cleanup(handlers: &mut HandlerList) {
    if let Err(e) = handlers.run() {
        warn!("cleanup after failed cluster itself failed: {e}");
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| {
            name.to_string_lossy().into_owned()
        })
}

/// Doubling poll backoff: sleeps double from `first` and hold at `max`
/// once reached.
fn poll_sleep_times(first: Duration, max: Duration) -> impl Iterator<Item = Duration> {
    let mut current = first;
    std::iter::from_fn(move || {
        if current < max {
            let value = current;
            current = current.saturating_mul(2);
            Some(value)
        } else {
            Some(max)
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_sleep_times_doubling_and_cap() {
        let times: Vec<u64> = poll_sleep_times(
            Duration::from_secs(10),
            Duration::from_secs(600),
        )
        .take(9)
        .map(|d| d.as_secs())
        .collect();
        assert_eq!(times, vec![10, 20, 40, 80, 160, 320, 600, 600, 600]);
    }

    #[test]
    fn test_poll_sleep_times_first_at_cap() {
        let times: Vec<u64> = poll_sleep_times(
            Duration::from_secs(600),
            Duration::from_secs(600),
        )
        .take(2)
        .map(|d| d.as_secs())
        .collect();
        assert_eq!(times, vec![600, 600]);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename(Path::new("/tmp/x/file.bin")), "file.bin");
        assert_eq!(basename(Path::new("file.bin")), "file.bin");
    }

    #[test]
    fn test_job_template_requires_process() {
        assert!(matches!(
            JobTemplate::builder().build(),
            Err(SweepRunError::TemplateInvalid { .. })
        ));
    }

    #[test]
    fn test_job_template_from_process_defaults_to_transfer() {
        let process = ProcessTemplate::builder().command("true").build().unwrap();
        let job = JobTemplate::from(process);
        assert!(job.transfer_files.resolve(&ParamSet::new()).unwrap());
        assert!(job.commands.is_empty());
    }

    #[test]
    fn test_assembler_yields_placeholder_when_first_record_fails() {
        use crate::resource::{InputSpec, Source};

        let dir = tempfile::tempdir().unwrap();
        let pinned = dir.path().join("input.dat");
        std::fs::write(&pinned, b"occupied").unwrap();

        let process = ProcessTemplate::builder()
            .command("/bin/true")
            .input_file(InputSpec::named("data", Source::bytes(b"y".to_vec())).pinned(pinned))
            .build()
            .unwrap();
        let job = JobTemplate::from(process);

        let params: ParamStream = Box::new(std::iter::once(ParamSet::new()));
        let mut assembly = assemble_cluster(&job, params, dir.path());

        // The record list handed to a scheduler binding must never be
        // empty, even though realizing the first parameter set failed.
        assert!(assembly.error.is_some());
        assert_eq!(assembly.records.len(), 1);
        assert_eq!(
            assembly.records[0].get("executable").map(String::as_str),
            Some("/bin/ls")
        );
        assert!(assembly.procs.is_empty());

        drain_cleanup(&mut assembly.cleanup_handlers);
    }

    #[test]
    fn test_assembler_keeps_earlier_records_on_later_failure() {
        use crate::params::ParamValue;
        use crate::resource::{InputSpec, Source};

        let dir = tempfile::tempdir().unwrap();
        let occupied = dir.path().join("occupied.dat");
        std::fs::write(&occupied, b"x").unwrap();

        // The pinned destination is parameter-dependent: the first set
        // lands on a fresh path, the second on the occupied one.
        let process = ProcessTemplate::builder()
            .command("/bin/true")
            .input_file(
                InputSpec::named("data", Source::bytes(b"y".to_vec()))
                    .pinned(Resolvable::format("{target}")),
            )
            .build()
            .unwrap();
        let job = JobTemplate::from(process);

        let fresh = dir.path().join("fresh.dat");
        let targets = [fresh.clone(), occupied];
        let params: ParamStream = Box::new(targets.into_iter().map(|target| -> ParamSet {
            ParamSet::from([(
                "target".to_string(),
                ParamValue::from(target.display().to_string()),
            )])
        }));

        let mut assembly = assemble_cluster(&job, params, dir.path());

        assert!(assembly.error.is_some());
        assert_eq!(assembly.records.len(), 1);
        assert_eq!(assembly.procs.len(), 1);
        assert!(
            assembly.records[0]
                .get("executable")
                .is_some_and(|exe| exe != "/bin/ls")
        );

        drain_cleanup(&mut assembly.cleanup_handlers);
        let _ = assembly.exit_handlers.run();
    }
}
