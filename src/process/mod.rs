//! Process templates: parameter-independent descriptions of one
//! invocation.
//!
//! A [`ProcessTemplate`] is built once, validated at finalize time, and
//! then resolved against each parameter set of a sweep. Executors obtain
//! the file side through [`ProcessTemplate::resolve_io`], realize the
//! files, merge the `__file_<name>` synthetic parameters into the set, and
//! resolve command, arguments, and environment against the augmented set
//! through [`ProcessTemplate::resolve_invocation`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, SweepRunError};
use crate::params::{ParamSet, Resolvable, resolve_all};
use crate::resource::{InputSpec, OutputSpec, RESERVED_NAMES, ResolvedInput, ResolvedOutput};
use crate::result::{FileAccessor, RunResult};

/// Environment variable set of a process, built through
/// [`EnvironmentBuilder`].
///
/// The spawned process receives exactly these variables; nothing is
/// inherited implicitly. Use [`EnvironmentBuilder::inherit`] and friends to
/// pull variables from the ambient environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Vec<(String, Resolvable<String>)>,
}

impl Environment {
    /// Creates a new environment builder.
    #[must_use]
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Evaluates all variables against `params`.
    ///
    /// # Errors
    ///
    /// Propagates the first value-resolution error.
    pub fn evaluate(&self, params: &ParamSet) -> Result<BTreeMap<String, String>> {
        self.vars
            .iter()
            .map(|(key, value)| Ok((key.clone(), value.resolve(params)?)))
            .collect()
    }
}

/// Builder for [`Environment`].
///
/// Each mutating call appends to a stack of entries; `build` collapses the
/// stack so that later entries override or unset earlier ones.
#[derive(Debug, Default)]
pub struct EnvironmentBuilder {
    // None as a value unsets the variable.
    entries: Vec<(String, Option<Resolvable<String>>)>,
}

impl EnvironmentBuilder {
    /// Sets a variable.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Resolvable<String>>) -> Self {
        self.entries.push((name.into(), Some(value.into())));
        self
    }

    /// Unsets a variable set by an earlier call.
    #[must_use]
    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), None));
        self
    }

    /// Inherits every variable of the ambient process environment.
    #[must_use]
    pub fn inherit(self) -> Self {
        self.inherit_filtered(|_| true)
    }

    /// Inherits only the named variables from the ambient environment.
    #[must_use]
    pub fn inherit_whitelist<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.inherit_filtered(|name| allowed.contains(name))
    }

    /// Inherits all but the named variables from the ambient environment.
    #[must_use]
    pub fn inherit_blacklist<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let denied: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.inherit_filtered(|name| !denied.contains(name))
    }

    fn inherit_filtered(mut self, keep: impl Fn(&str) -> bool) -> Self {
        for (name, value) in std::env::vars() {
            if keep(&name) {
                self.entries.push((name, Some(Resolvable::Literal(value))));
            }
        }
        self
    }

    /// Collapses the entry stack into an [`Environment`].
    #[must_use]
    pub fn build(self) -> Environment {
        let mut vars: Vec<(String, Resolvable<String>)> = Vec::new();
        for (key, value) in self.entries {
            vars.retain(|(existing, _)| *existing != key);
            if let Some(value) = value {
                vars.push((key, value));
            }
        }
        Environment { vars }
    }
}

/// Exit-code failure predicate.
pub type ExitCodePredicate = Arc<dyn Fn(i32) -> bool + Send + Sync>;

/// Stream-content failure predicate.
pub type StreamPredicate = Arc<dyn Fn(&FileAccessor) -> bool + Send + Sync>;

/// When a completed execution is considered failed.
///
/// If any configured predicate returns `true`, the execution failed.
/// Predicates are evaluated in a fixed order: exit code, stderr, stdout.
/// The default classifies any non-zero exit code as a failure.
#[derive(Clone, Default)]
pub struct FailureMode {
    exit_code: Option<ExitCodePredicate>,
    stderr: Option<StreamPredicate>,
    stdout: Option<StreamPredicate>,
}

impl FailureMode {
    /// No predicate at all: every completed execution counts as a
    /// success.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// The default behavior: exit code `!= 0` is a failure.
    #[must_use]
    pub fn exit_nonzero() -> Self {
        Self::none().with_exit_code(|code| code != 0)
    }

    /// Adds an exit-code predicate.
    #[must_use]
    pub fn with_exit_code<F>(mut self, f: F) -> Self
    where
        F: Fn(i32) -> bool + Send + Sync + 'static,
    {
        self.exit_code = Some(Arc::new(f));
        self
    }

    /// Adds a stderr-content predicate. Requires stderr capture.
    #[must_use]
    pub fn with_stderr<F>(mut self, f: F) -> Self
    where
        F: Fn(&FileAccessor) -> bool + Send + Sync + 'static,
    {
        self.stderr = Some(Arc::new(f));
        self
    }

    /// Adds a stdout-content predicate. Requires stdout capture.
    #[must_use]
    pub fn with_stdout<F>(mut self, f: F) -> Self
    where
        F: Fn(&FileAccessor) -> bool + Send + Sync + 'static,
    {
        self.stdout = Some(Arc::new(f));
        self
    }

    pub(crate) fn interprets_stderr(&self) -> bool {
        self.stderr.is_some()
    }

    pub(crate) fn interprets_stdout(&self) -> bool {
        self.stdout.is_some()
    }

    /// Classifies a completed execution.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::ProcessFailed`] when any predicate
    /// interprets the result as a failure.
    pub fn classify(&self, result: &RunResult) -> Result<()> {
        if let Some(predicate) = &self.exit_code
            && predicate(result.exit_code())
        {
            return Err(SweepRunError::ProcessFailed {
                reason: format!("exit code {} interpreted as failure", result.exit_code()),
                exit_code: Some(result.exit_code()),
                signal: None,
            });
        }
        if let Some(predicate) = &self.stderr
            && predicate(result.stderr()?)
        {
            return Err(SweepRunError::ProcessFailed {
                reason: "stderr interpreted as failure".to_string(),
                exit_code: Some(result.exit_code()),
                signal: None,
            });
        }
        if let Some(predicate) = &self.stdout
            && predicate(result.stdout()?)
        {
            return Err(SweepRunError::ProcessFailed {
                reason: "stdout interpreted as failure".to_string(),
                exit_code: Some(result.exit_code()),
                signal: None,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureMode")
            .field("exit_code", &self.exit_code.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("stdout", &self.stdout.is_some())
            .finish()
    }
}

/// Immutable description of one process invocation, resolved per
/// parameter set.
///
/// # Example
///
/// ```no_run
/// use sweeprun::{InputSpec, OutputSpec, ProcessTemplate, Resolvable, Source};
///
/// let template = ProcessTemplate::builder()
///     .command("simulate")
///     .arg("-f")
///     .arg(Resolvable::param("__file_access_seq"))
///     .arg("--storage-size")
///     .arg(Resolvable::param("storage_size"))
///     .input_file(InputSpec::named("access_seq", Source::path("/data/accessseq.json")))
///     .output_file(OutputSpec::named("stats").pinned(Resolvable::format("/data/stats_{storage_size}.csv")))
///     .capture_stdout(OutputSpec::capture())
///     .build()?;
/// # Ok::<(), sweeprun::SweepRunError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProcessTemplate {
    command: Resolvable<String>,
    args: Vec<Resolvable<String>>,
    working_dir: Option<Resolvable<PathBuf>>,
    environment: Environment,
    stdin: Option<InputSpec>,
    stdout: Option<OutputSpec>,
    stderr: Option<OutputSpec>,
    log: Option<OutputSpec>,
    input_files: BTreeMap<String, InputSpec>,
    output_files: BTreeMap<String, OutputSpec>,
    failure_mode: FailureMode,
}

impl ProcessTemplate {
    /// Creates a new template builder.
    #[must_use]
    pub fn builder() -> ProcessTemplateBuilder {
        ProcessTemplateBuilder::default()
    }

    /// The failure classification configured for this template.
    #[must_use]
    pub const fn failure_mode(&self) -> &FailureMode {
        &self.failure_mode
    }

    /// Whether a working directory is configured.
    #[must_use]
    pub const fn has_working_dir(&self) -> bool {
        self.working_dir.is_some()
    }

    /// Resolves the file side of the template against `params`.
    ///
    /// # Errors
    ///
    /// Propagates descriptor resolution failures.
    pub fn resolve_io(&self, params: &ParamSet) -> Result<ResolvedIo> {
        Ok(ResolvedIo {
            stdin: self
                .stdin
                .as_ref()
                .map(|spec| spec.resolve(params))
                .transpose()?,
            stdout: self
                .stdout
                .as_ref()
                .map(|spec| spec.resolve(params))
                .transpose()?,
            stderr: self
                .stderr
                .as_ref()
                .map(|spec| spec.resolve(params))
                .transpose()?,
            log: self
                .log
                .as_ref()
                .map(|spec| spec.resolve(params))
                .transpose()?,
            inputs: self
                .input_files
                .values()
                .map(|spec| spec.resolve(params))
                .collect::<Result<_>>()?,
            outputs: self
                .output_files
                .values()
                .map(|spec| spec.resolve(params))
                .collect::<Result<_>>()?,
        })
    }

    /// Resolves command, arguments, working directory, and environment
    /// against `params`.
    ///
    /// Executors call this with the parameter set augmented by the
    /// `__file_<name>` entries produced during file preparation, so
    /// arguments may reference realized file paths.
    ///
    /// # Errors
    ///
    /// Propagates the first resolution error.
    pub fn resolve_invocation(&self, params: &ParamSet) -> Result<ResolvedInvocation> {
        Ok(ResolvedInvocation {
            command: self.command.resolve(params)?,
            args: resolve_all(&self.args, params)?,
            working_dir: self
                .working_dir
                .as_ref()
                .map(|dir| dir.resolve(params))
                .transpose()?,
            env: self.environment.evaluate(params)?,
        })
    }
}

/// Builder for [`ProcessTemplate`].
///
/// Validity is checked once, at [`ProcessTemplateBuilder::build`] time.
#[derive(Debug, Default)]
pub struct ProcessTemplateBuilder {
    command: Option<Resolvable<String>>,
    args: Vec<Resolvable<String>>,
    working_dir: Option<Resolvable<PathBuf>>,
    environment: Environment,
    stdin: Option<InputSpec>,
    stdout: Option<OutputSpec>,
    stderr: Option<OutputSpec>,
    log: Option<OutputSpec>,
    input_files: BTreeMap<String, InputSpec>,
    output_files: BTreeMap<String, OutputSpec>,
    failure_mode: Option<FailureMode>,
}

impl ProcessTemplateBuilder {
    /// Sets the command. Required.
    #[must_use]
    pub fn command(mut self, command: impl Into<Resolvable<String>>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<Resolvable<String>>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replaces the argument list.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Resolvable<String>>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory. Backends may reject templates using
    /// this (the batch backend does).
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<Resolvable<PathBuf>>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the environment variable set.
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Connects a file to the process's stdin.
    #[must_use]
    pub fn stdin(mut self, mut spec: InputSpec) -> Self {
        spec.name = "stdin".to_string();
        self.stdin = Some(spec);
        self
    }

    /// Captures stdout into the described file.
    #[must_use]
    pub fn capture_stdout(mut self, mut spec: OutputSpec) -> Self {
        spec.name = "stdout".to_string();
        self.stdout = Some(spec);
        self
    }

    /// Captures stderr into the described file.
    #[must_use]
    pub fn capture_stderr(mut self, mut spec: OutputSpec) -> Self {
        spec.name = "stderr".to_string();
        self.stderr = Some(spec);
        self
    }

    /// Captures the job log into the described file. The local backend
    /// realizes the file without writing to it; the batch backend points
    /// the scheduler's log at it.
    #[must_use]
    pub fn capture_log(mut self, mut spec: OutputSpec) -> Self {
        spec.name = "log".to_string();
        self.log = Some(spec);
        self
    }

    /// Adds an input file. Replaces any input file with the same name.
    #[must_use]
    pub fn input_file(mut self, spec: InputSpec) -> Self {
        self.input_files.insert(spec.name.clone(), spec);
        self
    }

    /// Removes an input file by name.
    #[must_use]
    pub fn remove_input_file(mut self, name: &str) -> Self {
        self.input_files.remove(name);
        self
    }

    /// Adds an output file. Replaces any output file with the same name.
    #[must_use]
    pub fn output_file(mut self, spec: OutputSpec) -> Self {
        self.output_files.insert(spec.name.clone(), spec);
        self
    }

    /// Removes an output file by name.
    #[must_use]
    pub fn remove_output_file(mut self, name: &str) -> Self {
        self.output_files.remove(name);
        self
    }

    /// Replaces the failure classification. Without this call the default
    /// applies: exit code `!= 0` is a failure.
    #[must_use]
    pub fn failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = Some(failure_mode);
        self
    }

    /// Finalizes and validates the template.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::TemplateInvalid`] when the command is
    /// unset, an input and an output file share a name, a file uses a
    /// reserved or empty name, or a stream predicate is configured for an
    /// uncaptured stream.
    pub fn build(self) -> Result<ProcessTemplate> {
        let Some(command) = self.command else {
            return Err(SweepRunError::TemplateInvalid {
                reason: "command must be set".to_string(),
            });
        };

        for name in self.input_files.keys().chain(self.output_files.keys()) {
            if name.is_empty() {
                return Err(SweepRunError::TemplateInvalid {
                    reason: "input and output files must be named".to_string(),
                });
            }
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(SweepRunError::TemplateInvalid {
                    reason: format!("file name {name} is reserved for a standard stream"),
                });
            }
        }

        if let Some(name) = self
            .input_files
            .keys()
            .find(|name| self.output_files.contains_key(*name))
        {
            return Err(SweepRunError::TemplateInvalid {
                reason: format!("an input file and an output file share the name {name}"),
            });
        }

        let failure_mode = self.failure_mode.unwrap_or_else(FailureMode::exit_nonzero);

        if failure_mode.interprets_stderr() && self.stderr.is_none() {
            return Err(SweepRunError::TemplateInvalid {
                reason: "cannot interpret stderr if not captured".to_string(),
            });
        }
        if failure_mode.interprets_stdout() && self.stdout.is_none() {
            return Err(SweepRunError::TemplateInvalid {
                reason: "cannot interpret stdout if not captured".to_string(),
            });
        }

        Ok(ProcessTemplate {
            command,
            args: self.args,
            working_dir: self.working_dir,
            environment: self.environment,
            stdin: self.stdin,
            stdout: self.stdout,
            stderr: self.stderr,
            log: self.log,
            input_files: self.input_files,
            output_files: self.output_files,
            failure_mode,
        })
    }
}

/// The file side of a template, resolved against one parameter set.
#[derive(Debug, Clone)]
pub struct ResolvedIo {
    /// File connected to stdin, if any.
    pub stdin: Option<ResolvedInput>,
    /// Stdout capture, if configured.
    pub stdout: Option<ResolvedOutput>,
    /// Stderr capture, if configured.
    pub stderr: Option<ResolvedOutput>,
    /// Job log capture, if configured.
    pub log: Option<ResolvedOutput>,
    /// Named input files, in name order.
    pub inputs: Vec<ResolvedInput>,
    /// Named output files, in name order.
    pub outputs: Vec<ResolvedOutput>,
}

/// Command, arguments, working directory, and environment of a template,
/// resolved against one (augmented) parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInvocation {
    /// Command as written in the template, before path lookup.
    pub command: String,
    /// Argument list.
    pub args: Vec<String>,
    /// Working directory, if configured.
    pub working_dir: Option<PathBuf>,
    /// Complete environment of the spawned process.
    pub env: BTreeMap<String, String>,
}
