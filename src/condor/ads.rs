//! ClassAd attribute values, job status projection, and the submit-file
//! wire encodings.
//!
//! The three `*_to_str` encodings are bit-exact to the `condor_submit`
//! grammar for the `arguments`, `environment`, and
//! `transfer_output_remaps` commands; the vectors in the tests were
//! validated against HTCondor v8.9.4.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SweepRunError};

/// One submission record: a flat attribute map describing one proc.
pub type SubmitRecord = BTreeMap<String, String>;

/// A typed ClassAd attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AdValue {
    /// Integer attribute.
    Int(i64),
    /// Boolean attribute.
    Bool(bool),
    /// String attribute.
    Str(String),
}

impl AdValue {
    /// Integer view of the value; strings are parsed.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => s.parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Boolean view of the value; `"true"`/`"false"` strings are parsed.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(s) => s.parse().ok(),
            Self::Int(_) => None,
        }
    }
}

impl From<i64> for AdValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AdValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for AdValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// A flat string-keyed attribute map, as returned by status queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassAd(BTreeMap<String, AdValue>);

impl ClassAd {
    /// Creates an empty ad.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AdValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AdValue> {
        self.0.get(key)
    }

    fn require_int(&self, key: &str) -> Result<i64> {
        self.get(key)
            .and_then(AdValue::as_int)
            .ok_or_else(|| SweepRunError::SubmissionError {
                reason: format!("job ad is missing integer attribute {key}"),
            })
    }
}

impl FromIterator<(String, AdValue)> for ClassAd {
    fn from_iter<I: IntoIterator<Item = (String, AdValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Scheduler-side job status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Not yet expanded into a running job.
    Unexpanded,
    /// Queued, waiting for a slot.
    Idle,
    /// Executing.
    Running,
    /// Removed from the queue.
    Removed,
    /// Finished.
    Completed,
    /// Held by policy or operator.
    Held,
    /// The submission itself failed.
    SubmissionErr,
}

impl JobStatus {
    /// Parses the numeric status code used in job ads.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::SubmissionError`] for an unknown code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Unexpanded),
            1 => Ok(Self::Idle),
            2 => Ok(Self::Running),
            3 => Ok(Self::Removed),
            4 => Ok(Self::Completed),
            5 => Ok(Self::Held),
            6 => Ok(Self::SubmissionErr),
            other => Err(SweepRunError::SubmissionError {
                reason: format!("unknown job status code {other}"),
            }),
        }
    }
}

/// Snapshot of one proc's state, parsed from a queried job ad.
#[derive(Debug, Clone)]
pub struct JobState {
    /// Cluster the proc belongs to.
    pub cluster_id: u64,
    /// Index of the proc within the cluster.
    pub proc_id: u64,
    /// Current status.
    pub status: JobStatus,
    /// Exit code, present once the proc completed normally.
    pub exit_code: Option<i32>,
    /// Whether the proc was terminated by a signal.
    pub exit_by_signal: bool,
    /// Terminating signal number, if any.
    pub exit_signal: Option<i32>,
}

impl JobState {
    /// Attribute projection to request when querying job state.
    pub const PROJECTION: [&'static str; 6] = [
        "ClusterId",
        "ProcId",
        "JobStatus",
        "ExitCode",
        "ExitBySignal",
        "ExitSignal",
    ];

    /// Parses a queried job ad.
    ///
    /// # Errors
    ///
    /// Returns [`SweepRunError::SubmissionError`] when required attributes
    /// are missing or malformed.
    pub fn from_ad(ad: &ClassAd) -> Result<Self> {
        let opt_i32 = |key: &str| {
            ad.get(key)
                .and_then(AdValue::as_int)
                .and_then(|i| i32::try_from(i).ok())
        };

        Ok(Self {
            cluster_id: u64::try_from(ad.require_int("ClusterId")?).map_err(|_| {
                SweepRunError::SubmissionError {
                    reason: "negative ClusterId in job ad".to_string(),
                }
            })?,
            proc_id: u64::try_from(ad.require_int("ProcId")?).map_err(|_| {
                SweepRunError::SubmissionError {
                    reason: "negative ProcId in job ad".to_string(),
                }
            })?,
            status: JobStatus::from_code(ad.require_int("JobStatus")?)?,
            exit_code: opt_i32("ExitCode"),
            exit_by_signal: ad
                .get("ExitBySignal")
                .and_then(AdValue::as_bool)
                .unwrap_or(false),
            exit_signal: opt_i32("ExitSignal"),
        })
    }
}

/// Per-status counts over one poll snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Procs in state Unexpanded.
    pub unexpanded: usize,
    /// Procs in state Idle.
    pub idle: usize,
    /// Procs in state Running.
    pub running: usize,
    /// Procs in state Removed.
    pub removed: usize,
    /// Procs in state Completed.
    pub completed: usize,
    /// Procs in state Held.
    pub held: usize,
    /// Procs in state `SubmissionErr`.
    pub submission_err: usize,
}

impl StatusCounts {
    /// Counts the given job states.
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a JobState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            counts.add(state.status);
        }
        counts
    }

    /// Adds one proc in `status`.
    pub const fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Unexpanded => self.unexpanded += 1,
            JobStatus::Idle => self.idle += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Removed => self.removed += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Held => self.held += 1,
            JobStatus::SubmissionErr => self.submission_err += 1,
        }
    }

    /// Total procs counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.unexpanded
            + self.idle
            + self.running
            + self.removed
            + self.completed
            + self.held
            + self.submission_err
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpanded={} idle={} running={} removed={} completed={} held={} submission_err={}",
            self.unexpanded,
            self.idle,
            self.running,
            self.removed,
            self.completed,
            self.held,
            self.submission_err
        )
    }
}

fn contains_any(s: &str, chars: &[char]) -> bool {
    s.chars().any(|c| chars.contains(&c))
}

/// Quotes one token per the `arguments`/`environment` new syntax: embedded
/// single and double quotes are doubled; tokens containing whitespace or a
/// single quote, and empty tokens, are wrapped in single quotes.
fn quote(token: &str) -> String {
    let quote_wrap = contains_any(token, &[' ', '\t', '\'']);

    let quoted = token.replace('\'', "''").replace('"', "\"\"");

    if quote_wrap || token.is_empty() {
        format!("'{quoted}'")
    } else {
        quoted
    }
}

/// Serializes an argument list for the `arguments` submit command.
#[must_use]
pub fn args_to_str(args: &[String]) -> String {
    let joined = args.iter().map(|arg| quote(arg)).collect::<Vec<_>>().join(" ");
    format!("\"{joined}\"")
}

/// Serializes an environment map for the `environment` submit command.
#[must_use]
pub fn environment_to_str(environment: &BTreeMap<String, String>) -> String {
    let joined = environment
        .iter()
        .map(|(key, value)| format!("{key}={}", quote(value)))
        .collect::<Vec<_>>()
        .join(" ");
    format!("\"{joined}\"")
}

/// Serializes output remaps for the `transfer_output_remaps` submit
/// command. Literal `=` in a name and literal `;` in a new name are
/// backslash-escaped; nothing else is.
#[must_use]
pub fn file_remaps_to_str(remaps: &[(String, String)]) -> String {
    let joined = remaps
        .iter()
        .map(|(name, newname)| {
            format!("{}={}", name.replace('=', "\\="), newname.replace(';', "\\;"))
        })
        .collect::<Vec<_>>()
        .join(";");
    format!("\"{joined}\"")
}

/// Serializes a file list for the `transfer_input_files` and
/// `transfer_output_files` submit commands. There is no documented escape
/// for commas in file names.
#[must_use]
pub fn files_to_str<I, S>(files: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    files
        .into_iter()
        .map(|f| f.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    // The encoding vectors below were validated against HTCondor v8.9.4.

    #[test]
    fn test_args_to_str() {
        assert_eq!(args_to_str(&[]), "\"\"");
        assert_eq!(args_to_str(&strings(&["a"])), "\"a\"");
        assert_eq!(args_to_str(&strings(&["a and b"])), "\"'a and b'\"");
        assert_eq!(args_to_str(&strings(&["\""])), "\"\"\"\"");
        assert_eq!(
            args_to_str(&strings(&["\"a ...\" said he"])),
            "\"'\"\"a ...\"\" said he'\""
        );
        assert_eq!(args_to_str(&strings(&["'"])), "\"''''\"");
        assert_eq!(
            args_to_str(&strings(&["'and b' said she"])),
            "\"'''and b'' said she'\""
        );
        assert_eq!(args_to_str(&strings(&[""])), "\"''\"");

        assert_eq!(
            args_to_str(&strings(&["\"a ...\" said he", "'and b' said she"])),
            "\"'\"\"a ...\"\" said he' '''and b'' said she'\""
        );
    }

    #[test]
    fn test_environment_to_str() {
        let env = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        };

        assert_eq!(environment_to_str(&env(&[])), "\"\"");
        assert_eq!(environment_to_str(&env(&[("K", "a")])), "\"K=a\"");
        assert_eq!(
            environment_to_str(&env(&[("K", "a and b")])),
            "\"K='a and b'\""
        );
        assert_eq!(environment_to_str(&env(&[("K", "\"")])), "\"K=\"\"\"");
        assert_eq!(
            environment_to_str(&env(&[("K", "\"a ...\" said he")])),
            "\"K='\"\"a ...\"\" said he'\""
        );
        assert_eq!(environment_to_str(&env(&[("K", "'")])), "\"K=''''\"");
        assert_eq!(
            environment_to_str(&env(&[("K", "'and b' said she")])),
            "\"K='''and b'' said she'\""
        );
        assert_eq!(environment_to_str(&env(&[("K", "")])), "\"K=''\"");

        assert_eq!(
            environment_to_str(&env(&[
                ("K", "\"a ...\" said he"),
                ("P", "'and b' said she")
            ])),
            "\"K='\"\"a ...\"\" said he' P='''and b'' said she'\""
        );
    }

    #[test]
    fn test_file_remaps_to_str() {
        let remaps = |pairs: &[(&str, &str)]| -> Vec<(String, String)> {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        };

        assert_eq!(file_remaps_to_str(&remaps(&[])), "\"\"");
        assert_eq!(file_remaps_to_str(&remaps(&[("a", "b")])), "\"a=b\"");
        assert_eq!(
            file_remaps_to_str(&remaps(&[("a", "b"), ("c", "/d/d")])),
            "\"a=b;c=/d/d\""
        );
        assert_eq!(file_remaps_to_str(&remaps(&[("a", "b b")])), "\"a=b b\"");
        assert_eq!(
            file_remaps_to_str(&remaps(&[("a;a=a", "b;b=b")])),
            "\"a;a\\=a=b\\;b=b\""
        );
    }

    #[test]
    fn test_files_to_str() {
        assert_eq!(files_to_str(["a", "b/c"]), "a,b/c");
        assert_eq!(files_to_str(Vec::<String>::new()), "");
    }

    #[test]
    fn test_job_status_codes() {
        assert_eq!(JobStatus::from_code(4).unwrap(), JobStatus::Completed);
        assert_eq!(JobStatus::from_code(5).unwrap(), JobStatus::Held);
        assert!(JobStatus::from_code(7).is_err());
    }

    #[test]
    fn test_job_state_from_ad() {
        let mut ad = ClassAd::new();
        ad.insert("ClusterId", 12);
        ad.insert("ProcId", 3);
        ad.insert("JobStatus", 4);
        ad.insert("ExitCode", 0);
        ad.insert("ExitBySignal", false);

        let state = JobState::from_ad(&ad).unwrap();
        assert_eq!(state.cluster_id, 12);
        assert_eq!(state.proc_id, 3);
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.exit_code, Some(0));
        assert!(!state.exit_by_signal);
        assert_eq!(state.exit_signal, None);
    }

    #[test]
    fn test_job_state_missing_attribute() {
        let mut ad = ClassAd::new();
        ad.insert("ClusterId", 12);
        assert!(matches!(
            JobState::from_ad(&ad),
            Err(SweepRunError::SubmissionError { .. })
        ));
    }

    #[test]
    fn test_job_state_stringly_typed_ad() {
        // Some query paths deliver every attribute as a string.
        let mut ad = ClassAd::new();
        ad.insert("ClusterId", "7");
        ad.insert("ProcId", "0");
        ad.insert("JobStatus", "2");
        ad.insert("ExitBySignal", "true");
        ad.insert("ExitSignal", "9");

        let state = JobState::from_ad(&ad).unwrap();
        assert_eq!(state.status, JobStatus::Running);
        assert!(state.exit_by_signal);
        assert_eq!(state.exit_signal, Some(9));
    }

    #[test]
    fn test_status_counts() {
        let states = [
            JobState {
                cluster_id: 1,
                proc_id: 0,
                status: JobStatus::Completed,
                exit_code: Some(0),
                exit_by_signal: false,
                exit_signal: None,
            },
            JobState {
                cluster_id: 1,
                proc_id: 1,
                status: JobStatus::Running,
                exit_code: None,
                exit_by_signal: false,
                exit_signal: None,
            },
        ];
        let counts = StatusCounts::from_states(states.iter());
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.total(), 2);
        assert!(format!("{counts}").contains("completed=1"));
    }
}
