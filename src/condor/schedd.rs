//! The scheduler seam: submission, status queries, and queue removal.
//!
//! The batch executor talks to the scheduler exclusively through the
//! [`Schedd`] trait. [`CondorCli`] is the production adapter driving the
//! HTCondor command-line tools; tests substitute in-memory
//! implementations.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::condor::ads::{AdValue, ClassAd, SubmitRecord};
use crate::error::{Result, SweepRunError};
use crate::executor::BoxFuture;

/// Interface to a batch scheduler queue.
pub trait Schedd: Send + Sync {
    /// Submits all records as one atomic cluster and returns its id.
    /// Proc ids are the record indices.
    fn submit(&self, records: Vec<SubmitRecord>) -> BoxFuture<'_, Result<u64>>;

    /// Fetches the given attribute projection for every proc of the
    /// cluster.
    fn query(
        &self,
        cluster_id: u64,
        projection: &'static [&'static str],
    ) -> BoxFuture<'_, Result<Vec<ClassAd>>>;

    /// Removes the cluster from the queue.
    fn remove(&self, cluster_id: u64) -> BoxFuture<'_, Result<()>>;
}

/// [`Schedd`] adapter driving the `condor_submit`, `condor_q`, and
/// `condor_rm` command-line tools.
#[derive(Debug, Clone)]
pub struct CondorCli {
    submit_bin: PathBuf,
    query_bin: PathBuf,
    remove_bin: PathBuf,
    temp_dir: PathBuf,
}

impl CondorCli {
    /// Adapter using the tools as found on `PATH` and the system temp
    /// directory for submit descriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            submit_bin: PathBuf::from("condor_submit"),
            query_bin: PathBuf::from("condor_q"),
            remove_bin: PathBuf::from("condor_rm"),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Overrides the directory submit description files are written to.
    #[must_use]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}

impl Default for CondorCli {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedd for CondorCli {
    fn submit(&self, records: Vec<SubmitRecord>) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let description = render_submit_description(&records);
            debug!("submit description:\n{description}");

            let mut file = tempfile::Builder::new()
                .prefix("sweeprun-submit-")
                .suffix(".sub")
                .tempfile_in(&self.temp_dir)?;
            std::io::Write::write_all(&mut file, description.as_bytes())?;

            let stdout = run_tool(
                &self.submit_bin,
                &["-terse".to_string(), file.path().display().to_string()],
            )
            .await?;

            parse_terse_cluster_id(&stdout)
        })
    }

    fn query(
        &self,
        cluster_id: u64,
        projection: &'static [&'static str],
    ) -> BoxFuture<'_, Result<Vec<ClassAd>>> {
        Box::pin(async move {
            let stdout = run_tool(
                &self.query_bin,
                &[
                    "-json".to_string(),
                    "-constraint".to_string(),
                    format!("ClusterId == {cluster_id}"),
                    "-attributes".to_string(),
                    projection.join(","),
                ],
            )
            .await?;

            parse_query_json(&stdout)
        })
    }

    fn remove(&self, cluster_id: u64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            run_tool(&self.remove_bin, &[cluster_id.to_string()]).await?;
            Ok(())
        })
    }
}

/// Renders one submit description queueing every record as a proc of the
/// same cluster: commands are (re)defined per record, followed by a bare
/// `queue` statement.
fn render_submit_description(records: &[SubmitRecord]) -> String {
    let mut out = String::new();
    for record in records {
        for (key, value) in record {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out.push_str("queue\n");
    }
    out
}

/// Parses `condor_submit -terse` output of the form `23.0 - 23.2`.
fn parse_terse_cluster_id(stdout: &str) -> Result<u64> {
    stdout
        .split_whitespace()
        .next()
        .and_then(|token| token.split('.').next())
        .and_then(|cluster| cluster.parse().ok())
        .ok_or_else(|| SweepRunError::SubmissionError {
            reason: format!("unparseable condor_submit output: {stdout:?}"),
        })
}

/// Parses `condor_q -json` output into attribute maps. An empty output
/// means no matching procs.
fn parse_query_json(stdout: &str) -> Result<Vec<ClassAd>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let ads: Vec<serde_json::Map<String, Value>> =
        serde_json::from_str(trimmed).map_err(|e| SweepRunError::SubmissionError {
            reason: format!("unparseable condor_q output: {e}"),
        })?;

    Ok(ads
        .into_iter()
        .map(|ad| {
            ad.into_iter()
                .map(|(key, value)| (key, ad_value_from_json(value)))
                .collect()
        })
        .collect())
}

fn ad_value_from_json(value: Value) -> AdValue {
    match value {
        Value::Bool(b) => AdValue::Bool(b),
        Value::Number(n) => n
            .as_i64()
            .map_or_else(|| AdValue::Str(n.to_string()), AdValue::Int),
        Value::String(s) => AdValue::Str(s),
        other => AdValue::Str(other.to_string()),
    }
}

async fn run_tool(program: &Path, args: &[String]) -> Result<String> {
    let output = Command::new(program).args(args).output().await?;

    if !output.status.success() {
        return Err(SweepRunError::SubmissionError {
            reason: format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
