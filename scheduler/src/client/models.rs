use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Properties block of a job submission payload.
#[derive(Clone, Debug, Serialize)]
pub struct JobProperties {
    pub name: String,
    pub partition: String,
    pub cpus_per_task: u32,
    pub gpus_per_task: String,
    pub memory_per_cpu: u64,
    pub environment: BTreeMap<String, String>,
    pub current_working_directory: String,
    pub standard_output: String,
    pub standard_error: String,
    pub get_user_environment: String,
    /// Remote-specific extras, serialized as additional top-level keys.
    #[serde(flatten)]
    pub extra_properties: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct JobSubmission {
    pub script: String,
    pub job: JobProperties,
}

/// Error entry as returned by the REST API.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (code {:?}, source {:?})",
            self.error
                .as_deref()
                .or(self.description.as_deref())
                .unwrap_or("unknown error"),
            self.error_code,
            self.source,
        )
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct JobResponse {
    #[serde(default)]
    pub jobs: Vec<JobInfo>,
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

/// The slice of the remote's job record the monitor cares about.
/// Times are epoch seconds; zero or absent means "not set yet".
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JobInfo {
    #[serde(default)]
    pub job_id: i64,
    #[serde(default)]
    pub job_state: Option<String>,
    #[serde(default)]
    pub tres_alloc_str: Option<String>,
    #[serde(default)]
    pub submit_time: Option<i64>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

impl JobInfo {
    /// CPUs allocated to the job, parsed out of the TRES string.
    pub fn cpus(&self) -> Option<u32> {
        self.tres_alloc_str
            .as_deref()
            .and_then(|tres| parse_tres_field(tres, "cpu"))
    }

    /// GPUs allocated to the job, parsed out of the TRES string.
    pub fn gpus(&self) -> Option<u32> {
        self.tres_alloc_str
            .as_deref()
            .and_then(|tres| parse_tres_field(tres, "gpu"))
    }
}

/// Extract `<key>=<N>` from the remote's comma-separated resource-allocation
/// string, e.g. `cpu=4,mem=8G,node=1,billing=4,gres/gpu=2`.
///
/// A missing field yields `None` (not zero) so callers can distinguish "not
/// allocated" from "zero allocated"; malformed values are logged and also
/// yield `None`, never an error.
pub fn parse_tres_field(tres_alloc_str: &str, key: &str) -> Option<u32> {
    let pattern = format!("{key}=");
    let value = tres_alloc_str.split(',').find_map(|token| {
        token
            .find(&pattern)
            .map(|idx| &token[idx + pattern.len()..])
    })?;
    match value.parse() {
        Ok(count) => Some(count),
        Err(error) => {
            warn!(
                tres = tres_alloc_str,
                key,
                error = ?error,
                "failed to parse resource allocation field"
            );
            None
        }
    }
}
