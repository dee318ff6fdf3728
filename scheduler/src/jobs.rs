use crate::config::ConfigErrors;
use crate::state::SlurmState;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resource request for a single job.
#[derive(Clone, Debug)]
pub struct JobResources {
    pub cpu_cores: u32,
    pub gpus: u32,
    /// Memory per CPU in megabytes.
    pub memory_mb: u64,
    /// Open mapping of remote-specific extras, merged into the submission
    /// payload as-is.
    pub extra_properties: BTreeMap<String, serde_yaml::Value>,
}

impl Default for JobResources {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            gpus: 0,
            memory_mb: 4000,
            extra_properties: BTreeMap::new(),
        }
    }
}

/// Mutable per-job observation record, populated by polling.
#[derive(Clone, Debug)]
pub struct StatusInfo {
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub current_state: Option<SlurmState>,
    pub cpus: Option<u32>,
    pub gpus: Option<u32>,
    pub time_to_dispatch: Option<Duration>,
    pub wall_time: Option<Duration>,
    /// The monitor's terminal classification. Set exactly once; the synthetic
    /// states are only ever assigned here.
    pub final_state: Option<SlurmState>,
}

impl StatusInfo {
    pub fn new(submit_time: DateTime<Utc>) -> Self {
        Self {
            submit_time,
            start_time: None,
            current_state: None,
            cpus: None,
            gpus: None,
            time_to_dispatch: None,
            wall_time: None,
            final_state: None,
        }
    }
}

/// Per-job record: immutable intent plus the observations the monitor makes
/// while the job runs.
#[derive(Clone, Debug)]
pub struct JobSchedulingInformation {
    pub job_name: String,
    pub job_script_path: PathBuf,
    pub job_script_arguments: Vec<String>,
    pub job_env: BTreeMap<String, String>,
    pub working_directory: PathBuf,
    pub job_resources: JobResources,
    /// Duration, not a deadline; the deadline is computed from start_time.
    pub timeout: Duration,
    /// Materialized before first submission, see [`Self::ensure_log_directory`].
    pub log_directory: Option<PathBuf>,
    /// Recorded at submission so classification checks the same file the
    /// remote was told to write.
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    /// Set iff submission succeeded at least once.
    pub job_id: Option<u32>,
    pub status_info: Option<StatusInfo>,
    pub completion_status: bool,
}

impl JobSchedulingInformation {
    pub fn new(
        job_name: impl Into<String>,
        job_script_path: impl Into<PathBuf>,
        job_script_arguments: Vec<String>,
        working_directory: impl Into<PathBuf>,
        job_resources: JobResources,
        timeout: Duration,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            job_script_path: job_script_path.into(),
            job_script_arguments,
            job_env: BTreeMap::new(),
            working_directory: working_directory.into(),
            job_resources,
            timeout,
            log_directory: None,
            stdout_path: None,
            stderr_path: None,
            job_id: None,
            status_info: None,
            completion_status: false,
        }
    }

    /// Idempotent creation of the log directory, defaulting to
    /// `<cluster_output_dir>/cluster_logs` if the scheduler was configured
    /// with one, else `<working_directory>/cluster_logs`.
    pub fn ensure_log_directory(
        &mut self,
        cluster_output_dir: Option<&Path>,
    ) -> Result<(), ConfigErrors> {
        let dir = match self.log_directory.clone() {
            Some(dir) => dir,
            None => {
                let root = cluster_output_dir
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.working_directory.clone());
                let dir = root.join("cluster_logs");
                self.log_directory = Some(dir.clone());
                dir
            }
        };

        if dir.exists() && !dir.is_dir() {
            return Err(ConfigErrors::LogPathNotADirectory(dir));
        }
        if !dir.is_dir() {
            debug!(directory = ?dir, "making log directory");
            fs::create_dir_all(&dir).map_err(|e| ConfigErrors::CreateLogDirectory(dir, e))?;
        } else {
            debug!(directory = ?dir, "log directory already exists");
        }
        Ok(())
    }

    /// Derive and record the stdout/stderr paths for this job in the given
    /// batch. Requires the log directory to be materialized.
    pub fn set_output_paths(&mut self, batch_index: usize) -> Result<(), ConfigErrors> {
        let dir = self
            .log_directory
            .as_ref()
            .ok_or(ConfigErrors::LogDirectoryUnset)?;
        self.stdout_path = Some(dir.join(format!("{}.b{}.out", self.job_name, batch_index)));
        self.stderr_path = Some(dir.join(format!("{}.b{}.err", self.job_name, batch_index)));
        Ok(())
    }

    pub fn get_stdout_path(&self) -> Option<&Path> {
        self.stdout_path.as_deref()
    }

    pub fn get_stderr_path(&self) -> Option<&Path> {
        self.stderr_path.as_deref()
    }

    /// The wall-clock instant at which this job's timeout fires.
    ///
    /// The timeout is measured from dispatch so queue time does not count
    /// against the job. With `allow_from_submission` a submission-relative
    /// deadline is returned for jobs that have not started yet; that variant
    /// always yields a value for a submitted job and is used to pick the next
    /// interesting moment in the wait loop, never to cancel.
    pub fn get_deadline(&self, allow_from_submission: bool) -> Option<DateTime<Utc>> {
        let status_info = self.status_info.as_ref()?;
        match status_info.start_time {
            Some(start_time) => Some(start_time + self.timeout),
            None if allow_from_submission => Some(status_info.submit_time + self.timeout),
            None => None,
        }
    }

    /// Fresh record for resubmission, built from the intent fields of this
    /// one. The old observations stay frozen in the batch history.
    pub fn prepare_resubmission(&self) -> Self {
        Self {
            job_id: None,
            status_info: None,
            completion_status: false,
            stdout_path: None,
            stderr_path: None,
            ..self.clone()
        }
    }
}
