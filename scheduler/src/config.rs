use crate::jobs::{JobResources, JobSchedulingInformation};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

/// A jobscript the remote cannot read is a config error, not a job failure;
/// catch it before anything is submitted.
pub fn check_jobscript_is_readable(path: &Path) -> Result<&Path, ConfigErrors> {
    if !path.is_file() {
        return Err(ConfigErrors::JobscriptNotFound(path.to_owned()));
    }
    File::open(path).map_err(|e| ConfigErrors::JobscriptUnreadable(path.to_owned(), e))?;
    Ok(path)
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("configuration could not be parsed")]
    ParseFailed(#[from] serde_yaml::Error),
    #[error("configuration failed preflight checks")]
    FailedPreflight,
    #[error("job script {0} not found")]
    JobscriptNotFound(PathBuf),
    #[error("job script {0} is not readable")]
    JobscriptUnreadable(PathBuf, #[source] Error),
    #[error("log directory path {0} exists and is not a directory")]
    LogPathNotADirectory(PathBuf),
    #[error("failed to create log directory {0}")]
    CreateLogDirectory(PathBuf, #[source] Error),
    #[error("log directory has not been set")]
    LogDirectoryUnset,
    #[error("file not found")]
    FileNotFound,
    #[error("metadata not found")]
    MetadataNotFound(#[from] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// SLURM REST endpoint, e.g. http://cluster:6820
    pub url: String,
    /// Remote queue to submit against
    pub partition: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_token: Option<String>,
    /// Default root for per-job log directories
    #[serde(default)]
    pub cluster_output_dir: Option<PathBuf>,
    /// Overall deadline for a whole batch, in seconds
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: u64,
    /// Cancel jobs still running when the overall deadline fires
    #[serde(default = "default_terminate_after_wait")]
    pub terminate_after_wait: bool,
    /// Jobs as named entries; the name becomes the remote job name
    pub jobs: BTreeMap<String, JobConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub script: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-job timeout in seconds, measured from dispatch
    pub timeout: u64,
    pub working_directory: PathBuf,
    #[serde(default)]
    pub log_directory: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: ResourceConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: u32,
    #[serde(default)]
    pub gpus: u32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    /// Remote-specific extras passed through to the submission payload
    #[serde(default)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cpu_cores: default_cpu_cores(),
            gpus: 0,
            memory_mb: default_memory_mb(),
            extra: BTreeMap::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        if !path.is_file() {
            return Err(ConfigErrors::FileNotFound);
        }
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Validate everything that can be checked without talking to the remote.
    ///
    /// Attempts to catch all errors instead of piece-by-piece to make
    /// debugging easier for users; returns whether any error was found.
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if self.jobs.is_empty() {
            error!("No jobs were defined, nothing to submit");
            contains_error = true;
        }

        for (name, job) in self.jobs.iter() {
            match check_jobscript_is_readable(&job.script) {
                Ok(script) => match check_executable(script) {
                    Ok(is_executable) => {
                        if !is_executable {
                            warn!(
                                "jobs.{name}.script {} is not executable, this might cause problems",
                                script.to_string_lossy()
                            );
                        }
                    }
                    Err(e) => {
                        error!(
                            "Failed to determine if jobs.{name}.script ({}) is executable: {e}",
                            script.to_string_lossy()
                        );
                        contains_error = true;
                    }
                },
                Err(e) => {
                    error!("jobs.{name}.script failed validation: {e}");
                    contains_error = true;
                }
            }

            if job.timeout == 0 {
                error!("jobs.{name}.timeout cannot be 0. The job would be cancelled on dispatch.");
                contains_error = true;
            }

            if !job.working_directory.is_dir() {
                error!(
                    "jobs.{name}.working_directory {} is not a directory",
                    job.working_directory.to_string_lossy()
                );
                contains_error = true;
            }

            if let Some(log_directory) = &job.log_directory {
                if log_directory.exists() && !log_directory.is_dir() {
                    error!(
                        "jobs.{name}.log_directory {} exists and is not a directory",
                        log_directory.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        contains_error
    }

    /// Turn the named job entries into scheduling records, in name order.
    pub fn build_jobs(&self) -> Vec<JobSchedulingInformation> {
        self.jobs
            .iter()
            .map(|(name, job)| {
                let mut jsi = JobSchedulingInformation::new(
                    name.clone(),
                    job.script.clone(),
                    job.args.clone(),
                    job.working_directory.clone(),
                    JobResources {
                        cpu_cores: job.resources.cpu_cores,
                        gpus: job.resources.gpus,
                        memory_mb: job.resources.memory_mb,
                        extra_properties: job.resources.extra.clone(),
                    },
                    Duration::seconds(job.timeout as i64),
                );
                jsi.job_env = job.env.clone();
                jsi.log_directory = job.log_directory.clone();
                jsi
            })
            .collect()
    }
}

fn default_wait_timeout() -> u64 {
    7200
}

fn default_terminate_after_wait() -> bool {
    true
}

fn default_cpu_cores() -> u32 {
    1
}

fn default_memory_mb() -> u64 {
    4000
}
