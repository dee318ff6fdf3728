#[cfg(test)]
mod wait_test;

use crate::client::{
    models::{JobProperties, JobSubmission},
    ClientError, SlurmClient,
};
use crate::config::{check_jobscript_is_readable, ConfigErrors};
use crate::jobs::{JobSchedulingInformation, StatusInfo};
use crate::state::{SlurmState, COMPUTE_ISSUE, ENDED, OUT_OF_TIME, STARTING};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet},
    iter,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration as StdDuration,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("job submission failed: {errors}")]
    SubmissionFailed { errors: String },
    #[error("batch {0:?} does not exist in the job history")]
    BatchNotFound(Option<usize>),
    #[error("all jobs in the batch failed")]
    WholeBatchFailed,
}

/// Problems encountered while polling a single job. These never abort a wait;
/// the loop logs them and retries on the next pass.
#[derive(Error, Debug)]
enum PollError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("unrecognised job state {0:?}")]
    UnknownState(String),
    #[error("remote reported no state")]
    MissingState,
    #[error("job has not been submitted")]
    Unsubmitted,
}

impl PollError {
    /// Permanent errors will not resolve themselves however long we poll.
    fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Client(ClientError::InvalidJobId(_)) | Self::Unsubmitted
        )
    }
}

/// Intervals governing how eagerly the wait loop polls the remote.
///
/// The defaults suit real clusters; tests tighten them so scenarios finish in
/// milliseconds.
#[derive(Clone, Debug)]
pub struct PollingPolicy {
    /// Sleep between polls while waiting for jobs to dispatch.
    pub start_interval: StdDuration,
    /// Upper bound on the sleep between polls of running jobs.
    pub max_check_interval: StdDuration,
    /// How long cancelled jobs are given to reach a terminal state.
    pub drain_timeout: StdDuration,
    /// Sleep between polls during the final drain.
    pub drain_interval: StdDuration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            start_interval: StdDuration::from_secs(5),
            max_check_interval: StdDuration::from_secs(60),
            drain_timeout: StdDuration::from_secs(120),
            drain_interval: StdDuration::from_secs(60),
        }
    }
}

/// Submits batches of jobs to a remote scheduler, waits for them and
/// classifies each outcome against the output files the jobs were told to
/// write. Finished batches are kept in a history so killed jobs can be
/// resubmitted later.
pub struct JobScheduler<C: SlurmClient> {
    client: C,
    partition: String,
    cluster_output_dir: Option<PathBuf>,
    /// Overall deadline for a whole batch, measured from submission.
    wait_timeout: Duration,
    terminate_after_wait: bool,
    pub policy: PollingPolicy,
    job_history: Vec<BTreeMap<u32, JobSchedulingInformation>>,
    interrupt: Arc<AtomicBool>,
}

impl<C: SlurmClient> JobScheduler<C> {
    pub fn new(
        client: C,
        partition: impl Into<String>,
        cluster_output_dir: Option<PathBuf>,
        wait_timeout: Duration,
        terminate_after_wait: bool,
    ) -> Self {
        Self {
            client,
            partition: partition.into(),
            cluster_output_dir,
            wait_timeout,
            terminate_after_wait,
            policy: PollingPolicy::default(),
            job_history: Vec::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked at the top of every wait pass. Setting it (e.g. from a
    /// signal handler) makes the current wait stop early; the batch is still
    /// classified and recorded.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Submit a batch, wait for it and record the outcome. Returns whether
    /// every job in the batch completed with evidence of fresh output.
    pub fn run(&mut self, jobs: Vec<JobSchedulingInformation>) -> Result<bool, SchedulerError> {
        self.submit_and_monitor(jobs)
    }

    fn submit_and_monitor(
        &mut self,
        jobs: Vec<JobSchedulingInformation>,
    ) -> Result<bool, SchedulerError> {
        let mut batch = self.submit_jobs(jobs)?;
        self.wait_for_jobs(&mut batch);
        Ok(self.report_job_info(batch))
    }

    fn submit_jobs(
        &self,
        jobs: Vec<JobSchedulingInformation>,
    ) -> Result<BTreeMap<u32, JobSchedulingInformation>, SchedulerError> {
        let batch_index = self.job_history.len();
        let mut batch = BTreeMap::new();
        for mut jsi in jobs {
            debug!(
                script = ?jsi.job_script_path,
                args = ?jsi.job_script_arguments,
                "submitting job on cluster"
            );
            let submission = self.make_job_submission(&mut jsi, batch_index)?;
            let job_id = match self.try_submit(&submission) {
                Ok(job_id) => job_id,
                Err(problem) => {
                    warn!(job = %jsi.job_name, problem, "job submission failed, retrying once");
                    self.try_submit(&submission)
                        .map_err(|errors| SchedulerError::SubmissionFailed { errors })?
                }
            };
            jsi.job_id = Some(job_id);
            jsi.status_info = Some(StatusInfo::new(Utc::now()));
            info!(job = %jsi.job_name, job_id, "job submitted");
            batch.insert(job_id, jsi);
        }
        Ok(batch)
    }

    fn try_submit(&self, submission: &JobSubmission) -> Result<u32, String> {
        match self.client.submit_job(submission) {
            Ok(response) => match response.job_id {
                Some(job_id) if job_id > 0 => Ok(job_id as u32),
                Some(job_id) => Err(format!("remote returned invalid job id {job_id}")),
                None if response.errors.is_empty() => Err("no job id returned".to_owned()),
                None => Err(response.errors.iter().map(ToString::to_string).join("; ")),
            },
            Err(e) => Err(e.to_string()),
        }
    }

    fn make_job_submission(
        &self,
        jsi: &mut JobSchedulingInformation,
        batch_index: usize,
    ) -> Result<JobSubmission, SchedulerError> {
        jsi.ensure_log_directory(self.cluster_output_dir.as_deref())?;
        jsi.set_output_paths(batch_index)?;

        let job_script_path = check_jobscript_is_readable(&jsi.job_script_path)?;
        let command = iter::once(job_script_path.to_string_lossy().into_owned())
            .chain(jsi.job_script_arguments.iter().cloned())
            .join(" ");
        let script = format!("#!/bin/bash\n{command}");
        info!(command, "creating submission");

        let standard_output = jsi
            .get_stdout_path()
            .ok_or(ConfigErrors::LogDirectoryUnset)?
            .to_string_lossy()
            .into_owned();
        let standard_error = jsi
            .get_stderr_path()
            .ok_or(ConfigErrors::LogDirectoryUnset)?
            .to_string_lossy()
            .into_owned();

        Ok(JobSubmission {
            script,
            job: JobProperties {
                name: jsi.job_name.clone(),
                partition: self.partition.clone(),
                cpus_per_task: jsi.job_resources.cpu_cores,
                gpus_per_task: jsi.job_resources.gpus.to_string(),
                memory_per_cpu: jsi.job_resources.memory_mb,
                environment: jsi.job_env.clone(),
                current_working_directory: jsi.working_directory.to_string_lossy().into_owned(),
                standard_output,
                standard_error,
                get_user_environment: "10L".to_owned(),
                extra_properties: jsi.job_resources.extra_properties.clone(),
            },
        })
    }

    /// Poll the remote once for this job and fold the answer into its status.
    fn fetch_and_update_state(
        &self,
        jsi: &mut JobSchedulingInformation,
    ) -> Result<SlurmState, PollError> {
        let job_id = jsi.job_id.ok_or(PollError::Unsubmitted)?;
        let info = self.client.get_job(job_id)?;
        let state = info
            .job_state
            .as_deref()
            .ok_or(PollError::MissingState)?
            .parse::<SlurmState>()
            .map_err(|e| PollError::UnknownState(e.0))?;

        let cpus = info.cpus();
        let gpus = info.gpus();
        // Zero epoch seconds means "not set yet" on the remote.
        let submit_time = epoch_to_datetime(info.submit_time);
        let start_time = epoch_to_datetime(info.start_time);
        let end_time = epoch_to_datetime(info.end_time);

        let status = jsi.status_info.as_mut().ok_or(PollError::Unsubmitted)?;
        if let Some(submit_time) = submit_time {
            // The remote's value is more precise than our wall clock at
            // submission; never the other way around.
            status.submit_time = submit_time;
        }
        if let Some(start_time) = start_time {
            status.start_time = Some(start_time);
        }
        if let (Some(submit), Some(start), Some(end)) = (submit_time, start_time, end_time) {
            status.time_to_dispatch = Some(start - submit);
            status.wall_time = Some(end - start);
        }
        if cpus.is_some() {
            status.cpus = cpus;
        }
        if gpus.is_some() {
            status.gpus = gpus;
        }
        status.current_state = Some(state);
        debug!(job_id, state = %state, "updated job state");
        Ok(state)
    }

    /// Poll `subset` until each job's membership of `group` matches
    /// `in_group`, or the deadline passes. Returns the ids that never flipped.
    /// Transient poll failures are logged and retried on the next pass;
    /// permanent ones drop the job out of the wait into `abandoned`.
    fn wait_all_jobs(
        &self,
        batch: &mut BTreeMap<u32, JobSchedulingInformation>,
        subset: &BTreeSet<u32>,
        group: &[SlurmState],
        in_group: bool,
        deadline: DateTime<Utc>,
        sleep_time: StdDuration,
        abandoned: &mut BTreeSet<u32>,
    ) -> BTreeSet<u32> {
        let mut remaining = subset.clone();
        while !remaining.is_empty() && Utc::now() <= deadline {
            for job_id in remaining.clone() {
                let Some(jsi) = batch.get_mut(&job_id) else {
                    continue;
                };
                match self.fetch_and_update_state(jsi) {
                    Ok(state) => {
                        if state.is_in(group) == in_group {
                            remaining.remove(&job_id);
                        }
                    }
                    Err(e) if e.is_permanent() => {
                        error!(job_id, error = %e, "remote cannot report this job, giving up on it");
                        remaining.remove(&job_id);
                        abandoned.insert(job_id);
                    }
                    Err(e) => warn!(job_id, error = %e, "failed to poll job, will retry"),
                }
            }
            if !remaining.is_empty() {
                thread::sleep(sleep_time);
            }
        }
        remaining
    }

    /// One poll pass over `subset`; returns the ids now in a terminal state.
    fn handle_ended_jobs(
        &self,
        batch: &mut BTreeMap<u32, JobSchedulingInformation>,
        subset: &BTreeSet<u32>,
    ) -> BTreeSet<u32> {
        let mut ended = BTreeSet::new();
        for job_id in subset {
            let Some(jsi) = batch.get_mut(job_id) else {
                continue;
            };
            match self.fetch_and_update_state(jsi) {
                Ok(state) if state.is_in(ENDED) => {
                    debug!(job_id = *job_id, state = %state, "job ended");
                    ended.insert(*job_id);
                }
                Ok(_) => {}
                Err(e) => warn!(job_id = *job_id, error = %e, "failed to poll job"),
            }
        }
        ended
    }

    /// Cancel every job in `subset` whose start-relative deadline has passed.
    /// Jobs still queued have no such deadline and are never cancelled here.
    /// A failed cancel is logged but the job is still treated as timed out.
    fn handle_timeouts(
        &self,
        batch: &BTreeMap<u32, JobSchedulingInformation>,
        subset: &BTreeSet<u32>,
    ) -> BTreeSet<u32> {
        let now = Utc::now();
        let mut timed_out = BTreeSet::new();
        for job_id in subset {
            let Some(jsi) = batch.get(job_id) else {
                continue;
            };
            if jsi.get_deadline(false).map(|d| d < now).unwrap_or(false) {
                warn!(job_id = *job_id, "job timed out, terminating now");
                if let Err(e) = self.client.cancel_job(*job_id) {
                    error!(job_id = *job_id, error = %e, "failed to terminate timed out job");
                }
                timed_out.insert(*job_id);
            }
        }
        timed_out
    }

    /// Give queued jobs up to `check_time` to dispatch, polling briskly so
    /// queue time is not mistaken for run time. Returns the ids still queued.
    fn handle_not_started(
        &self,
        batch: &mut BTreeMap<u32, JobSchedulingInformation>,
        subset: &BTreeSet<u32>,
        check_time: StdDuration,
        abandoned: &mut BTreeSet<u32>,
    ) -> BTreeSet<u32> {
        let deadline = Utc::now() + Duration::from_std(check_time).unwrap_or_default();
        let mut starting = subset.clone();
        debug!(count = starting.len(), %deadline, "waiting for jobs to start");
        while !starting.is_empty() && Utc::now() < deadline {
            starting = self.wait_all_jobs(
                batch,
                &starting,
                STARTING,
                false,
                deadline,
                self.policy.start_interval,
                abandoned,
            );
            if !starting.is_empty() {
                thread::sleep(self.policy.start_interval);
                info!(count = starting.len(), "jobs left to start");
            }
        }
        starting
    }

    /// Wait for `subset` to reach a terminal state, then make one more poll
    /// pass so final times are recorded. Returns the ids that ended.
    fn wait_for_ended(
        &self,
        batch: &mut BTreeMap<u32, JobSchedulingInformation>,
        subset: &BTreeSet<u32>,
        deadline: DateTime<Utc>,
        sleep_time: StdDuration,
        wait_begin: DateTime<Utc>,
        abandoned: &mut BTreeSet<u32>,
    ) -> BTreeSet<u32> {
        debug!(
            count = subset.len(),
            %deadline,
            sleep = ?sleep_time,
            "waiting for jobs to end"
        );
        self.wait_all_jobs(batch, subset, ENDED, true, deadline, sleep_time, abandoned);
        let ended = self.handle_ended_jobs(batch, subset);
        info!(
            remaining = subset.len() - ended.len(),
            elapsed = %(Utc::now() - wait_begin),
            "jobs remaining after wait"
        );
        ended
    }

    /// Wait for the whole batch, enforcing both the per-job timeouts and the
    /// scheduler's overall deadline. Per-job timeouts run from dispatch; the
    /// overall deadline runs from submission.
    fn wait_for_jobs(&self, batch: &mut BTreeMap<u32, JobSchedulingInformation>) {
        let wait_begin = Utc::now();
        let wait_deadline = wait_begin + self.wait_timeout;

        let mut running: BTreeSet<u32> = batch.keys().copied().collect();
        let mut timed_out: BTreeSet<u32> = BTreeSet::new();
        let mut abandoned: BTreeSet<u32> = BTreeSet::new();

        // Jobs can end between submission and the first poll.
        for job_id in self.handle_ended_jobs(batch, &running.clone()) {
            running.remove(&job_id);
        }
        for job_id in self.handle_timeouts(batch, &running.clone()) {
            running.remove(&job_id);
            timed_out.insert(job_id);
        }

        if running.is_empty() && timed_out.is_empty() {
            warn!("all jobs ended before wait began");
            return;
        }

        while Utc::now() < wait_deadline && !running.is_empty() {
            if self.interrupt.swap(false, Ordering::SeqCst) {
                warn!("interrupt requested, stopping wait early");
                break;
            }

            // The next interesting moment is the earliest per-job deadline,
            // counted from submission for jobs still queued, and never past
            // the overall wait deadline. Sleeping half the distance to it
            // keeps polling sparse for long jobs without overshooting short
            // ones.
            let next_deadline = running
                .iter()
                .filter_map(|job_id| batch.get(job_id).and_then(|jsi| jsi.get_deadline(true)))
                .min()
                .unwrap_or(wait_deadline)
                .min(wait_deadline);
            // Bounded from below so a deadline already in the past (a job
            // still queued long after submission) cannot stall polling, and
            // max wins if the policy's bounds are inverted.
            let check_time = ((next_deadline - Utc::now()) / 2)
                .to_std()
                .unwrap_or_default()
                .max(self.policy.start_interval)
                .min(self.policy.max_check_interval);

            let not_started = self.handle_not_started(batch, &running, check_time, &mut abandoned);
            for job_id in &abandoned {
                running.remove(job_id);
            }
            let dispatched: BTreeSet<u32> = running.difference(&not_started).copied().collect();
            for job_id in self.wait_for_ended(
                batch,
                &dispatched,
                next_deadline,
                check_time,
                wait_begin,
                &mut abandoned,
            ) {
                running.remove(&job_id);
            }
            for job_id in &abandoned {
                running.remove(job_id);
            }
            for job_id in self.handle_timeouts(batch, &running.clone()) {
                running.remove(&job_id);
                timed_out.insert(job_id);
            }
        }
        debug!("wait loop ended, starting clear-up");

        if self.terminate_after_wait {
            for job_id in running {
                info!(job_id, "waiting for jobs timed out, terminating job now");
                if let Err(e) = self.client.cancel_job(job_id) {
                    error!(job_id, error = %e, "failed to terminate job");
                }
                timed_out.insert(job_id);
            }
        }

        // Cancelled jobs settle asynchronously on the remote; give them a
        // bounded window to report their final times.
        if !timed_out.is_empty() {
            let drain_deadline =
                Utc::now() + Duration::from_std(self.policy.drain_timeout).unwrap_or_default();
            self.wait_for_ended(
                batch,
                &timed_out,
                drain_deadline,
                self.policy.drain_interval,
                wait_begin,
                &mut abandoned,
            );
        }
    }

    /// Classify every job in the batch, record the batch in the history and
    /// return whether all jobs succeeded.
    ///
    /// A COMPLETED report from the remote is not taken at face value: the job
    /// must also have written its output file since it started.
    fn report_job_info(&mut self, mut batch: BTreeMap<u32, JobSchedulingInformation>) -> bool {
        for (job_id, jsi) in batch.iter_mut() {
            let job_id = *job_id;
            let stdout_path = jsi.stdout_path.clone();
            let args = jsi.job_script_arguments.clone();
            debug!(job_id, "classifying job");
            let Some(status) = jsi.status_info.as_mut() else {
                error!(job_id, "job has no recorded status, cannot classify");
                continue;
            };
            let state = status.current_state;
            let dispatch = status.time_to_dispatch;
            let wall = status.wall_time;
            let evidence = stdout_path.as_deref().filter(|path| path.is_file());

            let final_state = if state == Some(SlurmState::Failed) {
                error!(job_id, ?dispatch, ?wall, "job failed");
                SlurmState::Failed
            } else if status.start_time.is_none() && state != Some(SlurmState::Completed) {
                // Never dispatched: there is no output evidence to judge, so
                // the remote's own verdict stands.
                let verdict = state.unwrap_or(SlurmState::Cancelled);
                error!(job_id, state = %verdict, ?args, "job never started");
                verdict
            } else if evidence.is_none() {
                error!(
                    job_id,
                    ?args,
                    path = ?stdout_path,
                    ?state,
                    ?dispatch,
                    ?wall,
                    "job has not created its output file"
                );
                SlurmState::NoOutput
            } else if !evidence
                .map(|path| timestamp_ok(path, status.start_time))
                .unwrap_or(false)
            {
                error!(
                    job_id,
                    ?args,
                    path = ?stdout_path,
                    ?state,
                    ?dispatch,
                    ?wall,
                    "job has not written a new output file"
                );
                SlurmState::OldOutputFile
            } else if state == Some(SlurmState::Completed) {
                let cpu_time = match (status.cpus, wall) {
                    (Some(cpus), Some(wall)) => (wall * cpus as i32).to_string(),
                    _ => "n/a".to_owned(),
                };
                info!(
                    job_id,
                    ?args,
                    cpu_time,
                    slots = ?status.cpus,
                    ?dispatch,
                    ?wall,
                    "job completed"
                );
                SlurmState::Completed
            } else {
                let verdict = state.unwrap_or(SlurmState::Cancelled);
                if verdict.is_in(COMPUTE_ISSUE) {
                    error!(job_id, state = %verdict, ?dispatch, ?wall, "job hit a compute issue");
                } else if verdict.is_in(OUT_OF_TIME) {
                    error!(job_id, state = %verdict, ?dispatch, ?wall, "job ran out of time");
                } else {
                    error!(job_id, state = %verdict, ?args, ?dispatch, ?wall, "job ended abnormally");
                }
                verdict
            };
            status.final_state = Some(final_state);
            jsi.completion_status = final_state == SlurmState::Completed;
        }

        let success = get_success(batch.values());
        self.job_history.push(batch);
        success
    }

    pub fn job_history(&self) -> &[BTreeMap<u32, JobSchedulingInformation>] {
        &self.job_history
    }

    /// Index of the most recent batch, if any.
    pub fn batch_number(&self) -> Option<usize> {
        self.job_history.len().checked_sub(1)
    }

    pub fn get_batch(
        &self,
        batch_number: Option<usize>,
    ) -> Result<&BTreeMap<u32, JobSchedulingInformation>, SchedulerError> {
        let index = batch_number
            .or_else(|| self.batch_number())
            .ok_or(SchedulerError::BatchNotFound(batch_number))?;
        self.job_history
            .get(index)
            .ok_or(SchedulerError::BatchNotFound(Some(index)))
    }

    pub fn clear_history(&mut self) {
        self.job_history.clear();
    }

    /// Resubmit jobs from a recorded batch as a fresh batch, rebuilt from
    /// their intent fields. With `job_ids` of `None` the whole batch goes
    /// again. The old batch stays frozen in the history.
    pub fn resubmit_jobs(
        &mut self,
        job_ids: Option<&[u32]>,
        batch_number: Option<usize>,
    ) -> Result<bool, SchedulerError> {
        let resubmission: Vec<JobSchedulingInformation> = {
            let batch = self.get_batch(batch_number)?;
            batch
                .iter()
                .filter(|(job_id, _)| job_ids.map(|ids| ids.contains(job_id)).unwrap_or(true))
                .map(|(_, jsi)| jsi.prepare_resubmission())
                .collect()
        };
        info!(
            ?batch_number,
            ?job_ids,
            count = resubmission.len(),
            "resubmitting jobs"
        );
        self.submit_and_monitor(resubmission)
    }

    /// Resubmit the jobs of a batch that were cancelled out from under us.
    ///
    /// A batch where nothing completed usually means something systematic
    /// went wrong, so that case is refused unless `allow_all_failed` is set;
    /// setting it also widens the resubmission to every unsuccessful job,
    /// not just the cancelled ones.
    pub fn resubmit_killed_jobs(
        &mut self,
        batch_number: Option<usize>,
        allow_all_failed: bool,
    ) -> Result<bool, SchedulerError> {
        info!("resubmitting killed jobs");
        let to_resubmit: Vec<u32> = {
            let batch = self.get_batch(batch_number)?;
            if batch.values().all(|jsi| jsi.completion_status) {
                warn!("no failed jobs to resubmit");
                return Ok(true);
            }
            if !allow_all_failed && !batch.values().any(|jsi| jsi.completion_status) {
                error!("all jobs in the batch failed, refusing to resubmit");
                return Err(SchedulerError::WholeBatchFailed);
            }
            let failed: Vec<u32> = batch
                .iter()
                .filter(|(_, jsi)| {
                    jsi.status_info.as_ref().and_then(|s| s.final_state)
                        != Some(SlurmState::Completed)
                })
                .map(|(job_id, _)| *job_id)
                .collect();
            let killed = filter_killed_jobs(batch);
            info!(
                failed = failed.len(),
                killed = killed.len(),
                "batch failure summary"
            );
            if allow_all_failed {
                failed
            } else {
                killed
            }
        };
        if to_resubmit.is_empty() {
            return Ok(true);
        }
        self.resubmit_jobs(Some(&to_resubmit), batch_number)
    }
}

/// Ids of the jobs in a batch whose last observed state was CANCELLED.
pub fn filter_killed_jobs(batch: &BTreeMap<u32, JobSchedulingInformation>) -> Vec<u32> {
    batch
        .iter()
        .filter(|(_, jsi)| {
            jsi.status_info.as_ref().and_then(|s| s.current_state) == Some(SlurmState::Cancelled)
        })
        .map(|(job_id, _)| *job_id)
        .collect()
}

/// True when every job in the batch completed with fresh output.
pub fn get_success<'a>(jobs: impl IntoIterator<Item = &'a JobSchedulingInformation>) -> bool {
    jobs.into_iter().all(|jsi| jsi.completion_status)
}

/// Stdout paths of the jobs that have one recorded.
pub fn get_output_paths<'a>(
    jobs: impl IntoIterator<Item = &'a JobSchedulingInformation>,
) -> Vec<PathBuf> {
    jobs.into_iter()
        .filter_map(|jsi| jsi.get_stdout_path().map(Path::to_path_buf))
        .collect()
}

fn epoch_to_datetime(epoch: Option<i64>) -> Option<DateTime<Utc>> {
    epoch
        .filter(|seconds| *seconds > 0)
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
}

/// True if the output file was modified after the job started.
fn timestamp_ok(output: &Path, start_time: Option<DateTime<Utc>>) -> bool {
    let Some(start_time) = start_time else {
        return false;
    };
    match output.metadata().and_then(|meta| meta.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified) > start_time,
        Err(e) => {
            warn!(path = ?output, error = %e, "could not read output file mtime");
            false
        }
    }
}
