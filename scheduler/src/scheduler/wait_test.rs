use super::*;
use crate::client::{
    models::{ApiError, JobInfo, SubmitResponse},
    ClientError,
};
use crate::jobs::JobResources;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;
use tempfile::tempdir;

/// Millisecond offsets from submission paired with the state the remote
/// reports from that point on. A timeline without a terminal entry models a
/// job that runs until cancelled.
type Timeline = Vec<(u64, &'static str)>;

struct FakeJob {
    submitted: DateTime<Utc>,
    timeline: Timeline,
    cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct FakeState {
    next_job_id: u32,
    submit_failures: usize,
    submit_calls: usize,
    cancel_calls: Vec<(u32, DateTime<Utc>)>,
    timelines: VecDeque<Timeline>,
    jobs: BTreeMap<u32, FakeJob>,
    unreportable: BTreeSet<u32>,
}

struct FakeClient {
    inner: Mutex<FakeState>,
}

impl FakeClient {
    fn new() -> Self {
        Self {
            inner: Mutex::new(FakeState {
                next_job_id: 1000,
                ..Default::default()
            }),
        }
    }

    fn queue_timeline(&self, timeline: Timeline) {
        self.inner.lock().unwrap().timelines.push_back(timeline);
    }

    fn set_submit_failures(&self, count: usize) {
        self.inner.lock().unwrap().submit_failures = count;
    }

    fn submit_calls(&self) -> usize {
        self.inner.lock().unwrap().submit_calls
    }

    fn cancel_calls(&self) -> Vec<(u32, DateTime<Utc>)> {
        self.inner.lock().unwrap().cancel_calls.clone()
    }

    /// Makes `get_job` for this id report a negative job id, the way a
    /// confused slurmrestd answers for a job it cannot account for.
    fn mark_unreportable(&self, job_id: u32) {
        self.inner.lock().unwrap().unreportable.insert(job_id);
    }
}

impl SlurmClient for FakeClient {
    fn submit_job(&self, _submission: &JobSubmission) -> Result<SubmitResponse, ClientError> {
        let mut state = self.inner.lock().unwrap();
        state.submit_calls += 1;
        if state.submit_failures > 0 {
            state.submit_failures -= 1;
            return Ok(SubmitResponse {
                job_id: None,
                errors: vec![ApiError {
                    error: Some("zero-length response".to_owned()),
                    ..Default::default()
                }],
            });
        }
        let job_id = state.next_job_id;
        state.next_job_id += 1;
        let timeline = state
            .timelines
            .pop_front()
            .unwrap_or_else(|| vec![(0, "COMPLETED")]);
        state.jobs.insert(
            job_id,
            FakeJob {
                submitted: Utc::now(),
                timeline,
                cancelled_at: None,
            },
        );
        Ok(SubmitResponse {
            job_id: Some(job_id as i64),
            errors: Vec::new(),
        })
    }

    fn get_job(&self, job_id: u32) -> Result<JobInfo, ClientError> {
        let state = self.inner.lock().unwrap();
        if state.unreportable.contains(&job_id) {
            return Err(ClientError::InvalidJobId(-1));
        }
        let job = state
            .jobs
            .get(&job_id)
            .ok_or(ClientError::UnknownJob(job_id))?;
        let elapsed_ms = (Utc::now() - job.submitted).num_milliseconds().max(0) as u64;
        let cancel_ms = job
            .cancelled_at
            .map(|at| (at - job.submitted).num_milliseconds().max(0) as u64);
        let visible =
            |offset: u64| elapsed_ms >= offset && cancel_ms.map(|at| offset <= at).unwrap_or(true);

        let job_state = if cancel_ms.is_some() {
            "CANCELLED"
        } else {
            job.timeline
                .iter()
                .rev()
                .find(|(offset, _)| elapsed_ms >= *offset)
                .map(|(_, state)| *state)
                .unwrap_or("PENDING")
        };
        let start_time = job
            .timeline
            .iter()
            .find(|(_, state)| {
                state
                    .parse::<SlurmState>()
                    .map(|s| !s.is_in(STARTING))
                    .unwrap_or(false)
            })
            .map(|(offset, _)| *offset)
            .filter(|offset| visible(*offset))
            .map(|offset| (job.submitted + Duration::milliseconds(offset as i64)).timestamp());
        let end_time = job
            .timeline
            .iter()
            .find(|(_, state)| {
                state
                    .parse::<SlurmState>()
                    .map(|s| s.is_in(ENDED))
                    .unwrap_or(false)
            })
            .map(|(offset, _)| *offset)
            .filter(|offset| visible(*offset))
            .map(|offset| (job.submitted + Duration::milliseconds(offset as i64)).timestamp());

        Ok(JobInfo {
            job_id: job_id as i64,
            job_state: Some(job_state.to_owned()),
            tres_alloc_str: Some("cpu=2,mem=4000M,node=1,billing=2".to_owned()),
            submit_time: Some(job.submitted.timestamp()),
            start_time: start_time.or(Some(0)),
            end_time: end_time.or(Some(0)),
        })
    }

    fn cancel_job(&self, job_id: u32) -> Result<(), ClientError> {
        let mut state = self.inner.lock().unwrap();
        let now = Utc::now();
        state.cancel_calls.push((job_id, now));
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.cancelled_at = Some(now);
        }
        Ok(())
    }
}

impl SlurmClient for Arc<FakeClient> {
    fn submit_job(&self, submission: &JobSubmission) -> Result<SubmitResponse, ClientError> {
        self.as_ref().submit_job(submission)
    }

    fn get_job(&self, job_id: u32) -> Result<JobInfo, ClientError> {
        self.as_ref().get_job(job_id)
    }

    fn cancel_job(&self, job_id: u32) -> Result<(), ClientError> {
        self.as_ref().cancel_job(job_id)
    }
}

fn test_scheduler(client: Arc<FakeClient>, wait_secs: i64) -> JobScheduler<Arc<FakeClient>> {
    let mut scheduler = JobScheduler::new(client, "cs04r", None, Duration::seconds(wait_secs), true);
    scheduler.policy = PollingPolicy {
        start_interval: StdDuration::from_millis(10),
        max_check_interval: StdDuration::from_millis(25),
        drain_timeout: StdDuration::from_millis(200),
        drain_interval: StdDuration::from_millis(50),
    };
    scheduler
}

fn make_jsi(dir: &Path, name: &str, timeout_secs: i64) -> JobSchedulingInformation {
    let script = dir.join(format!("{name}.sh"));
    std::fs::write(&script, "#!/bin/bash\necho ok\n").unwrap();
    JobSchedulingInformation::new(
        name,
        script,
        vec!["--n".into(), "2".into()],
        dir,
        JobResources::default(),
        Duration::seconds(timeout_secs),
    )
}

fn finished_jsi(dir: &Path, name: &str, job_id: u32, state: SlurmState) -> JobSchedulingInformation {
    let mut jsi = make_jsi(dir, name, 60);
    jsi.job_id = Some(job_id);
    let mut status = StatusInfo::new(Utc::now());
    status.start_time = Some(status.submit_time);
    status.current_state = Some(state);
    status.final_state = Some(state);
    jsi.status_info = Some(status);
    jsi.completion_status = state == SlurmState::Completed;
    jsi
}

fn stdout_path(dir: &Path, name: &str, batch: usize) -> PathBuf {
    dir.join("cluster_logs").join(format!("{name}.b{batch}.out"))
}

/// Creates the job's stdout file after a delay, standing in for the remote
/// job writing its results.
fn spawn_writer(path: PathBuf, delay: StdDuration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(delay);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"results\n").unwrap();
    })
}

fn final_state(
    scheduler: &JobScheduler<Arc<FakeClient>>,
    job_id: u32,
) -> Option<SlurmState> {
    scheduler
        .get_batch(None)
        .unwrap()
        .get(&job_id)
        .and_then(|jsi| jsi.status_info.as_ref())
        .and_then(|status| status.final_state)
}

#[test]
fn completed_job_with_fresh_output_succeeds() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "PENDING"), (50, "RUNNING"), (250, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    let writer = spawn_writer(
        stdout_path(dir.path(), "happy", 0),
        StdDuration::from_millis(100),
    );

    let jobs = vec![make_jsi(dir.path(), "happy", 30)];
    let success = scheduler.run(jobs).unwrap();
    writer.join().unwrap();

    assert!(success);
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::Completed));
    let batch = scheduler.get_batch(None).unwrap();
    let jsi = &batch[&1000];
    assert!(jsi.completion_status);
    assert_eq!(jsi.status_info.as_ref().unwrap().cpus, Some(2));
    assert!(client.cancel_calls().is_empty());
}

#[test]
fn completed_job_without_output_is_no_output() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "RUNNING"), (100, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(client, 30);

    let success = scheduler.run(vec![make_jsi(dir.path(), "silent", 30)]).unwrap();

    assert!(!success);
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::NoOutput));
}

#[test]
fn stale_output_file_is_detected() {
    let client = Arc::new(FakeClient::new());
    // The job only dispatches 1.1s in, well past the pre-created file's
    // mtime even after the remote's times are truncated to whole seconds.
    client.queue_timeline(vec![(0, "PENDING"), (1100, "RUNNING"), (1300, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let stale = stdout_path(dir.path(), "stale", 0);
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, b"leftovers from an earlier run\n").unwrap();
    let mut scheduler = test_scheduler(client, 30);

    let success = scheduler.run(vec![make_jsi(dir.path(), "stale", 30)]).unwrap();

    assert!(!success);
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::OldOutputFile));
}

#[test]
fn job_over_its_timeout_is_cancelled() {
    let client = Arc::new(FakeClient::new());
    // Runs forever unless cancelled.
    client.queue_timeline(vec![(0, "PENDING"), (50, "RUNNING")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    let writer = spawn_writer(
        stdout_path(dir.path(), "runaway", 0),
        StdDuration::from_millis(100),
    );

    let submitted = Utc::now();
    let success = scheduler.run(vec![make_jsi(dir.path(), "runaway", 1)]).unwrap();
    writer.join().unwrap();

    assert!(!success);
    let cancels = client.cancel_calls();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].0, 1000);
    assert!(cancels[0].1 - submitted < Duration::seconds(3));
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::Cancelled));
}

#[test]
fn queue_time_does_not_count_against_timeout() {
    let client = Arc::new(FakeClient::new());
    // Queued for 2.5s with a 2s timeout; only run time may count.
    client.queue_timeline(vec![(0, "PENDING"), (2500, "RUNNING"), (2800, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    let writer = spawn_writer(
        stdout_path(dir.path(), "patient", 0),
        StdDuration::from_millis(2600),
    );

    let success = scheduler.run(vec![make_jsi(dir.path(), "patient", 2)]).unwrap();
    writer.join().unwrap();

    assert!(success);
    assert!(client.cancel_calls().is_empty());
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::Completed));
}

#[test]
fn submission_is_retried_once() {
    let client = Arc::new(FakeClient::new());
    client.set_submit_failures(1);
    client.queue_timeline(vec![(0, "RUNNING"), (100, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    let writer = spawn_writer(
        stdout_path(dir.path(), "retry", 0),
        StdDuration::from_millis(50),
    );

    let success = scheduler.run(vec![make_jsi(dir.path(), "retry", 30)]).unwrap();
    writer.join().unwrap();

    assert!(success);
    assert_eq!(client.submit_calls(), 2);
    let batch = scheduler.get_batch(None).unwrap();
    assert_eq!(batch[&1000].job_id, Some(1000));
}

#[test]
fn submission_failing_twice_aborts_the_batch() {
    let client = Arc::new(FakeClient::new());
    client.set_submit_failures(2);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);

    let result = scheduler.run(vec![make_jsi(dir.path(), "doomed", 30)]);

    assert!(matches!(
        result,
        Err(SchedulerError::SubmissionFailed { .. })
    ));
    assert_eq!(client.submit_calls(), 2);
    assert!(scheduler.job_history().is_empty());
}

#[test]
fn empty_batch_runs_successfully() {
    let client = Arc::new(FakeClient::new());
    let mut scheduler = test_scheduler(client, 30);

    assert!(scheduler.run(Vec::new()).unwrap());
    assert_eq!(scheduler.job_history().len(), 1);
    assert!(scheduler.get_batch(None).unwrap().is_empty());

    scheduler.clear_history();
    assert_eq!(scheduler.batch_number(), None);
}

#[test]
fn get_batch_rejects_missing_batches() {
    let client = Arc::new(FakeClient::new());
    let mut scheduler = test_scheduler(client, 30);

    assert!(matches!(
        scheduler.get_batch(None),
        Err(SchedulerError::BatchNotFound(None))
    ));
    assert!(matches!(
        scheduler.get_batch(Some(3)),
        Err(SchedulerError::BatchNotFound(Some(3)))
    ));

    scheduler.run(Vec::new()).unwrap();
    assert!(scheduler.get_batch(Some(0)).is_ok());
}

#[test]
fn resubmits_only_killed_jobs() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "RUNNING"), (100, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    scheduler.job_history.push(BTreeMap::from([
        (1, finished_jsi(dir.path(), "a", 1, SlurmState::Completed)),
        (2, finished_jsi(dir.path(), "b", 2, SlurmState::Cancelled)),
        (3, finished_jsi(dir.path(), "c", 3, SlurmState::Failed)),
    ]));
    let writer = spawn_writer(
        stdout_path(dir.path(), "b", 1),
        StdDuration::from_millis(50),
    );

    let success = scheduler.resubmit_killed_jobs(None, false).unwrap();
    writer.join().unwrap();

    assert!(success);
    assert_eq!(scheduler.job_history().len(), 2);
    let new_batch = scheduler.get_batch(None).unwrap();
    assert_eq!(new_batch.len(), 1);
    let resubmitted = new_batch.values().next().unwrap();
    assert_eq!(resubmitted.job_name, "b");
    assert_eq!(resubmitted.job_id, Some(1000));
}

#[test]
fn fully_successful_batch_is_not_resubmitted() {
    let client = Arc::new(FakeClient::new());
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    scheduler.job_history.push(BTreeMap::from([
        (1, finished_jsi(dir.path(), "a", 1, SlurmState::Completed)),
        (2, finished_jsi(dir.path(), "b", 2, SlurmState::Completed)),
    ]));

    assert!(scheduler.resubmit_killed_jobs(None, false).unwrap());
    assert_eq!(scheduler.job_history().len(), 1);
    assert_eq!(client.submit_calls(), 0);
}

#[test]
fn wholly_failed_batch_needs_explicit_permission() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "RUNNING"), (100, "COMPLETED")]);
    client.queue_timeline(vec![(0, "RUNNING"), (100, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    scheduler.job_history.push(BTreeMap::from([
        (1, finished_jsi(dir.path(), "a", 1, SlurmState::Cancelled)),
        (2, finished_jsi(dir.path(), "b", 2, SlurmState::Failed)),
    ]));

    assert!(matches!(
        scheduler.resubmit_killed_jobs(None, false),
        Err(SchedulerError::WholeBatchFailed)
    ));
    assert_eq!(scheduler.job_history().len(), 1);

    // With permission every unsuccessful job goes again, not just the
    // cancelled one.
    scheduler.resubmit_killed_jobs(None, true).unwrap();
    assert_eq!(scheduler.job_history().len(), 2);
    assert_eq!(scheduler.get_batch(None).unwrap().len(), 2);
}

#[test]
fn resubmit_jobs_takes_a_subset() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "RUNNING"), (100, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    scheduler.job_history.push(BTreeMap::from([
        (1, finished_jsi(dir.path(), "a", 1, SlurmState::Completed)),
        (3, finished_jsi(dir.path(), "c", 3, SlurmState::Failed)),
    ]));

    // No output writer, so the rerun is judged unsuccessful; the point is
    // which jobs were picked.
    let success = scheduler.resubmit_jobs(Some(&[3]), None).unwrap();

    assert!(!success);
    let new_batch = scheduler.get_batch(None).unwrap();
    assert_eq!(new_batch.len(), 1);
    assert_eq!(new_batch.values().next().unwrap().job_name, "c");
}

#[test]
fn interrupt_stops_the_wait_early() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "RUNNING")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    let flag = scheduler.interrupt_flag();
    flag.store(true, Ordering::SeqCst);

    let began = Instant::now();
    let success = scheduler.run(vec![make_jsi(dir.path(), "halted", 30)]).unwrap();

    assert!(!success);
    assert!(began.elapsed() < StdDuration::from_secs(5));
    assert_eq!(client.cancel_calls().len(), 1);
    // The flag is consumed, and the batch is still classified and recorded.
    assert!(!flag.load(Ordering::SeqCst));
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::NoOutput));
}

#[test]
fn overall_wait_deadline_bounds_the_run() {
    let client = Arc::new(FakeClient::new());
    // Runs forever; its own 10s timeout is far beyond the overall deadline.
    client.queue_timeline(vec![(0, "RUNNING")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 1);

    let began = Instant::now();
    let success = scheduler
        .run(vec![make_jsi(dir.path(), "longhaul", 10)])
        .unwrap();

    // Overall deadline (1s) plus the drain window, never the job's deadline.
    assert!(began.elapsed() < StdDuration::from_secs(3));
    assert!(!success);
    assert_eq!(client.cancel_calls().len(), 1);
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::NoOutput));
}

#[test]
fn inverted_polling_bounds_still_work() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "PENDING"), (50, "RUNNING"), (250, "COMPLETED")]);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);
    scheduler.policy.start_interval = StdDuration::from_millis(50);
    scheduler.policy.max_check_interval = StdDuration::from_millis(10);
    let writer = spawn_writer(
        stdout_path(dir.path(), "odd", 0),
        StdDuration::from_millis(100),
    );

    let success = scheduler.run(vec![make_jsi(dir.path(), "odd", 30)]).unwrap();
    writer.join().unwrap();

    assert!(success);
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::Completed));
}

#[test]
fn unreportable_job_is_dropped_from_the_wait() {
    let client = Arc::new(FakeClient::new());
    client.queue_timeline(vec![(0, "RUNNING")]);
    client.mark_unreportable(1000);
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(Arc::clone(&client), 30);

    let began = Instant::now();
    let success = scheduler.run(vec![make_jsi(dir.path(), "lost", 30)]).unwrap();

    // Permanent answers are not re-polled for the rest of the wait.
    assert!(began.elapsed() < StdDuration::from_secs(3));
    assert!(!success);
    assert!(client.cancel_calls().is_empty());
    assert_eq!(final_state(&scheduler, 1000), Some(SlurmState::Cancelled));
}

#[test]
fn never_started_jobs_keep_the_remote_verdict() {
    let client = Arc::new(FakeClient::new());
    let dir = tempdir().unwrap();
    let mut scheduler = test_scheduler(client, 30);

    let mut jsi = make_jsi(dir.path(), "ghost", 30);
    jsi.job_id = Some(7);
    let mut status = StatusInfo::new(Utc::now());
    status.current_state = Some(SlurmState::Cancelled);
    jsi.status_info = Some(status);

    let success = scheduler.report_job_info(BTreeMap::from([(7, jsi)]));

    assert!(!success);
    // Cancelled before dispatch: no output evidence exists to judge, so the
    // classification must not be NO_OUTPUT.
    assert_eq!(final_state(&scheduler, 7), Some(SlurmState::Cancelled));
}

#[test]
fn filter_killed_picks_cancelled_jobs() {
    let dir = tempdir().unwrap();
    let batch = BTreeMap::from([
        (1, finished_jsi(dir.path(), "a", 1, SlurmState::Completed)),
        (2, finished_jsi(dir.path(), "b", 2, SlurmState::Cancelled)),
        (3, finished_jsi(dir.path(), "c", 3, SlurmState::Failed)),
    ]);
    assert_eq!(filter_killed_jobs(&batch), vec![2]);
    assert_eq!(get_output_paths(batch.values()).len(), 0);
}
