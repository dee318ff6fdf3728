use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Job states as reported by the SLURM REST API, see
/// https://slurm.schedmd.com/squeue.html#SECTION_JOB-STATE-CODES,
/// plus the two synthetic states only the monitor can assign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlurmState {
    /// Job terminated due to launch failure, typically a hardware failure.
    BootFail,
    /// Job was explicitly cancelled by the user or system administrator.
    /// The job may or may not have been initiated.
    Cancelled,
    /// Job has terminated all processes on all nodes with an exit code of zero.
    Completed,
    /// Job has been allocated resources, but is waiting for them to become ready.
    Configuring,
    /// Job is in the process of completing.
    Completing,
    /// Job terminated on deadline.
    Deadline,
    /// Job terminated with non-zero exit code or other failure condition.
    Failed,
    /// Job terminated due to failure of one or more allocated nodes.
    NodeFail,
    /// Job experienced out of memory error.
    OutOfMemory,
    /// Job is awaiting resource allocation.
    Pending,
    /// Job terminated due to preemption.
    Preempted,
    /// Job currently has an allocation.
    Running,
    /// Job is held.
    ResvDelHold,
    /// Job is being requeued by a federation.
    RequeueFed,
    /// Held job is being requeued.
    RequeueHold,
    /// Completing job is being requeued.
    Requeued,
    /// Job is about to change size.
    Resizing,
    /// Sibling was removed from cluster due to other cluster starting the job.
    Revoked,
    /// Job is being signaled.
    Signaling,
    /// The job was requeued in a special state.
    SpecialExit,
    /// Job is staging out files.
    StageOut,
    /// Job has an allocation, but execution has been stopped with SIGSTOP.
    Stopped,
    /// Job has an allocation, but execution has been suspended.
    Suspended,
    /// Job terminated upon reaching its time limit.
    Timeout,
    /// Synthetic state. No output file found.
    NoOutput,
    /// Synthetic state. Output file has not been updated since the job started.
    OldOutputFile,
}

/// States a job passes through before it is dispatched.
pub const STARTING: &[SlurmState] = &[
    SlurmState::Pending,
    SlurmState::Requeued,
    SlurmState::Resizing,
    SlurmState::Suspended,
    SlurmState::Configuring,
];

/// States the wait loop treats as "this job is done".
pub const ENDED: &[SlurmState] = &[
    SlurmState::Completed,
    SlurmState::Failed,
    SlurmState::Timeout,
    SlurmState::Deadline,
];

/// Terminal states caused by the cluster rather than the job itself.
pub const COMPUTE_ISSUE: &[SlurmState] = &[
    SlurmState::BootFail,
    SlurmState::NodeFail,
    SlurmState::OutOfMemory,
];

/// Terminal states caused by a time limit.
pub const OUT_OF_TIME: &[SlurmState] = &[SlurmState::Timeout, SlurmState::Deadline];

/// States from which the remote is willing to requeue a job.
pub const REQUEUEABLE: &[SlurmState] = &[
    SlurmState::Configuring,
    SlurmState::Running,
    SlurmState::Stopped,
    SlurmState::Suspended,
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised job state {0:?}")]
pub struct UnknownStateError(pub String);

impl SlurmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BootFail => "BOOT_FAIL",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
            Self::Configuring => "CONFIGURING",
            Self::Completing => "COMPLETING",
            Self::Deadline => "DEADLINE",
            Self::Failed => "FAILED",
            Self::NodeFail => "NODE_FAIL",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::Pending => "PENDING",
            Self::Preempted => "PREEMPTED",
            Self::Running => "RUNNING",
            Self::ResvDelHold => "RESV_DEL_HOLD",
            Self::RequeueFed => "REQUEUE_FED",
            Self::RequeueHold => "REQUEUE_HOLD",
            Self::Requeued => "REQUEUED",
            Self::Resizing => "RESIZING",
            Self::Revoked => "REVOKED",
            Self::Signaling => "SIGNALING",
            Self::SpecialExit => "SPECIAL_EXIT",
            Self::StageOut => "STAGE_OUT",
            Self::Stopped => "STOPPED",
            Self::Suspended => "SUSPENDED",
            Self::Timeout => "TIMEOUT",
            Self::NoOutput => "NO_OUTPUT",
            Self::OldOutputFile => "OLD_OUTPUT_FILE",
        }
    }

    /// Set-membership test against one of the state groups above.
    pub fn is_in(&self, group: &[SlurmState]) -> bool {
        group.contains(self)
    }
}

impl FromStr for SlurmState {
    type Err = UnknownStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "BOOT_FAIL" => Self::BootFail,
            "CANCELLED" => Self::Cancelled,
            "COMPLETED" => Self::Completed,
            "CONFIGURING" => Self::Configuring,
            "COMPLETING" => Self::Completing,
            "DEADLINE" => Self::Deadline,
            "FAILED" => Self::Failed,
            "NODE_FAIL" => Self::NodeFail,
            "OUT_OF_MEMORY" => Self::OutOfMemory,
            "PENDING" => Self::Pending,
            "PREEMPTED" => Self::Preempted,
            "RUNNING" => Self::Running,
            "RESV_DEL_HOLD" => Self::ResvDelHold,
            "REQUEUE_FED" => Self::RequeueFed,
            "REQUEUE_HOLD" => Self::RequeueHold,
            "REQUEUED" => Self::Requeued,
            "RESIZING" => Self::Resizing,
            "REVOKED" => Self::Revoked,
            "SIGNALING" => Self::Signaling,
            "SPECIAL_EXIT" => Self::SpecialExit,
            "STAGE_OUT" => Self::StageOut,
            "STOPPED" => Self::Stopped,
            "SUSPENDED" => Self::Suspended,
            "TIMEOUT" => Self::Timeout,
            "NO_OUTPUT" => Self::NoOutput,
            "OLD_OUTPUT_FILE" => Self::OldOutputFile,
            other => return Err(UnknownStateError(other.to_owned())),
        })
    }
}

impl fmt::Display for SlurmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
