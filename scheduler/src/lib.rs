//! Batch job submission and monitoring against a SLURM REST endpoint.
//!
//! A [`scheduler::JobScheduler`] submits a batch of jobs, waits for them
//! while enforcing per-job and overall deadlines, and classifies every
//! outcome against the output file each job was told to write. Finished
//! batches are recorded so cancelled jobs can be resubmitted.

pub mod client;
pub mod config;
pub mod jobs;
pub mod scheduler;
pub mod state;
