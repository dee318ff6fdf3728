pub mod models;

use models::{JobInfo, JobResponse, JobSubmission, SubmitResponse};
use reqwest::blocking::RequestBuilder;
use reqwest::Method;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP transport failed")]
    Transport(#[from] reqwest::Error),
    #[error("invalid scheduler endpoint")]
    Endpoint(#[from] url::ParseError),
    #[error("remote returned invalid job id {0}")]
    InvalidJobId(i64),
    #[error("remote has no record of job {0}")]
    UnknownJob(u32),
}

/// The three operations the monitor needs from a remote batch scheduler.
///
/// Every call is an independent request; no state is kept between calls and
/// no retrying happens at this layer (retry policy lives in the monitor).
pub trait SlurmClient {
    fn submit_job(&self, submission: &JobSubmission) -> Result<SubmitResponse, ClientError>;
    fn get_job(&self, job_id: u32) -> Result<JobInfo, ClientError>;
    fn cancel_job(&self, job_id: u32) -> Result<(), ClientError>;
}

/// Thin adapter over the SLURM REST API. Hides authentication headers, URL
/// composition and JSON shape from the monitor.
pub struct SlurmRestClient {
    base_url: String,
    user_name: Option<String>,
    user_token: Option<String>,
    http: reqwest::blocking::Client,
}

impl SlurmRestClient {
    pub const API_VERSION: &'static str = "v0.0.38";

    pub fn new(
        url: &str,
        user_name: Option<String>,
        user_token: Option<String>,
    ) -> Result<Self, ClientError> {
        // Validate early so a bad endpoint fails at construction, not mid-run.
        let parsed = Url::parse(url)?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_owned(),
            user_name,
            user_token,
            http: reqwest::blocking::Client::new(),
        })
    }

    fn endpoint(&self, tail: &str) -> Result<Url, ClientError> {
        Ok(Url::parse(&format!(
            "{}/slurm/{}/{}",
            self.base_url,
            Self::API_VERSION,
            tail
        ))?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(user_name) = &self.user_name {
            builder = builder.header("X-SLURM-USER-NAME", user_name);
        }
        if let Some(user_token) = &self.user_token {
            builder = builder.header("X-SLURM-USER-TOKEN", user_token);
        }
        builder
    }
}

impl SlurmClient for SlurmRestClient {
    fn submit_job(&self, submission: &JobSubmission) -> Result<SubmitResponse, ClientError> {
        let url = self.endpoint("job/submit")?;
        debug!(url = %url, job = %submission.job.name, "submitting job");
        let response: SubmitResponse = self
            .request(Method::POST, url)
            .json(submission)
            .send()?
            .json()?;
        trace!(response = ?response, "submit response");
        Ok(response)
    }

    fn get_job(&self, job_id: u32) -> Result<JobInfo, ClientError> {
        let url = self.endpoint(&format!("job/{job_id}"))?;
        let response: JobResponse = self.request(Method::GET, url).send()?.json()?;
        let info = response
            .jobs
            .into_iter()
            .next()
            .ok_or(ClientError::UnknownJob(job_id))?;
        if info.job_id < 0 {
            return Err(ClientError::InvalidJobId(info.job_id));
        }
        Ok(info)
    }

    fn cancel_job(&self, job_id: u32) -> Result<(), ClientError> {
        let url = self.endpoint(&format!("job/{job_id}"))?;
        debug!(job_id, "cancelling job");
        self.request(Method::DELETE, url)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
