//! The client for the compute provider worker machines run on
//!
//! The provider exposes a machines api: create, start, stop, and list.
//! 429s and 5xxs are worth retrying; anything else is terminal.

mod models;

use http::StatusCode;
use std::fmt;
use tracing::instrument;

pub use models::{GuestSpec, MachineConfig, MachineSpec, ProviderMachine, RestartPolicy};

use crate::Conf;
use crate::utils::ApiError;

/// The errors the provider client can return
#[derive(Debug)]
pub enum ProviderError {
    /// The provider answered with a non success status
    Http {
        /// The status the provider answered with
        status: StatusCode,
        /// The body the provider answered with
        body: String,
    },
    /// The provider answered with a body we could not parse
    InvalidMachineResponse(String),
    /// The request never completed
    Request(reqwest::Error),
}

impl ProviderError {
    /// Whether a retry might succeed for this error
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            // rate limits and server errors are worth retrying
            ProviderError::Http { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            // transport level failures may be transient
            ProviderError::Request(error) => error.is_timeout() || error.is_connect(),
            ProviderError::InvalidMachineResponse(_) => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderError::Http { status, body } => {
                write!(f, "provider returned {status}: {body}")
            }
            ProviderError::InvalidMachineResponse(msg) => {
                write!(f, "invalid machine response: {msg}")
            }
            ProviderError::Request(error) => write!(f, "provider request failed: {error}"),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        ProviderError::Request(error)
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        ApiError::new(
            StatusCode::BAD_GATEWAY,
            Some(format!("Provider error: {error}")),
        )
    }
}

/// A client for the providers machines api
pub struct Machines {
    /// The reqwest client to send requests with
    client: reqwest::Client,
    /// The base url for the provider api
    url: String,
    /// The app machines are created under
    app: String,
    /// The token to authenticate with
    token: Option<String>,
}

impl Machines {
    /// Create a new machines client
    ///
    /// # Arguments
    ///
    /// * `conf` - The clipforge config to use
    #[must_use]
    pub fn new(conf: &Conf) -> Self {
        // build our reqwest client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build provider client");
        Machines {
            client,
            url: conf.provider.url.clone(),
            app: conf.provider.app_name.clone(),
            token: conf.provider.token.clone(),
        }
    }

    /// Build the url to a machines route
    ///
    /// # Arguments
    ///
    /// * `path` - The path under the machines collection
    fn route(&self, path: &str) -> String {
        format!("{}/apps/{}/machines{}", self.url, self.app, path)
    }

    /// Send a request and surface non success statuses as errors
    ///
    /// # Arguments
    ///
    /// * `req` - The request to send
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        // add our auth token if one is set
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            // pull the body out for the error
            let body = resp.text().await.unwrap_or_default();
            Err(ProviderError::Http { status, body })
        }
    }

    /// Create a new machine
    ///
    /// # Arguments
    ///
    /// * `spec` - The spec to create this machine from
    #[instrument(name = "Machines::create", skip_all, err(Debug))]
    pub async fn create(&self, spec: &MachineSpec) -> Result<ProviderMachine, ProviderError> {
        let resp = self.send(self.client.post(self.route("")).json(spec)).await?;
        // the machine we get back must at least carry an id
        resp.json::<ProviderMachine>()
            .await
            .map_err(|error| ProviderError::InvalidMachineResponse(error.to_string()))
    }

    /// Start a stopped machine
    ///
    /// # Arguments
    ///
    /// * `machine` - The id of the machine to start
    #[instrument(name = "Machines::start", skip(self), err(Debug))]
    pub async fn start(&self, machine: &str) -> Result<(), ProviderError> {
        let path = format!("/{machine}/start");
        self.send(self.client.post(self.route(&path))).await?;
        Ok(())
    }

    /// Stop a running machine
    ///
    /// # Arguments
    ///
    /// * `machine` - The id of the machine to stop
    #[instrument(name = "Machines::stop", skip(self), err(Debug))]
    pub async fn stop(&self, machine: &str) -> Result<(), ProviderError> {
        let path = format!("/{machine}/stop");
        self.send(self.client.post(self.route(&path))).await?;
        Ok(())
    }

    /// List every machine under our app
    #[instrument(name = "Machines::list", skip_all, err(Debug))]
    pub async fn list(&self) -> Result<Vec<ProviderMachine>, ProviderError> {
        let resp = self.send(self.client.get(self.route(""))).await?;
        resp.json::<Vec<ProviderMachine>>()
            .await
            .map_err(|error| ProviderError::InvalidMachineResponse(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an http error for a status code
    fn http(status: u16) -> ProviderError {
        ProviderError::Http {
            status: StatusCode::from_u16(status).unwrap(),
            body: String::default(),
        }
    }

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        assert!(http(429).retryable());
        assert!(http(500).retryable());
        assert!(http(503).retryable());
        assert!(!http(400).retryable());
        assert!(!http(404).retryable());
        assert!(!http(422).retryable());
    }

    #[test]
    fn bad_bodies_are_terminal() {
        let error = ProviderError::InvalidMachineResponse("missing id".to_owned());
        assert!(!error.retryable());
    }
}
