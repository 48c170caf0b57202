//! HTTPS coordinator client
//!
//! Blocking `reqwest` client over rustls. The control loop is sequential, so
//! every call blocks until the response body has been read. Timeouts are
//! configured on the client and enforced by the HTTP stack.

use crate::models::{JobAssignment, JobDescriptor};
use crate::net::wire::{self, UploadBody};
use crate::net::{
    Coordinator, CoordinatorError, EngineRequest, ProtocolError, StreamSession, TransportError,
};
use crate::trust::{TrustBundle, TrustLoadError, TrustStore};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, info};

pub const ASSIGN_PATH: &str = "/core/assign";
pub const FRAME_PATH: &str = "/core/frame";
pub const CHECKPOINT_PATH: &str = "/core/checkpoint";
pub const HEARTBEAT_PATH: &str = "/core/heartbeat";
pub const STOP_PATH: &str = "/core/stop";

/// Transport settings handed to the HTTP stack
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Handshake client for one coordinator
pub struct HttpCoordinator {
    base_url: String,
    settings: HttpSettings,
    trust: Option<TrustStore>,
    client: Client,
}

impl HttpCoordinator {
    /// Client trusting the built-in web PKI roots until a bundle is installed
    pub fn new(base_url: impl Into<String>, settings: HttpSettings) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = build_client(&settings, None).map_err(|e| TransportError::Io {
            url: base_url.clone(),
            message: error_chain(&e),
        })?;
        Ok(Self {
            base_url,
            settings,
            trust: None,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Custom roots currently installed, if any
    pub fn trust_store(&self) -> Option<&TrustStore> {
        self.trust.as_ref()
    }
}

impl Coordinator for HttpCoordinator {
    fn install_trust(&mut self, bundle: TrustBundle) -> Result<usize, TrustLoadError> {
        let mut candidate = self.trust.clone().unwrap_or_default();
        let added = candidate.install(bundle);

        let client = build_client(&self.settings, Some(&candidate)).map_err(|e| {
            TrustLoadError::Rejected {
                message: error_chain(&e),
            }
        })?;

        self.client = client;
        self.trust = Some(candidate);
        info!(added, "installed trust bundle");
        Ok(added)
    }

    fn assign(&mut self, request: &EngineRequest) -> Result<JobAssignment, CoordinatorError> {
        let url = format!("{}{}", self.base_url, ASSIGN_PATH);
        debug!(%url, engine = %request.engine, "requesting assignment");

        let body = send(&url, self.client.post(&url).json(request))?;
        let assignment = wire::parse_assignment(&body)?;

        info!(host = %assignment.host, port = assignment.port, "received assignment");
        Ok(assignment)
    }

    fn open_stream(
        &mut self,
        assignment: &JobAssignment,
    ) -> Result<(JobDescriptor, Box<dyn StreamSession>), CoordinatorError> {
        let url = assignment.stream_url();
        debug!(%url, "opening stream");

        let body = send(
            &url,
            self.client
                .get(&url)
                .header(AUTHORIZATION, assignment.token.as_str()),
        )?;
        let descriptor = wire::parse_descriptor(&body)?;

        info!(
            stream_id = %descriptor.stream_id,
            target_id = %descriptor.target_id,
            "stream opened"
        );
        let session = HttpStreamSession {
            client: self.client.clone(),
            assignment: assignment.clone(),
        };
        Ok((descriptor, Box::new(session)))
    }
}

/// Reporting channel bound to one assignment token
pub struct HttpStreamSession {
    client: Client,
    assignment: JobAssignment,
}

impl HttpStreamSession {
    fn put_body(&self, path: &str, body: &UploadBody) -> Result<(), CoordinatorError> {
        let url = self.assignment.endpoint(path);
        let request = self
            .client
            .put(&url)
            .header(AUTHORIZATION, self.assignment.token.as_str())
            .header("Content-MD5", body.md5())
            .header(CONTENT_TYPE, "application/json")
            .body(body.json().to_string());
        send(&url, request).map(|_| ())
    }
}

impl StreamSession for HttpStreamSession {
    fn send_frame(&mut self, body: &UploadBody) -> Result<(), CoordinatorError> {
        self.put_body(FRAME_PATH, body)
    }

    fn send_checkpoint(&mut self, body: &UploadBody) -> Result<(), CoordinatorError> {
        self.put_body(CHECKPOINT_PATH, body)
    }

    fn heartbeat(&mut self) -> Result<(), CoordinatorError> {
        let url = self.assignment.endpoint(HEARTBEAT_PATH);
        let request = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.assignment.token.as_str());
        send(&url, request).map(|_| ())
    }

    fn stop(&mut self, error: Option<&str>) -> Result<(), CoordinatorError> {
        let body = UploadBody::stop(error);
        let url = self.assignment.endpoint(STOP_PATH);
        let request = self
            .client
            .put(&url)
            .header(AUTHORIZATION, self.assignment.token.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body.json().to_string());
        send(&url, request).map(|_| ())
    }
}

fn build_client(
    settings: &HttpSettings,
    roots: Option<&TrustStore>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .use_rustls_tls()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout);

    if let Some(store) = roots {
        builder = builder.tls_built_in_root_certs(false);
        for root in store.roots() {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(root.as_der())?);
        }
    }

    builder.build()
}

/// Send a request and return the body of a successful response
fn send(url: &str, request: RequestBuilder) -> Result<String, CoordinatorError> {
    let response = request.send().map_err(|e| classify(url, &e))?;
    let status = response.status();
    let body = response.text().map_err(|e| classify(url, &e))?;

    if !status.is_success() {
        return Err(ProtocolError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        }
        .into());
    }
    Ok(body)
}

/// Map a `reqwest` failure onto the transport taxonomy
///
/// TLS is checked first: a rejected certificate also surfaces as a connect
/// error, but must be reported as TLS.
pub(crate) fn classify(url: &str, err: &reqwest::Error) -> TransportError {
    let url = url.to_string();
    let message = error_chain(err);

    if is_tls_failure(err) {
        TransportError::Tls { url, message }
    } else if err.is_timeout() {
        TransportError::Timeout { url }
    } else if err.is_connect() {
        TransportError::Connect { url, message }
    } else {
        TransportError::Io { url, message }
    }
}

fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            let wraps_rustls = io
                .get_ref()
                .map_or(false, |inner| inner.downcast_ref::<rustls::Error>().is_some());
            if wraps_rustls {
                return true;
            }
        }
        current = e.source();
    }

    let text = error_chain(err).to_ascii_lowercase();
    ["certificate", "tls handshake", "invalid peer", "corrupt message"]
        .iter()
        .any(|needle| text.contains(needle))
}

/// `err: cause: cause` rendering of an error and its sources
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        current = cause.source();
    }
    message
}
