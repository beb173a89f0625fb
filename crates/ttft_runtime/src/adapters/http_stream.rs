use std::io::{ErrorKind, Read};
use std::time::Duration;

use ttft_experiments::loadgen::{EndpointError, GenerateRequest, StreamingEndpoint};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const STREAM_PATH: &str = "/generate_stream";
const CHUNK_SIZE: usize = 8192;

/// Streams generations from `{target}/generate_stream` over chunked HTTP.
pub struct HttpStreamEndpoint {
    target: String,
    default_timeout: Duration,
    client: reqwest::blocking::Client,
}

impl HttpStreamEndpoint {
    pub fn new(target: &str, default_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(default_timeout)
            .build()?;
        Ok(Self {
            target: normalize_target(target),
            default_timeout,
            client,
        })
    }

    pub fn stream_url(&self) -> String {
        format!("{}{STREAM_PATH}", self.target)
    }
}

/// `host:port` gets an `http://` scheme; a trailing slash is dropped.
pub fn normalize_target(target: &str) -> String {
    let trimmed = target.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

impl StreamingEndpoint for HttpStreamEndpoint {
    fn stream_generate(
        &self,
        request: &GenerateRequest,
        on_chunk: &mut dyn FnMut(&[u8]),
    ) -> Result<(), EndpointError> {
        let deadline = request.timeout.unwrap_or(self.default_timeout);
        let mut response = self
            .client
            .post(self.stream_url())
            .timeout(deadline)
            .json(request)
            .send()
            .map_err(|error| {
                if error.is_timeout() {
                    EndpointError::Timeout(deadline)
                } else {
                    EndpointError::Connect(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(EndpointError::Status {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            match response.read(&mut buffer) {
                Ok(0) => return Ok(()),
                Ok(read) => on_chunk(&buffer[..read]),
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) if error.kind() == ErrorKind::TimedOut => {
                    return Err(EndpointError::Timeout(deadline))
                }
                Err(error) => return Err(EndpointError::Stream(error.to_string())),
            }
        }
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}
