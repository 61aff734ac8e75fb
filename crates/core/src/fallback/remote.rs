use async_trait::async_trait;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::conversion::wire::{
    ConvertResponseBody, ErrorBody, CALLER_HEADER, CONVERT_JSON_PATH, REQUEST_ID_HEADER,
};
use crate::conversion::{
    ConversionError, ConversionRequest, ConversionResult, Converter, ErrorKind,
};
use crate::format::FormatTag;
use crate::metrics;

/// Client for another instance's `POST /api/v1/convert/json` endpoint.
pub struct RemoteConverter {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RemoteConverter {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}{}", config.url.trim_end_matches('/'), CONVERT_JSON_PATH),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, error: reqwest::Error) -> ConversionError {
        metrics::REMOTE_REQUESTS.with_label_values(&["error"]).inc();
        if error.is_timeout() {
            ConversionError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ConversionError::remote(ErrorKind::BackendUnavailable, error.to_string())
        }
    }

    fn build_form(request: &ConversionRequest) -> Result<Form, ConversionError> {
        let options = serde_json::to_string(&request.options)
            .map_err(|e| ConversionError::invalid_request(format!("options: {}", e)))?;

        let filename = request.filename.clone().unwrap_or_else(|| {
            if request.source.is_empty() {
                "upload".to_string()
            } else {
                format!("upload.{}", request.source)
            }
        });

        let mut form = Form::new()
            .part("file", Part::bytes(request.payload.to_vec()).file_name(filename))
            .text("target", request.target.to_string())
            .text("options", options);
        if !request.source.is_empty() {
            form = form.text("source", request.source.to_string());
        }
        Ok(form)
    }
}

/// Maps a non-2xx response to an error of the same kind the remote raised.
fn status_error(status: u16, body: &str) -> ConversionError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();

    if status >= 500 {
        // Only transport kinds survive a server error; the remote's internal
        // failures are a backend problem from here.
        return match parsed {
            Some(err) if err.error.is_transport() => ConversionError::remote(err.error, err.message),
            _ => ConversionError::remote(
                ErrorKind::BackendUnavailable,
                format!("remote returned {}", status),
            ),
        };
    }

    match parsed {
        Some(err) => ConversionError::remote(err.error, err.message),
        None => ConversionError::remote(
            ErrorKind::BackendUnavailable,
            format!("remote returned {} without an error body", status),
        ),
    }
}

#[async_trait]
impl Converter for RemoteConverter {
    fn name(&self) -> &str {
        "remote"
    }

    async fn convert(
        &self,
        caller: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        debug!(request_id = %request.id, endpoint = %self.endpoint, "Sending conversion to remote");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header(CALLER_HEADER, caller)
            .header(REQUEST_ID_HEADER, &request.id)
            .multipart(Self::build_form(request)?)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let label = if status >= 500 { "error" } else { "rejected" };
            metrics::REMOTE_REQUESTS.with_label_values(&[label]).inc();
            return Err(status_error(status, &body));
        }

        let body: ConvertResponseBody = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                metrics::REMOTE_REQUESTS.with_label_values(&["error"]).inc();
                ConversionError::remote(
                    ErrorKind::BackendUnavailable,
                    format!("malformed remote response: {}", e),
                )
            }
        })?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(body.data_base64.as_bytes())
            .map_err(|e| {
                metrics::REMOTE_REQUESTS.with_label_values(&["error"]).inc();
                ConversionError::remote(
                    ErrorKind::BackendUnavailable,
                    format!("malformed remote payload: {}", e),
                )
            })?;

        metrics::REMOTE_REQUESTS.with_label_values(&["success"]).inc();

        Ok(ConversionResult {
            data,
            filename: body.filename,
            format: FormatTag::new(&body.format),
            aux: body.aux,
            produced_by: if body.produced_by.is_empty() {
                "remote".to_string()
            } else {
                format!("remote/{}", body.produced_by)
            },
            duration_ms: body.duration_ms,
        })
    }
}
