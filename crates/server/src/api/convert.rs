//! Conversion endpoints.
//!
//! Both endpoints take the same multipart form:
//!
//! | field     | required | content                                 |
//! |-----------|----------|-----------------------------------------|
//! | `file`    | yes      | input bytes; the filename is a hint     |
//! | `target`  | yes      | target format tag, e.g. `webp`          |
//! | `source`  | no       | declared source tag, sniffed otherwise  |
//! | `options` | no       | JSON [`ConversionOptions`] object       |

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;
use transmute_core::conversion::wire::{ConvertResponseBody, ErrorBody, REQUEST_ID_HEADER};
use transmute_core::{ConversionError, ConversionOptions, ConversionRequest, ErrorKind};

use super::middleware::CallerId;
use crate::metrics::HTTP_CONVERSION_ERRORS;
use crate::state::AppState;

/// Header naming the resolved output format on binary responses.
pub const OUTPUT_FORMAT_HEADER: &str = "x-output-format";

/// Header naming the converter that produced the output.
pub const PRODUCED_BY_HEADER: &str = "x-produced-by";

/// Longest request id accepted from the client.
const MAX_REQUEST_ID_LEN: usize = 64;

/// HTTP status for a conversion error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::UnsupportedOption => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedConversion | ErrorKind::CorruptInput => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        // Non-standard "client closed request".
        ErrorKind::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
    }
}

/// A failed conversion, rendered as `{"error": kind, "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::from(ConversionError::invalid_request(reason))
    }

    fn from_multipart(err: MultipartError) -> Self {
        let status = err.status();
        let mut api_error = Self::invalid(format!("malformed upload: {}", err.body_text()));
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            api_error.status = status;
        }
        api_error
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        let body = ErrorBody::from(&err);
        Self {
            status: status_for(body.error),
            body,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        HTTP_CONVERSION_ERRORS
            .with_label_values(&[self.body.error.as_str()])
            .inc();
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Default)]
struct ConvertForm {
    payload: Option<Vec<u8>>,
    filename: Option<String>,
    target: Option<String>,
    source: Option<String>,
    options: ConversionOptions,
}

impl ConvertForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(ApiError::from_multipart)?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    form.filename = field
                        .file_name()
                        .map(str::to_string)
                        .filter(|name| !name.trim().is_empty());
                    let bytes = field.bytes().await.map_err(ApiError::from_multipart)?;
                    form.payload = Some(bytes.to_vec());
                }
                "target" => {
                    form.target = Some(field.text().await.map_err(ApiError::from_multipart)?);
                }
                "source" => {
                    let source = field.text().await.map_err(ApiError::from_multipart)?;
                    form.source = Some(source).filter(|s| !s.trim().is_empty());
                }
                "options" => {
                    let text = field.text().await.map_err(ApiError::from_multipart)?;
                    if !text.trim().is_empty() {
                        form.options = serde_json::from_str(&text).map_err(|e| {
                            ApiError::invalid(format!("options is not valid JSON: {}", e))
                        })?;
                    }
                }
                other => debug!(field = other, "Ignoring unknown multipart field"),
            }
        }

        Ok(form)
    }

    fn into_request(self, request_id: Option<String>) -> Result<ConversionRequest, ApiError> {
        let payload = self
            .payload
            .ok_or_else(|| ApiError::invalid("missing file field"))?;
        let target = self
            .target
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::invalid("missing target field"))?;

        let mut request = ConversionRequest::new(payload, target).with_options(self.options);
        if let Some(source) = self.source {
            request = request.with_source(source);
        }
        if let Some(filename) = self.filename {
            request = request.with_filename(filename);
        }
        if let Some(id) = request_id {
            request = request.with_id(id);
        }
        Ok(request)
    }
}

/// Client-supplied request id, if it is safe to reuse as a scratch namespace.
fn request_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .filter(|id| {
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
        .map(str::to_string)
}

async fn run_conversion(
    state: &AppState,
    caller: &str,
    headers: &HeaderMap,
    multipart: Multipart,
) -> Result<transmute_core::ConversionResult, ApiError> {
    let request = ConvertForm::read(multipart)
        .await?
        .into_request(request_id_from(headers))?;

    debug!(
        request_id = %request.id,
        caller = caller,
        target = %request.target,
        bytes = request.input_bytes(),
        "Conversion request received"
    );

    Ok(state.converter().convert(caller, &request).await?)
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// `POST /api/v1/convert`: responds with the converted bytes.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let result = run_conversion(&state, &caller, &headers, multipart).await?;

    let mime_type = result.format.mime_type();
    let disposition = format!("attachment; filename=\"{}\"", result.filename);
    let format = result.format.to_string();
    let produced_by = result.produced_by.clone();

    let mut response = (StatusCode::OK, result.data).into_response();
    let response_headers = response.headers_mut();
    set_header(response_headers, header::CONTENT_TYPE, mime_type);
    set_header(response_headers, header::CONTENT_DISPOSITION, &disposition);
    set_header(
        response_headers,
        HeaderName::from_static(OUTPUT_FORMAT_HEADER),
        &format,
    );
    set_header(
        response_headers,
        HeaderName::from_static(PRODUCED_BY_HEADER),
        &produced_by,
    );

    Ok(response)
}

/// `POST /api/v1/convert/json`: responds with base64 output and aux results.
pub async fn convert_json(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ConvertResponseBody>, ApiError> {
    let result = run_conversion(&state, &caller, &headers, multipart).await?;
    Ok(Json(ConvertResponseBody::from(&result)))
}
