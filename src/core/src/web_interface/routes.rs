use bytes::BufMut;
use futures::TryStreamExt;
use log::{debug, error, warn};
use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use warp::multipart::FormData;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{HealthResponse, TryOnForm, TryOnResponse};
use crate::configuration::Config;
use crate::error_handling::types::{TryOnError, WebError};
use crate::session_management::public_url::{resolve_base_url, PUBLIC_MOUNT};
use crate::session_management::{SessionManager, TryOnOutcome, TryOnRequest};
use crate::storage::UploadKind;
use crate::synthesis::GenerationParams;

/// Number of images the caller asked for.
pub const EXPECTED_HEADER: &str = "x-tryon-expected";
/// Number of images actually returned.
pub const PRODUCED_HEADER: &str = "x-tryon-produced";

/// A form that could be read but not accepted.
#[derive(Debug)]
pub struct InvalidForm(pub WebError);

impl warp::reject::Reject for InvalidForm {}

fn with_manager(
    manager: Arc<SessionManager>,
) -> impl Filter<Extract = (Arc<SessionManager>,), Error = Infallible> + Clone {
    warp::any().map(move || manager.clone())
}

fn with_config(
    config: Arc<Config>,
) -> impl Filter<Extract = (Arc<Config>,), Error = Infallible> + Clone {
    warp::any().map(move || config.clone())
}

fn error_reply(status: StatusCode, message: String) -> reply::Response {
    reply::with_status(reply::json(&TryOnResponse::error(message)), status).into_response()
}

/// POST /tryon/
pub fn tryon_route(
    manager: Arc<SessionManager>,
    config: Arc<Config>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let max_length = config.max_upload_bytes;
    warp::path("tryon")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("host"))
        .and(warp::header::optional::<String>("x-forwarded-proto"))
        .and(warp::multipart::form().max_length(max_length))
        .and(with_manager(manager))
        .and(with_config(config))
        .and_then(tryon_handler)
}

/// GET /served_outputs/<session-id>/<filename>
pub fn served_outputs_route(
    public_dir: PathBuf,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path(PUBLIC_MOUNT).and(warp::fs::dir(public_dir))
}

/// GET /health
pub fn health_route(
    manager: Arc<SessionManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_manager(manager))
        .map(|manager: Arc<SessionManager>| {
            reply::json(&HealthResponse {
                status: "ok",
                mode: manager.synthesis().runtime(),
                sessions: manager.get_stats(),
                synthesis: manager.synthesis().get_stats(),
            })
        })
}

async fn tryon_handler(
    host: Option<String>,
    forwarded_proto: Option<String>,
    form: FormData,
    manager: Arc<SessionManager>,
    config: Arc<Config>,
) -> Result<reply::Response, Rejection> {
    let form = read_tryon_form(form)
        .await
        .map_err(|e| warp::reject::custom(InvalidForm(e)))?;

    let base_url = resolve_base_url(
        config.public_base_url.as_deref(),
        host.as_deref(),
        forwarded_proto.as_deref(),
        &config.fallback_base_url(),
    );
    let request = TryOnRequest {
        model_image: form.model_image,
        cloth_image: form.cloth_image,
        params: form.params,
        base_url,
    };

    let response = match manager.handle_tryon(request).await {
        Ok(TryOnOutcome::Success {
            results,
            expected,
            produced,
            ..
        }) => {
            let body = reply::json(&TryOnResponse::Success { results });
            let body = reply::with_header(body, EXPECTED_HEADER, expected.to_string());
            reply::with_header(body, PRODUCED_HEADER, produced.to_string()).into_response()
        }
        Ok(TryOnOutcome::Failed { message, .. }) => {
            reply::json(&TryOnResponse::Error { message }).into_response()
        }
        Err(TryOnError::InvalidParameter(message)) => {
            error_reply(StatusCode::UNPROCESSABLE_ENTITY, message)
        }
        Err(e) => {
            error!("Try-on request failed: {}", e);
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    };
    Ok(response)
}

fn parse_field<T: FromStr>(name: &str, data: Vec<u8>, default: T) -> Result<T, WebError> {
    let text = String::from_utf8(data)
        .map_err(|_| WebError::InvalidField(format!("{} is not valid UTF-8", name)))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(default);
    }
    text.parse()
        .map_err(|_| WebError::InvalidField(format!("{} has an invalid value: {}", name, text)))
}

/// Reads every part of the multipart body and picks out the try-on fields.
pub async fn read_tryon_form(form: FormData) -> Result<TryOnForm, WebError> {
    let fields: Vec<(String, Vec<u8>)> = form
        .and_then(|mut part| async move {
            let mut data: Vec<u8> = Vec::new();
            while let Some(chunk) = part.data().await {
                data.put(chunk?);
            }
            Ok::<_, warp::Error>((part.name().to_string(), data))
        })
        .try_collect()
        .await
        .map_err(|e| WebError::MultipartError(e.to_string()))?;

    let mut model_image = None;
    let mut cloth_image = None;
    let mut params = GenerationParams::default();
    for (name, data) in fields {
        match name.as_str() {
            "model_image" => model_image = Some(data),
            "cloth_image" => cloth_image = Some(data),
            "sample" => params.sample = parse_field("sample", data, params.sample)?,
            "scale" => params.scale = parse_field("scale", data, params.scale)?,
            other => debug!("Ignoring unknown form field {}", other),
        }
    }

    let model_image = model_image
        .ok_or_else(|| WebError::MissingField(UploadKind::Model.form_field().to_string()))?;
    let cloth_image = cloth_image
        .ok_or_else(|| WebError::MissingField(UploadKind::Cloth.form_field().to_string()))?;

    Ok(TryOnForm {
        model_image,
        cloth_image,
        params,
    })
}

/// Turns every rejection into a JSON error body.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(InvalidForm(e)) = err.find::<InvalidForm>() {
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "Upload exceeds the configured size limit".to_string(),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            "A Content-Length header is required".to_string(),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::MissingHeader>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
    {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a multipart/form-data body".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        )
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(reply::with_status(
        reply::json(&TryOnResponse::error(message)),
        status,
    ))
}
