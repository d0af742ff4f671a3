use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{debug, error, info};
use serde::Serialize;

use covid_serve::upload::{allowed_file, secure_filename, SavedUpload};
use covid_serve::{Prediction, XrayClassifier};

const INDEX_HTML: &str = include_str!("index.html");

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

pub const NO_FILE: &str = "No se proporcionó archivo";
pub const NO_FILE_SELECTED: &str = "No se seleccionó archivo";
pub const EXTENSION_NOT_ALLOWED: &str = "Tipo de archivo no permitido. Use JPG o PNG";

/// Everything a request needs, shared by all connections
pub struct AppState {
    classifier: XrayClassifier,
    upload_dir: PathBuf,
}

impl AppState {
    pub fn new(classifier: XrayClassifier, upload_dir: PathBuf) -> Self {
        AppState {
            classifier,
            upload_dir,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

struct Upload {
    filename: String,
    data: Vec<u8>,
}

fn json<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Could not serialize response: {}", e);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    json(status, &ErrorBody { error: message })
}

fn home() -> Response<Body> {
    let mut response = Response::new(Body::from(INDEX_HTML));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Validate a client filename and return the name to store it under.
///
/// The `Err` value is the message sent back with a 400.
pub fn check_filename(filename: &str) -> Result<String, &'static str> {
    if filename.is_empty() {
        return Err(NO_FILE_SELECTED);
    }

    if !allowed_file(filename) {
        return Err(EXTENSION_NOT_ALLOWED);
    }

    // The allowed extension is ASCII, so the sanitized name is never empty.
    Ok(secure_filename(filename))
}

/// Pull the first file sent under `FILE_FIELD` out of a multipart body.
async fn read_upload(req: Request<Body>) -> multer::Result<Option<Upload>> {
    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(multer::parse_boundary);

    let boundary = match boundary {
        Some(Ok(boundary)) => boundary,
        _ => return Ok(None),
    };

    let mut multipart = multer::Multipart::new(req.into_body(), boundary);

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A plain form value under the right name is not a file.
        let filename = match field.file_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };

        let data = field.bytes().await?.to_vec();

        return Ok(Some(Upload { filename, data }));
    }

    Ok(None)
}

/// Save, classify and clean up one upload on a blocking thread.
async fn classify_upload(
    state: &AppState,
    filename: String,
    data: Vec<u8>,
) -> Result<Prediction, String> {
    let classifier = state.classifier.clone();
    let dir = state.upload_dir.clone();

    let job = tokio::task::spawn_blocking(move || -> covid_serve::Result<Prediction> {
        let saved = SavedUpload::save(&dir, &filename, &data)?;
        let classification = classifier.classify_file(saved.path())?;

        Ok(classification.prediction)
    });

    match job.await {
        Ok(Ok(prediction)) => Ok(prediction),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

async fn predict(req: Request<Body>, state: &AppState) -> Response<Body> {
    let upload = match read_upload(req).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, NO_FILE),
        Err(e) => {
            debug!("Malformed multipart body: {}", e);
            return error_response(StatusCode::BAD_REQUEST, NO_FILE);
        }
    };

    let filename = match check_filename(&upload.filename) {
        Ok(name) => name,
        Err(message) => {
            debug!("Rejected upload '{}': {}", upload.filename, message);
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    debug!("Received {} ({} bytes)", filename, upload.data.len());

    match classify_upload(state, filename, upload.data).await {
        Ok(prediction) => {
            info!(
                "{} (probability {:.4}, confidence {:.4})",
                prediction.class, prediction.probability, prediction.confidence
            );
            json(StatusCode::OK, &prediction)
        }
        Err(e) => {
            error!("Processing failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error procesando imagen: {}", e),
            )
        }
    }
}

/// Route one request
pub async fn handle(
    req: Request<Body>,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible> {
    debug!("{} {}", req.method(), req.uri().path());

    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => home(),
        (&Method::POST, "/predict") => predict(req, &state).await,
        _ => error_response(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filename_is_not_selected() {
        assert_eq!(check_filename(""), Err(NO_FILE_SELECTED));
    }

    #[test]
    fn disallowed_extension_is_rejected_before_sanitizing() {
        assert_eq!(check_filename("xray.gif"), Err(EXTENSION_NOT_ALLOWED));
        assert_eq!(check_filename("../xray.bmp"), Err(EXTENSION_NOT_ALLOWED));
    }

    #[test]
    fn non_ascii_name_keeps_its_extension() {
        assert_eq!(check_filename("\u{5199}\u{771f}.png"), Ok("png".to_owned()));
        assert_eq!(check_filename("/._.jpg"), Ok("jpg".to_owned()));
    }

    #[test]
    fn accepted_names_are_sanitized() {
        assert_eq!(
            check_filename("../../chest scan.JPEG"),
            Ok("chest_scan.JPEG".to_owned())
        );
    }
}
