//! The platform-neutral request pipeline shared by every adapter.

use image::DynamicImage;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::codec::{decode_image, image_to_base64_png, DecodedImage};
use crate::compositor::composite;
use crate::error::{ProcessError, Result};
use crate::llm::MediaFile;
use crate::placement::Placement;
use crate::state::AppState;
use crate::utils::timing::RequestTimer;

pub const MISSING_FIELDS_MESSAGE: &str =
    "Отсутствуют обязательные поля: interiorImage или artworkImage";

#[derive(Debug, Clone)]
pub struct ProcessImageRequest {
    pub interior_image: String,
    pub artwork_image: String,
}

impl ProcessImageRequest {
    /// Parses a raw request body. Anything short of an object carrying both
    /// images as strings is an input error.
    pub fn from_json_bytes(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| ProcessError::input(format!("Некорректный JSON: {err}")))?;
        let Value::Object(fields) = value else {
            return Err(ProcessError::input(MISSING_FIELDS_MESSAGE));
        };
        let field = |name: &str| {
            fields
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ProcessError::input(MISSING_FIELDS_MESSAGE))
        };
        Ok(Self {
            interior_image: field("interiorImage")?,
            artwork_image: field("artworkImage")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageResponse {
    pub final_image: String,
}

/// Status code plus JSON body, independent of any web framework.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonReply {
    pub status: u16,
    pub body: Value,
}

impl JsonReply {
    fn from_error(err: &ProcessError) -> Self {
        Self {
            status: err.status_code(),
            body: json!({ "error": err.to_string() }),
        }
    }
}

async fn run_blocking<T, F>(task: &'static str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ProcessError::processing(format!("{task} task failed: {err}")))?
}

/// Resolves a placement (unless one is supplied) and composites the artwork.
pub async fn render(
    state: &AppState,
    interior: DecodedImage,
    artwork: DecodedImage,
    placement: Option<Placement>,
    timer: &mut RequestTimer,
) -> Result<DynamicImage> {
    let DecodedImage {
        bytes: interior_bytes,
        image: interior_image,
    } = interior;
    let DecodedImage {
        bytes: artwork_bytes,
        image: artwork_image,
    } = artwork;

    let placement = match placement {
        Some(placement) => placement,
        None => {
            let interior_file = MediaFile::image(interior_bytes, "interior");
            let artwork_file = MediaFile::image(artwork_bytes, "artwork");
            let placement = state
                .resolver
                .resolve(&state.prompt, &interior_file, &artwork_file)
                .await;
            timer.stage("resolve");
            placement
        }
    };

    let options = state.options;
    let composed = run_blocking("composite", move || {
        Ok(composite(&interior_image, &artwork_image, &placement, &options))
    })
    .await?;
    timer.stage("composite");
    Ok(composed)
}

/// Decodes both images, resolves a placement, composites and encodes.
pub async fn process_request(
    state: &AppState,
    request: ProcessImageRequest,
    timer: &mut RequestTimer,
) -> Result<ProcessImageResponse> {
    let ProcessImageRequest {
        interior_image,
        artwork_image,
    } = request;
    let (interior, artwork) = run_blocking("decode", move || {
        Ok((decode_image(&interior_image)?, decode_image(&artwork_image)?))
    })
    .await?;
    timer.stage("decode");
    info!(
        interior_width = interior.image.width(),
        interior_height = interior.image.height(),
        artwork_width = artwork.image.width(),
        artwork_height = artwork.image.height(),
        "Decoded request images"
    );

    let composed = render(state, interior, artwork, None, timer).await?;

    let final_image = run_blocking("encode", move || image_to_base64_png(&composed)).await?;
    timer.stage("encode");
    Ok(ProcessImageResponse { final_image })
}

/// Runs the whole pipeline for a raw JSON body and shapes the reply.
pub async fn handle_json_body(state: &AppState, body: &[u8], adapter: &str) -> JsonReply {
    let mut timer = RequestTimer::start(adapter);
    let outcome = match ProcessImageRequest::from_json_bytes(body) {
        Ok(request) => process_request(state, request, &mut timer).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(response) => JsonReply {
            status: 200,
            body: json!(response),
        },
        Err(err) => {
            if err.is_input() {
                warn!("Rejected request: {err}");
                timer.mark_status("input_error", Some(err.to_string()));
            } else {
                error!("Request failed: {err}");
                timer.mark_status("error", Some(err.to_string()));
            }
            JsonReply::from_error(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::base64_to_image;
    use crate::handlers::testing::{png_base64, test_state, FakeModel};
    use image::{GenericImageView, Rgb};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn body(interior: &str, artwork: &str) -> Vec<u8> {
        json!({ "interiorImage": interior, "artworkImage": artwork })
            .to_string()
            .into_bytes()
    }

    fn error_text(reply: &JsonReply) -> String {
        reply.body["error"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn missing_field_is_rejected_before_the_model() {
        let model = Arc::new(FakeModel::replying("{}"));
        let state = test_state(model.clone());
        let payload = json!({ "interiorImage": png_base64(10, 10, Rgb([255, 255, 255])) });

        let reply = handle_json_body(&state, payload.to_string().as_bytes(), "test").await;

        assert_eq!(reply.status, 400);
        assert_eq!(error_text(&reply), MISSING_FIELDS_MESSAGE);
        assert!(reply.body.get("finalImage").is_none());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_object_bodies_are_input_errors() {
        let state = test_state(Arc::new(FakeModel::replying("{}")));
        let bodies: [&[u8]; 4] = [b"[1, 2]", b"null", b"\"text\"", b"{not json"];
        for raw in bodies {
            let reply = handle_json_body(&state, raw, "test").await;
            assert_eq!(reply.status, 400, "body {:?}", String::from_utf8_lossy(raw));
        }
        let reply = handle_json_body(
            &state,
            json!({ "interiorImage": 1, "artworkImage": 2 }).to_string().as_bytes(),
            "test",
        )
        .await;
        assert_eq!(error_text(&reply), MISSING_FIELDS_MESSAGE);
    }

    #[tokio::test]
    async fn undecodable_image_fails_fast() {
        let model = Arc::new(FakeModel::replying("{}"));
        let state = test_state(model.clone());
        let interior = png_base64(10, 10, Rgb([255, 255, 255]));

        let reply = handle_json_body(&state, &body(&interior, "%%%not-base64%%%"), "test").await;
        assert_eq!(reply.status, 400);
        assert!(error_text(&reply).starts_with("Ошибка декодирования"));

        let reply = handle_json_body(&state, &body(&interior, "aGVsbG8gd29ybGQ="), "test").await;
        assert_eq!(reply.status, 400);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_placement_drives_the_composite() {
        let model = Arc::new(FakeModel::replying(
            "```json\n{\"x\": 50, \"y\": 40, \"scale\": 1.0, \"rotation\": 0, \"wall_height\": 30}\n```",
        ));
        let state = test_state(model.clone());
        let interior = format!(
            "data:image/png;base64,{}",
            png_base64(120, 100, Rgb([255, 255, 255]))
        );
        let artwork = png_base64(20, 20, Rgb([255, 0, 0]));

        let reply = handle_json_body(&state, &body(&interior, &artwork), "test").await;

        assert_eq!(reply.status, 200, "{:?}", reply.body);
        assert!(reply.body.get("error").is_none());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        let final_image = reply.body["finalImage"].as_str().expect("finalImage");
        let out = base64_to_image(final_image).expect("png");
        assert_eq!(out.dimensions(), (120, 100));
        let centre = out.get_pixel(50, 40);
        assert_eq!([centre[0], centre[1], centre[2]], [255, 0, 0]);
        let corner = out.get_pixel(5, 5);
        assert_eq!([corner[0], corner[1], corner[2]], [255, 255, 255]);
    }

    #[tokio::test]
    async fn failing_model_still_produces_an_image() {
        let state = test_state(Arc::new(FakeModel::failing("quota exceeded")));
        let interior = png_base64(64, 48, Rgb([240, 240, 240]));
        let artwork = png_base64(16, 16, Rgb([0, 0, 255]));

        let reply = handle_json_body(&state, &body(&interior, &artwork), "test").await;

        assert_eq!(reply.status, 200);
        let out = base64_to_image(reply.body["finalImage"].as_str().expect("finalImage"))
            .expect("png");
        assert_eq!(out.dimensions(), (64, 48));
    }

    #[test]
    fn request_parsing_accepts_extra_fields() {
        let request = ProcessImageRequest::from_json_bytes(
            br#"{"interiorImage": "a", "artworkImage": "b", "note": 1}"#,
        )
        .expect("request");
        assert_eq!(request.interior_image, "a");
        assert_eq!(request.artwork_image, "b");
    }
}
