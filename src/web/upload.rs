use crate::error::ApiError;
use crate::storage::{parse_data_uri, ImageStore};
use crate::user::Client;
use crate::web::parse_body;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct UploadForm {
    pub image: Option<String>,
    pub filename: Option<String>,
}

pub async fn put_image(
    req: HttpRequest,
    store: web::Data<Arc<dyn ImageStore>>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let client = Client::resolve(&req).await?;
    let user = client.require()?;

    let form: UploadForm = parse_body(&body)?;
    let image = form
        .image
        .ok_or_else(|| ApiError::Validation("no image provided".to_owned()))?;
    let payload = parse_data_uri(&image)?;
    let filename = form.filename.unwrap_or_else(|| "image.jpg".to_owned());

    log::info!(
        "user {} uploading {} ({} bytes decoded)",
        user.id,
        filename,
        payload.bytes.len()
    );

    let image_url = store.store(payload.bytes, &filename).await?;

    Ok(HttpResponse::Ok().json(json!({
        "image_url": image_url,
        "message": "image uploaded",
    })))
}
