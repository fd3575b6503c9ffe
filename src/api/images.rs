use std::io::Cursor;
use std::sync::Arc;

use rocket::http::{ContentType, Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::State;

use crate::api::ApiError;
use crate::images::{CacheStatus, ImageOptimizer, ImageRequest, TargetSize, OUTPUT_EXTENSION};

const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

pub enum ImageReply {
    Image { data: Arc<[u8]>, cache: CacheStatus },
    Redirect(String),
}

impl<'r> Responder<'r, 'static> for ImageReply {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let (data, cache) = match self {
            ImageReply::Redirect(url) => {
                return Response::build()
                    .status(Status::Found)
                    .raw_header("Location", location_value(&url))
                    .ok();
            }
            ImageReply::Image { data, cache } => (data, cache),
        };

        let etag = format!("\"{:x}\"", md5::compute(&data));
        // Check If-None-Match header
        if req.headers().get_one("If-None-Match") == Some(etag.as_str()) {
            return Response::build()
                .status(Status::NotModified)
                .header(Header::new("ETag", etag))
                .header(Header::new("Cache-Control", CACHE_CONTROL))
                .ok();
        }

        Response::build()
            .header(ContentType::new("image", OUTPUT_EXTENSION))
            .header(Header::new("Cache-Control", CACHE_CONTROL))
            .header(Header::new("X-Image-Cache", cache.as_str()))
            .header(Header::new(
                "Content-Disposition",
                format!("inline; filename=\"optimized-image.{}\"", OUTPUT_EXTENSION),
            ))
            .header(Header::new("ETag", etag))
            .sized_body(data.len(), Cursor::new(data))
            .ok()
    }
}

#[get("/resize?<url>&<width>&<height>&<nocache>")]
pub async fn resize_image(
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    nocache: Option<&str>,
    optimizer: &State<ImageOptimizer>,
) -> Result<ImageReply, ApiError> {
    let url = match url {
        Some(url) if !url.is_empty() => url,
        _ => return Err(ApiError::MissingParameter("url")),
    };

    let request = ImageRequest {
        url,
        target: TargetSize::new(positive(width), positive(height)),
        bypass_cache: nocache == Some("true"),
    };

    match optimizer.optimize(&request).await {
        Ok(image) => Ok(ImageReply::Image {
            data: image.data,
            cache: image.cache,
        }),
        Err(fallback) => Ok(ImageReply::Redirect(fallback.url)),
    }
}

fn positive(value: Option<u32>) -> Option<u32> {
    value.filter(|v| *v > 0)
}

// Header values must be visible ASCII; escape everything else
fn location_value(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for byte in url.bytes() {
        if (0x21..=0x7E).contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_keeps_ordinary_urls() {
        let url = "https://example.com/a/photo.jpg?w=1&x=%20";
        assert_eq!(location_value(url), url);
    }

    #[test]
    fn location_escapes_control_and_non_ascii_bytes() {
        assert_eq!(
            location_value("https://example.com/a.ico\r\nX-Evil: 1"),
            "https://example.com/a.ico%0D%0AX-Evil:%201"
        );
        assert_eq!(location_value("https://example.com/caf\u{e9}.png"), "https://example.com/caf%C3%A9.png");
    }
}
