use rocket::http::{ContentType, Status};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    MissingParameter(&'static str),
}

impl<'r> rocket::response::Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        match self {
            ApiError::MissingParameter(name) => {
                let body = json!({
                    "error": format!("Missing required parameter: {}", name)
                })
                .to_string();

                rocket::Response::build()
                    .status(Status::BadRequest)
                    .header(ContentType::JSON)
                    .sized_body(body.len(), std::io::Cursor::new(body))
                    .ok()
            }
        }
    }
}
