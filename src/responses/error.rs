use poem_openapi::Object;

#[derive(Debug, Object, Clone, Eq, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
}

impl From<&str> for ErrorResponse {
    fn from(s: &str) -> Self {
        Self {
            message: s.to_string(),
        }
    }
}

impl From<String> for ErrorResponse {
    fn from(message: String) -> Self {
        Self { message }
    }
}
