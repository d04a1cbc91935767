use argon2::Error as ArgonError;
use serde_json::{json, Map, Value};
use std::io::Error as StdIoError;
use tracing::{event, instrument, Level};
use warp::{
    filters::{body::BodyDeserializeError, cors::CorsForbidden},
    http::StatusCode,
    reject::{
        InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, Reject,
        UnsupportedMediaType,
    },
    Rejection, Reply,
};

#[derive(Debug)]
pub enum Error {
    ParseError(std::num::ParseIntError),
    Validation { field: &'static str, message: String },
    NotFound(&'static str),
    PageNotFound,
    DatabaseQueryError(sqlx::Error),
    ArgonLibraryError(ArgonError),
    WrongPassword,
    CannotDecryptToken,
    Unauthorized,
    Forbidden,
    InvalidImage,
    StdFileError(StdIoError),
    Configuration(String),
    Document(String),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Error::ParseError(ref err) => write!(f, "Cannot parse parameter: {}", err),
            Error::Validation {
                ref field,
                ref message,
            } => write!(f, "{}: {}", field, message),
            Error::NotFound(what) => write!(f, "{} not found", what),
            Error::PageNotFound => write!(f, "Invalid page."),
            Error::DatabaseQueryError(ref e) => {
                write!(f, "Query could not be executed: {}", e)
            }
            Error::ArgonLibraryError(ref e) => write!(f, "Cannot verify password: {}", e),
            Error::WrongPassword => {
                write!(f, "Unable to log in with provided credentials.")
            }
            Error::CannotDecryptToken => write!(f, "Invalid token."),
            Error::Unauthorized => {
                write!(f, "Authentication credentials were not provided.")
            }
            Error::Forbidden => {
                write!(f, "You do not have permission to perform this action.")
            }
            Error::InvalidImage => write!(f, "Invalid base64 image data."),
            Error::StdFileError(ref err) => write!(f, "File error: {}", err),
            Error::Configuration(ref msg) => write!(f, "Configuration error: {}", msg),
            Error::Document(ref msg) => write!(f, "Cannot render document: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Reject for Error {}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::DatabaseQueryError(e)
    }
}

const DUPLICATE_KEY: &str = "23505";

fn reply(body: Value, status: StatusCode) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn detail(message: impl ToString, status: StatusCode) -> warp::reply::Response {
    reply(json!({ "detail": message.to_string() }), status)
}

fn error_response(error: &Error) -> warp::reply::Response {
    match error {
        Error::ParseError(_) => detail(error, StatusCode::BAD_REQUEST),
        Error::Validation { field, message } => {
            let mut body = Map::new();
            body.insert(field.to_string(), json!([message]));
            reply(Value::Object(body), StatusCode::BAD_REQUEST)
        }
        Error::NotFound(_) | Error::PageNotFound => detail(error, StatusCode::NOT_FOUND),
        Error::WrongPassword => reply(
            json!({ "non_field_errors": [error.to_string()] }),
            StatusCode::BAD_REQUEST,
        ),
        Error::CannotDecryptToken | Error::Unauthorized => {
            detail(error, StatusCode::UNAUTHORIZED)
        }
        Error::Forbidden => detail(error, StatusCode::FORBIDDEN),
        Error::InvalidImage => reply(
            json!({ "image": [error.to_string()] }),
            StatusCode::BAD_REQUEST,
        ),
        Error::DatabaseQueryError(e) => match e {
            sqlx::Error::Database(err)
                if err.code().as_deref() == Some(DUPLICATE_KEY) =>
            {
                detail("Object already exists.", StatusCode::BAD_REQUEST)
            }
            sqlx::Error::RowNotFound => detail("Not found.", StatusCode::NOT_FOUND),
            _ => detail("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR),
        },
        Error::ArgonLibraryError(_)
        | Error::StdFileError(_)
        | Error::Configuration(_)
        | Error::Document(_) => {
            detail("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[instrument]
pub async fn return_error(r: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(error) = r.find::<Error>() {
        let response = error_response(error);
        if response.status().is_server_error() {
            event!(Level::ERROR, "{}", error);
        } else {
            event!(Level::WARN, "{}", error);
        }
        Ok(response)
    } else if let Some(error) = r.find::<CorsForbidden>() {
        event!(Level::ERROR, "{}", error);
        Ok(detail(error, StatusCode::FORBIDDEN))
    } else if let Some(error) = r.find::<BodyDeserializeError>() {
        event!(Level::WARN, "{}", error);
        Ok(detail(error, StatusCode::BAD_REQUEST))
    } else if let Some(error) = r.find::<InvalidQuery>() {
        event!(Level::WARN, "{}", error);
        Ok(detail(error, StatusCode::BAD_REQUEST))
    } else if let Some(error) = r.find::<PayloadTooLarge>() {
        Ok(detail(error, StatusCode::PAYLOAD_TOO_LARGE))
    } else if let Some(error) = r.find::<LengthRequired>() {
        Ok(detail(error, StatusCode::LENGTH_REQUIRED))
    } else if let Some(error) = r.find::<UnsupportedMediaType>() {
        Ok(detail(error, StatusCode::UNSUPPORTED_MEDIA_TYPE))
    } else if r.is_not_found() {
        Ok(detail("Not found.", StatusCode::NOT_FOUND))
    } else if let Some(error) = r.find::<MethodNotAllowed>() {
        Ok(detail(error, StatusCode::METHOD_NOT_ALLOWED))
    } else {
        event!(Level::ERROR, "unhandled rejection: {:?}", r);
        Ok(detail("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn status_of(error: Error) -> StatusCode {
        return_error(warp::reject::custom(error))
            .await
            .expect("recover never fails")
            .into_response()
            .status()
    }

    #[tokio::test]
    async fn maps_errors_to_status_codes() {
        assert_eq!(status_of(Error::Unauthorized).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(Error::CannotDecryptToken).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(Error::Forbidden).await, StatusCode::FORBIDDEN);
        assert_eq!(status_of(Error::NotFound("Recipe")).await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::PageNotFound).await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::WrongPassword).await, StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(Error::validation("tags", "This field may not be empty.")).await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::DatabaseQueryError(sqlx::Error::RowNotFound)).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::DatabaseQueryError(sqlx::Error::PoolTimedOut)).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(Error::Document("cannot load embedded font".into())).await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_body_is_keyed_by_field() {
        let response = error_response(&Error::validation("cooking_time", "Too long"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_rejection_is_not_found() {
        let response = return_error(warp::reject::not_found())
            .await
            .expect("recover never fails")
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
