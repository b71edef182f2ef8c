//! The error class for the clipforge API and core

use aws_sdk_s3::error::SdkError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use std::fmt;
use tracing::{Level, event};
use utoipa::ToSchema;

// re-exported so the error macros expand from any crate
pub use axum::http::StatusCode;

/// Builds an error http response
#[derive(Debug, ToSchema, Serialize)]
pub struct ApiError {
    /// The status code to return
    #[serde(skip)]
    pub code: StatusCode,
    /// The error message to return
    pub msg: Option<String>,
}

impl ApiError {
    /// creates a new error object
    ///
    /// # Arguments
    ///
    /// * `code` - status of error response
    /// * `msg` - message to put in the response
    #[must_use]
    pub fn new(code: StatusCode, msg: Option<String>) -> ApiError {
        ApiError { code, msg }
    }

    /// Get this errors message or a generic placeholder
    #[must_use]
    pub fn msg(&self) -> String {
        match &self.msg {
            Some(msg) => msg.clone(),
            None => format!("code {}", self.code.as_u16()),
        }
    }
}

impl IntoResponse for ApiError {
    /// Allow Axum to build a response from error messages
    fn into_response(self) -> Response {
        // check if we have an error message or not
        match self.msg {
            // we have a message so build our error response
            Some(msg) => {
                // log this error msg
                event!(Level::ERROR, msg = &msg);
                // wrap our message in a json object
                let err_json = Json(serde_json::json!({ "error": msg }));
                (self.code, err_json).into_response()
            }
            // we do not have an error message so just return the code
            None => self.code.into_response(),
        }
    }
}

/// 400 bad request
#[macro_export]
macro_rules! bad {
    ($($msg:tt)+) => {Err($crate::utils::ApiError::new($crate::utils::StatusCode::BAD_REQUEST, Some($($msg)+)))}
}

/// 409 conflict
#[macro_export]
macro_rules! conflict {
    ($($msg:tt)+) => {Err($crate::utils::ApiError::new($crate::utils::StatusCode::CONFLICT, Some($($msg)+)))}
}

/// 404 not found
#[macro_export]
macro_rules! not_found {
    ($($msg:tt)+) => {Err($crate::utils::ApiError::new($crate::utils::StatusCode::NOT_FOUND, Some($($msg)+)))}
}

/// 500 internal server error
#[macro_export]
macro_rules! internal_err {
    () => {Err($crate::utils::ApiError::new($crate::utils::StatusCode::INTERNAL_SERVER_ERROR, None))};
    ($($msg:tt)+) => {Err($crate::utils::ApiError::new($crate::utils::StatusCode::INTERNAL_SERVER_ERROR, Some($($msg)+)))}
}

/// 503 service unavailable
#[macro_export]
macro_rules! unavailable {
    ($($msg:tt)+) => {Err($crate::utils::ApiError::new($crate::utils::StatusCode::SERVICE_UNAVAILABLE, Some($($msg)+)))}
}

/// 429 too many requests
#[macro_export]
macro_rules! too_many {
    ($($msg:tt)+) => {Err($crate::utils::ApiError::new($crate::utils::StatusCode::TOO_MANY_REQUESTS, Some($($msg)+)))}
}

/// 400 bad request without the Err wrap
#[macro_export]
macro_rules! bad_internal {
    ($($msg:tt)+) => {$crate::utils::ApiError::new($crate::utils::StatusCode::BAD_REQUEST, Some($($msg)+))}
}

impl fmt::Display for ApiError {
    /// Cast this error to either a string based on the message or the code
    ///
    /// # Arguments
    ///
    /// * `f` - The formatter that is being used
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{msg}"),
            // if we have a status code then return that and the reason if one exists
            None => write!(f, "code {} - {}", self.code.as_u16(), self.code),
        }
    }
}

impl From<uuid::Error> for ApiError {
    fn from(error: uuid::Error) -> Self {
        bad_internal!(format!("Failed cast to Uuid {:#?}", error))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        bad_internal!(format!("Failed cast JsonValue to String {:#?}", error))
    }
}

impl From<std::num::ParseIntError> for ApiError {
    fn from(error: std::num::ParseIntError) -> Self {
        bad_internal!(format!("Failed cast to int {:#?}", error))
    }
}

impl From<std::num::ParseFloatError> for ApiError {
    fn from(error: std::num::ParseFloatError) -> Self {
        bad_internal!(format!("Failed cast to float {:#?}", error))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        bad_internal!(format!("IO Error {:#?}", error))
    }
}

impl From<chrono::format::ParseError> for ApiError {
    fn from(error: chrono::format::ParseError) -> Self {
        bad_internal!(format!("Failed to parse timestamp {:#?}", error))
    }
}

impl From<url::ParseError> for ApiError {
    fn from(error: url::ParseError) -> Self {
        bad_internal!(format!("URL parse error {:#?}", error))
    }
}

impl From<std::num::TryFromIntError> for ApiError {
    fn from(error: std::num::TryFromIntError) -> Self {
        bad_internal!(format!("Int casting error {:#?}", error))
    }
}

impl From<redis::RedisError> for ApiError {
    fn from(error: redis::RedisError) -> Self {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            Some(format!("Redis error {:#?}", error)),
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(format!("Request error {:#?}", error)),
        )
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(error: tokio::task::JoinError) -> Self {
        bad_internal!(format!("Tokio task failed to join: {:#?}", error))
    }
}

impl From<std::net::AddrParseError> for ApiError {
    fn from(error: std::net::AddrParseError) -> Self {
        bad_internal!(format!("Error parsing IP address: {error}"))
    }
}

impl From<aws_sdk_s3::presigning::PresigningConfigError> for ApiError {
    fn from(error: aws_sdk_s3::presigning::PresigningConfigError) -> Self {
        bad_internal!(format!("Failed to build presigning config {:#?}", error))
    }
}

impl From<SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>> for ApiError {
    fn from(error: SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>) -> Self {
        bad_internal!(format!("Failed to check if an object exists {:#?}", error))
    }
}

impl From<aws_sdk_s3::operation::head_object::HeadObjectError> for ApiError {
    fn from(error: aws_sdk_s3::operation::head_object::HeadObjectError) -> Self {
        bad_internal!(format!("Failed to check if an object exists {:#?}", error))
    }
}

impl From<SdkError<aws_sdk_s3::operation::put_object::PutObjectError>> for ApiError {
    fn from(error: SdkError<aws_sdk_s3::operation::put_object::PutObjectError>) -> Self {
        bad_internal!(format!("Failed to upload object to s3 {:#?}", error))
    }
}

impl From<SdkError<aws_sdk_s3::operation::get_object::GetObjectError>> for ApiError {
    fn from(error: SdkError<aws_sdk_s3::operation::get_object::GetObjectError>) -> Self {
        bad_internal!(format!("Failed to get object from s3 {:#?}", error))
    }
}

impl From<SdkError<aws_sdk_s3::operation::delete_object::DeleteObjectError>> for ApiError {
    fn from(error: SdkError<aws_sdk_s3::operation::delete_object::DeleteObjectError>) -> Self {
        bad_internal!(format!("Failed to delete object from s3 {:#?}", error))
    }
}
