//! HTTP protocol layer module
//!
//! Request/response contexts and request body decoding, decoupled from the
//! transport that feeds them.

pub mod body;
pub mod multipart;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use body::{decode, Body, FormData};
pub use multipart::{MultipartForm, MultipartValue, UploadedFile};
pub use request::{Query, Request};
pub use response::{build_413_response, build_error_response, Response};
