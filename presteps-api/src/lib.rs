//! # presteps-api
//!
//! HTTP front end for presteps: PDF uploads in, structured documents out,
//! plus curation of an extracted document against annotations.

mod api;
pub use api::{
    app, app_with_settings, curate_document, extract_document, health_check, AppError,
    CurateRequest, CurateResponse, ErrorResponse, MAX_UPLOAD_BYTES,
};
