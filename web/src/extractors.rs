//! Conditional-request extractors.
//!
//! - [`IfMatch`]: the `If-Match` header of a `PATCH`
//! - [`IfNoneMatch`]: the `If-None-Match` header of a `GET`
//!
//! Both are optional: a missing header extracts as `None`. A header that is
//! not visible ASCII is rejected with 400.
//!
//! # Example
//!
//! ```ignore
//! async fn handler(IfNoneMatch(cached): IfNoneMatch) -> String {
//!     format!("client has {cached:?}")
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderName, header, request::Parts},
};

/// Entity tag the client expects to overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfMatch(pub Option<String>);

/// Entity tag the client already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfNoneMatch(pub Option<String>);

fn header_value(parts: &Parts, name: &HeaderName) -> Result<Option<String>, AppError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(|s| s.trim().to_string())
                .map_err(|_| AppError::bad_request(format!("{name} header is not valid ASCII")))
        })
        .transpose()
}

#[async_trait]
impl<S> FromRequestParts<S> for IfMatch
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, &header::IF_MATCH).map(Self)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for IfNoneMatch
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, &header::IF_NONE_MATCH).map(Self)
    }
}
