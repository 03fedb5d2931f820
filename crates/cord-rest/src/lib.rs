//! # cord-rest
//!
//! The REST half of cord: one shared HTTPS client whose every request is
//! admitted by a rate-limit governor.
//!
//! - [`Route`] - endpoint routes and their rate-limit bucket keys
//! - [`RateLimiter`] - per-bucket admission, global lockout, 429 and 5xx
//!   retry policy
//! - [`Http`] - the typed endpoint surface used by the client facade
//!
//! Requests that share a bucket are serialized at the budget boundary and
//! kept in submission order for mutating methods; requests on distinct
//! buckets run in parallel.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bucket;
pub mod error;
pub mod governor;
pub mod http;
pub mod request;
pub mod routes;

pub use bucket::{Bucket, RateLimitHeaders};
pub use error::{RestError, RestResult};
pub use governor::{GlobalLockout, RateLimiter, RetryConfig};
pub use http::{
    validate_bulk_delete, BanMember, CreateChannel, CreateInvite, CreateMessage, EditChannel,
    EditMessage, EditRole, Http, HttpConfig, BULK_DELETE_MAX_AGE_DAYS,
};
pub use request::{Attachment, Request};
pub use routes::Route;
