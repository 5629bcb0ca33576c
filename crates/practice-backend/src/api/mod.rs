mod auth;
pub mod classify;
mod client;
mod error;
pub mod http;
mod request;

pub use auth::{AuthResponse, LoginRequest, RegisterRequest};
pub use client::ApiClient;
pub use error::ApiError;
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient, TransportError};
pub use request::ApiRequest;
