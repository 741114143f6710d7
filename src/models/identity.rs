use serde::Deserialize;

/// Verified owner identity attached to a request by the auth middleware.
/// The id is opaque to this service; it is used only as a namespace key.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

/// Bearer token claims issued by the external identity provider
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}
