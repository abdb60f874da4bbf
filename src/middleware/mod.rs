use actix_session::{Session, SessionExt};
use actix_web::{dev, FromRequest, HttpRequest};
use serde::Serialize;
use std::future::{ready, Ready};

use crate::models::{RequestMetadata, ROLE_ADMIN};

/// Session-backed identity of the logged-in user. Extraction fails with 401
/// when no session is established.
#[derive(Serialize, Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ROLE_ADMIN)
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let session = req.get_session();
        if let (Ok(Some(id)), Ok(Some(email)), Ok(Some(roles))) = (
            session.get("user_id"),
            session.get("user_email"),
            session.get("user_roles"),
        ) {
            ready(Ok(AuthenticatedUser { id, email, roles }))
        } else {
            ready(Err(actix_web::error::ErrorUnauthorized("Not logged in.")))
        }
    }
}

pub fn store_login(session: &Session, user: &crate::models::User) -> Result<(), actix_web::Error> {
    session.insert("user_id", user.id)?;
    session.insert("user_email", user.email.clone())?;
    session.insert("user_roles", user.effective_roles())?;
    Ok(())
}

/// Client address and agent for the audit trail. Behind a reverse proxy the
/// first X-Forwarded-For entry wins over the socket peer.
pub fn request_metadata(req: &HttpRequest) -> RequestMetadata {
    let ip_address = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()));

    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    RequestMetadata {
        ip_address,
        user_agent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn forwarded_header_beats_peer_address() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.9, 10.0.0.1"))
            .insert_header(("User-Agent", "test-agent"))
            .to_http_request();
        let metadata = request_metadata(&req);
        assert_eq!(metadata.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(metadata.user_agent.as_deref(), Some("test-agent"));
    }

    #[test]
    fn metadata_fields_are_optional() {
        let req = TestRequest::default().to_http_request();
        let metadata = request_metadata(&req);
        assert!(metadata.user_agent.is_none());
    }
}
