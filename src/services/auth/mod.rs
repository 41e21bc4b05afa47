pub mod factory;
pub mod google;
pub mod identity;
pub mod jwks;
pub mod service;
pub mod verifier;

pub use factory::build_auth_service;
pub use google::GoogleIdTokenVerifier;
pub use identity::VerifiedIdentity;
pub use jwks::JwksClient;
pub use service::{AuthService, IdentitySource};
pub use verifier::{TokenVerifier, VerifiedClaims, VerifyError};
