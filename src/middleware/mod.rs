/*
 * Responsibility
 * - Router-level middleware, applied in app.rs
 *   - auth: bearer token verification (+ verified-token cache)
 *   - http / cors / security_headers: transport concerns
 */
pub mod auth;
pub mod cors;
pub mod http;
pub mod security_headers;
