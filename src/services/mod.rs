/*
 * Responsibility
 * - HTTP に依存しない core (auth / endpoint registry / gateway trust / request log / outbound client)
 */
pub mod auth;
pub mod client;
pub mod endpoints;
pub mod gateway;
pub mod request_log;
