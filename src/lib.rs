/*
 * Responsibility
 * - crate の module 構成 (binary / integration test / jwt-gen から使う)
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
