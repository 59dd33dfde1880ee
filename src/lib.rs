//! Library crate for mission-complete, exposing the session core to the server binary,
//! remote clients and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod identity;
pub mod routes;
pub mod services;
pub mod state;
