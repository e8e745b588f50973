mod database {
    pub mod actions;
    pub mod connect;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
    pub mod views;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod constants;

pub mod config;
pub mod media;
pub mod routes;

pub use authentication::*;
pub use constants::*;
pub use database::*;
