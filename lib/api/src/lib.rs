//! diplomarec-api: HTTP surface for the recommendation engine
//!
//! Routes:
//! - `POST /api/recommend` - ranked programs for a student profile
//! - `POST /api/validate` - vocabulary check of a profile
//! - `GET /api/retrain` - retrain if the data changed (`?background=true` to queue)
//! - `GET /healthz`, `GET /readyz`

pub mod rest;

pub use rest::{configure, RestApi};
