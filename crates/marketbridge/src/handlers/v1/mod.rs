//! V1 admin API handlers.

mod routes;

pub use routes::{list_routes, remove_route, set_route};
