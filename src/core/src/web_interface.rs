// Web Interface module root
pub mod routes;
pub mod types;
pub mod web_server;


pub use routes::{handle_rejection, read_tryon_form, EXPECTED_HEADER, PRODUCED_HEADER};
pub use types::{HealthResponse, TryOnResponse};
pub use web_server::{routes, WebServer};
