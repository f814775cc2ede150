pub mod http;

pub use http::{create_router, ApiServer, AppState};
