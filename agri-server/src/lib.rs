pub mod dashboard;
pub mod http;
pub mod static_files;
pub mod websocket;

pub use dashboard::{DashboardFrame, DashboardState};
pub use http::create_router;
