mod mjpeg;
mod notification;
mod server;

pub use server::{start_server, AppState};
