mod capture;
mod feed;
mod frame;

pub use capture::{spawn_capture, OpenCvBackend};
pub use feed::{CameraFeed, LatestFrame};
pub use frame::Frame;
