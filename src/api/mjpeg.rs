use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::body::Bytes;
use futures::Stream;
use opencv::core::Vector;
use opencv::imgcodecs;

use crate::analytics::InferenceScheduler;
use crate::camera::Frame;
use crate::config::StreamConfig;

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub fn encode_jpeg(frame: &Frame, quality: i32) -> opencv::Result<Vec<u8>> {
    let mat = frame.to_mat()?;
    let params = Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, quality]);
    let mut buf = Vector::<u8>::new();
    imgcodecs::imencode(".jpg", &mat, &mut buf, &params)?;
    Ok(buf.to_vec())
}

pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut payload = Vec::with_capacity(header.len() + jpeg.len() + 2);
    payload.extend_from_slice(header.as_bytes());
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// One viewer's live feed. Each viewer owns its own encoder; all of them
/// share the camera's scheduler, so adding viewers never adds inference.
pub struct StreamEncoder {
    scheduler: Arc<InferenceScheduler>,
    quality: i32,
    idle_delay: Duration,
    placeholder_delay: Duration,
}

impl StreamEncoder {
    pub fn new(scheduler: Arc<InferenceScheduler>, config: &StreamConfig) -> Self {
        Self {
            scheduler,
            quality: config.jpeg_quality,
            idle_delay: config.idle_delay(),
            placeholder_delay: config.placeholder_delay(),
        }
    }

    /// Unbounded sequence of multipart parts. Ends only when dropped.
    ///
    /// Every iteration sends whatever the scheduler currently serves; an
    /// unchanged frame is resent from its already encoded part.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        stream! {
            let mut last_part: Option<(Arc<Frame>, Bytes)> = None;

            loop {
                let served = self.scheduler.next_frame().await;
                let reused = last_part
                    .as_ref()
                    .filter(|(frame, _)| Arc::ptr_eq(frame, served.frame()))
                    .map(|(_, part)| part.clone());
                let changed = reused.is_none();

                let part = match reused {
                    Some(part) => Some(part),
                    None => {
                        let frame = Arc::clone(served.frame());
                        let quality = self.quality;
                        match tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await {
                            Ok(Ok(jpeg)) => Some(multipart_part(&jpeg)),
                            Ok(Err(e)) => {
                                tracing::warn!(
                                    camera = %self.scheduler.camera_id(),
                                    error = %e,
                                    "jpeg encode failed"
                                );
                                None
                            }
                            Err(e) => {
                                tracing::error!(
                                    camera = %self.scheduler.camera_id(),
                                    error = %e,
                                    "encode task failed"
                                );
                                None
                            }
                        }
                    }
                };

                if let Some(part) = part {
                    last_part = Some((Arc::clone(served.frame()), part.clone()));
                    yield Ok(part);
                }

                if served.is_placeholder() {
                    tokio::time::sleep(self.placeholder_delay).await;
                } else if !changed {
                    tokio::time::sleep(self.idle_delay).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
