use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use thiserror::Error;

use super::{CameraFeed, Frame};
use crate::config::{CaptureConfig, CaptureSource};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open {0}")]
    OpenFailed(String),
    #[error("device returned no frame")]
    NoFrame,
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub trait CaptureDevice: Send {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Opens (and reopens) the device behind one camera.
pub trait CaptureBackend: Send {
    fn open(&mut self) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

pub struct OpenCvBackend {
    source: CaptureSource,
    width: u32,
    height: u32,
}

impl OpenCvBackend {
    pub fn new(source: CaptureSource, config: &CaptureConfig) -> Self {
        Self {
            source,
            width: config.width,
            height: config.height,
        }
    }
}

impl CaptureBackend for OpenCvBackend {
    fn open(&mut self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let mut capture = match &self.source {
            CaptureSource::Index(index) => VideoCapture::new(*index, videoio::CAP_ANY)?,
            CaptureSource::Url(url) => VideoCapture::from_file(url, videoio::CAP_ANY)?,
        };
        if !capture.is_opened()? {
            return Err(CaptureError::OpenFailed(self.source.to_string()));
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, self.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, self.height as f64)?;
        let _ = capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0);

        tracing::info!(
            source = %self.source,
            width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32,
            height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32,
            "capture device opened"
        );

        Ok(Box::new(OpenCvDevice {
            capture,
            scratch: Mat::default(),
        }))
    }
}

struct OpenCvDevice {
    capture: VideoCapture,
    scratch: Mat,
}

impl CaptureDevice for OpenCvDevice {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.capture.read(&mut self.scratch)? || self.scratch.empty() {
            return Err(CaptureError::NoFrame);
        }
        Ok(Frame::from_mat(&self.scratch)?)
    }
}

impl Drop for OpenCvDevice {
    fn drop(&mut self) {
        let _ = self.capture.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    Frame,
    OpenFailed,
    ReadFailed,
}

/// Keeps a camera's latest-frame cell fresh. Read failures release the
/// device, wait out the reopen delay and try again, forever.
pub struct FrameSource<B> {
    feed: Arc<CameraFeed>,
    backend: B,
    device: Option<Box<dyn CaptureDevice>>,
    reopen_delay: Duration,
}

impl<B: CaptureBackend> FrameSource<B> {
    pub fn new(feed: Arc<CameraFeed>, backend: B, reopen_delay: Duration) -> Self {
        Self {
            feed,
            backend,
            device: None,
            reopen_delay,
        }
    }

    pub fn step(&mut self) -> CaptureStep {
        if self.device.is_none() {
            match self.backend.open() {
                Ok(device) => self.device = Some(device),
                Err(e) => {
                    let failures = self.feed.record_failure();
                    tracing::warn!(
                        camera = %self.feed.camera_id(),
                        error = %e,
                        failures,
                        "failed to open capture device"
                    );
                    thread::sleep(self.reopen_delay);
                    return CaptureStep::OpenFailed;
                }
            }
        }
        let Some(device) = self.device.as_mut() else {
            return CaptureStep::OpenFailed;
        };

        match device.read_frame() {
            Ok(frame) => {
                self.feed.publish(frame);
                CaptureStep::Frame
            }
            Err(e) => {
                let failures = self.feed.record_failure();
                tracing::warn!(
                    camera = %self.feed.camera_id(),
                    error = %e,
                    failures,
                    "frame read failed, reopening device"
                );
                self.device = None;
                thread::sleep(self.reopen_delay);
                CaptureStep::ReadFailed
            }
        }
    }

    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        tracing::info!(camera = %self.feed.camera_id(), "capture loop started");

        while !shutdown.load(Ordering::Relaxed) {
            self.step();
        }

        tracing::info!(camera = %self.feed.camera_id(), "capture loop stopped");
    }
}

pub fn spawn_capture<B: CaptureBackend + 'static>(
    feed: Arc<CameraFeed>,
    backend: B,
    reopen_delay: Duration,
    shutdown: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || FrameSource::new(feed, backend, reopen_delay).run(shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Script = Arc<Mutex<VecDeque<Result<Frame, ()>>>>;

    struct ScriptedDevice {
        script: Script,
    }

    impl CaptureDevice for ScriptedDevice {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(frame)) => Ok(frame),
                _ => Err(CaptureError::NoFrame),
            }
        }
    }

    struct ScriptedBackend {
        script: Script,
        opens: Arc<Mutex<u32>>,
        fail_opens: u32,
    }

    impl CaptureBackend for ScriptedBackend {
        fn open(&mut self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            let mut opens = self.opens.lock().unwrap();
            *opens += 1;
            if *opens <= self.fail_opens {
                return Err(CaptureError::OpenFailed("scripted".to_string()));
            }
            Ok(Box::new(ScriptedDevice {
                script: Arc::clone(&self.script),
            }))
        }
    }

    fn source(
        reads: Vec<Result<Frame, ()>>,
        fail_opens: u32,
    ) -> (FrameSource<ScriptedBackend>, Arc<CameraFeed>, Arc<Mutex<u32>>) {
        let feed = CameraFeed::new("0".to_string());
        let opens = Arc::new(Mutex::new(0));
        let backend = ScriptedBackend {
            script: Arc::new(Mutex::new(reads.into())),
            opens: Arc::clone(&opens),
            fail_opens,
        };
        (
            FrameSource::new(Arc::clone(&feed), backend, Duration::ZERO),
            feed,
            opens,
        )
    }

    #[test]
    fn successful_read_publishes_frame() {
        let (mut src, feed, opens) = source(vec![Ok(Frame::filled(4, 4, [7, 7, 7]))], 0);

        assert_eq!(src.step(), CaptureStep::Frame);
        assert_eq!(feed.snapshot().unwrap().frame.data()[0], 7);
        assert_eq!(*opens.lock().unwrap(), 1);
    }

    #[test]
    fn read_failure_reopens_and_counts() {
        let (mut src, feed, opens) = source(
            vec![
                Err(()),
                Err(()),
                Ok(Frame::filled(2, 2, [1, 1, 1])),
            ],
            0,
        );

        assert_eq!(src.step(), CaptureStep::ReadFailed);
        assert_eq!(feed.failure_count(), 1);
        assert_eq!(src.step(), CaptureStep::ReadFailed);
        assert_eq!(feed.failure_count(), 2);
        assert!(feed.snapshot().is_none());

        assert_eq!(src.step(), CaptureStep::Frame);
        assert_eq!(feed.failure_count(), 0);
        assert_eq!(*opens.lock().unwrap(), 3);
    }

    #[test]
    fn open_failure_is_retried() {
        let (mut src, feed, opens) = source(vec![Ok(Frame::filled(2, 2, [3, 3, 3]))], 2);

        assert_eq!(src.step(), CaptureStep::OpenFailed);
        assert_eq!(src.step(), CaptureStep::OpenFailed);
        assert_eq!(feed.failure_count(), 2);
        assert_eq!(src.step(), CaptureStep::Frame);
        assert_eq!(*opens.lock().unwrap(), 3);
    }

    #[test]
    fn run_stops_on_shutdown() {
        let (src, _feed, _opens) = source(Vec::new(), 0);
        let shutdown = Arc::new(AtomicBool::new(true));
        src.run(shutdown);
    }
}
