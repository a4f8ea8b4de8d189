//! Video file capture and output

use crate::error::VisionError;
use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A decoded frame with its 1-based position in the stream
pub struct Frame {
    pub index: u64,
    pub image: Mat,
}

/// Anything that yields frames to the patrol loop
pub trait FrameSource: Send {
    /// Next frame, or `None` once a non-looping source is exhausted
    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError>;

    /// Native frame rate, when the container reports one
    fn frame_rate(&self) -> Option<f64>;

    /// (width, height)
    fn frame_size(&self) -> Option<(i32, i32)>;
}

/// Frame source backed by a video file
pub struct VideoFileSource {
    path: PathBuf,
    capture: VideoCapture,
    looping: bool,
    fps: Option<f64>,
    size: (i32, i32),
    next_index: u64,
}

impl VideoFileSource {
    /// Open a video file. A looping source seeks back to the first frame
    /// when the file runs out and never reports exhaustion.
    pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, VisionError> {
        let path = path.as_ref().to_path_buf();
        let path_str = path
            .to_str()
            .ok_or_else(|| VisionError::Video(format!("Video path {:?} is not valid UTF-8", path)))?;

        let capture = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| VisionError::Video(format!("Failed to open {:?}: {}", path, e)))?;

        if !capture.is_opened()? {
            return Err(VisionError::Video(format!("Video {:?} could not be opened", path)));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Opened video {:?} at {}x{} @ {:.1}fps (looping: {})",
            path, width, height, fps, looping
        );

        Ok(Self {
            path,
            capture,
            looping,
            fps: (fps.is_finite() && fps > 0.0).then_some(fps),
            size: (width, height),
            next_index: 1,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw(&mut self) -> Result<Option<Mat>, VisionError> {
        let mut frame = Mat::default();
        if self.capture.read(&mut frame)? && !frame.empty() {
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        let image = match self.read_raw()? {
            Some(image) => image,
            None if self.looping => {
                debug!("Reached end of {:?}, rewinding", self.path);
                self.capture.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
                self.read_raw()?.ok_or_else(|| {
                    VisionError::Video(format!("Video {:?} contains no decodable frames", self.path))
                })?
            }
            None => return Ok(None),
        };

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame { index, image }))
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn frame_size(&self) -> Option<(i32, i32)> {
        Some(self.size)
    }
}

/// In-memory source cycling through a fixed set of frames
pub struct StillFrameSource {
    frames: Vec<Mat>,
    looping: bool,
    cursor: usize,
    next_index: u64,
    fps: Option<f64>,
}

impl StillFrameSource {
    pub fn new(frames: Vec<Mat>, looping: bool) -> Result<Self, VisionError> {
        if frames.is_empty() {
            return Err(VisionError::Video("Frame source needs at least one frame".to_string()));
        }

        Ok(Self {
            frames,
            looping,
            cursor: 0,
            next_index: 1,
            fps: None,
        })
    }

    /// Report `fps` as the native rate; non-positive or non-finite values
    /// leave the rate unknown
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.fps = (fps.is_finite() && fps > 0.0).then_some(fps);
        self
    }
}

impl FrameSource for StillFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        if self.cursor >= self.frames.len() {
            if !self.looping {
                return Ok(None);
            }
            self.cursor = 0;
        }

        let image = self.frames[self.cursor].try_clone()?;
        self.cursor += 1;

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame { index, image }))
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn frame_size(&self) -> Option<(i32, i32)> {
        self.frames.first().map(|mat| (mat.cols(), mat.rows()))
    }
}

/// Video file writer for annotated output
pub struct VideoSink {
    writer: VideoWriter,
    path: PathBuf,
    frames_written: u64,
}

impl VideoSink {
    pub fn create(
        path: impl AsRef<Path>,
        fourcc: [char; 4],
        fps: f64,
        size: (i32, i32),
    ) -> Result<Self, VisionError> {
        let path = path.as_ref().to_path_buf();
        let path_str = path
            .to_str()
            .ok_or_else(|| VisionError::Video(format!("Output path {:?} is not valid UTF-8", path)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let code = VideoWriter::fourcc(fourcc[0], fourcc[1], fourcc[2], fourcc[3])?;
        let writer = VideoWriter::new(path_str, code, fps, Size::new(size.0, size.1), true)?;

        if !writer.is_opened()? {
            return Err(VisionError::Video(format!("Cannot write video to {:?}", path)));
        }

        info!("Writing {}x{} @ {:.1}fps to {:?}", size.0, size.1, fps, path);
        Ok(Self {
            writer,
            path,
            frames_written: 0,
        })
    }

    pub fn write(&mut self, frame: &Mat) -> Result<(), VisionError> {
        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush and close the file, returning the number of frames written
    pub fn finish(mut self) -> Result<u64, VisionError> {
        self.writer.release()?;
        info!("Closed {:?} after {} frames", self.path, self.frames_written);
        Ok(self.frames_written)
    }
}
