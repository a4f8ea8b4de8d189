//! Offline simulation against real video files

use agri_eye::decision::COMMAND_CRUISE;
use agri_eye::error::VisionError;
use agri_eye::models::Sampling;
use agri_eye::simulation::STATE_SCANNING;
use agri_eye::utils::solid_mat;
use agri_eye::{FrameSource, HudRenderer, InferenceClient, Outcome, Simulation, VideoFileSource, VideoSink, VisionBackend};
use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;

const MJPEG: [char; 4] = ['M', 'J', 'P', 'G'];
const SIZE: (i32, i32) = (96, 96);
const FPS: f64 = 10.0;

struct CountingHealthy {
    calls: AtomicUsize,
}

#[async_trait]
impl VisionBackend for CountingHealthy {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn load(&self) -> Result<(), VisionError> {
        Ok(())
    }

    async fn chat(&self, _image: &RgbImage, _prompt: &str, _sampling: &Sampling) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("Healthy".to_string())
    }
}

fn write_clip(path: &Path, frames: usize) {
    let mut sink = VideoSink::create(path, MJPEG, FPS, SIZE).unwrap();
    for i in 0..frames {
        let shade = (i * 20 % 256) as f64;
        sink.write(&solid_mat(SIZE.0, SIZE.1, (shade, 160.0, 60.0)).unwrap()).unwrap();
    }
    assert_eq!(sink.finish().unwrap(), frames as u64);
}

fn count_frames(source: &mut dyn FrameSource) -> u64 {
    let mut count = 0;
    while source.next_frame().unwrap().is_some() {
        count += 1;
    }
    count
}

#[test]
fn test_simulation_writes_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("field.avi");
    let output = dir.path().join("out").join("annotated.avi");
    write_clip(&input, 12);

    let runtime = Runtime::new().unwrap();
    let backend = Arc::new(CountingHealthy {
        calls: AtomicUsize::new(0),
    });
    let client = Arc::new(InferenceClient::new(backend.clone()));
    runtime.block_on(client.load()).unwrap();

    let source = VideoFileSource::open(&input, false).unwrap();
    let sink = VideoSink::create(&output, MJPEG, FPS, SIZE).unwrap();
    let simulation = Simulation::new(Box::new(source), sink, HudRenderer::with_fallback_font(), client, 5);

    let report = simulation.run(runtime.handle()).unwrap();
    assert_eq!(report.frames, 12);
    assert_eq!(report.inferences, 2);
    assert_eq!(report.think_frames, vec![5, 10]);
    assert_eq!(report.last_outcome, Some(Outcome::Healthy));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

    let panel = report.final_panel.expect("last frame has a panel");
    assert_eq!(panel.frame_id, 12);
    assert_eq!(panel.state, STATE_SCANNING);
    assert!(panel.scanning);
    assert_eq!(panel.diagnosis, "健康 (Healthy)");
    assert_eq!(panel.command, format!("[指令] {}", COMMAND_CRUISE));

    let mut written = VideoFileSource::open(&output, false).unwrap();
    assert_eq!(written.frame_size(), Some(SIZE));
    let fps = written.frame_rate().expect("AVI reports its frame rate");
    assert!((fps - FPS).abs() < 0.5, "fps {fps}");
    assert_eq!(count_frames(&mut written), 12);
}

#[test]
fn test_looping_source_rewinds_past_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("short.avi");
    write_clip(&input, 12);

    let mut once = VideoFileSource::open(&input, false).unwrap();
    assert_eq!(count_frames(&mut once), 12);

    let mut looping = VideoFileSource::open(&input, true).unwrap();
    let mut last = 0;
    for _ in 0..15 {
        last = looping.next_frame().unwrap().expect("looping source never ends").index;
    }
    assert_eq!(last, 15);
}

#[test]
fn test_simulation_requires_loaded_model() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("field.avi");
    write_clip(&input, 3);

    let runtime = Runtime::new().unwrap();
    let client = Arc::new(InferenceClient::new(Arc::new(CountingHealthy {
        calls: AtomicUsize::new(0),
    })));

    let source = VideoFileSource::open(&input, false).unwrap();
    let sink = VideoSink::create(dir.path().join("out.avi"), MJPEG, FPS, SIZE).unwrap();
    let simulation = Simulation::new(Box::new(source), sink, HudRenderer::with_fallback_font(), client, 5);

    assert!(matches!(simulation.run(runtime.handle()), Err(VisionError::Model(_))));
}
