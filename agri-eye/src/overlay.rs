//! Heads-up display drawn over patrol frames

use crate::decision::Outcome;
use crate::error::VisionError;
use crate::record::DecisionRecord;
use opencv::{
    core::{self, Mat, Point, Ptr, Rect, Scalar},
    freetype::{self, FreeType2},
    imgproc,
    prelude::*,
};
use std::path::Path;
use tracing::{info, warn};

const TOP_BAR_HEIGHT: i32 = 60;
const BOTTOM_BAR_HEIGHT: i32 = 120;
const BAR_OPACITY: f64 = 0.6;

/// Colour in OpenCV channel order
pub type Bgr = (f64, f64, f64);

pub const WHITE: Bgr = (255.0, 255.0, 255.0);
pub const GREY: Bgr = (200.0, 200.0, 200.0);
pub const BLACK: Bgr = (0.0, 0.0, 0.0);
pub const RED: Bgr = (50.0, 50.0, 255.0);
pub const GREEN: Bgr = (50.0, 255.0, 50.0);
pub const YELLOW: Bgr = (0.0, 255.0, 255.0);

fn scalar(color: Bgr) -> Scalar {
    Scalar::new(color.0, color.1, color.2, 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextSize {
    Big,
    Standard,
    Small,
}

impl TextSize {
    fn pixels(self) -> i32 {
        match self {
            TextSize::Big => 40,
            TextSize::Standard => 24,
            TextSize::Small => 18,
        }
    }
}

/// Everything the HUD shows for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct HudPanel {
    pub frame_id: u64,
    pub state: String,
    /// Steady scanning state; drawn green instead of yellow
    pub scanning: bool,
    pub diagnosis: String,
    pub advice: String,
    pub command: String,
    pub latency_ms: f64,
    pub outcome: Option<Outcome>,
}

impl HudPanel {
    pub fn new(frame_id: u64, state: impl Into<String>, record: &DecisionRecord) -> Self {
        Self {
            frame_id,
            state: state.into(),
            scanning: false,
            diagnosis: record.diagnosis.clone(),
            advice: record.advice.clone(),
            command: record.command.clone(),
            latency_ms: record.latency_ms,
            outcome: record.outcome,
        }
    }
}

/// Colour for the diagnosis line
pub fn diagnosis_color(outcome: Option<Outcome>) -> Bgr {
    match outcome {
        Some(o) if o.requires_stop() => RED,
        Some(Outcome::Healthy) => GREEN,
        _ => WHITE,
    }
}

/// Colour for the command line
pub fn command_color(outcome: Option<Outcome>) -> Bgr {
    match outcome {
        Some(o) if o.requires_stop() => RED,
        Some(Outcome::Healthy) => GREEN,
        _ => YELLOW,
    }
}

/// Draws the panel layout. Falls back to OpenCV's Hershey font when the
/// TrueType font cannot be loaded; Hershey has no CJK glyphs.
pub struct HudRenderer {
    font: Option<Ptr<FreeType2>>,
}

impl HudRenderer {
    pub fn new(font_path: impl AsRef<Path>) -> Self {
        let font_path = font_path.as_ref();
        match load_font(font_path) {
            Ok(font) => {
                info!("HUD font loaded from {:?}", font_path);
                Self { font: Some(font) }
            }
            Err(e) => {
                warn!("HUD font {:?} unavailable ({}), using fallback font without CJK glyphs", font_path, e);
                Self { font: None }
            }
        }
    }

    pub fn with_fallback_font() -> Self {
        Self { font: None }
    }

    pub fn has_truetype_font(&self) -> bool {
        self.font.is_some()
    }

    /// Return a copy of `frame` with the HUD drawn on it
    pub fn render(&mut self, frame: &Mat, panel: &HudPanel) -> Result<Mat, VisionError> {
        if frame.empty() {
            return Err(VisionError::Processing("Cannot render HUD on an empty frame".to_string()));
        }

        let (w, h) = (frame.cols(), frame.rows());

        let mut overlay = frame.try_clone()?;
        imgproc::rectangle(
            &mut overlay,
            Rect::new(0, 0, w, TOP_BAR_HEIGHT.min(h)),
            scalar(BLACK),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::rectangle(
            &mut overlay,
            Rect::new(0, (h - BOTTOM_BAR_HEIGHT).max(0), w, BOTTOM_BAR_HEIGHT.min(h)),
            scalar(BLACK),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;

        let mut out = Mat::default();
        core::add_weighted(&overlay, BAR_OPACITY, frame, 1.0 - BAR_OPACITY, 0.0, &mut out, -1)?;

        let status_color = if panel.scanning { GREEN } else { YELLOW };
        self.draw_text(
            &mut out,
            &format!("系统状态: {}", panel.state),
            (20, 15),
            status_color,
            TextSize::Standard,
        )?;
        self.draw_text(
            &mut out,
            &format!("延迟: {:.0}ms | 帧: {}", panel.latency_ms, panel.frame_id),
            (w - 250, 20),
            GREY,
            TextSize::Small,
        )?;

        self.draw_text(
            &mut out,
            &format!("诊断结果: {}", panel.diagnosis),
            (20, h - 100),
            diagnosis_color(panel.outcome),
            TextSize::Big,
        )?;
        self.draw_text(
            &mut out,
            &format!("专家建议: {}", panel.advice),
            (20, h - 50),
            GREY,
            TextSize::Standard,
        )?;

        let text_w = panel.command.chars().count() as i32 * 20;
        self.draw_text(
            &mut out,
            &panel.command,
            (w - text_w - 150, h - 80),
            command_color(panel.outcome),
            TextSize::Big,
        )?;

        Ok(out)
    }

    /// Draw text with a 1px shadow; `top_left` is the top-left of the line
    fn draw_text(
        &mut self,
        img: &mut Mat,
        text: &str,
        top_left: (i32, i32),
        color: Bgr,
        size: TextSize,
    ) -> Result<(), VisionError> {
        let height = size.pixels();
        let origin = Point::new(top_left.0, top_left.1 + height);
        self.put_text(img, text, Point::new(origin.x + 1, origin.y + 1), height, BLACK)?;
        self.put_text(img, text, origin, height, color)
    }

    fn put_text(
        &mut self,
        img: &mut Mat,
        text: &str,
        origin: Point,
        height: i32,
        color: Bgr,
    ) -> Result<(), VisionError> {
        let color = scalar(color);
        match self.font.as_mut() {
            Some(font) => {
                font.put_text(img, text, origin, height, color, -1, imgproc::LINE_AA, false)?;
            }
            None => {
                imgproc::put_text(
                    img,
                    text,
                    origin,
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    height as f64 / 30.0,
                    color,
                    if height >= 30 { 2 } else { 1 },
                    imgproc::LINE_AA,
                    false,
                )?;
            }
        }
        Ok(())
    }
}

fn load_font(path: &Path) -> Result<Ptr<FreeType2>, VisionError> {
    if !path.is_file() {
        return Err(VisionError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("font file {:?} not found", path),
        )));
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| VisionError::Config(format!("Font path {:?} is not valid UTF-8", path)))?;

    let mut font = freetype::create_free_type_2()?;
    font.load_font_data(path_str, 0)?;
    Ok(font)
}
