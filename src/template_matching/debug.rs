//! Optional debug artifacts: frames with matched regions outlined

use super::types::MatchResult;
use crate::error::VisionResult;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

const OUTLINE: Rgb<u8> = Rgb([255, 0, 255]);

/// Copy of `frame` with every match outlined (2px).
pub fn annotate_matches(frame: &RgbImage, matches: &[MatchResult]) -> RgbImage {
    let mut annotated = frame.clone();
    for m in matches {
        let (x, y) = m.top_left;
        let (w, h) = m.template_size;
        draw_hollow_rect_mut(&mut annotated, Rect::at(x as i32, y as i32).of_size(w, h), OUTLINE);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(x as i32 + 1, y as i32 + 1).of_size(w - 2, h - 2),
                OUTLINE,
            );
        }
    }
    annotated
}

/// Destination for annotated frames. Never required for matching itself.
pub trait DebugSink {
    fn record(&mut self, tag: &str, frame: &RgbImage, matches: &[MatchResult]) -> VisionResult<()>;
}

/// Writes `<tag>-<timestamp>.png` files into a directory.
pub struct DirectoryDebugSink {
    directory: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectoryDebugSink {
    pub fn new(directory: impl AsRef<Path>) -> VisionResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            written: Vec::new(),
        })
    }

    /// Files written so far, oldest first.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl DebugSink for DirectoryDebugSink {
    fn record(&mut self, tag: &str, frame: &RgbImage, matches: &[MatchResult]) -> VisionResult<()> {
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f");
        let path = self
            .directory
            .join(format!("{tag}-{stamp}-{}.png", self.written.len()));
        annotate_matches(frame, matches).save(&path)?;
        log::debug!("🖼️ Debug frame written to {:?}", path);
        self.written.push(path);
        Ok(())
    }
}
