/// Template matching implementation
///
/// ZNCC scoring with an optional coarse-to-fine pyramid search
use super::kernel::{LumaPlane, PreparedTemplate, SearchPlane};
use super::region::SearchRegion;
use super::types::{MatchResult, SearchStrategy, Template};
use crate::error::{VisionError, VisionResult};
use image::RgbImage;
use std::cell::OnceCell;
use std::time::Instant;

/// Half-width of the refinement window when stepping down one pyramid level.
const REFINE_RADIUS: u32 = 2;

/// No offset can beat a refined candidate scoring this high.
const PERFECT_SCORE: f32 = 1.0 - 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x: u32,
    y: u32,
    score: f32,
}

/// Inclusive range of top-left offsets at which a template fits the search area.
#[derive(Debug, Clone, Copy)]
struct OffsetRange {
    x_min: u32,
    x_max: u32,
    y_min: u32,
    y_max: u32,
}

impl OffsetRange {
    fn new(area: SearchRegion, template_width: u32, template_height: u32) -> Option<Self> {
        if area.width < template_width || area.height < template_height {
            return None;
        }
        Some(Self {
            x_min: area.x,
            x_max: area.x + area.width - template_width,
            y_min: area.y,
            y_max: area.y + area.height - template_height,
        })
    }

    /// Range for pyramid `level`, where the plane has been halved `level` times.
    fn at_level(area: SearchRegion, level: u32, plane: &LumaPlane, template: &PreparedTemplate) -> Option<Self> {
        let x0 = (area.x >> level).min(plane.width);
        let y0 = (area.y >> level).min(plane.height);
        let x1 = ((area.x + area.width) >> level).min(plane.width);
        let y1 = ((area.y + area.height) >> level).min(plane.height);
        let scaled = SearchRegion::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0));
        Self::new(scaled, template.width, template.height)
    }

    fn window(&self, cx: u32, cy: u32, radius: u32) -> Option<Self> {
        let window = Self {
            x_min: cx.saturating_sub(radius).max(self.x_min),
            x_max: cx.saturating_add(radius).min(self.x_max),
            y_min: cy.saturating_sub(radius).max(self.y_min),
            y_max: cy.saturating_add(radius).min(self.y_max),
        };
        (window.x_min <= window.x_max && window.y_min <= window.y_max).then_some(window)
    }

    fn columns(&self) -> usize {
        (self.x_max - self.x_min + 1) as usize
    }
}

/// Luma planes of the frame, level 0 at full resolution.
struct FramePyramid {
    levels: Vec<SearchPlane>,
    full_scan: OnceCell<SearchPlane>,
}

impl FramePyramid {
    /// Integral images are built for every coarse level; the full resolution
    /// level only gets one when it will be scanned exhaustively.
    fn build(frame: &RgbImage, depth: usize, scan_base: bool) -> Self {
        let base = LumaPlane::from_rgb(frame);
        let base = if scan_base {
            SearchPlane::new(base)
        } else {
            SearchPlane::without_integral(base)
        };
        let mut levels = vec![base];
        for _ in 0..depth {
            let next = levels[levels.len() - 1].plane.downsample();
            if next.width == 0 || next.height == 0 {
                break;
            }
            levels.push(SearchPlane::new(next));
        }
        Self {
            levels,
            full_scan: OnceCell::new(),
        }
    }

    /// Level 0 with an integral image, built on first use.
    fn scan_plane(&self) -> &SearchPlane {
        let base = &self.levels[0];
        if base.integral.is_some() {
            return base;
        }
        self.full_scan.get_or_init(|| SearchPlane::new(base.plane.clone()))
    }
}

/// Template matcher for locating labelled UI elements in frames.
///
/// Every call is a pure function of its inputs; nothing is cached between calls.
#[derive(Debug, Clone, Default)]
pub struct TemplateMatcher {
    strategy: SearchStrategy,
    region: Option<SearchRegion>,
}

impl TemplateMatcher {
    pub fn new(strategy: SearchStrategy) -> Self {
        Self {
            strategy,
            region: None,
        }
    }

    /// Restrict matches to templates lying entirely inside `region`.
    pub fn with_region(mut self, region: SearchRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Best match across all `templates`, or `None` when nothing clears its threshold.
    ///
    /// A template's own threshold overrides `threshold`. Ties between
    /// templates go to the earlier one.
    pub fn match_best(
        &self,
        frame: &RgbImage,
        templates: &[Template],
        threshold: f32,
    ) -> VisionResult<Option<MatchResult>> {
        if templates.is_empty() {
            return Err(VisionError::Config("no templates supplied to match_best".to_string()));
        }
        let start_time = Instant::now();
        let prepared = templates
            .iter()
            .map(|t| self.prepare(frame, t))
            .collect::<VisionResult<Vec<_>>>()?;
        let depth = prepared.iter().map(|p| p.len() - 1).max().unwrap_or(0);
        let scan_base = prepared.iter().any(|p| p.len() == 1);
        let pyramid = FramePyramid::build(frame, depth, scan_base);
        let area = self.search_area(frame);

        let mut best: Option<MatchResult> = None;
        for (template, levels) in templates.iter().zip(&prepared) {
            let required = template.effective_threshold(threshold);
            let Some(candidate) = self.best_candidate(&pyramid, levels, area, required) else {
                log::debug!("🔍 {}: no candidate in the search area", template.display_name());
                continue;
            };
            log::debug!(
                "🔍 {}: best ({},{}) score={:.3} (threshold {:.3})",
                template.display_name(),
                candidate.x,
                candidate.y,
                candidate.score,
                required
            );
            if candidate.score < required {
                continue;
            }
            if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                best = Some(MatchResult::new(template, candidate.x, candidate.y, candidate.score));
            }
        }

        log::debug!(
            "⏱️ match_best over {} template(s) took {}ms",
            templates.len(),
            start_time.elapsed().as_millis()
        );
        Ok(best)
    }

    /// All non-overlapping matches of `template` scoring at least `threshold`
    /// (or the template's override), best first.
    ///
    /// Candidates are accepted greedily in score order; one is dropped when it
    /// lies closer than `min_separation` on both axes to an accepted match.
    pub fn match_all(
        &self,
        frame: &RgbImage,
        template: &Template,
        threshold: f32,
        min_separation: u32,
    ) -> VisionResult<Vec<MatchResult>> {
        let start_time = Instant::now();
        let mut levels = self.prepare(frame, template)?;
        if !self.strategy.is_approximate() {
            levels.truncate(1);
        }
        let pyramid = FramePyramid::build(frame, levels.len() - 1, levels.len() == 1);
        let area = self.search_area(frame);
        let required = template.effective_threshold(threshold);

        let mut candidates = self.threshold_candidates(&pyramid, &levels, area, required);
        sort_best_first(&mut candidates);
        let accepted = suppress_nearby(candidates, min_separation);

        log::debug!(
            "🔍 {}: {} match(es) >= {:.3} in {}ms",
            template.display_name(),
            accepted.len(),
            required,
            start_time.elapsed().as_millis()
        );
        Ok(accepted
            .into_iter()
            .map(|c| MatchResult::new(template, c.x, c.y, c.score))
            .collect())
    }

    fn search_area(&self, frame: &RgbImage) -> SearchRegion {
        match self.region {
            Some(region) => region.clip_to_screen(frame.width(), frame.height()),
            None => SearchRegion::full_screen(frame.width(), frame.height()),
        }
    }

    /// Validate `template` against `frame` and build its correlation pyramid.
    fn prepare(&self, frame: &RgbImage, template: &Template) -> VisionResult<Vec<PreparedTemplate>> {
        if frame.width() < template.width() || frame.height() < template.height() {
            return Err(VisionError::FrameTooSmall {
                label: template.label.clone(),
                frame_width: frame.width(),
                frame_height: frame.height(),
                template_width: template.width(),
                template_height: template.height(),
            });
        }
        let base_plane = LumaPlane::from_rgb(&template.image);
        let base = PreparedTemplate::new(&base_plane).ok_or_else(|| VisionError::FlatTemplate {
            label: template.label.clone(),
        })?;
        let mut levels = vec![base];

        if let SearchStrategy::Pyramid {
            max_levels,
            min_template_side,
            ..
        } = self.strategy
        {
            let mut plane = base_plane;
            while levels.len() <= max_levels as usize {
                let next = plane.downsample();
                if next.width.min(next.height) < min_template_side {
                    break;
                }
                match PreparedTemplate::new(&next) {
                    Some(prepared) => levels.push(prepared),
                    None => break,
                }
                plane = next;
            }
        }
        Ok(levels)
    }

    /// Deepest level at which the template still fits the frame pyramid.
    fn usable_depth(
        pyramid: &FramePyramid,
        levels: &[PreparedTemplate],
        area: SearchRegion,
    ) -> Option<(usize, Vec<OffsetRange>)> {
        let mut ranges = Vec::new();
        for (level, template) in levels.iter().enumerate() {
            let Some(plane) = pyramid.levels.get(level) else {
                break;
            };
            match OffsetRange::at_level(area, level as u32, &plane.plane, template) {
                Some(range) => ranges.push(range),
                None => break,
            }
        }
        (!ranges.is_empty()).then(|| (ranges.len() - 1, ranges))
    }

    fn best_candidate(
        &self,
        pyramid: &FramePyramid,
        levels: &[PreparedTemplate],
        area: SearchRegion,
        threshold: f32,
    ) -> Option<Candidate> {
        let (depth, ranges) = Self::usable_depth(pyramid, levels, area)?;
        let SearchStrategy::Pyramid {
            max_candidates,
            coarse_slack,
            exact,
            ..
        } = self.strategy
        else {
            return scan_best(pyramid.scan_plane(), &levels[0], ranges[0]);
        };
        if depth == 0 {
            return scan_best(pyramid.scan_plane(), &levels[0], ranges[0]);
        }

        let mut coarse: Vec<Candidate> =
            local_maxima(&pyramid.levels[depth], &levels[depth], ranges[depth])
                .into_iter()
                .filter(|c| c.score >= threshold - coarse_slack)
                .collect();
        sort_best_first(&mut coarse);
        if !exact {
            coarse.truncate(max_candidates.max(1));
        }

        let mut refined = refine_all(coarse, pyramid, levels, &ranges, depth);
        sort_best_first(&mut refined);
        let best = refined.into_iter().next();
        if !exact || best.is_some_and(|b| b.score >= PERFECT_SCORE) {
            return best;
        }
        log::debug!("🔍 No perfect coarse-to-fine match, scanning full resolution");
        scan_best(pyramid.scan_plane(), &levels[0], ranges[0])
    }

    /// Offsets scoring at least `threshold`. Exact strategies reach here with a
    /// single level and scan every cell.
    fn threshold_candidates(
        &self,
        pyramid: &FramePyramid,
        levels: &[PreparedTemplate],
        area: SearchRegion,
        threshold: f32,
    ) -> Vec<Candidate> {
        let Some((depth, ranges)) = Self::usable_depth(pyramid, levels, area) else {
            return Vec::new();
        };
        let SearchStrategy::Pyramid {
            max_candidates,
            coarse_slack,
            ..
        } = self.strategy
        else {
            return scan_above(pyramid.scan_plane(), &levels[0], ranges[0], threshold);
        };
        if depth == 0 {
            return scan_above(pyramid.scan_plane(), &levels[0], ranges[0], threshold);
        }

        let mut coarse: Vec<Candidate> =
            local_maxima(&pyramid.levels[depth], &levels[depth], ranges[depth])
                .into_iter()
                .filter(|c| c.score >= threshold - coarse_slack)
                .collect();
        sort_best_first(&mut coarse);
        if coarse.len() > max_candidates {
            log::warn!(
                "⚠️ {} coarse candidates, refining only the best {}",
                coarse.len(),
                max_candidates
            );
            coarse.truncate(max_candidates);
        }

        refine_all(coarse, pyramid, levels, &ranges, depth)
            .into_iter()
            .filter(|c| c.score >= threshold)
            .collect()
    }
}

/// Best-scoring offset in `range`; the first offset in row-major order wins ties.
fn scan_best(frame: &SearchPlane, template: &PreparedTemplate, range: OffsetRange) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for y in range.y_min..=range.y_max {
        for x in range.x_min..=range.x_max {
            let score = template.score_at(frame, x, y);
            if best.is_none_or(|b| score > b.score) {
                best = Some(Candidate { x, y, score });
            }
        }
    }
    best
}

/// Every offset in `range` scoring at least `threshold`, in row-major order.
fn scan_above(
    frame: &SearchPlane,
    template: &PreparedTemplate,
    range: OffsetRange,
    threshold: f32,
) -> Vec<Candidate> {
    let mut found = Vec::new();
    for y in range.y_min..=range.y_max {
        for x in range.x_min..=range.x_max {
            let score = template.score_at(frame, x, y);
            if score >= threshold {
                found.push(Candidate { x, y, score });
            }
        }
    }
    found
}

/// Response cells that are not exceeded by any of their 8 neighbours.
fn local_maxima(frame: &SearchPlane, template: &PreparedTemplate, range: OffsetRange) -> Vec<Candidate> {
    let columns = range.columns();
    let rows = (range.y_max - range.y_min + 1) as usize;
    let mut surface = Vec::with_capacity(columns * rows);
    for y in range.y_min..=range.y_max {
        for x in range.x_min..=range.x_max {
            surface.push(template.score_at(frame, x, y));
        }
    }

    let mut maxima = Vec::new();
    for row in 0..rows {
        for col in 0..columns {
            let score = surface[row * columns + col];
            let mut is_peak = true;
            'neighbours: for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    if dr == 0 && dc == 0 {
                        continue;
                    }
                    let (r, c) = (row as i64 + dr, col as i64 + dc);
                    if r < 0 || c < 0 || r >= rows as i64 || c >= columns as i64 {
                        continue;
                    }
                    if surface[r as usize * columns + c as usize] > score {
                        is_peak = false;
                        break 'neighbours;
                    }
                }
            }
            if is_peak {
                maxima.push(Candidate {
                    x: range.x_min + col as u32,
                    y: range.y_min + row as u32,
                    score,
                });
            }
        }
    }
    maxima
}

/// Follow each coarse candidate down to level 0, re-scoring a small window per level.
fn refine_all(
    coarse: Vec<Candidate>,
    pyramid: &FramePyramid,
    levels: &[PreparedTemplate],
    ranges: &[OffsetRange],
    depth: usize,
) -> Vec<Candidate> {
    let mut refined: Vec<Candidate> = Vec::with_capacity(coarse.len());
    for mut candidate in coarse {
        let mut lost = false;
        for level in (0..depth).rev() {
            let window = ranges[level].window(candidate.x * 2, candidate.y * 2, REFINE_RADIUS);
            match window.and_then(|w| scan_best(&pyramid.levels[level], &levels[level], w)) {
                Some(better) => candidate = better,
                None => {
                    lost = true;
                    break;
                }
            }
        }
        if !lost && !refined.iter().any(|r| r.x == candidate.x && r.y == candidate.y) {
            refined.push(candidate);
        }
    }
    refined
}

/// Score descending; equal scores keep row-major order so results are reproducible.
fn sort_best_first(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.y.cmp(&b.y).then(a.x.cmp(&b.x)));
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Greedy duplicate suppression over candidates sorted best first.
fn suppress_nearby(sorted: Vec<Candidate>, min_separation: u32) -> Vec<Candidate> {
    let mut accepted: Vec<Candidate> = Vec::new();
    for candidate in sorted {
        let too_close = accepted.iter().any(|a| {
            a.x.abs_diff(candidate.x) < min_separation && a.y.abs_diff(candidate.y) < min_separation
        });
        if !too_close {
            accepted.push(candidate);
        }
    }
    accepted
}

/// Best match using the default pyramid search.
pub fn match_best(
    frame: &RgbImage,
    templates: &[Template],
    threshold: f32,
) -> VisionResult<Option<MatchResult>> {
    TemplateMatcher::default().match_best(frame, templates, threshold)
}

/// All separated matches using the default pyramid search.
pub fn match_all(
    frame: &RgbImage,
    template: &Template,
    threshold: f32,
    min_separation: u32,
) -> VisionResult<Vec<MatchResult>> {
    TemplateMatcher::default().match_all(frame, template, threshold, min_separation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: u32, y: u32, score: f32) -> Candidate {
        Candidate { x, y, score }
    }

    #[test]
    fn test_sort_is_stable_in_scan_order() {
        let mut list = vec![
            candidate(5, 2, 0.9),
            candidate(1, 1, 0.9),
            candidate(9, 0, 0.5),
            candidate(3, 1, 0.95),
        ];
        sort_best_first(&mut list);
        assert_eq!(list[0], candidate(3, 1, 0.95));
        assert_eq!(list[1], candidate(1, 1, 0.9));
        assert_eq!(list[2], candidate(5, 2, 0.9));
        assert_eq!(list[3], candidate(9, 0, 0.5));
    }

    #[test]
    fn test_suppress_nearby_keeps_best_of_cluster() {
        let sorted = vec![
            candidate(100, 100, 0.99),
            candidate(102, 101, 0.97),
            candidate(100, 130, 0.96),
            candidate(140, 100, 0.95),
        ];
        let kept = suppress_nearby(sorted, 20);
        assert_eq!(
            kept,
            vec![
                candidate(100, 100, 0.99),
                candidate(100, 130, 0.96),
                candidate(140, 100, 0.95)
            ]
        );
    }

    #[test]
    fn test_suppression_needs_both_axes_close() {
        // 5px apart horizontally but 25px vertically: both survive
        let kept = suppress_nearby(vec![candidate(10, 10, 0.9), candidate(15, 35, 0.8)], 20);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_offset_window_clamps_to_range() {
        let range = OffsetRange {
            x_min: 0,
            x_max: 10,
            y_min: 5,
            y_max: 8,
        };
        let w = range.window(1, 9, 2).unwrap();
        assert_eq!((w.x_min, w.x_max, w.y_min, w.y_max), (0, 3, 7, 8));
        assert!(range.window(20, 20, 2).is_none());
    }
}
