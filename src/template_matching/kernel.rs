//! Zero-mean normalised cross-correlation (ZNCC) over luma planes.
//!
//! Scores are in `[-1, 1]`, higher is better, `1.0` is an exact (affine
//! brightness) match. A frame window without variance scores `0.0`.

use image::RgbImage;

/// Minimum per-pixel variance for a window or template to count as textured.
const FLAT_VARIANCE: f64 = 1e-6;

/// Single channel f32 image, row-major.
#[derive(Debug, Clone)]
pub(crate) struct LumaPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl LumaPlane {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let gray = image::imageops::grayscale(image);
        Self {
            width: gray.width(),
            height: gray.height(),
            data: gray.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Halve both dimensions with a 2x2 box filter (odd trailing row/column dropped).
    pub fn downsample(&self) -> Self {
        let width = self.width / 2;
        let height = self.height / 2;
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = (x * 2, y * 2);
                let sum = self.get(sx, sy)
                    + self.get(sx + 1, sy)
                    + self.get(sx, sy + 1)
                    + self.get(sx + 1, sy + 1);
                data.push(sum * 0.25);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }
}

/// Summed-area tables of values and squared values, for O(1) window statistics.
#[derive(Debug, Clone)]
pub(crate) struct IntegralImage {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl IntegralImage {
    pub fn new(plane: &LumaPlane) -> Self {
        let stride = plane.width as usize + 1;
        let rows = plane.height as usize + 1;
        let mut sum = vec![0.0f64; stride * rows];
        let mut sum_sq = vec![0.0f64; stride * rows];
        for y in 0..plane.height as usize {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..plane.width as usize {
                let v = plane.data[y * plane.width as usize + x] as f64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row_sum;
                sum_sq[idx] = sum_sq[idx - stride] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    /// Returns `(sum, sum_of_squares)` over the window.
    #[inline]
    pub fn window(&self, x: u32, y: u32, width: u32, height: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + width as usize, y0 + height as usize);
        let a = y0 * self.stride + x0;
        let b = y0 * self.stride + x1;
        let c = y1 * self.stride + x0;
        let d = y1 * self.stride + x1;
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sum_sq[d] - self.sum_sq[b] - self.sum_sq[c] + self.sum_sq[a],
        )
    }
}

/// A luma plane, optionally with its integral image.
///
/// Without the integral image window statistics are summed directly, which
/// is cheaper when only a few offsets are scored (pyramid refinement).
#[derive(Debug, Clone)]
pub(crate) struct SearchPlane {
    pub plane: LumaPlane,
    pub integral: Option<IntegralImage>,
}

impl SearchPlane {
    pub fn new(plane: LumaPlane) -> Self {
        let integral = Some(IntegralImage::new(&plane));
        Self { plane, integral }
    }

    pub fn without_integral(plane: LumaPlane) -> Self {
        Self {
            plane,
            integral: None,
        }
    }
}

/// Template with its mean removed, ready for correlation.
#[derive(Debug, Clone)]
pub(crate) struct PreparedTemplate {
    pub width: u32,
    pub height: u32,
    zero_mean: Vec<f32>,
    norm: f64,
}

impl PreparedTemplate {
    /// Returns `None` when the template has no contrast.
    pub fn new(plane: &LumaPlane) -> Option<Self> {
        let n = plane.data.len() as f64;
        if n == 0.0 {
            return None;
        }
        let mean = plane.data.iter().map(|&v| v as f64).sum::<f64>() / n;
        let zero_mean: Vec<f32> = plane.data.iter().map(|&v| (v as f64 - mean) as f32).collect();
        let energy: f64 = zero_mean.iter().map(|&v| (v as f64) * (v as f64)).sum();
        if energy <= FLAT_VARIANCE * n {
            return None;
        }
        Some(Self {
            width: plane.width,
            height: plane.height,
            zero_mean,
            norm: energy.sqrt(),
        })
    }

    /// ZNCC score of the template placed with its top-left corner at `(x, y)`.
    pub fn score_at(&self, frame: &SearchPlane, x: u32, y: u32) -> f32 {
        let n = (self.width * self.height) as f64;
        let fw = frame.plane.width as usize;
        let tw = self.width as usize;

        // Sum of I * (T - mean(T)) equals the centred cross term because the
        // zero-mean template sums to zero.
        let mut cross = 0.0f64;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for dy in 0..self.height as usize {
            let row_start = (y as usize + dy) * fw + x as usize;
            let frame_row = &frame.plane.data[row_start..row_start + tw];
            let tpl_row = &self.zero_mean[dy * tw..(dy + 1) * tw];
            let row: f32 = frame_row.iter().zip(tpl_row).map(|(a, b)| a * b).sum();
            cross += row as f64;
            if frame.integral.is_none() {
                for &v in frame_row {
                    let v = v as f64;
                    sum += v;
                    sum_sq += v * v;
                }
            }
        }
        if let Some(integral) = &frame.integral {
            (sum, sum_sq) = integral.window(x, y, self.width, self.height);
        }

        let variance_sum = sum_sq - sum * sum / n;
        if variance_sum <= FLAT_VARIANCE * n {
            return 0.0;
        }
        (cross / (variance_sum.sqrt() * self.norm)).clamp(-1.0, 1.0) as f32
    }
}
