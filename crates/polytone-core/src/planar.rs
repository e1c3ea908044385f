use rayon::prelude::*;
use tracing::debug;

use crate::error::{Result, ToneError};
use crate::image_buf::PixelPlane;
use crate::polynomial::{Polynomial, clamp_unit_value};

/// Planes with at least this many pixels are processed on the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 64 * 1024;

/// Rows handed to one rayon task; also the cancellation granularity.
const ROWS_PER_CHUNK: usize = 16;

/// Piecewise polynomial over input ranges.
///
/// With boundaries `b0 < b1 < ... < bn`, segment `i` owns `[b_i, b_(i+1))` and
/// the last segment owns the closed range `[b_(n-1), b_n]`. Inputs below `b0`
/// fall to the first segment, inputs above `bn` to the last.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentedPolynomial {
    segments: Vec<Polynomial>,
    boundaries: Vec<f32>,
}

impl SegmentedPolynomial {
    pub fn new(segments: Vec<Polynomial>, boundaries: Vec<f32>) -> Result<Self> {
        if segments.is_empty() {
            return Err(ToneError::ShapeMismatch("no polynomial segments".into()));
        }
        if boundaries.len() != segments.len() + 1 {
            return Err(ToneError::ShapeMismatch(format!(
                "{} segments need {} boundaries, got {}",
                segments.len(),
                segments.len() + 1,
                boundaries.len()
            )));
        }
        if boundaries.iter().any(|b| b.is_nan()) || boundaries.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ToneError::ShapeMismatch(
                "segment boundaries must be strictly increasing".into(),
            ));
        }
        Ok(Self {
            segments,
            boundaries,
        })
    }

    /// One polynomial over `(-inf, +inf)`.
    pub fn single(polynomial: Polynomial) -> Self {
        Self {
            segments: vec![polynomial],
            boundaries: vec![f32::NEG_INFINITY, f32::INFINITY],
        }
    }

    pub fn segments(&self) -> &[Polynomial] {
        &self.segments
    }

    pub fn boundaries(&self) -> &[f32] {
        &self.boundaries
    }

    /// Index of the segment that owns `x`.
    pub fn segment_index(&self, x: f32) -> usize {
        let interior = &self.boundaries[1..self.boundaries.len() - 1];
        interior.partition_point(|&b| b <= x)
    }

    /// Unclamped value at `x`.
    #[inline]
    pub fn eval(&self, x: f32) -> f32 {
        if self.segments.len() == 1 {
            return self.segments[0].eval(x);
        }
        self.segments[self.segment_index(x)].eval(x)
    }

    fn map_row(&self, src: &[f32], dst: &mut [f32]) {
        for (out, &v) in dst.iter_mut().zip(src) {
            *out = clamp_unit_value(self.eval(v));
        }
    }
}

/// Applies a segmented polynomial to every sample of a plane.
#[derive(Clone, Copy, Debug)]
pub struct PlanarTransformer {
    parallel_threshold: usize,
}

impl Default for PlanarTransformer {
    fn default() -> Self {
        Self::new(PARALLEL_THRESHOLD)
    }
}

impl PlanarTransformer {
    pub fn new(parallel_threshold: usize) -> Self {
        Self { parallel_threshold }
    }

    pub fn apply(
        &self,
        curve: &SegmentedPolynomial,
        src: &PixelPlane,
        dst: &mut PixelPlane,
    ) -> Result<()> {
        self.apply_cancellable(curve, src, dst, &|| false)
    }

    pub fn apply_in_place(
        &self,
        curve: &SegmentedPolynomial,
        plane: &mut PixelPlane,
    ) -> Result<()> {
        let width = (plane.width as usize).max(1);
        let chunk = width * ROWS_PER_CHUNK;
        if plane.pixel_count() >= self.parallel_threshold {
            plane.data.par_chunks_mut(chunk).for_each(|rows| {
                for v in rows.iter_mut() {
                    *v = clamp_unit_value(curve.eval(*v));
                }
            });
        } else {
            for v in plane.data.iter_mut() {
                *v = clamp_unit_value(curve.eval(*v));
            }
        }
        Ok(())
    }

    /// Like [`apply`](Self::apply), but polls `is_cancelled` between row chunks.
    ///
    /// Returns [`ToneError::Cancelled`] once the predicate fires; `dst` may then
    /// be partially written.
    pub fn apply_cancellable(
        &self,
        curve: &SegmentedPolynomial,
        src: &PixelPlane,
        dst: &mut PixelPlane,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<()> {
        if !src.same_shape(dst) || src.data.len() != dst.data.len() {
            return Err(ToneError::ShapeMismatch(format!(
                "source plane is {}x{}, destination is {}x{}",
                src.width, src.height, dst.width, dst.height
            )));
        }

        let width = (src.width as usize).max(1);
        let chunk = width * ROWS_PER_CHUNK;
        let pixels = src.pixel_count();

        if pixels >= self.parallel_threshold {
            debug!(pixels, "parallel plane transform");
            src.data
                .par_chunks(chunk)
                .zip(dst.data.par_chunks_mut(chunk))
                .try_for_each(|(s, d)| {
                    if is_cancelled() {
                        return Err(ToneError::Cancelled);
                    }
                    curve.map_row(s, d);
                    Ok(())
                })
        } else {
            for (s, d) in src.data.chunks(chunk).zip(dst.data.chunks_mut(chunk)) {
                if is_cancelled() {
                    return Err(ToneError::Cancelled);
                }
                curve.map_row(s, d);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::basis::BasisMatrix;

    fn noisy_plane(width: u32, height: u32) -> PixelPlane {
        let data = (0..width as usize * height as usize)
            .map(|i| ((i * 7919) % 1000) as f32 / 999.0)
            .collect();
        PixelPlane::from_data(width, height, data).unwrap()
    }

    #[test]
    fn identity_leaves_plane_unchanged() {
        let curve = SegmentedPolynomial::single(Polynomial::identity(5));
        let src = noisy_plane(33, 17);
        let mut dst = PixelPlane::new(33, 17);
        PlanarTransformer::default().apply(&curve, &src, &mut dst).unwrap();
        for (a, b) in src.data.iter().zip(&dst.data) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn fitted_identity_leaves_plane_unchanged() {
        let basis = BasisMatrix::ramp(5).unwrap();
        let p = Polynomial::fit(&basis, &[0.0, 0.25, 0.5, 0.75, 1.0]).unwrap();
        let curve = SegmentedPolynomial::single(p);
        let src = noisy_plane(20, 20);
        let mut dst = PixelPlane::new(20, 20);
        PlanarTransformer::default().apply(&curve, &src, &mut dst).unwrap();
        for (a, b) in src.data.iter().zip(&dst.data) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn zero_curve_blanks_plane() {
        let basis = BasisMatrix::ramp(5).unwrap();
        let p = Polynomial::fit(&basis, &[0.0; 5]).unwrap();
        let curve = SegmentedPolynomial::single(p);
        let mut plane = noisy_plane(16, 9);
        PlanarTransformer::default().apply_in_place(&curve, &mut plane).unwrap();
        assert!(plane.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn output_is_clamped_for_every_pixel() {
        // 4x - 1.5 overshoots both ends of [0, 1].
        let curve = SegmentedPolynomial::single(Polynomial::from_descending(vec![4.0, -1.5]));
        let src = noisy_plane(64, 64);
        let mut dst = PixelPlane::new(64, 64);
        PlanarTransformer::default().apply(&curve, &src, &mut dst).unwrap();
        assert!(dst.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(dst.data[0], 0.0); // src 0.0 -> -1.5
        assert!(dst.data.contains(&1.0));
    }

    #[test]
    fn parallel_matches_sequential() {
        let p = Polynomial::from_descending(vec![-1.2, 0.7, 1.4, 0.05]);
        let curve = SegmentedPolynomial::single(p);
        let src = noisy_plane(300, 250);

        let mut seq = PixelPlane::new(300, 250);
        PlanarTransformer::new(usize::MAX).apply(&curve, &src, &mut seq).unwrap();
        let mut par = PixelPlane::new(300, 250);
        PlanarTransformer::new(0).apply(&curve, &src, &mut par).unwrap();
        assert_eq!(seq, par);

        let mut in_place = src.clone();
        PlanarTransformer::new(0).apply_in_place(&curve, &mut in_place).unwrap();
        assert_eq!(in_place, seq);
    }

    #[test]
    fn segment_tie_break_goes_to_upper_segment() {
        let low = Polynomial::from_descending(vec![0.1]);
        let mid = Polynomial::from_descending(vec![0.5]);
        let high = Polynomial::from_descending(vec![0.9]);
        let curve =
            SegmentedPolynomial::new(vec![low, mid, high], vec![0.0, 0.25, 0.75, 1.0]).unwrap();

        assert_eq!(curve.segment_index(0.0), 0);
        assert_eq!(curve.segment_index(0.2499), 0);
        assert_eq!(curve.segment_index(0.25), 1);
        assert_eq!(curve.segment_index(0.75), 2);
        // Final segment is closed on both ends.
        assert_eq!(curve.segment_index(1.0), 2);
        // Out-of-range inputs use the end segments.
        assert_eq!(curve.segment_index(-3.0), 0);
        assert_eq!(curve.segment_index(7.0), 2);

        let src = PixelPlane::from_data(4, 1, vec![0.1, 0.25, 0.75, 1.0]).unwrap();
        let mut dst = PixelPlane::new(4, 1);
        PlanarTransformer::default().apply(&curve, &src, &mut dst).unwrap();
        assert_eq!(dst.data, vec![0.1, 0.5, 0.9, 0.9]);
    }

    #[test]
    fn segments_evaluate_their_own_polynomial() {
        // x below 0.5, 1 - x above.
        let curve = SegmentedPolynomial::new(
            vec![
                Polynomial::from_descending(vec![1.0, 0.0]),
                Polynomial::from_descending(vec![-1.0, 1.0]),
            ],
            vec![f32::NEG_INFINITY, 0.5, f32::INFINITY],
        )
        .unwrap();
        assert_eq!(curve.eval(0.25), 0.25);
        assert_eq!(curve.eval(0.75), 0.25);
        assert_eq!(curve.eval(0.5), 0.5);
    }

    #[test]
    fn rejects_bad_boundaries() {
        let p = || Polynomial::identity(2);
        assert!(SegmentedPolynomial::new(vec![], vec![0.0]).is_err());
        assert!(SegmentedPolynomial::new(vec![p()], vec![0.0]).is_err());
        assert!(SegmentedPolynomial::new(vec![p(), p()], vec![0.0, 0.5, 0.5]).is_err());
        assert!(SegmentedPolynomial::new(vec![p()], vec![1.0, 0.0]).is_err());
        assert!(SegmentedPolynomial::new(vec![p()], vec![0.0, f32::NAN]).is_err());
    }

    #[test]
    fn rejects_shape_mismatch() {
        let curve = SegmentedPolynomial::single(Polynomial::identity(2));
        let src = PixelPlane::new(4, 4);
        let mut dst = PixelPlane::new(2, 8);
        let err = PlanarTransformer::default().apply(&curve, &src, &mut dst).unwrap_err();
        assert!(matches!(err, ToneError::ShapeMismatch(_)));
    }

    #[test]
    fn cancellation_stops_work() {
        let curve = SegmentedPolynomial::single(Polynomial::identity(2));
        let src = noisy_plane(8, 64);
        let mut dst = PixelPlane::new(8, 64);
        let polls = AtomicUsize::new(0);
        let err = PlanarTransformer::new(usize::MAX)
            .apply_cancellable(&curve, &src, &mut dst, &|| {
                polls.fetch_add(1, Ordering::SeqCst) >= 1
            })
            .unwrap_err();
        assert_eq!(err, ToneError::Cancelled);
        // First chunk done, the rest skipped.
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert!(dst.data[8 * ROWS_PER_CHUNK..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn empty_plane() {
        let curve = SegmentedPolynomial::single(Polynomial::identity(2));
        let src = PixelPlane::new(0, 0);
        let mut dst = PixelPlane::new(0, 0);
        PlanarTransformer::default().apply(&curve, &src, &mut dst).unwrap();
    }
}
