//! Off-thread channel rendering with last-writer-wins semantics.
//!
//! Every submission bumps its channel's generation. Jobs for one channel run
//! one at a time; a job that finds a newer generation before or during the
//! pixel pass gives up and yields `None`. Channels are independent and render
//! in parallel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::basis::BasisMatrix;
use crate::curve::{Channel, ControlPoints};
use crate::error::{Result, ToneError};
use crate::image_buf::PixelPlane;
use crate::planar::{PlanarTransformer, SegmentedPolynomial};
use crate::polynomial::Polynomial;

/// Latest submitted edit and number of unfinished renders, per channel.
#[derive(Debug, Default)]
pub(crate) struct Generations {
    latest: [AtomicU64; 3],
    in_flight: [AtomicUsize; 3],
}

impl Generations {
    pub(crate) fn next(&self, channel: Channel) -> u64 {
        self.latest[channel.index()].fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn current(&self, channel: Channel) -> u64 {
        self.latest[channel.index()].load(Ordering::Acquire)
    }

    pub(crate) fn is_busy(&self, channel: Channel) -> bool {
        self.in_flight[channel.index()].load(Ordering::Acquire) > 0
    }

    fn begin(self: &Arc<Self>, channel: Channel) -> InFlight {
        self.in_flight[channel.index()].fetch_add(1, Ordering::AcqRel);
        InFlight {
            generations: self.clone(),
            channel,
        }
    }
}

/// Counts one submitted render until its task finishes or is dropped.
struct InFlight {
    generations: Arc<Generations>,
    channel: Channel,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.generations.in_flight[self.channel.index()].fetch_sub(1, Ordering::AcqRel);
    }
}

/// A finished off-thread render, ready for
/// [`ToneSession::commit`](crate::session::ToneSession::commit).
#[derive(Clone, Debug)]
pub struct ChannelRender {
    pub channel: Channel,
    pub generation: u64,
    pub points: ControlPoints,
    pub polynomial: Polynomial,
    pub plane: PixelPlane,
    /// Source planes the render was computed from.
    pub(crate) source: Arc<Vec<PixelPlane>>,
}

#[derive(Clone)]
pub struct BackgroundRenderer {
    basis: Arc<BasisMatrix>,
    source: Arc<Vec<PixelPlane>>,
    slots: [usize; 3],
    transformer: PlanarTransformer,
    generations: Arc<Generations>,
    locks: Arc<[Mutex<()>; 3]>,
}

impl BackgroundRenderer {
    pub(crate) fn new(
        basis: Arc<BasisMatrix>,
        source: Arc<Vec<PixelPlane>>,
        slots: [usize; 3],
        transformer: PlanarTransformer,
        generations: Arc<Generations>,
    ) -> Self {
        Self {
            basis,
            source,
            slots,
            transformer,
            generations,
            locks: Arc::new([Mutex::new(()), Mutex::new(()), Mutex::new(())]),
        }
    }

    /// Queue a render of `channel` with new control points.
    ///
    /// Must be called from within a tokio runtime. Resolves to `Ok(None)` if a
    /// newer edit for the same channel superseded this one.
    pub fn submit(
        &self,
        channel: Channel,
        points: ControlPoints,
    ) -> JoinHandle<Result<Option<ChannelRender>>> {
        let generation = self.generations.next(channel);
        let in_flight = self.generations.begin(channel);
        let this = self.clone();

        tokio::spawn(async move {
            let _in_flight = in_flight;
            let _turn = this.locks[channel.index()].lock().await;
            if this.is_stale(channel, generation) {
                debug!(%channel, generation, "render superseded before start");
                return Ok(None);
            }

            let worker = this.clone();
            let job =
                tokio::task::spawn_blocking(move || worker.render(channel, generation, points));
            match job.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Ok(None),
            }
        })
    }

    fn is_stale(&self, channel: Channel, generation: u64) -> bool {
        self.generations.current(channel) != generation
    }

    fn render(
        &self,
        channel: Channel,
        generation: u64,
        points: ControlPoints,
    ) -> Result<Option<ChannelRender>> {
        if points.len() != self.basis.size() {
            return Err(ToneError::IllegalParameter { index: 7 });
        }
        let polynomial = Polynomial::fit(&self.basis, points.values())?;

        let src = &self.source[self.slots[channel.index()]];
        let mut plane = PixelPlane::new(src.width, src.height);
        let curve = SegmentedPolynomial::single(polynomial.clone());
        let cancelled = || self.is_stale(channel, generation);

        match self.transformer.apply_cancellable(&curve, src, &mut plane, &cancelled) {
            Ok(()) => Ok(Some(ChannelRender {
                channel,
                generation,
                points,
                polynomial,
                plane,
                source: self.source.clone(),
            })),
            Err(ToneError::Cancelled) => {
                debug!(%channel, generation, "render cancelled mid-pass");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
