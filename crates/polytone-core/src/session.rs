use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::basis::BasisMatrix;
use crate::config::{SessionConfig, ToneSettings};
use crate::convert::{deinterleave, interleave, interleave_into};
use crate::curve::{Channel, ControlPoints, CurvePreset};
use crate::error::{Result, ToneError};
use crate::image_buf::{Image, PixelPlane};
use crate::planar::{PlanarTransformer, SegmentedPolynomial};
use crate::polynomial::Polynomial;
use crate::render::{BackgroundRenderer, ChannelRender, Generations};

const EVENT_CAPACITY: usize = 64;

/// What the session is doing, as seen by [`ToneSession::state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// A render for this channel is running: a synchronous edit, or a
    /// submitted background render that has not finished yet.
    Recomputing(Channel),
}

/// Notifications for whoever draws the image and curve editors.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    CurveUpdated {
        channel: Channel,
        polynomial: Polynomial,
    },
    ImageUpdated {
        channel: Channel,
    },
    RecomputeFailed {
        channel: Channel,
        error: ToneError,
    },
}

#[derive(Clone, Debug)]
struct ChannelCurve {
    points: ControlPoints,
    polynomial: Polynomial,
}

/// Per-channel tone-curve editing over one source image.
///
/// ```text
/// edit -> solve (shared basis) -> transform channel plane -> interleave -> display
/// ```
///
/// Only the edited channel's plane is re-rendered; the others are reused. A
/// failed edit leaves points, coefficients, planes and the display image as
/// they were.
pub struct ToneSession {
    config: SessionConfig,
    basis: Arc<BasisMatrix>,
    transformer: PlanarTransformer,
    source: Arc<Vec<PixelPlane>>,
    planes: Vec<PixelPlane>,
    curves: [ChannelCurve; 3],
    display: Image,
    state: SessionState,
    generations: Arc<Generations>,
    committed: [u64; 3],
    events: broadcast::Sender<SessionEvent>,
}

impl ToneSession {
    pub fn new(image: Image, config: &SessionConfig) -> Result<Self> {
        if config.point_count < 2 {
            return Err(ToneError::DegenerateBasis(format!(
                "a tone curve needs at least 2 control points, got {}",
                config.point_count
            )));
        }
        let basis = Arc::new(BasisMatrix::ramp(config.point_count)?);
        let identity = ControlPoints::identity(config.point_count);
        let polynomial = Polynomial::fit(&basis, identity.values())?;
        let curve = ChannelCurve {
            points: identity,
            polynomial,
        };

        let source = deinterleave(&image);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut session = Self {
            config: config.clone(),
            basis,
            transformer: PlanarTransformer::new(config.parallel_threshold),
            planes: source.clone(),
            source: Arc::new(source),
            curves: [curve.clone(), curve.clone(), curve],
            display: image,
            state: SessionState::Idle,
            generations: Arc::new(Generations::default()),
            committed: [0; 3],
            events,
        };
        session.render_all()?;
        info!(
            width = session.display.width,
            height = session.display.height,
            points = session.config.point_count,
            "tone session ready"
        );
        Ok(session)
    }

    /// Swap in a new source image, keeping the current curves.
    pub fn set_source(&mut self, image: Image) -> Result<()> {
        self.source = Arc::new(deinterleave(&image));
        self.planes = self.source.as_ref().clone();
        self.display = image;
        for channel in Channel::ALL {
            self.generations.next(channel);
        }
        self.render_all()
    }

    pub fn set_control_points(
        &mut self,
        channel: Channel,
        points: ControlPoints,
    ) -> Result<&Image> {
        let generation = self.generations.next(channel);
        self.state = SessionState::Recomputing(channel);
        let result = self.recompute(channel, points);
        self.state = SessionState::Idle;

        match result {
            Ok((curve, plane)) => {
                self.install(channel, curve, plane)?;
                self.committed[channel.index()] = generation;
                Ok(&self.display)
            }
            Err(err) => {
                error!(%channel, %err, "tone curve recompute failed");
                let _ = self.events.send(SessionEvent::RecomputeFailed {
                    channel,
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    /// Move a single control point.
    pub fn set_control_point(
        &mut self,
        channel: Channel,
        index: usize,
        value: f32,
    ) -> Result<&Image> {
        let mut points = self.curves[channel.index()].points.clone();
        points.set(index, value)?;
        self.set_control_points(channel, points)
    }

    pub fn apply_preset(&mut self, channel: Channel, preset: CurvePreset) -> Result<&Image> {
        self.set_control_points(channel, preset.points(self.config.point_count))
    }

    /// Apply every curve named in `settings`, in red, green, blue order.
    /// Stops at the first failure; channels before it stay applied.
    pub fn apply_settings(&mut self, settings: &ToneSettings) -> Result<&Image> {
        for channel in Channel::ALL {
            if let Some(spec) = settings.curve(channel) {
                self.set_control_points(channel, spec.to_points(self.config.point_count))?;
            }
        }
        Ok(&self.display)
    }

    /// Handle for rendering edits off the calling thread.
    pub fn renderer(&self) -> BackgroundRenderer {
        let slots = Channel::ALL.map(|c| self.display.format.order.index_of(c));
        BackgroundRenderer::new(
            self.basis.clone(),
            self.source.clone(),
            slots,
            self.transformer,
            self.generations.clone(),
        )
    }

    /// Install a background render if it is still the newest edit for its
    /// channel and was computed from the current source image. Returns
    /// `false` for stale renders, which are dropped.
    pub fn commit(&mut self, render: ChannelRender) -> Result<bool> {
        let channel = render.channel;
        let idx = channel.index();
        if !Arc::ptr_eq(&render.source, &self.source) {
            debug!(
                %channel,
                generation = render.generation,
                "discarding render of replaced source"
            );
            return Ok(false);
        }
        if render.generation != self.generations.current(channel)
            || render.generation <= self.committed[idx]
        {
            debug!(
                %channel,
                generation = render.generation,
                latest = self.generations.current(channel),
                "discarding stale render"
            );
            return Ok(false);
        }

        let slot = self.display.format.order.index_of(channel);
        if !render.plane.same_shape(&self.source[slot]) {
            return Err(ToneError::ShapeMismatch(format!(
                "render for {channel} is {}x{}, source is {}x{}",
                render.plane.width, render.plane.height, self.display.width, self.display.height
            )));
        }

        let curve = ChannelCurve {
            points: render.points,
            polynomial: render.polynomial,
        };
        self.install(channel, curve, render.plane)?;
        self.committed[idx] = render.generation;
        Ok(true)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn display(&self) -> &Image {
        &self.display
    }

    pub fn state(&self) -> SessionState {
        if self.state != SessionState::Idle {
            return self.state;
        }
        Channel::ALL
            .into_iter()
            .find(|&c| self.generations.is_busy(c))
            .map_or(SessionState::Idle, SessionState::Recomputing)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn basis(&self) -> &BasisMatrix {
        &self.basis
    }

    pub fn control_points(&self, channel: Channel) -> &ControlPoints {
        &self.curves[channel.index()].points
    }

    pub fn polynomial(&self, channel: Channel) -> &Polynomial {
        &self.curves[channel.index()].polynomial
    }

    /// Clamped curve over the preview grid.
    pub fn curve_preview(&self, channel: Channel) -> Vec<f32> {
        self.polynomial(channel)
            .sample_curve(self.config.preview_samples)
    }

    fn recompute(
        &self,
        channel: Channel,
        points: ControlPoints,
    ) -> Result<(ChannelCurve, PixelPlane)> {
        let t0 = Instant::now();
        if points.len() != self.basis.size() {
            return Err(ToneError::IllegalParameter { index: 7 });
        }
        let polynomial = Polynomial::fit(&self.basis, points.values())?;

        let slot = self.display.format.order.index_of(channel);
        let src = &self.source[slot];
        let mut plane = PixelPlane::new(src.width, src.height);
        let curve = SegmentedPolynomial::single(polynomial.clone());
        self.transformer.apply(&curve, src, &mut plane)?;

        debug!(
            %channel,
            elapsed_ms = t0.elapsed().as_millis(),
            pixels = plane.pixel_count(),
            "channel recomputed"
        );
        Ok((ChannelCurve { points, polynomial }, plane))
    }

    fn install(&mut self, channel: Channel, curve: ChannelCurve, plane: PixelPlane) -> Result<()> {
        let slot = self.display.format.order.index_of(channel);
        let previous = std::mem::replace(&mut self.planes[slot], plane);
        if let Err(err) = interleave_into(&self.planes, &mut self.display) {
            self.planes[slot] = previous;
            return Err(err);
        }

        let polynomial = curve.polynomial.clone();
        self.curves[channel.index()] = curve;
        let _ = self.events.send(SessionEvent::CurveUpdated {
            channel,
            polynomial,
        });
        let _ = self.events.send(SessionEvent::ImageUpdated { channel });
        Ok(())
    }

    fn render_all(&mut self) -> Result<()> {
        for channel in Channel::ALL {
            let points = self.curves[channel.index()].points.clone();
            let (curve, plane) = self.recompute(channel, points)?;
            let slot = self.display.format.order.index_of(channel);
            self.planes[slot] = plane;
            self.curves[channel.index()] = curve;
        }
        self.display = interleave(&self.planes, self.display.format)?;
        Ok(())
    }
}
