use std::time::{Duration, Instant};

use glq_core::config::{GlqConfig, SurfaceMode};
use glq_protocol::gl;
use glq_protocol::handle::{NativeHandle, SurfaceId, SurfaceSize};
use tracing::{debug, error};

use crate::driver::{Driver, DriverError, SurfaceDesc};

pub(crate) const ALL_BUFFERS: u32 =
    gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapChainState {
    NoSurfaces,
    Provisioned,
    Rendering,
    Finalized,
}

/// Swap-chain behaviour derived from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct FrameOptions {
    pub mode: SurfaceMode,
    pub antialias: bool,
    pub samples: u32,
    pub multiply_alpha: bool,
    pub preserve_drawing_buffer: bool,
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl FrameOptions {
    pub fn from_config(config: &GlqConfig) -> Self {
        let exclusive = config.surface.mode == SurfaceMode::Exclusive;
        let attrs = &config.context;
        Self {
            mode: config.surface.mode,
            // The host owns multisampling and compositing of a shared surface
            antialias: exclusive && attrs.antialias && attrs.max_samples > 0,
            samples: attrs.max_samples,
            multiply_alpha: exclusive && attrs.multiply_alpha(),
            preserve_drawing_buffer: attrs.preserve_drawing_buffer,
            alpha: attrs.alpha,
            depth: attrs.depth,
            stencil: attrs.stencil,
        }
    }
}

/// Render targets owned by the execution plane: optional multisample,
/// render (drawn to), display (last complete frame) and optional
/// alpha-premultiply scratch. Render and display swap by id.
pub struct SwapChain {
    options: FrameOptions,
    state: SwapChainState,
    size: SurfaceSize,
    multisample: Option<SurfaceId>,
    render: Option<SurfaceId>,
    display: Option<SurfaceId>,
    scratch: Option<SurfaceId>,
}

impl SwapChain {
    pub fn new(options: FrameOptions) -> Self {
        Self {
            options,
            state: SwapChainState::NoSurfaces,
            size: SurfaceSize::default(),
            multisample: None,
            render: None,
            display: None,
            scratch: None,
        }
    }

    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    pub fn state(&self) -> SwapChainState {
        self.state
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn render_surface(&self) -> Option<SurfaceId> {
        self.render
    }

    pub fn display_surface(&self) -> Option<SurfaceId> {
        self.display
    }

    pub fn is_exclusive(&self) -> bool {
        self.options.mode == SurfaceMode::Exclusive
    }

    /// (Re)create surfaces for `size`. New surfaces are fully created and
    /// cleared before the old ones are destroyed.
    pub fn provision<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
        size: SurfaceSize,
    ) -> Result<(), DriverError> {
        if self.state != SwapChainState::NoSurfaces && size == self.size {
            return Ok(());
        }

        if !self.is_exclusive() {
            self.size = size;
            self.state = SwapChainState::Provisioned;
            debug!("shared surface provisioned at {}x{}", size.width, size.height);
            return Ok(());
        }

        let single = SurfaceDesc {
            size,
            samples: 0,
            alpha: self.options.alpha,
            depth: self.options.depth,
            stencil: self.options.stencil,
        };

        let mut created = Vec::new();
        let result = (|| -> Result<_, DriverError> {
            let render = create_cleared(driver, &single, &mut created)?;
            let display = create_cleared(driver, &single, &mut created)?;
            let multisample = if self.options.antialias {
                let desc = SurfaceDesc {
                    samples: self.options.samples,
                    ..single
                };
                Some(create_cleared(driver, &desc, &mut created)?)
            } else {
                None
            };
            let scratch = if self.options.multiply_alpha {
                let desc = SurfaceDesc {
                    depth: false,
                    stencil: false,
                    ..single
                };
                Some(create_cleared(driver, &desc, &mut created)?)
            } else {
                None
            };
            Ok((render, display, multisample, scratch))
        })();

        let (render, display, multisample, scratch) = match result {
            Ok(surfaces) => surfaces,
            Err(e) => {
                error!("failed to provision {}x{} surfaces: {}", size.width, size.height, e);
                for surface in created {
                    driver.destroy_surface(surface);
                }
                return Err(e);
            }
        };

        let old = [self.render, self.display, self.multisample, self.scratch];
        self.render = Some(render);
        self.display = Some(display);
        self.multisample = multisample;
        self.scratch = scratch;
        for surface in old.into_iter().flatten() {
            driver.destroy_surface(surface);
        }

        self.size = size;
        self.state = SwapChainState::Provisioned;
        self.bind_default(driver);
        debug!(
            width = size.width,
            height = size.height,
            multisample = multisample.is_some(),
            scratch = scratch.is_some(),
            "swap chain provisioned"
        );
        Ok(())
    }

    /// Destroy every surface.
    pub fn release<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        let surfaces = [
            self.render.take(),
            self.display.take(),
            self.multisample.take(),
            self.scratch.take(),
        ];
        for surface in surfaces.into_iter().flatten() {
            driver.destroy_surface(surface);
        }
        self.state = SwapChainState::NoSurfaces;
    }

    /// The surface drawn to when the default framebuffer is bound.
    pub fn default_target(&self) -> Option<SurfaceId> {
        if self.is_exclusive() {
            self.multisample.or(self.render)
        } else {
            None
        }
    }

    /// Bind the default framebuffer.
    pub fn bind_default<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        driver.bind_surface(self.default_target());
        if self.state != SwapChainState::NoSurfaces {
            self.state = SwapChainState::Rendering;
        }
    }

    /// Run the finalize sequence. Returns the new display texture and size
    /// when a frame became displayable (exclusive mode only).
    pub fn finalize<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
    ) -> Option<(NativeHandle, SurfaceSize)> {
        if let (Some(ms), Some(render)) = (self.multisample, self.render) {
            driver.resolve_multisample(ms, render);
        }

        if let (Some(render), Some(scratch)) = (self.render, self.scratch) {
            driver.premultiply_alpha(render, scratch);
            self.render = Some(scratch);
            self.scratch = Some(render);
        }

        driver.flush();
        driver.finish();
        self.state = SwapChainState::Finalized;

        if !self.is_exclusive() {
            return None;
        }

        std::mem::swap(&mut self.render, &mut self.display);
        let display = self.display?;

        if self.options.preserve_drawing_buffer {
            if let Some(render) = self.render {
                driver.copy_surface(display, render);
            }
        }

        Some((driver.surface_texture(display), self.size))
    }

    /// Surface holding the current frame as a caller reading the default
    /// framebuffer would see it: multisampling resolved and alpha
    /// premultiplied, without swapping.
    pub fn readback_surface<D: Driver + ?Sized>(&mut self, driver: &mut D) -> Option<SurfaceId> {
        if !self.is_exclusive() {
            return None;
        }
        if let (Some(ms), Some(render)) = (self.multisample, self.render) {
            driver.resolve_multisample(ms, render);
        }
        match (self.render, self.scratch) {
            (Some(render), Some(scratch)) => {
                driver.premultiply_alpha(render, scratch);
                Some(scratch)
            }
            (render, _) => render,
        }
    }
}

fn create_cleared<D: Driver + ?Sized>(
    driver: &mut D,
    desc: &SurfaceDesc,
    created: &mut Vec<SurfaceId>,
) -> Result<SurfaceId, DriverError> {
    let surface = driver.create_surface(desc)?;
    created.push(surface);
    driver.clear_surface(Some(surface), ALL_BUFFERS);
    Ok(surface)
}

/// Frame-rate accounting over windows of at least `interval`.
#[derive(Debug)]
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u32,
    fps: u32,
}

impl FpsCounter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
            fps: 0,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Count one finalized frame. Returns the new rate when a window closed
    /// and the rate changed.
    pub fn tick_at(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let avg_ms = elapsed.as_secs_f64() * 1000.0 / f64::from(self.frames);
        let fps = if avg_ms > 0.0 {
            (1000.0 / avg_ms).round() as u32
        } else {
            0
        };
        self.frames = 0;
        self.window_start = now;

        if fps != self.fps {
            self.fps = fps;
            Some(fps)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reports_only_on_window_close_and_change() {
        let t0 = Instant::now();
        let mut fps = FpsCounter::starting_at(Duration::from_millis(500), t0);

        // 30 frames over 500ms -> 60 fps
        for i in 1..30 {
            assert_eq!(fps.tick_at(t0 + Duration::from_micros(16_667 * i)), None);
        }
        assert_eq!(fps.tick_at(t0 + Duration::from_millis(500)), Some(60));

        // Same rate in the next window: no report
        let t1 = t0 + Duration::from_millis(500);
        for i in 1..30 {
            fps.tick_at(t1 + Duration::from_micros(16_667 * i));
        }
        assert_eq!(fps.tick_at(t1 + Duration::from_millis(500)), None);
        assert_eq!(fps.fps(), 60);
    }
}
