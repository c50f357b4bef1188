use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::rendering::camera::Viewport;
use crate::rendering::surface::Surface;

/// Owns the window's pixel buffer and the CPU frame the world renders into.
pub struct Presenter {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    frame: Surface,
    viewport: Viewport,
}

impl Presenter {
    pub fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width.max(1), size.height.max(1))?;
        Ok(Self {
            window,
            pixels,
            frame: Surface::new(size.width, size.height),
            viewport: Viewport::new(size.width, size.height),
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Returns `Ok(false)` for a zero-sized (minimized) window, which keeps the old buffers.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, Error> {
        if width == 0 || height == 0 {
            return Ok(false);
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.frame = Surface::new(width, height);
        self.viewport = Viewport::new(width, height);
        Ok(true)
    }

    fn build_pixels(window: Arc<Window>, width: u32, height: u32) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn frame_mut(&mut self) -> &mut Surface {
        &mut self.frame
    }

    /// Copies the CPU frame into the pixel buffer and presents it.
    pub fn present(&mut self) -> Result<(), Error> {
        if self.viewport.is_empty() {
            return Ok(());
        }
        let target = self.pixels.frame_mut();
        let source = self.frame.as_bytes();
        if target.len() == source.len() {
            target.copy_from_slice(source);
        }
        self.pixels.render()
    }
}
