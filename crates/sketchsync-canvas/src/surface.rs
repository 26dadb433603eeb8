//! Shared canvas state.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use sketchsync_core::protocol::Point;

use crate::color::Color;
use crate::error::Result;

/// The mutable raster the sync layer draws on.
///
/// Implementations must be cheap to call from inside the sync critical
/// section: none of these methods may block on I/O.
pub trait DrawSurface: Send {
    /// Width and height in pixels.
    fn size(&self) -> (u32, u32);

    /// Colour used by `erase` and `clear`.
    fn background(&self) -> Color;

    /// Stroke a segment `width` pixels wide with round caps.
    fn draw_line(&mut self, from: Point, to: Point, color: Color, width: f64);

    /// Fill the circle inscribed in the square whose top-left corner is
    /// `top_left` and whose side is `diameter`.
    fn fill_circle(&mut self, top_left: Point, diameter: f64, color: Color);

    /// Paint every pixel.
    fn fill(&mut self, color: Color);

    /// Encode the canvas as it is right now.
    fn capture_snapshot(&self) -> Result<Vec<u8>>;
}

/// In-memory RGBA canvas that snapshots to PNG.
///
/// Pixels are overwritten, not blended.
pub struct RasterSurface {
    image: RgbaImage,
    background: Color,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, background.rgba()),
            background,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.image.width() && y < self.image.height() {
            Some(*self.image.get_pixel(x, y))
        } else {
            None
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Paint every pixel whose centre satisfies `inside`, restricted to the
    /// given bounding box (clamped to the canvas).
    fn paint_where(
        &mut self,
        (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
        color: Color,
        inside: impl Fn(f64, f64) -> bool,
    ) {
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);
        let x0 = (min_x.floor() as i64).clamp(0, w);
        let y0 = (min_y.floor() as i64).clamp(0, h);
        let x1 = (max_x.ceil() as i64).clamp(0, w);
        let y1 = (max_y.ceil() as i64).clamp(0, h);

        let rgba = color.rgba();
        for y in y0..y1 {
            for x in x0..x1 {
                if inside(x as f64 + 0.5, y as f64 + 0.5) {
                    self.image.put_pixel(x as u32, y as u32, rgba);
                }
            }
        }
    }
}

impl DrawSurface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn background(&self) -> Color {
        self.background
    }

    fn draw_line(&mut self, from: Point, to: Point, color: Color, width: f64) {
        let radius = width.max(1.0) / 2.0;
        let bounds = (
            from.x.min(to.x) - radius,
            from.y.min(to.y) - radius,
            from.x.max(to.x) + radius,
            from.y.max(to.y) + radius,
        );
        let r2 = radius * radius;
        self.paint_where(bounds, color, |px, py| {
            distance_sq_to_segment(px, py, from, to) <= r2
        });
    }

    fn fill_circle(&mut self, top_left: Point, diameter: f64, color: Color) {
        if diameter <= 0.0 {
            return;
        }
        let radius = diameter / 2.0;
        let (cx, cy) = (top_left.x + radius, top_left.y + radius);
        let bounds = (top_left.x, top_left.y, top_left.x + diameter, top_left.y + diameter);
        let r2 = radius * radius;
        self.paint_where(bounds, color, |px, py| {
            let (dx, dy) = (px - cx, py - cy);
            dx * dx + dy * dy <= r2
        });
    }

    fn fill(&mut self, color: Color) {
        let rgba = color.rgba();
        for pixel in self.image.pixels_mut() {
            *pixel = rgba;
        }
    }

    fn capture_snapshot(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

fn distance_sq_to_segment(px: f64, py: f64, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - a.x) * dx + (py - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.x + t * dx, a.y + t * dy);
    (px - qx) * (px - qx) + (py - qy) * (py - qy)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgb(255, 0, 0);

    fn painted(surface: &RasterSurface, color: Color) -> Vec<(u32, u32)> {
        surface
            .image()
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == color.rgba())
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    fn bounding_box(points: &[(u32, u32)]) -> (u32, u32, u32, u32) {
        let min_x = points.iter().map(|p| p.0).min().unwrap();
        let min_y = points.iter().map(|p| p.1).min().unwrap();
        let max_x = points.iter().map(|p| p.0).max().unwrap();
        let max_y = points.iter().map(|p| p.1).max().unwrap();
        (min_x, min_y, max_x + 1, max_y + 1)
    }

    #[test]
    fn test_new_surface_is_background() {
        let surface = RasterSurface::new(4, 3, Color::WHITE);
        assert_eq!(surface.size(), (4, 3));
        assert_eq!(painted(&surface, Color::WHITE).len(), 12);
    }

    #[test]
    fn test_fill_circle_bounding_box() {
        let mut surface = RasterSurface::new(200, 200, Color::WHITE);
        surface.fill_circle(Point::new(90.0, 90.0), 20.0, RED);

        let pixels = painted(&surface, RED);
        assert_eq!(bounding_box(&pixels), (90, 90, 110, 110));
        assert_eq!(surface.pixel(100, 100), Some(RED.rgba()));
        // Corners of the bounding square stay untouched.
        assert_eq!(surface.pixel(90, 90), Some(Color::WHITE.rgba()));
    }

    #[test]
    fn test_draw_horizontal_line() {
        let mut surface = RasterSurface::new(50, 50, Color::WHITE);
        surface.draw_line(Point::new(10.0, 20.0), Point::new(30.0, 20.0), Color::BLACK, 4.0);

        let pixels = painted(&surface, Color::BLACK);
        let (x0, y0, x1, y1) = bounding_box(&pixels);
        assert_eq!((y0, y1), (18, 22));
        // Round caps extend up to half the width past each endpoint.
        assert!(x0 >= 8 && x0 <= 10);
        assert!(x1 >= 30 && x1 <= 32);
        assert_eq!(surface.pixel(20, 20), Some(Color::BLACK.rgba()));
        assert_eq!(surface.pixel(20, 25), Some(Color::WHITE.rgba()));
    }

    #[test]
    fn test_degenerate_line_is_a_dot() {
        let mut surface = RasterSurface::new(20, 20, Color::WHITE);
        surface.draw_line(Point::new(5.0, 5.0), Point::new(5.0, 5.0), RED, 6.0);
        assert!(!painted(&surface, RED).is_empty());
        assert_eq!(surface.pixel(5, 5), Some(RED.rgba()));
    }

    #[test]
    fn test_drawing_outside_canvas_is_clipped() {
        let mut surface = RasterSurface::new(10, 10, Color::WHITE);
        surface.draw_line(Point::new(-100.0, 5.0), Point::new(1e9, 5.0), RED, 2.0);
        surface.fill_circle(Point::new(-50.0, -50.0), 10.0, RED);
        let pixels = painted(&surface, RED);
        assert_eq!(pixels.len(), 20);
        assert!(pixels.iter().all(|&(_, y)| y == 4 || y == 5));
    }

    #[test]
    fn test_fill_resets_everything() {
        let mut surface = RasterSurface::new(8, 8, Color::WHITE);
        surface.fill_circle(Point::new(0.0, 0.0), 8.0, RED);
        surface.fill(surface.background());
        assert!(painted(&surface, RED).is_empty());
    }

    #[test]
    fn test_snapshot_is_png_of_current_state() {
        let mut surface = RasterSurface::new(16, 9, Color::WHITE);
        surface.fill_circle(Point::new(2.0, 2.0), 4.0, RED);
        let bytes = surface.capture_snapshot().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8();
        assert_eq!(decoded.dimensions(), (16, 9));
        assert_eq!(decoded.get_pixel(4, 4), &RED.rgba());
    }
}
