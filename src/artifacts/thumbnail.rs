//! Software renderer for type thumbnails.
//!
//! Meshes are projected orthographically onto the x/y plane (front view, y
//! pointing down as in the EM volume). Neurons are z-buffered and flat
//! shaded; the optional backdrop is drawn as a flat silhouette behind them.

use super::mesh::{Bounds, Mesh};
use crate::error::{BuildError, BuildResult};
use image::{ImageFormat, Rgba, RgbaImage};
use std::path::Path;

pub const THUMBNAIL_WIDTH: u32 = 400;
pub const THUMBNAIL_HEIGHT: u32 = 300;
const PADDING: f32 = 0.05;
const BACKDROP: Rgba<u8> = Rgba([225, 225, 225, 255]);
const AMBIENT: f32 = 0.35;

/// Meshes drawn in one colour.
#[derive(Debug, Clone)]
pub struct MeshLayer<'a> {
    pub meshes: &'a [Mesh],
    pub color: [u8; 3],
}

/// Parse `#rrggbb`.
pub fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

struct Projection {
    origin: [f32; 2],
    scale: f32,
    offset: [f32; 2],
}

impl Projection {
    fn fit(bounds: Bounds, width: u32, height: u32) -> Self {
        let usable_w = width as f32 * (1.0 - 2.0 * PADDING);
        let usable_h = height as f32 * (1.0 - 2.0 * PADDING);
        let ex = bounds.extent(0).max(f32::EPSILON);
        let ey = bounds.extent(1).max(f32::EPSILON);
        let scale = (usable_w / ex).min(usable_h / ey);
        let offset = [
            (width as f32 - ex * scale) / 2.0,
            (height as f32 - ey * scale) / 2.0,
        ];
        Self {
            origin: [bounds.min[0], bounds.min[1]],
            scale,
            offset,
        }
    }

    fn project(&self, v: [f32; 3]) -> [f32; 3] {
        [
            (v[0] - self.origin[0]) * self.scale + self.offset[0],
            (v[1] - self.origin[1]) * self.scale + self.offset[1],
            v[2],
        ]
    }
}

struct Canvas {
    image: RgbaImage,
    depth: Vec<f32>,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0])),
            depth: vec![f32::INFINITY; (width * height) as usize],
        }
    }

    /// Fill a projected triangle. With `depth_test` off the pixel is painted
    /// without touching the z-buffer.
    fn fill(&mut self, tri: [[f32; 3]; 3], color: Rgba<u8>, depth_test: bool) {
        let (w, h) = self.image.dimensions();
        let [a, b, c] = tri;
        let area = edge(a, b, c);
        if area.abs() < f32::EPSILON {
            return;
        }
        let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as u32;
        let max_x = a[0].max(b[0]).max(c[0]).ceil().min(w as f32 - 1.0);
        let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as u32;
        let max_y = a[1].max(b[1]).max(c[1]).ceil().min(h as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }
        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                let p = [x as f32 + 0.5, y as f32 + 0.5, 0.0];
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let idx = (y * w + x) as usize;
                if depth_test {
                    let z = w0 * a[2] + w1 * b[2] + w2 * c[2];
                    if z >= self.depth[idx] {
                        continue;
                    }
                    self.depth[idx] = z;
                }
                self.image.put_pixel(x, y, color);
            }
        }
    }
}

fn edge(a: [f32; 3], b: [f32; 3], p: [f32; 3]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Lambert term against a light looking down the z axis.
fn shade(v: [[f32; 3]; 3], color: [u8; 3]) -> Rgba<u8> {
    let u = [v[1][0] - v[0][0], v[1][1] - v[0][1], v[1][2] - v[0][2]];
    let w = [v[2][0] - v[0][0], v[2][1] - v[0][1], v[2][2] - v[0][2]];
    let n = [
        u[1] * w[2] - u[2] * w[1],
        u[2] * w[0] - u[0] * w[2],
        u[0] * w[1] - u[1] * w[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    let lambert = if len > 0.0 { (n[2] / len).abs() } else { 0.0 };
    let k = AMBIENT + (1.0 - AMBIENT) * lambert;
    Rgba([
        (color[0] as f32 * k).round() as u8,
        (color[1] as f32 * k).round() as u8,
        (color[2] as f32 * k).round() as u8,
        255,
    ])
}

fn triangles<'m>(mesh: &'m Mesh) -> impl Iterator<Item = [[f32; 3]; 3]> + 'm {
    mesh.triangles.iter().map(move |t| {
        [
            mesh.vertices[t[0] as usize],
            mesh.vertices[t[1] as usize],
            mesh.vertices[t[2] as usize],
        ]
    })
}

/// Render the layers, framed on the backdrop when there is one and on the
/// neurons otherwise.
pub fn render(layers: &[MeshLayer<'_>], backdrop: Option<&Mesh>, width: u32, height: u32) -> BuildResult<RgbaImage> {
    let neuron_bounds = layers
        .iter()
        .flat_map(|layer| layer.meshes.iter())
        .filter_map(Mesh::bounds)
        .reduce(Bounds::union);
    let Some(neuron_bounds) = neuron_bounds else {
        return Err(BuildError::EmptySelection("thumbnail".to_string()));
    };
    let frame = backdrop
        .and_then(Mesh::bounds)
        .map(|b| b.union(neuron_bounds))
        .unwrap_or(neuron_bounds);
    let projection = Projection::fit(frame, width, height);
    let mut canvas = Canvas::new(width, height);

    if let Some(backdrop) = backdrop {
        for tri in triangles(backdrop) {
            let projected = tri.map(|v| projection.project(v));
            canvas.fill(projected, BACKDROP, false);
        }
    }
    for layer in layers {
        for mesh in layer.meshes {
            for tri in triangles(mesh) {
                let color = shade(tri, layer.color);
                let projected = tri.map(|v| projection.project(v));
                canvas.fill(projected, color, true);
            }
        }
    }
    Ok(canvas.image)
}

pub fn write_png(image: &RgbaImage, path: &Path) -> BuildResult<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| BuildError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })
}
