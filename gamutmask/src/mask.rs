//! Gamut-mask wheel generation.
//!
//! Every source pixel is plotted on a hue/saturation wheel: hue is the angle
//! (red at the top), saturation the distance from the centre. When several
//! pixels land on the same spot the brightest one wins, so the wheel shows the
//! outline of the palette the image actually uses.

use std::f64::consts::FRAC_PI_2;
use std::io;
use std::path::Path;
use std::time::Instant;

use gamutmask_core::{Transform, TransformError, TransformOutcome};
use image::{ImageFormat, ImageReader, Rgb, RgbImage, Rgba, RgbaImage};
use tracing::info;

/// Geometry of the generated wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskSettings {
    pub width: u32,
    pub height: u32,
    /// Gap between the wheel and the left/right edge.
    pub padding_x: u32,
    /// Gap between the wheel and the top/bottom edge.
    pub padding_y: u32,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            width: 250,
            height: 250,
            padding_x: 2,
            padding_y: 2,
        }
    }
}

impl MaskSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "wheel must be at least 1x1, got {}x{}",
                self.width, self.height
            ));
        }
        if u64::from(self.padding_x) * 2 >= u64::from(self.width)
            || u64::from(self.padding_y) * 2 >= u64::from(self.height)
        {
            return Err(format!(
                "padding {}x{} leaves no room for a {}x{} wheel",
                self.padding_x, self.padding_y, self.width, self.height
            ));
        }
        Ok(())
    }

    fn center(&self) -> (f64, f64) {
        (f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    fn radii(&self) -> (f64, f64) {
        let (cx, cy) = self.center();
        (
            (cx - f64::from(self.padding_x)).max(0.5),
            (cy - f64::from(self.padding_y)).max(0.5),
        )
    }
}

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
fn hsv(pixel: &Rgb<u8>) -> (f64, f64, f64) {
    let [r, g, b] = pixel.0.map(|channel| f64::from(channel) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn value_of(pixel: &Rgba<u8>) -> f64 {
    f64::from(pixel.0[0].max(pixel.0[1]).max(pixel.0[2])) / 255.0
}

/// Draw the wheel for `source`.
///
/// The canvas starts transparent with an opaque black ellipse inset by the
/// padding. A zero-sized canvas comes back empty.
pub fn generate_gamut_mask(source: &RgbImage, settings: &MaskSettings) -> RgbaImage {
    let (cx, cy) = settings.center();
    let (rx, ry) = settings.radii();

    let mut wheel = RgbaImage::from_fn(settings.width, settings.height, |x, y| {
        let dx = (f64::from(x) + 0.5 - cx) / rx;
        let dy = (f64::from(y) + 0.5 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    if wheel.width() == 0 || wheel.height() == 0 {
        return wheel;
    }
    let max_x = f64::from(settings.width.saturating_sub(1));
    let max_y = f64::from(settings.height.saturating_sub(1));

    for pixel in source.pixels() {
        let (hue, saturation, value) = hsv(pixel);
        let angle = hue.to_radians() - FRAC_PI_2;
        let x = (angle.cos() * saturation * rx + cx).floor().clamp(0.0, max_x) as u32;
        let y = (angle.sin() * saturation * ry + cy).floor().clamp(0.0, max_y) as u32;

        let current = wheel.get_pixel(x, y);
        if value_of(current) < value {
            let [r, g, b] = pixel.0;
            wheel.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }

    wheel
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// [`Transform`] that decodes a JPEG/PNG and writes its wheel as PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct GamutMaskTransform {
    settings: MaskSettings,
}

impl GamutMaskTransform {
    pub fn new(settings: MaskSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MaskSettings {
        &self.settings
    }
}

impl Transform for GamutMaskTransform {
    fn transform(&self, output: &Path, input: &Path) -> Result<TransformOutcome, TransformError> {
        let started = Instant::now();
        self.settings
            .validate()
            .map_err(|reason| TransformError::Write {
                path: output.to_path_buf(),
                reason,
            })?;

        let reader = match ImageReader::open(input) {
            Ok(reader) => reader,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(TransformOutcome::InputMissing);
            }
            Err(source) => {
                return Err(TransformError::Read {
                    path: input.to_path_buf(),
                    source,
                });
            }
        };
        let reader = reader
            .with_guessed_format()
            .map_err(|source| TransformError::Read {
                path: input.to_path_buf(),
                source,
            })?;
        let image = reader.decode().map_err(|err| TransformError::Decode {
            path: input.to_path_buf(),
            reason: err.to_string(),
        })?;

        let source = image.to_rgb8();
        let wheel = generate_gamut_mask(&source, &self.settings);
        wheel
            .save_with_format(output, ImageFormat::Png)
            .map_err(|err| TransformError::Write {
                path: output.to_path_buf(),
                reason: err.to_string(),
            })?;

        let pixels = u64::from(source.width()) * u64::from(source.height());
        info!(
            "  {:8.2}s ({}px)",
            started.elapsed().as_secs_f64(),
            group_thousands(pixels)
        );

        Ok(TransformOutcome::Produced {
            width: self.settings.width,
            height: self.settings.height,
        })
    }
}
