use super::{into_payload, Analyzer, Payload};
use crate::config::Config;
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

const HIST_WIDTH: u32 = 512;
const HIST_HEIGHT: u32 = 256;
const PALETTE_FILENAME: &str = "color_palette.png";
const PALETTE_WIDTH: u32 = 500;
const PALETTE_HEIGHT: u32 = 100;

/// Colour census: dominant colours, per-channel histograms, palette strip.
pub struct ColorAnalyzer {
    dominant_limit: usize,
}

impl ColorAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            dominant_limit: cfg.color.dominant_limit.max(1),
        }
    }
}

impl Analyzer for ColorAnalyzer {
    fn description(&self) -> &str {
        "colour palette, dominant colours and RGB histograms"
    }

    fn analyze(&self, input: &Path, out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let rgb = image::open(input)
            .with_context(|| format!("decode image {}", input.display()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        let total = u64::from(width) * u64::from(height);

        let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
        let mut hist = [[0u64; 256]; 3];
        for px in rgb.pixels() {
            *counts.entry(px.0).or_default() += 1;
            for (c, v) in px.0.iter().enumerate() {
                hist[c][*v as usize] += 1;
            }
        }

        let dominant = dominant_colors(&counts, self.dominant_limit);
        let diversity = if total == 0 {
            0.0
        } else {
            counts.len() as f64 / total as f64
        };

        let mut histograms = serde_json::Map::new();
        for (c, (channel, color)) in [("R", [255, 0, 0]), ("G", [0, 255, 0]), ("B", [0, 0, 255])]
            .into_iter()
            .enumerate()
        {
            let filename = format!("histogram_{channel}.png");
            histogram_image(&hist[c], Rgb(color))
                .save(out_dir.join(&filename))
                .with_context(|| format!("write {filename}"))?;
            histograms.insert(channel.to_string(), json!(filename));
        }

        let palette_file = if dominant.is_empty() {
            None
        } else {
            palette_image(&dominant)
                .save(out_dir.join(PALETTE_FILENAME))
                .with_context(|| "write colour palette")?;
            Some(PALETTE_FILENAME)
        };

        let dominant_json: Vec<Value> = dominant
            .iter()
            .map(|(rgb, count)| {
                json!({
                    "rgb": rgb,
                    "hex": format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2]),
                    "count": count,
                    "percentage": round2(*count as f64 * 100.0 / total as f64),
                })
            })
            .collect();

        Ok(into_payload(json!({
            "width": width,
            "height": height,
            "total_pixels": total,
            "unique_colors": counts.len(),
            "color_diversity": diversity,
            "dominant_colors": dominant_json,
            "histograms": histograms,
            "palette_file": palette_file,
        })))
    }
}

/// Most frequent colours first; ties broken by colour value so output is stable.
pub fn dominant_colors(counts: &HashMap<[u8; 3], u64>, limit: usize) -> Vec<([u8; 3], u64)> {
    let mut all: Vec<([u8; 3], u64)> = counts.iter().map(|(c, n)| (*c, *n)).collect();
    all.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    all.truncate(limit);
    all
}

fn histogram_image(hist: &[u64; 256], color: Rgb<u8>) -> RgbImage {
    let max = hist.iter().copied().max().unwrap_or(0).max(1) as f64;
    let mut img = RgbImage::new(HIST_WIDTH, HIST_HEIGHT);
    for (i, count) in hist.iter().enumerate() {
        let bar = ((*count as f64 / max) * f64::from(HIST_HEIGHT - 10)) as u32;
        let x0 = i as u32 * HIST_WIDTH / 256;
        let x1 = (i as u32 + 1) * HIST_WIDTH / 256;
        for y in HIST_HEIGHT - bar..HIST_HEIGHT {
            for x in x0..x1.min(HIST_WIDTH) {
                img.put_pixel(x, y, color);
            }
        }
    }
    img
}

fn palette_image(dominant: &[([u8; 3], u64)]) -> RgbImage {
    let stripe = PALETTE_WIDTH / dominant.len() as u32;
    RgbImage::from_fn(PALETTE_WIDTH, PALETTE_HEIGHT, |x, _| {
        let idx = (x / stripe.max(1)) as usize;
        match dominant.get(idx) {
            Some((rgb, _)) => Rgb(*rgb),
            None => Rgb([0, 0, 0]),
        }
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
