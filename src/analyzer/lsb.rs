//! Bit-plane extraction: one black/white image per channel bit.

use super::{into_payload, Analyzer, Payload};
use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

const CHANNELS: [&str; 3] = ["R", "G", "B"];

pub struct LsbAnalyzer;

impl LsbAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LsbAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for LsbAnalyzer {
    fn description(&self) -> &str {
        "bit-plane images for every RGB channel bit"
    }

    fn analyze(&self, input: &Path, out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let img = image::open(input).with_context(|| format!("decode image {}", input.display()))?;
        let mode = format!("{:?}", img.color());
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut planes = Vec::with_capacity(CHANNELS.len() * 8);
        for (channel_idx, channel) in CHANNELS.iter().enumerate() {
            for bit in 0..8u8 {
                let plane = GrayImage::from_fn(width, height, |x, y| {
                    let value = rgb.get_pixel(x, y).0[channel_idx];
                    Luma([((value >> bit) & 1) * 255])
                });
                let filename = format!("lsb_{channel}{bit}.png");
                plane
                    .save(out_dir.join(&filename))
                    .with_context(|| format!("write bit plane {filename}"))?;
                planes.push(json!({
                    "channel": channel,
                    "bit": bit,
                    "filename": filename,
                }));
            }
        }
        debug!("lsb wrote {} planes for {}x{}", planes.len(), width, height);

        Ok(into_payload(json!({
            "width": width,
            "height": height,
            "mode": mode,
            "bit_planes": planes,
        })))
    }
}
