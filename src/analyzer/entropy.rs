//! Shannon entropy over the whole image, per channel, and per block.

use super::{into_payload, Analyzer, Payload};
use crate::config::Config;
use anyhow::{Context, Result};
use image::{imageops::FilterType, GrayImage, Luma, RgbImage};
use serde_json::{json, Value};
use std::path::Path;

const MAP_FILENAME: &str = "entropy_map.png";

pub struct EntropyAnalyzer {
    block_size: u32,
    suspicious_factor: f64,
    max_suspicious_blocks: usize,
}

struct Block {
    x: u32,
    y: u32,
    entropy: f64,
}

impl EntropyAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            block_size: cfg.entropy.block_size.max(1),
            suspicious_factor: cfg.entropy.suspicious_factor,
            max_suspicious_blocks: cfg.entropy.max_suspicious_blocks,
        }
    }

    fn blocks(&self, rgb: &RgbImage) -> Vec<Block> {
        let (width, height) = rgb.dimensions();
        let bs = self.block_size;
        let mut blocks = Vec::new();
        let mut by = 0;
        while by + bs <= height {
            let mut bx = 0;
            while bx + bs <= width {
                let mut hist = [0u64; 256];
                for y in by..by + bs {
                    for x in bx..bx + bs {
                        for v in rgb.get_pixel(x, y).0 {
                            hist[v as usize] += 1;
                        }
                    }
                }
                blocks.push(Block {
                    x: bx,
                    y: by,
                    entropy: shannon_entropy(&hist),
                });
                bx += bs;
            }
            by += bs;
        }
        blocks
    }

    fn write_map(&self, rgb: &RgbImage, blocks: &[Block], out_dir: &Path) -> Result<Option<String>> {
        let (width, height) = rgb.dimensions();
        let (map_w, map_h) = (width / self.block_size, height / self.block_size);
        let max = blocks.iter().map(|b| b.entropy).fold(0.0_f64, f64::max);
        if map_w == 0 || map_h == 0 || max <= 0.0 {
            return Ok(None);
        }
        let mut map = GrayImage::new(map_w, map_h);
        for b in blocks {
            let (mx, my) = (b.x / self.block_size, b.y / self.block_size);
            if mx < map_w && my < map_h {
                map.put_pixel(mx, my, Luma([((b.entropy / max) * 255.0) as u8]));
            }
        }
        let scaled = image::imageops::resize(&map, width, height, FilterType::Nearest);
        scaled
            .save(out_dir.join(MAP_FILENAME))
            .with_context(|| "write entropy map")?;
        Ok(Some(MAP_FILENAME.to_string()))
    }
}

impl Analyzer for EntropyAnalyzer {
    fn description(&self) -> &str {
        "Shannon entropy per channel and per block"
    }

    fn analyze(&self, input: &Path, out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let rgb = image::open(input)
            .with_context(|| format!("decode image {}", input.display()))?
            .to_rgb8();

        let mut all = [0u64; 256];
        let mut per_channel = [[0u64; 256]; 3];
        for px in rgb.pixels() {
            for (c, v) in px.0.iter().enumerate() {
                all[*v as usize] += 1;
                per_channel[c][*v as usize] += 1;
            }
        }
        let overall = round4(shannon_entropy(&all));
        let channels: Vec<f64> = per_channel.iter().map(|h| round4(shannon_entropy(h))).collect();

        let blocks = self.blocks(&rgb);
        let mut block_stats = json!({});
        let mut suspicious = Vec::new();
        if !blocks.is_empty() {
            let avg = blocks.iter().map(|b| b.entropy).sum::<f64>() / blocks.len() as f64;
            let min = blocks.iter().map(|b| b.entropy).fold(f64::INFINITY, f64::min);
            let max = blocks.iter().map(|b| b.entropy).fold(0.0_f64, f64::max);
            block_stats = json!({
                "average": round4(avg),
                "min": round4(min),
                "max": round4(max),
            });
            let threshold = avg * self.suspicious_factor;
            suspicious = blocks
                .iter()
                .filter(|b| b.entropy > threshold)
                .take(self.max_suspicious_blocks)
                .map(|b| {
                    json!({
                        "x": b.x,
                        "y": b.y,
                        "entropy": round4(b.entropy),
                        "difference": round4(b.entropy - avg),
                    })
                })
                .collect();
        }

        let map_file = self.write_map(&rgb, &blocks, out_dir)?;
        let interpretation = interpret(overall, &channels, suspicious.len());

        Ok(into_payload(json!({
            "overall_entropy": overall,
            "channel_entropy": { "R": channels[0], "G": channels[1], "B": channels[2] },
            "block_entropy": block_stats,
            "suspicious_blocks": suspicious,
            "entropy_map_file": map_file,
            "interpretation": interpretation,
        })))
    }
}

pub fn shannon_entropy(hist: &[u64]) -> f64 {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    hist.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn interpret(overall: f64, channels: &[f64], suspicious: usize) -> Vec<String> {
    let mut lines = Vec::new();
    if overall < 3.0 {
        lines.push("Low entropy: low complexity or repetitive patterns".to_string());
    } else if overall > 7.5 {
        lines.push("High entropy: highly complex, or encrypted/compressed data present".to_string());
    } else {
        lines.push("Normal entropy for a natural image".to_string());
    }
    if suspicious > 0 {
        lines.push(format!("{suspicious} blocks with unusually high entropy"));
    }
    let hi = channels.iter().cloned().fold(f64::MIN, f64::max);
    let lo = channels.iter().cloned().fold(f64::MAX, f64::min);
    if hi - lo > 2.0 {
        lines.push("Large entropy gap between color channels, possible embedding".to_string());
    }
    lines
}
