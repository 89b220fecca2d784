//! Manipulation heuristics: error level analysis, JPEG quality estimate,
//! a double-compression hint and exact block cloning.

use super::{into_payload, Analyzer, Payload};
use crate::config::Config;
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const ELA_FILENAME: &str = "ela_result.png";
const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;

pub struct ForensicsAnalyzer {
    ela_quality: u8,
    clone_block_size: u32,
    max_clone_matches: usize,
}

impl ForensicsAnalyzer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            ela_quality: cfg.forensics.ela_quality.clamp(1, 100),
            clone_block_size: cfg.forensics.clone_block_size.max(2),
            max_clone_matches: cfg.forensics.max_clone_matches,
        }
    }

    fn error_level(&self, rgb: &RgbImage, out_dir: &Path) -> Result<u8> {
        let recompressed = decode_jpeg(&encode_jpeg(rgb, self.ela_quality)?)?;
        let mut diff = RgbImage::new(rgb.width(), rgb.height());
        let mut max_diff = 0u8;
        for (x, y, px) in rgb.enumerate_pixels() {
            let other = recompressed.get_pixel(x, y);
            let d = [0usize, 1, 2].map(|c| px.0[c].abs_diff(other.0[c]));
            max_diff = max_diff.max(d[0]).max(d[1]).max(d[2]);
            diff.put_pixel(x, y, Rgb(d));
        }
        if max_diff > 0 {
            let scale = 255.0 / f64::from(max_diff);
            for px in diff.pixels_mut() {
                px.0 = px.0.map(|v| (f64::from(v) * scale).min(255.0) as u8);
            }
        }
        diff.save(out_dir.join(ELA_FILENAME))
            .with_context(|| "write ELA image")?;
        Ok(max_diff)
    }

    /// Positions of non-flat blocks whose pixels repeat exactly elsewhere.
    fn cloned_blocks(&self, gray: &GrayImage) -> Vec<Value> {
        let bs = self.clone_block_size;
        let (width, height) = gray.dimensions();
        let mut seen: HashMap<Vec<u8>, (u32, u32)> = HashMap::new();
        let mut matches = Vec::new();
        let mut y = 0;
        while y + bs <= height && matches.len() < self.max_clone_matches {
            let mut x = 0;
            while x + bs <= width && matches.len() < self.max_clone_matches {
                let block: Vec<u8> = (y..y + bs)
                    .flat_map(|yy| (x..x + bs).map(move |xx| (xx, yy)))
                    .map(|(xx, yy)| gray.get_pixel(xx, yy).0[0])
                    .collect();
                let flat = block.iter().all(|v| *v == block[0]);
                if !flat {
                    match seen.entry(block) {
                        Entry::Occupied(first) => {
                            let (sx, sy) = *first.get();
                            matches.push(json!({ "source": [sx, sy], "copy": [x, y] }));
                        }
                        Entry::Vacant(slot) => {
                            slot.insert((x, y));
                        }
                    }
                }
                x += bs;
            }
            y += bs;
        }
        matches
    }
}

impl Analyzer for ForensicsAnalyzer {
    fn description(&self) -> &str {
        "error level analysis, JPEG quality and cloning heuristics"
    }

    fn analyze(&self, input: &Path, out_dir: &Path, _params: Option<&Value>) -> Result<Payload> {
        let img = image::open(input).with_context(|| format!("decode image {}", input.display()))?;
        let rgb = img.to_rgb8();

        let mut payload = json!({
            "ela_performed": false,
            "ela_file": null,
            "findings": [],
            "manipulation_likelihood": "Unknown",
        });
        match self.error_level(&rgb, out_dir) {
            Ok(max_diff) => {
                payload["ela_performed"] = json!(true);
                payload["ela_file"] = json!(ELA_FILENAME);
                payload["max_difference"] = json!(max_diff);
                payload["findings"] = json!(ela_findings(max_diff));
                payload["manipulation_likelihood"] = json!(likelihood(max_diff));
            }
            Err(err) => {
                debug!("ELA failed: {err:#}");
                payload["error"] = json!(format!("{err:#}"));
            }
        }

        let is_jpeg = input
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "jfif"));
        let mut quality = None;
        let mut double_jpeg = false;
        if is_jpeg {
            let raw = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
            quality = quantization_tables(&raw)
                .first()
                .and_then(|t| quality_label(t));
            double_jpeg = looks_double_compressed(&rgb).unwrap_or(false);
        }
        payload["quality_estimate"] = json!(quality);
        payload["compression_level"] = json!(quality.unwrap_or("Unknown"));
        payload["double_jpeg"] = json!(double_jpeg);

        let matches = self.cloned_blocks(&img.to_luma8());
        payload["cloning_detected"] = json!({
            "analysis_performed": true,
            "method": format!("exact {0}x{0} block matching", self.clone_block_size),
            "duplicate_blocks": matches.len(),
            "matches": matches,
        });

        Ok(into_payload(payload))
    }
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(rgb)
        .with_context(|| format!("JPEG encode at quality {quality}"))?;
    Ok(buf)
}

fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .with_context(|| "JPEG decode")?
        .to_rgb8())
}

/// Re-encoding at 85 and 95 barely changes the size of an image that was
/// already compressed hard.
fn looks_double_compressed(rgb: &RgbImage) -> Result<bool> {
    let low = encode_jpeg(rgb, 85)?.len();
    let high = encode_jpeg(rgb, 95)?.len();
    Ok(high.saturating_sub(low) < 100)
}

/// Every quantization table in the header, in file order. Stops at the
/// first scan.
pub fn quantization_tables(data: &[u8]) -> Vec<Vec<u16>> {
    let mut tables = Vec::new();
    if !data.starts_with(&[0xFF, 0xD8]) {
        return tables;
    }
    let mut i = 2;
    while i + 4 <= data.len() {
        if data[i] != 0xFF {
            break;
        }
        let marker = data[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        if marker == SOS {
            break;
        }
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            i += 2;
            continue;
        }
        let len = usize::from(u16::from_be_bytes([data[i + 2], data[i + 3]]));
        let Some(segment) = data.get(i + 4..i + 2 + len) else {
            break;
        };
        if marker == DQT {
            parse_dqt(segment, &mut tables);
        }
        i += 2 + len;
    }
    tables
}

fn parse_dqt(mut seg: &[u8], tables: &mut Vec<Vec<u16>>) {
    while let Some((&pq_tq, rest)) = seg.split_first() {
        let wide = pq_tq >> 4 != 0;
        let size = if wide { 128 } else { 64 };
        let Some(body) = rest.get(..size) else {
            return;
        };
        let table = if wide {
            body.chunks_exact(2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .collect()
        } else {
            body.iter().map(|b| u16::from(*b)).collect()
        };
        tables.push(table);
        seg = &rest[size..];
    }
}

/// Coarse quality band from the mean of a quantization table.
pub fn quality_label(table: &[u16]) -> Option<&'static str> {
    if table.is_empty() {
        return None;
    }
    let avg = table.iter().map(|v| f64::from(*v)).sum::<f64>() / table.len() as f64;
    Some(if avg < 10.0 {
        "High (90-100)"
    } else if avg < 20.0 {
        "Good (75-90)"
    } else if avg < 50.0 {
        "Medium (50-75)"
    } else {
        "Low (<50)"
    })
}

pub fn ela_findings(max_diff: u8) -> Vec<&'static str> {
    let mut findings = Vec::new();
    match max_diff {
        0..=9 => findings.push("Very low error levels: heavily compressed or unmodified"),
        10..=29 => findings.push("Low error levels: likely unmodified or lightly edited"),
        30..=49 => findings.push("Moderate error levels: some editing may have occurred"),
        _ => {
            findings.push("High error levels: significant differences detected");
            findings.push("Bright areas in the ELA image may indicate manipulation");
        }
    }
    findings.push("ELA is most effective on JPEG images");
    findings
}

fn likelihood(max_diff: u8) -> &'static str {
    match max_diff {
        0..=29 => "Low",
        30..=49 => "Moderate",
        _ => "High",
    }
}
