//! Image generation (C7): turn a character profile into a portrait, with a
//! deterministic placeholder fallback that never lets a provider failure
//! abort the pipeline.
//!
//! The placeholder renderer draws directly with the `image` crate rather
//! than pulling in a font-rendering stack: a small hand-authored bitmap font
//! is enough for initials and a footer label, and it keeps this module's
//! dependency footprint limited to a crate already in the workspace.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{ImageBuffer, Rgb, RgbImage};
use serde::Serialize;

use crate::error::ImageProviderError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const PLACEHOLDER_SIZE: u32 = 512;

/// Outcome of one image generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    Real,
    Placeholder,
}

/// A generated portrait ready to persist.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub path: PathBuf,
    pub prompt: String,
    pub outcome: ImageOutcome,
    pub duration_ms: u64,
}

/// Text-to-image backend contract. One HTTP-backed implementation
/// (`HttpImageProvider`) ships here; tests substitute a fake.
pub trait ImageProvider: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        seed: u32,
        aspect_ratio: &str,
    ) -> Result<Vec<u8>, ImageProviderError>;
}

/// Generic REST text-to-image client: POST a JSON body, read back raw image
/// bytes. Matches the shape of the provider-agnostic HTTP contract this
/// component is specified against.
pub struct HttpImageProvider {
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpImageProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from the `STORYMIND_IMAGE_API_KEY` / `STORYMIND_IMAGE_ENDPOINT`
    /// environment variables.
    pub fn from_env() -> Result<Self, ImageProviderError> {
        let endpoint = std::env::var("STORYMIND_IMAGE_ENDPOINT").map_err(|_| {
            ImageProviderError::Transport("STORYMIND_IMAGE_ENDPOINT not set".to_string())
        })?;
        let api_key = std::env::var("STORYMIND_IMAGE_API_KEY").map_err(|_| {
            ImageProviderError::Transport("STORYMIND_IMAGE_API_KEY not set".to_string())
        })?;
        Ok(Self::new(endpoint, api_key))
    }
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    seed: u32,
    aspect_ratio: &'a str,
    safety_filter: &'static str,
}

impl ImageProvider for HttpImageProvider {
    fn generate(
        &self,
        prompt: &str,
        seed: u32,
        aspect_ratio: &str,
    ) -> Result<Vec<u8>, ImageProviderError> {
        let request = ImageRequest {
            prompt,
            seed,
            aspect_ratio,
            safety_filter: "permissive",
        };

        let response = ureq::post(&self.endpoint)
            .set("authorization", &format!("Bearer {}", self.api_key))
            .set("content-type", "application/json")
            .timeout(self.timeout)
            .send_json(&request);

        let response = match response {
            Ok(r) => r,
            Err(ureq::Error::Status(429, _)) => return Err(ImageProviderError::QuotaExceeded),
            Err(ureq::Error::Status(422, _)) => return Err(ImageProviderError::Refusal),
            Err(ureq::Error::Status(400, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                if body.to_lowercase().contains("content") || body.to_lowercase().contains("safety")
                {
                    return Err(ImageProviderError::ContentFiltered);
                }
                return Err(ImageProviderError::Transport(format!("bad request: {body}")));
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(ImageProviderError::Transport(format!(
                    "provider returned {code}: {body}"
                )));
            }
            Err(e) => return Err(ImageProviderError::Transport(e.to_string())),
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| ImageProviderError::Transport(e.to_string()))?;
        Ok(bytes)
    }
}

/// Build the image generation prompt from a canonical description, style
/// string, and seed.
pub fn build_prompt(description: &str, style: &str, seed: u32) -> String {
    format!("{description}, {style} [ID: {seed}]")
}

/// Slugify a character name for use in a deterministic filename.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Attempt to generate a real portrait via `provider`; on any provider
/// error, fall back to a deterministic placeholder. The caller never sees
/// a provider error — this always produces a `GeneratedImage`.
pub fn generate_image(
    provider: &dyn ImageProvider,
    image_dir: &Path,
    name: &str,
    description: &str,
    style: &str,
    seed: u32,
    aspect_ratio: &str,
) -> std::io::Result<GeneratedImage> {
    let started = Instant::now();
    let prompt = build_prompt(description, style, seed);

    match provider.generate(&prompt, seed, aspect_ratio) {
        Ok(bytes) => {
            let path = image_dir.join(format!("{}_{}.png", slugify(name), seed));
            std::fs::write(&path, &bytes)?;
            tracing::info!("generated real portrait for '{name}' at {:?}", path);
            Ok(GeneratedImage {
                path,
                prompt,
                outcome: ImageOutcome::Real,
                duration_ms: started.elapsed().as_millis() as u64,
            })
        }
        Err(err) => {
            tracing::warn!("image provider failed for '{name}', falling back to placeholder: {err}");
            let path = image_dir.join(format!("{}_{}.png", slugify(name), seed));
            render_placeholder(name, seed, &path)?;
            Ok(GeneratedImage {
                path,
                prompt,
                outcome: ImageOutcome::Placeholder,
                duration_ms: started.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Render and save a deterministic placeholder portrait: a solid
/// seed-derived background, the character's initials, and a footer label.
pub fn render_placeholder(name: &str, seed: u32, path: &Path) -> std::io::Result<()> {
    let image = render_placeholder_image(name, seed);
    image
        .save(path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

fn render_placeholder_image(name: &str, seed: u32) -> RgbImage {
    let bg = seed_to_color(seed);
    let fg = contrasting_color(bg);
    let mut image: RgbImage = ImageBuffer::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, bg);

    let initials = initials_of(name);
    draw_text_centered(&mut image, &initials, PLACEHOLDER_SIZE / 2 - 80, 10.0, fg);
    draw_text_centered(&mut image, "PLACEHOLDER", PLACEHOLDER_SIZE - 40, 3.0, fg);

    image
}

fn initials_of(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|w| w.chars().next())
        .map(|c| c.to_ascii_uppercase())
        .take(2)
        .collect();
    if initials.is_empty() {
        "??".to_string()
    } else {
        initials
    }
}

fn seed_to_color(seed: u32) -> Rgb<u8> {
    let bytes = seed.to_be_bytes();
    // Keep channels away from the extremes so both light and dark glyph
    // colors remain legible against it.
    Rgb([
        64 + (bytes[0] % 160),
        64 + (bytes[1] % 160),
        64 + (bytes[2] % 160),
    ])
}

fn contrasting_color(bg: Rgb<u8>) -> Rgb<u8> {
    let luma = 0.299 * bg[0] as f32 + 0.587 * bg[1] as f32 + 0.114 * bg[2] as f32;
    if luma > 140.0 {
        Rgb([20, 20, 20])
    } else {
        Rgb([235, 235, 235])
    }
}

/// A minimal 3x5 bitmap font covering A-Z, 0-9, and '?', enough to render
/// initials and a short footer label without a font-rendering dependency.
fn glyph(c: char) -> [[bool; 3]; 5] {
    const ON: bool = true;
    const OFF: bool = false;
    match c.to_ascii_uppercase() {
        'A' => [[OFF, ON, OFF], [ON, OFF, ON], [ON, ON, ON], [ON, OFF, ON], [ON, OFF, ON]],
        'B' => [[ON, ON, OFF], [ON, OFF, ON], [ON, ON, OFF], [ON, OFF, ON], [ON, ON, OFF]],
        'C' => [[OFF, ON, ON], [ON, OFF, OFF], [ON, OFF, OFF], [ON, OFF, OFF], [OFF, ON, ON]],
        'D' => [[ON, ON, OFF], [ON, OFF, ON], [ON, OFF, ON], [ON, OFF, ON], [ON, ON, OFF]],
        'E' => [[ON, ON, ON], [ON, OFF, OFF], [ON, ON, OFF], [ON, OFF, OFF], [ON, ON, ON]],
        'F' => [[ON, ON, ON], [ON, OFF, OFF], [ON, ON, OFF], [ON, OFF, OFF], [ON, OFF, OFF]],
        'G' => [[OFF, ON, ON], [ON, OFF, OFF], [ON, OFF, ON], [ON, OFF, ON], [OFF, ON, ON]],
        'H' => [[ON, OFF, ON], [ON, OFF, ON], [ON, ON, ON], [ON, OFF, ON], [ON, OFF, ON]],
        'I' => [[ON, ON, ON], [OFF, ON, OFF], [OFF, ON, OFF], [OFF, ON, OFF], [ON, ON, ON]],
        'J' => [[OFF, OFF, ON], [OFF, OFF, ON], [OFF, OFF, ON], [ON, OFF, ON], [OFF, ON, OFF]],
        'K' => [[ON, OFF, ON], [ON, ON, OFF], [ON, OFF, OFF], [ON, ON, OFF], [ON, OFF, ON]],
        'L' => [[ON, OFF, OFF], [ON, OFF, OFF], [ON, OFF, OFF], [ON, OFF, OFF], [ON, ON, ON]],
        'M' => [[ON, OFF, ON], [ON, ON, ON], [ON, ON, ON], [ON, OFF, ON], [ON, OFF, ON]],
        'N' => [[ON, OFF, ON], [ON, ON, ON], [ON, ON, ON], [ON, OFF, ON], [ON, OFF, ON]],
        'O' => [[OFF, ON, OFF], [ON, OFF, ON], [ON, OFF, ON], [ON, OFF, ON], [OFF, ON, OFF]],
        'P' => [[ON, ON, OFF], [ON, OFF, ON], [ON, ON, OFF], [ON, OFF, OFF], [ON, OFF, OFF]],
        'Q' => [[OFF, ON, OFF], [ON, OFF, ON], [ON, OFF, ON], [ON, ON, OFF], [OFF, ON, ON]],
        'R' => [[ON, ON, OFF], [ON, OFF, ON], [ON, ON, OFF], [ON, ON, OFF], [ON, OFF, ON]],
        'S' => [[OFF, ON, ON], [ON, OFF, OFF], [OFF, ON, OFF], [OFF, OFF, ON], [ON, ON, OFF]],
        'T' => [[ON, ON, ON], [OFF, ON, OFF], [OFF, ON, OFF], [OFF, ON, OFF], [OFF, ON, OFF]],
        'U' => [[ON, OFF, ON], [ON, OFF, ON], [ON, OFF, ON], [ON, OFF, ON], [OFF, ON, OFF]],
        'V' => [[ON, OFF, ON], [ON, OFF, ON], [ON, OFF, ON], [OFF, ON, OFF], [OFF, ON, OFF]],
        'W' => [[ON, OFF, ON], [ON, OFF, ON], [ON, ON, ON], [ON, ON, ON], [ON, OFF, ON]],
        'X' => [[ON, OFF, ON], [ON, OFF, ON], [OFF, ON, OFF], [ON, OFF, ON], [ON, OFF, ON]],
        'Y' => [[ON, OFF, ON], [ON, OFF, ON], [OFF, ON, OFF], [OFF, ON, OFF], [OFF, ON, OFF]],
        'Z' => [[ON, ON, ON], [OFF, OFF, ON], [OFF, ON, OFF], [ON, OFF, OFF], [ON, ON, ON]],
        '0' => [[ON, ON, ON], [ON, OFF, ON], [ON, OFF, ON], [ON, OFF, ON], [ON, ON, ON]],
        '1' => [[OFF, ON, OFF], [ON, ON, OFF], [OFF, ON, OFF], [OFF, ON, OFF], [ON, ON, ON]],
        _ => [[OFF, ON, OFF], [ON, OFF, ON], [OFF, OFF, ON], [OFF, ON, OFF], [OFF, ON, OFF]],
    }
}

/// Draw `text` horizontally centered at vertical offset `y`, each glyph cell
/// scaled by `scale` pixels per bitmap dot.
fn draw_text_centered(image: &mut RgbImage, text: &str, y: u32, scale: f32, color: Rgb<u8>) {
    let cell = scale.max(1.0) as u32;
    let glyph_width = 3 * cell + cell; // 3 columns plus inter-glyph gap
    let total_width = glyph_width * text.len() as u32;
    let start_x = PLACEHOLDER_SIZE.saturating_sub(total_width) / 2;

    for (i, c) in text.chars().enumerate() {
        let rows = glyph(c);
        let gx = start_x + i as u32 * glyph_width;
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, &on) in row.iter().enumerate() {
                if !on {
                    continue;
                }
                let px = gx + col_idx as u32 * cell;
                let py = y + row_idx as u32 * cell;
                for dx in 0..cell {
                    for dy in 0..cell {
                        let x = px + dx;
                        let yy = py + dy;
                        if x < PLACEHOLDER_SIZE && yy < PLACEHOLDER_SIZE {
                            image.put_pixel(x, yy, color);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider {
        result: Result<Vec<u8>, ImageProviderError>,
    }

    impl ImageProvider for FakeProvider {
        fn generate(
            &self,
            _prompt: &str,
            _seed: u32,
            _aspect_ratio: &str,
        ) -> Result<Vec<u8>, ImageProviderError> {
            match &self.result {
                Ok(bytes) => Ok(bytes.clone()),
                Err(ImageProviderError::Refusal) => Err(ImageProviderError::Refusal),
                Err(ImageProviderError::QuotaExceeded) => Err(ImageProviderError::QuotaExceeded),
                Err(ImageProviderError::ContentFiltered) => Err(ImageProviderError::ContentFiltered),
                Err(ImageProviderError::Transport(s)) => Err(ImageProviderError::Transport(s.clone())),
            }
        }
    }

    #[test]
    fn slugify_normalizes_punctuation_and_case() {
        assert_eq!(slugify("Harry Potter"), "harry-potter");
        assert_eq!(slugify("Mrs. Dursley"), "mrs-dursley");
    }

    #[test]
    fn build_prompt_includes_style_and_seed_tag() {
        let prompt = build_prompt("a tall man with dark hair", "photorealistic", 42);
        assert_eq!(prompt, "a tall man with dark hair, photorealistic [ID: 42]");
    }

    #[test]
    fn generate_image_uses_real_outcome_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider {
            result: Ok(vec![0x89, 0x50, 0x4e, 0x47]),
        };
        let result = generate_image(
            &provider,
            dir.path(),
            "Harry Potter",
            "a description",
            "photorealistic",
            42,
            "1:1",
        )
        .unwrap();
        assert_eq!(result.outcome, ImageOutcome::Real);
        assert!(result.path.exists());
    }

    #[test]
    fn generate_image_falls_back_to_placeholder_on_quota_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider {
            result: Err(ImageProviderError::QuotaExceeded),
        };
        let result = generate_image(
            &provider,
            dir.path(),
            "Harry Potter",
            "a description",
            "photorealistic",
            42,
            "1:1",
        )
        .unwrap();
        assert_eq!(result.outcome, ImageOutcome::Placeholder);
        assert!(result.path.exists());
    }

    #[test]
    fn generate_image_falls_back_on_refusal_and_content_filter_too() {
        let dir = tempfile::tempdir().unwrap();
        for err in [ImageProviderError::Refusal, ImageProviderError::ContentFiltered] {
            let provider = FakeProvider { result: Err(err) };
            let result = generate_image(
                &provider,
                dir.path(),
                "Ron Weasley",
                "a description",
                "photorealistic",
                7,
                "1:1",
            )
            .unwrap();
            assert_eq!(result.outcome, ImageOutcome::Placeholder);
        }
    }

    #[test]
    fn placeholder_filenames_are_deterministic_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harry-potter_42.png");
        render_placeholder("Harry Potter", 42, &path).unwrap();
        let first_len = std::fs::metadata(&path).unwrap().len();
        render_placeholder("Harry Potter", 42, &path).unwrap();
        let second_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(first_len, second_len);
    }

    #[test]
    fn initials_are_derived_from_first_letters() {
        assert_eq!(initials_of("Harry Potter"), "HP");
        assert_eq!(initials_of("Cher"), "C");
        assert_eq!(initials_of(""), "??");
    }
}
