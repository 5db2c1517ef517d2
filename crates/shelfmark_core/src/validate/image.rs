//! Two-phase image acceptor for embedded covers and author photos.
//!
//! Phase one is a cheap synchronous gate on the data-URL shape, declared
//! MIME type and approximate payload size. Phase two actually decodes the
//! payload off-thread and catches files that lied about their header or
//! arrive corrupt. Absence of an image is always acceptable; failing either
//! phase strips the image field but never rejects the owning entity.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{error, warn};
use regex::Regex;
use std::sync::OnceLock;
use tokio::task;

/// Size ceiling for book covers, pre-encoding.
pub const MAX_IMAGE_SIZE_BYTES: usize = 500 * 1024;

/// Size ceiling for author photos. Stricter than covers: photos are shown
/// small and there are potentially many of them per page.
pub const MAX_AUTHOR_IMAGE_SIZE_BYTES: usize = 200 * 1024;

/// Raster formats we accept. No SVG and no wildcard types, which keeps
/// script-bearing formats out of the stored blob entirely.
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

fn mime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used, reason = "Static pattern, checked by tests")]
        Regex::new("^data:(image/[a-zA-Z]+);base64,").expect("MIME prefix pattern is valid")
    })
}

/// Phase one: structural check of a data URL against the MIME allow-list
/// and a size ceiling. An empty string counts as "no image" and passes.
///
/// The size estimate is base64 length times 0.75, close enough to the
/// decoded size for a ceiling check without decoding anything.
#[must_use]
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called rarely per entity"
)]
pub fn validate_image(data_url: &str, max_size_bytes: usize) -> bool {
    if data_url.is_empty() {
        return true;
    }

    if !data_url.starts_with("data:image/") {
        warn!("Validation failed: image is not a data URL");
        return false;
    }

    let mime = mime_pattern()
        .captures(data_url)
        .and_then(|captures| captures.get(1))
        .map(|matched| matched.as_str());
    match mime {
        Some(mime) if ALLOWED_MIME_TYPES.contains(&mime) => {}
        Some(mime) => {
            warn!(
                "Validation failed: image MIME type {mime} is not allowed, allowed: {}",
                ALLOWED_MIME_TYPES.join(", ")
            );
            return false;
        }
        None => {
            warn!("Validation failed: image MIME type could not be determined");
            return false;
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "Approximate size estimate only"
    )]
    let size_in_bytes = (data_url.len() as f64 * 0.75) as usize;
    if size_in_bytes > max_size_bytes {
        warn!(
            "Validation failed: image size ({}KB) exceeds limit of {}KB",
            size_in_bytes / 1024,
            max_size_bytes / 1024
        );
        return false;
    }

    true
}

/// Phase two: decode verification.
///
/// Strips the data-URL prefix, base64-decodes the payload and runs it
/// through the image decoder on a blocking worker. Returns `false` for
/// anything that fails to decode; never errors. An empty string counts as
/// "no image" and passes.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called rarely per entity"
)]
pub async fn validate_image_content(data_url: &str) -> bool {
    if data_url.is_empty() {
        return true;
    }

    let Some((_, payload)) = data_url.split_once(";base64,") else {
        warn!("Validation failed: image data URL carries no base64 payload");
        return false;
    };

    let payload = payload.to_owned();
    let decoded = task::spawn_blocking(move || {
        let bytes = STANDARD.decode(payload).ok()?;
        image::load_from_memory(&bytes).ok()
    })
    .await;

    match decoded {
        Ok(Some(_)) => true,
        Ok(None) => {
            warn!("Validation failed: image could not be decoded");
            false
        }
        Err(join_error) => {
            error!("Image decode task failed: {join_error}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1x1 red pixel, valid PNG.
    const TINY_PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAIAAACQd1PeAAAADElEQVR4nGP4z8AAAAMBAQDJ/pLvAAAAAElFTkSuQmCC";

    fn png_data_url() -> String {
        format!("data:image/png;base64,{TINY_PNG_B64}")
    }

    #[test]
    fn absent_image_is_valid() {
        assert!(validate_image("", MAX_IMAGE_SIZE_BYTES));
    }

    #[test]
    fn allowed_mime_types_pass_phase_one() {
        assert!(validate_image(&png_data_url(), MAX_IMAGE_SIZE_BYTES));
        assert!(validate_image(
            "data:image/jpeg;base64,AAAA",
            MAX_IMAGE_SIZE_BYTES
        ));
        assert!(validate_image(
            "data:image/webp;base64,AAAA",
            MAX_IMAGE_SIZE_BYTES
        ));
    }

    #[test]
    fn disallowed_mime_types_are_rejected() {
        assert!(!validate_image(
            "data:image/svg+xml;base64,AAAA",
            MAX_IMAGE_SIZE_BYTES
        ));
        assert!(!validate_image(
            "data:image/gif;base64,AAAA",
            MAX_IMAGE_SIZE_BYTES
        ));
        assert!(!validate_image(
            "data:text/html;base64,AAAA",
            MAX_IMAGE_SIZE_BYTES
        ));
        assert!(!validate_image("http://example.com/a.png", MAX_IMAGE_SIZE_BYTES));
        assert!(!validate_image("just some text", MAX_IMAGE_SIZE_BYTES));
    }

    #[test]
    fn oversized_payloads_are_rejected() {
        let oversized = format!("data:image/png;base64,{}", "A".repeat(300 * 1024));
        assert!(!validate_image(&oversized, MAX_AUTHOR_IMAGE_SIZE_BYTES));
        assert!(validate_image(&oversized, MAX_IMAGE_SIZE_BYTES));
    }

    #[tokio::test]
    async fn decodable_image_passes_phase_two() {
        assert!(validate_image_content(&png_data_url()).await);
        assert!(validate_image_content("").await);
    }

    #[tokio::test]
    async fn corrupt_payload_fails_phase_two() {
        // Claims PNG, carries garbage: passes phase one, must fail here.
        let corrupt = "data:image/png;base64,Z2FyYmFnZSBieXRlcw==";
        assert!(validate_image(corrupt, MAX_IMAGE_SIZE_BYTES));
        assert!(!validate_image_content(corrupt).await);

        let invalid_b64 = "data:image/png;base64,%%%not-base64%%%";
        assert!(!validate_image_content(invalid_b64).await);
    }
}
