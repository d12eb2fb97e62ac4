use image::{imageops, imageops::FilterType, RgbaImage};

pub const DEFAULT_MAX_DIMENSION: u32 = 2048;

/// Dimensions after scaling `(width, height)` uniformly so the longer side is at most
/// `max_dimension`. Never upscales; both sides round to the nearest integer and stay >= 1.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let scale = f64::from(max_dimension) / f64::from(width.max(height));
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

pub fn resize_to_bound(image: &RgbaImage, max_dimension: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = bounded_dimensions(width, height, max_dimension);

    if (new_width, new_height) == (width, height) {
        return image.clone();
    }

    imageops::resize(image, new_width, new_height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    #[test]
    fn test_landscape_is_scaled_to_bound() {
        assert_eq!(bounded_dimensions(4000, 2000, 2048), (2048, 1024));
    }

    #[test]
    fn test_portrait_rounds_to_nearest() {
        // 3000 * (2048 / 4001) = 1535.6...
        assert_eq!(bounded_dimensions(3000, 4001, 2048), (1536, 2048));
    }

    #[test]
    fn test_within_bound_is_untouched() {
        let image = RgbaImage::from_pixel(100, 50, Rgba([1, 2, 3, 4]));
        let resized = resize_to_bound(&image, 2048);
        assert_eq!(resized.dimensions(), (100, 50));
        assert_eq!(resized.as_raw(), image.as_raw());
    }

    #[test]
    fn test_resize_buffer_dimensions() {
        let image = RgbaImage::from_pixel(400, 200, Rgba([10, 20, 30, 255]));
        assert_eq!(resize_to_bound(&image, 100).dimensions(), (100, 50));
    }

    #[test]
    fn test_extreme_aspect_keeps_one_pixel() {
        assert_eq!(bounded_dimensions(10_000, 1, 100), (100, 1));
    }

    proptest! {
        #[test]
        fn test_bounded_and_idempotent(w in 1u32..6000, h in 1u32..6000, max in 1u32..3000) {
            let (bw, bh) = bounded_dimensions(w, h, max);
            prop_assert!(bw <= max && bh <= max);
            prop_assert!(bw <= w && bh <= h);
            prop_assert_eq!(bounded_dimensions(bw, bh, max), (bw, bh));
        }
    }
}
