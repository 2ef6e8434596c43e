//! Frame normalization: resize to the working width, convert to luma, smooth

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

/// Side length of the square smoothing kernel
pub const BLUR_KERNEL_SIZE: usize = 21;

/// Resize, convert to single-channel intensity and blur
pub fn normalize(image: &RgbImage, working_width: u32) -> GrayImage {
    let resized = resize_to_width(image, working_width);
    let gray = to_luma(&resized);
    gaussian_blur(&gray, BLUR_KERNEL_SIZE)
}

/// Resize to `width`, keeping the aspect ratio (height rounds down, minimum 1)
pub fn resize_to_width(image: &RgbImage, width: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == width || w == 0 || width == 0 {
        return image.clone();
    }

    let height = ((h as u64 * width as u64) / w as u64).max(1) as u32;
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// BT.601 luma, rounded to nearest
pub fn to_luma(image: &RgbImage) -> GrayImage {
    let (w, h) = image.dimensions();
    let data = image
        .as_raw()
        .chunks_exact(3)
        .map(|rgb| ((rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114 + 500) / 1000) as u8)
        .collect();

    GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
}

/// Sigma implied by a kernel size: 0.3 * ((k - 1) / 2 - 1) + 0.8
pub fn sigma_for_kernel(size: usize) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian weights
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = sigma_for_kernel(size);
    let center = (size / 2) as f32;
    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Reflect-101 border: `dcb|abcd|cba`
fn reflect(i: isize, n: isize) -> usize {
    if n == 1 {
        return 0;
    }
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable Gaussian blur with a `size` x `size` kernel
pub fn gaussian_blur(image: &GrayImage, size: usize) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let kernel = gaussian_kernel(size);
    let radius = (size / 2) as isize;
    let (wi, hi) = (w as isize, h as isize);
    let src = image.as_raw();

    let mut horizontal = vec![0f32; src.len()];
    for y in 0..hi {
        let row = (y * wi) as usize;
        for x in 0..wi {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect(x + k as isize - radius, wi);
                acc += weight * src[row + sx] as f32;
            }
            horizontal[row + x as usize] = acc;
        }
    }

    let mut out = vec![0u8; src.len()];
    for y in 0..hi {
        for x in 0..wi {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect(y + k as isize - radius, hi);
                acc += weight * horizontal[sy * w as usize + x as usize];
            }
            out[(y * wi + x) as usize] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage::from_raw(w, h, out).unwrap_or_else(|| GrayImage::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = gaussian_kernel(BLUR_KERNEL_SIZE);
        assert_eq!(kernel.len(), 21);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((sigma_for_kernel(21) - 3.5).abs() < 1e-6);
        assert!(kernel[10] > kernel[9] && kernel[9] > kernel[0]);
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let image = RgbImage::new(1000, 600);
        assert_eq!(resize_to_width(&image, 500).dimensions(), (500, 300));

        let image = RgbImage::new(333, 100);
        assert_eq!(resize_to_width(&image, 500).dimensions(), (500, 150));
    }

    #[test]
    fn test_luma_weights() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        assert_eq!(to_luma(&image).get_pixel(0, 0), &Luma([76]));

        let image = RgbImage::from_pixel(2, 2, Rgb([200, 200, 200]));
        assert_eq!(to_luma(&image).get_pixel(1, 1), &Luma([200]));

        // 0.57 and 0.587 round up rather than truncating to 0
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 0, 5]));
        assert_eq!(to_luma(&image).get_pixel(0, 0), &Luma([1]));
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 1, 0]));
        assert_eq!(to_luma(&image).get_pixel(0, 0), &Luma([1]));
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        assert_eq!(to_luma(&image).get_pixel(0, 0), &Luma([255]));
    }

    #[test]
    fn test_blur_keeps_uniform_image() {
        let image = GrayImage::from_pixel(40, 30, Luma([90]));
        let blurred = gaussian_blur(&image, BLUR_KERNEL_SIZE);
        assert!(blurred.pixels().all(|p| p.0[0] == 90));
    }

    #[test]
    fn test_blur_spreads_a_point() {
        let mut image = GrayImage::new(41, 41);
        image.put_pixel(20, 20, Luma([255]));
        let blurred = gaussian_blur(&image, BLUR_KERNEL_SIZE);

        assert!(blurred.get_pixel(20, 20).0[0] < 255);
        assert!(blurred.get_pixel(21, 20).0[0] > 0);
        assert_eq!(blurred.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_reflect_border() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-3, 5), 3);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(2, 5), 2);
        assert_eq!(reflect(-7, 1), 0);
    }

    #[test]
    fn test_normalize_output_size() {
        let image = RgbImage::from_pixel(1000, 400, Rgb([10, 20, 30]));
        assert_eq!(normalize(&image, 500).dimensions(), (500, 200));
    }
}
