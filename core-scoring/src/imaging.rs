// =====================================================================================
// File: core-scoring/src/imaging.rs
// Description: Grayscale statistics, DCT perceptual hashing, and spectral helpers
//              shared by the quality, duplicate, and forensic layers
// =====================================================================================

use image::GrayImage;

/// Mean grayscale intensity
pub fn mean_intensity(gray: &GrayImage) -> f64 {
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64
}

/// Population standard deviation of grayscale intensity
pub fn intensity_stddev(gray: &GrayImage) -> f64 {
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    let mean = mean_intensity(gray);
    let variance = pixels
        .iter()
        .map(|&p| (p as f64 - mean).powi(2))
        .sum::<f64>()
        / pixels.len() as f64;
    variance.sqrt()
}

/// Variance of the discrete Laplacian response; low values indicate blur
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut responses = Vec::with_capacity(((width - 2) * (height - 2)) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray.get_pixel(x, y)[0] as f64;
            let up = gray.get_pixel(x, y - 1)[0] as f64;
            let down = gray.get_pixel(x, y + 1)[0] as f64;
            let left = gray.get_pixel(x - 1, y)[0] as f64;
            let right = gray.get_pixel(x + 1, y)[0] as f64;
            responses.push(up + down + left + right - 4.0 * center);
        }
    }

    let mean = responses.iter().sum::<f64>() / responses.len() as f64;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / responses.len() as f64
}

/// Square 2-D DCT-II over a row-major `n`×`n` block
fn dct_2d(input: &[f64], n: usize) -> Vec<f64> {
    let mut output = vec![0.0; n * n];
    let scale = std::f64::consts::PI / n as f64;
    for u in 0..n {
        for v in 0..n {
            let mut sum = 0.0;
            for y in 0..n {
                for x in 0..n {
                    sum += input[y * n + x]
                        * ((y as f64 + 0.5) * u as f64 * scale).cos()
                        * ((x as f64 + 0.5) * v as f64 * scale).cos();
                }
            }
            output[u * n + v] = sum;
        }
    }
    output
}

const PHASH_INPUT: u32 = 32;
const PHASH_BLOCK: usize = 8;

/// 64-bit DCT perceptual hash: downscale to 32×32, keep the 8×8 low-frequency
/// DCT block, and threshold each coefficient against the block median
pub fn phash(gray: &GrayImage) -> u64 {
    let small = image::imageops::resize(
        gray,
        PHASH_INPUT,
        PHASH_INPUT,
        image::imageops::FilterType::Triangle,
    );
    let input: Vec<f64> = small.as_raw().iter().map(|&p| p as f64).collect();
    let coefficients = dct_2d(&input, PHASH_INPUT as usize);

    let mut block = Vec::with_capacity(PHASH_BLOCK * PHASH_BLOCK);
    for u in 0..PHASH_BLOCK {
        for v in 0..PHASH_BLOCK {
            block.push(coefficients[u * PHASH_INPUT as usize + v]);
        }
    }

    let mut sorted = block.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = (sorted[31] + sorted[32]) / 2.0;

    let mut hash = 0u64;
    for (bit, value) in block.iter().enumerate() {
        if *value > median {
            hash |= 1 << bit;
        }
    }
    hash
}

/// Render a 64-bit hash as the 16-character hex form stored in the state file
pub fn hash_to_hex(hash: u64) -> String {
    format!("{hash:016x}")
}

/// Hamming distance between two hex-encoded 64-bit hashes. Unparseable or
/// empty operands count as maximally distant.
pub fn hamming_distance_hex(a: &str, b: &str) -> u32 {
    match (u64::from_str_radix(a, 16), u64::from_str_radix(b, 16)) {
        (Ok(a), Ok(b)) => (a ^ b).count_ones(),
        _ => 64,
    }
}

const SPECTRUM_SIZE: u32 = 64;

/// Ratio of high-frequency to low-frequency spectral energy of the downscaled
/// grayscale. The low band is a disc of radius min(h, w) / 8 around DC; values
/// well below 1.0 suggest upscaled or synthetic content.
pub fn high_low_frequency_ratio(gray: &GrayImage) -> f64 {
    let small = image::imageops::resize(
        gray,
        SPECTRUM_SIZE,
        SPECTRUM_SIZE,
        image::imageops::FilterType::Triangle,
    );
    let n = SPECTRUM_SIZE as usize;
    let input: Vec<f64> = small.as_raw().iter().map(|&p| p as f64).collect();
    let coefficients = dct_2d(&input, n);

    let low_radius = (n / 8) as f64;
    let mut low_energy = 0.0;
    let mut total_energy = 0.0;
    for u in 0..n {
        for v in 0..n {
            let magnitude = coefficients[u * n + v].abs();
            total_energy += magnitude;
            if ((u * u + v * v) as f64) <= low_radius * low_radius {
                low_energy += magnitude;
            }
        }
    }
    let high_energy = total_energy - low_energy;
    high_energy / (low_energy + 1e-8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    fn checkerboard(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_uniform_image_statistics() {
        let gray = uniform(32, 32, 128);
        assert!((mean_intensity(&gray) - 128.0).abs() < 1e-9);
        assert!(intensity_stddev(&gray) < 1e-9);
        assert!(laplacian_variance(&gray) < 1e-9);
    }

    #[test]
    fn test_checkerboard_is_sharp_and_contrasty() {
        let gray = checkerboard(64, 64);
        assert!(laplacian_variance(&gray) > 1000.0);
        assert!(intensity_stddev(&gray) > 100.0);
    }

    #[test]
    fn test_phash_is_stable() {
        let gray = checkerboard(64, 64);
        assert_eq!(phash(&gray), phash(&gray));
    }

    #[test]
    fn test_phash_differs_for_distinct_content() {
        // Coarse blocks survive the 32x32 downscale, so the two layouts keep
        // their energy in different frequency bands
        let half_split = GrayImage::from_fn(64, 64, |x, _| {
            if x < 32 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let blocks = GrayImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let distance = (phash(&half_split) ^ phash(&blocks)).count_ones();
        assert!(distance > 2, "distance {distance}");
    }

    #[test]
    fn test_hamming_distance_hex() {
        assert_eq!(hamming_distance_hex("0000000000000000", "0000000000000000"), 0);
        assert_eq!(hamming_distance_hex("0000000000000000", "0000000000000001"), 1);
        assert_eq!(hamming_distance_hex("0000000000000000", "ffffffffffffffff"), 64);
        assert_eq!(hamming_distance_hex("", "0000000000000001"), 64);
        assert_eq!(hamming_distance_hex("zz", "0000000000000001"), 64);
    }

    #[test]
    fn test_hash_to_hex_width() {
        assert_eq!(hash_to_hex(1), "0000000000000001");
        assert_eq!(hash_to_hex(u64::MAX), "ffffffffffffffff");
    }

    #[test]
    fn test_frequency_ratio_orders_sharp_above_flat() {
        let sharp = high_low_frequency_ratio(&checkerboard(64, 64));
        let flat = high_low_frequency_ratio(&uniform(64, 64, 128));
        assert!(sharp > flat);
    }
}
