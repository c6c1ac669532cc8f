//! Image decoding and CLIP input preparation

use candle_core::{DType, Device, Tensor};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use stylelens_core::{Error, Result};

/// Side length of the square image fed to the encoder
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Per-channel mean used by the CLIP image processor
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// Per-channel standard deviation used by the CLIP image processor
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

/// Decode an uploaded image of any supported raster format
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::image("empty image payload"));
    }
    image::load_from_memory(bytes).map_err(|e| Error::image(format!("Failed to decode image: {}", e)))
}

/// Convert to RGB and resize to a `size` x `size` square (aspect ratio is not kept)
pub fn resize_square(image: &DynamicImage, size: u32) -> RgbImage {
    image.resize_exact(size, size, FilterType::CatmullRom).to_rgb8()
}

/// Normalised `[1, 3, H, W]` pixel tensor in CLIP's expected layout
pub fn image_to_tensor(image: &RgbImage, device: &Device) -> Result<Tensor> {
    let (width, height) = image.dimensions();
    let to_err = |e: candle_core::Error| Error::image(format!("Failed to build pixel tensor: {}", e));

    let mean = Tensor::new(&CLIP_MEAN, device).and_then(|t| t.reshape((3, 1, 1))).map_err(to_err)?;
    let std = Tensor::new(&CLIP_STD, device).and_then(|t| t.reshape((3, 1, 1))).map_err(to_err)?;

    let pixels = Tensor::from_vec(image.as_raw().clone(), (height as usize, width as usize, 3), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t / 255.)
        .map_err(to_err)?;

    pixels
        .broadcast_sub(&mean)
        .and_then(|t| t.broadcast_div(&std))
        .and_then(|t| t.unsqueeze(0))
        .map_err(to_err)
}

/// Decode, resize, and tensorise an uploaded image in one step
pub fn preprocess(bytes: &[u8], size: u32, device: &Device) -> Result<Tensor> {
    let image = decode_image(bytes)?;
    let resized = resize_square(&image, size);
    image_to_tensor(&resized, device)
}
