use anyhow::{ensure, Result};
use image::imageops::{self, FilterType};
use image::DynamicImage;
use ndarray::Array4;

use super::landmark::Landmark;

/// BlazePose 系モデルの入力サイズ
pub const DEFAULT_INPUT_SIZE: u32 = 256;

/// レターボックスの配置情報（いずれもモデル入力に対する割合）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    pub pad_left: f32,
    pub pad_top: f32,
    pub content_width: f32,
    pub content_height: f32,
}

impl LetterboxInfo {
    pub fn identity() -> Self {
        Self {
            pad_left: 0.0,
            pad_top: 0.0,
            content_width: 1.0,
            content_height: 1.0,
        }
    }

    /// モデル入力座標のランドマークを元画像の正規化座標に戻す
    pub fn unletterbox(&self, lm: &Landmark) -> Landmark {
        Landmark::new(
            (lm.x - self.pad_left) / self.content_width,
            (lm.y - self.pad_top) / self.content_height,
            lm.z,
            lm.visibility,
        )
    }
}

/// 画像をアスペクト比を保ったまま正方形に収め、NHWC テンソルに変換
///
/// - RGB, [0.0, 1.0] に正規化
/// - 余白は 0 (黒)
/// - 出力: [1, size, size, 3]
/// - `input_size` が0ならエラー
pub fn preprocess_letterbox(image: &DynamicImage, input_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    ensure!(input_size > 0, "model input size must be positive");
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let s = input_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, s, s, 3));

    if w == 0 || h == 0 {
        return Ok((tensor, LetterboxInfo::identity()));
    }

    let scale = input_size as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, input_size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, input_size);
    let resized = imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

    let pad_x = (input_size - new_w) / 2;
    let pad_y = (input_size - new_h) / 2;

    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + pad_x) as usize;
        let ty = (y + pad_y) as usize;
        for c in 0..3 {
            tensor[[0, ty, tx, c]] = pixel[c] as f32 / 255.0;
        }
    }

    let size = input_size as f32;
    let info = LetterboxInfo {
        pad_left: pad_x as f32 / size,
        pad_top: pad_y as f32 / size,
        content_width: new_w as f32 / size,
        content_height: new_h as f32 / size,
    };
    Ok((tensor, info))
}
