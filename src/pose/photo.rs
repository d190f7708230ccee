use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use serde::Serialize;

use super::landmark::LandmarkSet;
use crate::error::DetectionError;

/// 画像サイズ（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    /// 幅・高さのどちらかが0なら None
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn of(image: &DynamicImage) -> Option<Self> {
        let (w, h) = image.dimensions();
        Self::new(w, h)
    }
}

/// 生バイト列を画像としてデコード
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DetectionError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| DetectionError::InvalidImage(e.to_string()))?;
    if ImageSize::of(&image).is_none() {
        return Err(DetectionError::InvalidImage("image has zero size".to_string()));
    }
    Ok(image)
}

/// 撮影画像とその検出結果
///
/// ランドマークは検出成功時に一度だけ付与され、以後は変更しない。
/// 再検出したい場合は新しい Photo を作る。
#[derive(Debug, Clone)]
pub struct Photo {
    id: String,
    bytes: Arc<[u8]>,
    size: ImageSize,
    landmarks: Option<LandmarkSet>,
}

impl Photo {
    pub fn new(id: impl Into<String>, bytes: impl Into<Arc<[u8]>>, size: ImageSize) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
            size,
            landmarks: None,
        }
    }

    /// バイト列をデコードしてサイズを確定させる
    pub fn decode(id: impl Into<String>, bytes: Vec<u8>) -> Result<(Self, DynamicImage), DetectionError> {
        let image = decode_image(&bytes)?;
        let size = ImageSize::of(&image)
            .ok_or_else(|| DetectionError::InvalidImage("image has zero size".to_string()))?;
        Ok((Self::new(id, bytes, size), image))
    }

    /// ランドマーク付きの新しい Photo を返す
    pub fn with_landmarks(&self, landmarks: LandmarkSet) -> Self {
        Self {
            id: self.id.clone(),
            bytes: Arc::clone(&self.bytes),
            size: self.size,
            landmarks: Some(landmarks),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        self.landmarks.as_ref()
    }

    /// アライメント計算用のビュー。ランドマークがなければ None。
    pub fn posed(&self) -> Option<PosedImage<'_>> {
        self.landmarks.as_ref().map(|landmarks| PosedImage {
            landmarks,
            size: self.size,
        })
    }
}

/// ランドマークと画像サイズの組
#[derive(Debug, Clone, Copy)]
pub struct PosedImage<'a> {
    pub landmarks: &'a LandmarkSet,
    pub size: ImageSize,
}

impl<'a> PosedImage<'a> {
    pub fn new(landmarks: &'a LandmarkSet, size: ImageSize) -> Self {
        Self { landmarks, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkIndex};
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_image_size_rejects_zero() {
        assert!(ImageSize::new(0, 10).is_none());
        assert!(ImageSize::new(10, 0).is_none());
        assert_eq!(ImageSize::new(4, 3), Some(ImageSize { width: 4, height: 3 }));
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DetectionError::InvalidImage(_)));
    }

    #[test]
    fn test_photo_decode_reads_dimensions() {
        let (photo, image) = Photo::decode("before", png_bytes(64, 48)).unwrap();
        assert_eq!(photo.size(), ImageSize { width: 64, height: 48 });
        assert_eq!(image.dimensions(), (64, 48));
        assert!(photo.landmarks().is_none());
        assert!(photo.posed().is_none());
    }

    #[test]
    fn test_with_landmarks_creates_new_photo() {
        let (photo, _) = Photo::decode("after", png_bytes(8, 8)).unwrap();
        let set = LandmarkSet::new([Landmark::new(0.5, 0.5, 0.0, 1.0); LandmarkIndex::COUNT]);
        let posed = photo.with_landmarks(set.clone());

        assert!(photo.landmarks().is_none());
        assert_eq!(posed.landmarks(), Some(&set));
        assert_eq!(posed.id(), "after");
        assert_eq!(posed.bytes(), photo.bytes());
    }
}
