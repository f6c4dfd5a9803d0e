use egui::{ColorImage, TextureHandle, TextureOptions};
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};

use crate::{BridgeError, Size};

#[derive(Clone, Debug)]
pub struct Thumbnail {
    pixels: RgbaImage,
}

impl Thumbnail {
    pub fn decode(
        name: &str,
        data: &[u8],
        requested: Size,
        max: Size,
    ) -> Result<Self, BridgeError> {
        if data.is_empty() {
            return Err(BridgeError::Decode(format!("empty response for '{name}'")));
        }

        let format = ::image::guess_format(data)
            .map_err(|err| BridgeError::Decode(format!("cannot guess format for '{name}': {err}")))?;

        let img = match format {
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif => {
                ::image::load_from_memory_with_format(data, format)?
            }
            fmt => {
                return Err(BridgeError::Decode(format!(
                    "unsupported format for '{name}': {fmt:?}"
                )))
            }
        };

        Ok(Self::scaled(img, requested, max))
    }

    fn scaled(img: DynamicImage, requested: Size, max: Size) -> Self {
        let source = (img.width(), img.height());
        let (width, height) = max.limit(requested.fit(source));
        let img = if (width, height) == source {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        Self {
            pixels: img.to_rgba8(),
        }
    }

    pub fn size(&self) -> Size {
        Size::from(self.pixels.dimensions())
    }

    pub const fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    pub fn to_color_image(&self) -> ColorImage {
        let (width, height) = self.pixels.dimensions();
        ColorImage::from_rgba_unmultiplied([width as _, height as _], &self.pixels)
    }

    pub fn load_texture(&self, ctx: &egui::Context, name: &str) -> TextureHandle {
        ctx.load_texture(name, self.to_color_image(), TextureOptions::default())
    }
}
