//! Building a page around a single JPEG or PNG image

use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat};
use lopdf::{Dictionary, Document, Object, Stream};

use crate::error::{Error, Result};
use crate::layout::{place_image, PageGeometry, Placement};
use crate::pdf::{OutputPage, PageSet};
use crate::source::ImageEncoding;

/// Resource name of the image inside the page's XObject dictionary
const IMAGE_RESOURCE: &str = "Im0";

/// An image ready to be embedded: the XObject stream plus its pixel size
#[derive(Debug)]
struct EmbeddedImage {
    stream: Stream,
    smask: Option<Stream>,
    width: u32,
    height: u32,
}

/// A decoded image and where it goes on its page
///
/// Holds no document state, so preparation can run on any thread.
#[derive(Debug)]
pub struct PreparedImage {
    embedded: EmbeddedImage,
    pub placement: Placement,
    geometry: PageGeometry,
}

impl PreparedImage {
    /// Wrap the image in a one-page fragment
    pub fn into_page_set(self, item_id: &str) -> PageSet {
        let placement = self.placement;
        PageSet {
            item_id: item_id.to_string(),
            document: build_page_document(self.embedded, &self.geometry, &placement),
            pages: vec![OutputPage::Image(placement)],
        }
    }
}

/// Decode an image and compute its scaled, centered placement
///
/// JPEG data is embedded as-is (only the header is decoded); PNG data is
/// decoded and re-compressed with Flate. Other encodings are rejected with
/// `UnsupportedImageEncoding`.
pub fn prepare_image(
    item_id: &str,
    encoding: &ImageEncoding,
    bytes: &[u8],
    geometry: &PageGeometry,
    allow_upscale: bool,
) -> Result<PreparedImage> {
    let embedded = match encoding {
        ImageEncoding::Jpeg => embed_jpeg(bytes),
        ImageEncoding::Png => embed_png(bytes),
        ImageEncoding::Other(name) => {
            return Err(Error::UnsupportedImageEncoding {
                item: item_id.to_string(),
                encoding: name.clone(),
            })
        }
    }
    .map_err(|detail| Error::DecodeError {
        item: item_id.to_string(),
        detail,
    })?;

    if embedded.width == 0 || embedded.height == 0 {
        return Err(Error::DecodeError {
            item: item_id.to_string(),
            detail: format!("image has no area ({}x{})", embedded.width, embedded.height),
        });
    }

    let placement = place_image(geometry, embedded.width, embedded.height, allow_upscale);
    log::debug!(
        "Placing '{}' ({}x{} px) at {:.1},{:.1} size {:.1}x{:.1} (scale {:.3})",
        item_id,
        embedded.width,
        embedded.height,
        placement.x,
        placement.y,
        placement.width,
        placement.height,
        placement.scale
    );

    Ok(PreparedImage {
        embedded,
        placement,
        geometry: *geometry,
    })
}

/// Create a one-page fragment showing the image scaled into the page and centered
pub fn image_page(
    item_id: &str,
    encoding: &ImageEncoding,
    bytes: &[u8],
    geometry: &PageGeometry,
    allow_upscale: bool,
) -> Result<PageSet> {
    prepare_image(item_id, encoding, bytes, geometry, allow_upscale)
        .map(|prepared| prepared.into_page_set(item_id))
}

/// Wrap the image in a minimal single-page document
fn build_page_document(image: EmbeddedImage, geometry: &PageGeometry, placement: &Placement) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut stream = image.stream;
    if let Some(smask) = image.smask {
        let smask_id = doc.add_object(smask);
        stream.dict.set("SMask", Object::Reference(smask_id));
    }
    let image_id = doc.add_object(stream);

    // Draw the unit-square image stretched to the placed size
    let content = format!(
        "q\n{:.4} 0 0 {:.4} {:.4} {:.4} cm\n/{} Do\nQ\n",
        placement.width, placement.height, placement.x, placement.y, IMAGE_RESOURCE
    );
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let resources = Dictionary::from_iter([(
        "XObject",
        Object::Dictionary(Dictionary::from_iter([(IMAGE_RESOURCE, Object::Reference(image_id))])),
    )]);

    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(geometry.width.pt() as f32),
                Object::Real(geometry.height.pt() as f32),
            ]),
        ),
        ("Resources", Object::Dictionary(resources)),
        ("Contents", Object::Reference(content_id)),
    ]));

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(1)),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
        ])),
    );

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc
}

fn image_dictionary(width: u32, height: u32, color_space: &str, filter: &str) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
    dict
}

/// Embed JPEG bytes unchanged behind a DCTDecode filter
fn embed_jpeg(bytes: &[u8]) -> std::result::Result<EmbeddedImage, String> {
    let decoder = JpegDecoder::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let (width, height) = decoder.dimensions();

    // The decoder reports CMYK as RGB, so the component count comes from the frame header
    let header = scan_jpeg_header(bytes);
    let components = header
        .components
        .unwrap_or_else(|| decoder.color_type().channel_count());

    let color_space = match components {
        1 => "DeviceGray",
        3 => "DeviceRGB",
        4 => "DeviceCMYK",
        n => return Err(format!("unsupported JPEG component count {}", n)),
    };

    let mut dict = image_dictionary(width, height, color_space, "DCTDecode");
    if components == 4 && header.adobe {
        // Adobe writes CMYK JPEGs inverted
        dict.set(
            "Decode",
            Object::Array((0..4).flat_map(|_| [Object::Integer(1), Object::Integer(0)]).collect()),
        );
    }

    Ok(EmbeddedImage {
        stream: Stream::new(dict, bytes.to_vec()).with_compression(false),
        smask: None,
        width,
        height,
    })
}

/// Decode a PNG and re-encode its pixels with Flate; alpha becomes a soft mask
fn embed_png(bytes: &[u8]) -> std::result::Result<EmbeddedImage, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png).map_err(|e| e.to_string())?;
    let (width, height) = (img.width(), img.height());
    let color = img.color();
    let gray = matches!(
        color,
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16
    );

    let (pixels, alpha) = split_alpha(&img, gray, color.has_alpha());

    let color_space = if gray { "DeviceGray" } else { "DeviceRGB" };
    let dict = image_dictionary(width, height, color_space, "FlateDecode");
    let stream = Stream::new(dict, deflate(&pixels)?).with_compression(false);

    let smask = match alpha {
        Some(alpha) => {
            let dict = image_dictionary(width, height, "DeviceGray", "FlateDecode");
            Some(Stream::new(dict, deflate(&alpha)?).with_compression(false))
        }
        None => None,
    };

    Ok(EmbeddedImage {
        stream,
        smask,
        width,
        height,
    })
}

/// 8-bit color samples, plus the alpha plane when any pixel is not opaque
fn split_alpha(img: &DynamicImage, gray: bool, has_alpha: bool) -> (Vec<u8>, Option<Vec<u8>>) {
    if !has_alpha {
        let pixels = if gray {
            img.to_luma8().into_raw()
        } else {
            img.to_rgb8().into_raw()
        };
        return (pixels, None);
    }

    let (raw, channels) = if gray {
        (img.to_luma_alpha8().into_raw(), 2)
    } else {
        (img.to_rgba8().into_raw(), 4)
    };

    let mut pixels = Vec::with_capacity(raw.len() / channels * (channels - 1));
    let mut alpha = Vec::with_capacity(raw.len() / channels);
    for chunk in raw.chunks_exact(channels) {
        pixels.extend_from_slice(&chunk[..channels - 1]);
        alpha.push(chunk[channels - 1]);
    }

    if alpha.iter().all(|&a| a == u8::MAX) {
        (pixels, None)
    } else {
        (pixels, Some(alpha))
    }
}

fn deflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| format!("Failed to compress image data: {}", e))?;
    encoder
        .finish()
        .map_err(|e| format!("Failed to finish compression: {}", e))
}

/// What the JPEG marker segments say about the frame
#[derive(Debug, Default, PartialEq)]
struct JpegHeader {
    components: Option<u8>,
    adobe: bool,
}

/// Walk the marker segments up to the first frame header
fn scan_jpeg_header(bytes: &[u8]) -> JpegHeader {
    let mut header = JpegHeader::default();
    let mut pos = 2; // past SOI

    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            break;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            // Fill byte
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            pos += 2;
            continue;
        }

        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let segment = pos + 4;

        match marker {
            // SOF0..SOF15, excluding DHT, JPG and DAC
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                header.components = bytes.get(segment + 5).copied();
                break;
            }
            0xEE => {
                header.adobe |= bytes.get(segment..segment + 5) == Some(b"Adobe".as_slice());
            }
            0xDA | 0xD9 => break,
            _ => {}
        }

        pos += 2 + length;
    }

    header
}
