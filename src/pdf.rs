//! Stamping signatures onto the uploaded PDF. Images arrive as base64 PNG
//! payloads; typed signatures are drawn as Helvetica text. Coordinates are
//! PDF user space with the origin at the bottom left of the page.

use std::io::Write;

pub const STAMP_WIDTH: f64 = 150.0;
pub const STAMP_HEIGHT: f64 = 60.0;
const TYPED_FONT_SIZE: f64 = 24.0;
const FONT_NAME: &str = "F_docsign_Helvetica";

#[derive(thiserror::Error, Debug)]
pub enum EmbedError {
    #[error("invalid PDF: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid PNG: {0}")]
    Png(#[from] png::DecodingError),
    #[error("invalid image payload: {0}")]
    Payload(#[from] base64::DecodeError),
    #[error("page {0} not found")]
    PageNotFound(u32),
    #[error("unsupported image format")]
    Unsupported,
}

pub enum StampContent {
    Png(Vec<u8>),
    Text(String),
}

pub struct Stamp {
    pub content: StampContent,
    pub x: f64,
    pub y: f64,
    pub page: u32,
}

/// Accepts either a bare base64 string or a `data:image/...;base64,` URL, as
/// browsers produce from canvas exports and file readers.
pub fn decode_image_payload(value: &str) -> Result<Vec<u8>, EmbedError> {
    let encoded = match value.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => value,
    };
    Ok(base64::decode(encoded)?)
}

/// Applies `stamp` to `base_pdf` and returns the rewritten document bytes.
pub fn embed_signature(base_pdf: &[u8], stamp: &Stamp) -> Result<Vec<u8>, EmbedError> {
    let mut doc = lopdf::Document::load_mem(base_pdf)?;
    let page_id = *doc
        .get_pages()
        .get(&stamp.page)
        .ok_or(EmbedError::PageNotFound(stamp.page))?;

    let mut content = doc.get_and_decode_page_content(page_id)?;

    match &stamp.content {
        StampContent::Png(data) => {
            let xobj_id = png_to_xobject(&mut doc, data)?;
            let img_name = format!("X{}", uuid::Uuid::new_v4().simple());
            doc.add_xobject(page_id, img_name.as_bytes(), xobj_id)?;

            content.operations.extend(vec![
                lopdf::content::Operation::new("q", vec![]),
                lopdf::content::Operation::new(
                    "cm",
                    vec![
                        STAMP_WIDTH.into(),
                        0.into(),
                        0.into(),
                        STAMP_HEIGHT.into(),
                        stamp.x.into(),
                        stamp.y.into(),
                    ],
                ),
                lopdf::content::Operation::new("Do", vec![img_name.into()]),
                lopdf::content::Operation::new("Q", vec![]),
            ]);
        }
        StampContent::Text(text) => {
            ensure_font(&mut doc, page_id)?;

            content.operations.extend(vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new(
                    "Tf",
                    vec![FONT_NAME.into(), TYPED_FONT_SIZE.into()],
                ),
                lopdf::content::Operation::new("Td", vec![stamp.x.into(), stamp.y.into()]),
                lopdf::content::Operation::new(
                    "Tj",
                    vec![lopdf::Object::string_literal(text.as_str())],
                ),
                lopdf::content::Operation::new("ET", vec![]),
            ]);
        }
    }

    doc.change_page_content(page_id, content.encode()?)?;

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

fn ensure_font(doc: &mut lopdf::Document, page_id: lopdf::ObjectId) -> Result<(), EmbedError> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let resources = doc.get_or_create_resources(page_id)?.as_dict_mut()?;
    if !resources.has(b"Font") {
        resources.set("Font", lopdf::Dictionary::new());
    }
    let fonts = resources
        .get_mut(b"Font")
        .and_then(lopdf::Object::as_dict_mut)?;
    if !fonts.has(FONT_NAME.as_bytes()) {
        fonts.set(FONT_NAME, lopdf::Object::Reference(font_id));
    }
    Ok(())
}

/// Turns a decoded PNG into an image XObject. Alpha channels are split out
/// into a separate soft mask stream referenced via SMask.
fn png_to_xobject(doc: &mut lopdf::Document, data: &[u8]) -> Result<lopdf::ObjectId, EmbedError> {
    let decoder = png::Decoder::new(data);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;
    let bytes = &buf[..info.buffer_size()];

    let (img_bytes, color_space, bits_per_component, mask_bytes) =
        match (info.bit_depth, info.color_type) {
            (png::BitDepth::One, png::ColorType::Grayscale) => {
                (bytes.to_vec(), "DeviceGray", 1, None)
            }
            (png::BitDepth::One, png::ColorType::Rgb) => (bytes.to_vec(), "DeviceRGB", 1, None),
            (png::BitDepth::Two, png::ColorType::Grayscale) => {
                (bytes.to_vec(), "DeviceGray", 2, None)
            }
            (png::BitDepth::Two, png::ColorType::Rgb) => (bytes.to_vec(), "DeviceRGB", 2, None),
            (png::BitDepth::Four, png::ColorType::Grayscale) => {
                (bytes.to_vec(), "DeviceGray", 4, None)
            }
            (png::BitDepth::Four, png::ColorType::Rgb) => (bytes.to_vec(), "DeviceRGB", 4, None),
            (png::BitDepth::Eight, png::ColorType::Grayscale) => {
                (bytes.to_vec(), "DeviceGray", 8, None)
            }
            (png::BitDepth::Eight, png::ColorType::Rgb) => (bytes.to_vec(), "DeviceRGB", 8, None),
            (png::BitDepth::Eight, png::ColorType::GrayscaleAlpha) => {
                let mut gray_bytes = Vec::with_capacity(bytes.len() / 2);
                let mut alpha_bytes = Vec::with_capacity(bytes.len() / 2);
                for (i, byte) in bytes.iter().enumerate() {
                    if i % 2 == 0 {
                        gray_bytes.push(*byte);
                    } else {
                        alpha_bytes.push(*byte);
                    }
                }
                (gray_bytes, "DeviceGray", 8, Some(alpha_bytes))
            }
            (png::BitDepth::Eight, png::ColorType::Rgba) => {
                let mut rgb_bytes = Vec::with_capacity((bytes.len() / 4) * 3);
                let mut alpha_bytes = Vec::with_capacity(bytes.len() / 4);
                for (i, byte) in bytes.iter().enumerate() {
                    if i % 4 == 3 {
                        alpha_bytes.push(*byte);
                    } else {
                        rgb_bytes.push(*byte);
                    }
                }
                (rgb_bytes, "DeviceRGB", 8, Some(alpha_bytes))
            }
            _ => return Err(EmbedError::Unsupported),
        };

    let mask_obj_id = match mask_bytes {
        Some(mask_bytes) => {
            let mask_obj = lopdf::Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "ColorSpace" => "DeviceGray",
                    "Width" => lopdf::Object::Integer(info.width.into()),
                    "Height" => lopdf::Object::Integer(info.height.into()),
                    "BitsPerComponent" => lopdf::Object::Integer(bits_per_component),
                    "Filter" => lopdf::Object::Array(vec!["ASCIIHexDecode".into(), "FlateDecode".into()])
                },
                hex_deflate(&mask_bytes),
            )
            .with_compression(false);
            Some(doc.add_object(mask_obj))
        }
        None => None,
    };

    let mut img_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "ColorSpace" => color_space,
        "Width" => lopdf::Object::Integer(info.width.into()),
        "Height" => lopdf::Object::Integer(info.height.into()),
        "BitsPerComponent" => lopdf::Object::Integer(bits_per_component),
        "Filter" => lopdf::Object::Array(vec!["ASCIIHexDecode".into(), "FlateDecode".into()])
    };
    if let Some(mask_obj_id) = mask_obj_id {
        img_dict.set("SMask", lopdf::Object::Reference(mask_obj_id));
    }
    let img_obj = lopdf::Stream::new(img_dict, hex_deflate(&img_bytes)).with_compression(false);

    Ok(doc.add_object(img_obj))
}

fn hex_deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = deflate::write::ZlibEncoder::new(Vec::new(), deflate::Compression::Default);
    encoder.write_all(data).unwrap();
    let compressed = encoder.finish().unwrap();
    let mut hex_data = hex::encode(&compressed);
    hex_data.push('>');
    hex_data.into_bytes()
}
