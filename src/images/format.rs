use image::ImageFormat;

const UNSUPPORTED_EXTENSIONS: [&str; 4] = [".ico", ".bmp", ".tiff", ".tif"];
const UNSUPPORTED_CONTENT_MARKERS: [&str; 3] = ["icon", "bmp", "tiff"];

/// True when the source URL names an icon, bitmap or TIFF file.
/// Matching is a case-insensitive substring test on the whole URL.
pub fn has_unsupported_extension(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    UNSUPPORTED_EXTENSIONS.iter().any(|ext| url.contains(ext))
}

pub fn is_unsupported_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    UNSUPPORTED_CONTENT_MARKERS
        .iter()
        .any(|marker| content_type.contains(marker))
}

pub fn is_generic_content_type(content_type: &str) -> bool {
    let content_type = content_type.trim();
    content_type.is_empty() || content_type.starts_with("application/octet-stream")
}

// Detect the image type from its magic number
pub fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP".as_slice()) {
        Some("image/webp")
    } else if data.starts_with(b"BM") {
        Some("image/bmp")
    } else if data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        Some("image/tiff")
    } else if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        Some("image/x-icon")
    } else {
        None
    }
}

/// Decoder hint from a declared content type. Parameters such as `; charset=`
/// are ignored.
pub fn format_from_content_type(content_type: &str) -> Option<ImageFormat> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}
