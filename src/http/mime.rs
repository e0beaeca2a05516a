use crate::gopher::selector::Selector;
use std::path::Path;

pub const TEXT_HTML: &str = "text/html; charset=iso-8859-1";

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
];

/// Content type for an image path, by extension.
pub fn image_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    IMAGE_TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

/// Content type a selector is served with over HTTP.
pub fn content_type(selector: Selector, path: &Path) -> Option<&'static str> {
    match selector {
        Selector::Document => Some("text/plain"),
        Selector::Directory | Selector::Html => Some(TEXT_HTML),
        Selector::Gif => Some("image/gif"),
        Selector::Image => image_type(path),
        Selector::Binary | Selector::BinHex | Selector::DosBinary | Selector::Uuencoded => {
            Some("application/octet-stream")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions_are_case_insensitive() {
        assert_eq!(image_type(Path::new("a/b.PNG")), Some("image/png"));
        assert_eq!(image_type(Path::new("photo.jpeg")), Some("image/jpeg"));
        assert_eq!(image_type(Path::new("noext")), None);
        assert_eq!(image_type(Path::new("x.tiff")), None);
    }
}
