//! Flow layout of parsed markup blocks onto fixed-size pages.
//!
//! The layout walks blocks top to bottom with a single vertical cursor and
//! starts a new page whenever the next line or image would cross the bottom
//! margin. Where images come from and what happens to finished pages is up
//! to the [`PageSink`], which is the only difference between the flow and
//! print converters.

use crate::markup::Block;
use crate::pdf::{wrap, FontProgram, PageCanvas, PageSize, XObject, A4, MM};
use crate::Result;

const RULE_THICKNESS: f32 = 0.5;
const RULE_SPACING: f32 = 3.0;

/// Page size plus margins, all in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub size: PageSize,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
}

impl PageGeometry {
    pub fn a4(margin_mm: f32) -> Self {
        Self {
            size: A4,
            margin_top: margin_mm * MM,
            margin_right: margin_mm * MM,
            margin_bottom: margin_mm * MM,
            margin_left: margin_mm * MM,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.size.width - self.margin_left - self.margin_right
    }

    fn bottom(&self) -> f32 {
        self.size.height - self.margin_bottom
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            size: A4,
            margin_top: 15.0 * MM,
            margin_right: 20.0 * MM,
            margin_bottom: 15.0 * MM,
            margin_left: 25.0 * MM,
        }
    }
}

/// Receives images and finished pages from [`lay_out`].
pub trait PageSink {
    /// Resolve an `<img src>`; `None` drops the image.
    fn image(&mut self, src: &str) -> Result<Option<XObject>>;

    fn page(&mut self, page: PageCanvas) -> Result<()>;
}

struct Cursor<'a> {
    geometry: &'a PageGeometry,
    page: PageCanvas,
    top: f32,
    emitted: usize,
}

impl Cursor<'_> {
    fn break_page(&mut self, sink: &mut dyn PageSink) -> Result<()> {
        let done = std::mem::replace(&mut self.page, PageCanvas::new(self.geometry.size));
        sink.page(done)?;
        self.emitted += 1;
        self.top = self.geometry.margin_top;
        Ok(())
    }

    /// Start a new page unless `height` still fits. An empty page always fits.
    fn reserve(&mut self, height: f32, sink: &mut dyn PageSink) -> Result<()> {
        if self.top + height > self.geometry.bottom() && !self.page.is_empty() {
            self.break_page(sink)?;
        }
        Ok(())
    }
}

/// Lay `blocks` out and hand every page to `sink`. Returns the page count.
pub fn lay_out(
    blocks: &[Block],
    font: &FontProgram,
    geometry: &PageGeometry,
    sink: &mut dyn PageSink,
) -> Result<usize> {
    let mut cursor = Cursor {
        geometry,
        page: PageCanvas::new(geometry.size),
        top: geometry.margin_top,
        emitted: 0,
    };
    let left = geometry.margin_left;
    let content_width = geometry.content_width();

    for block in blocks {
        match block {
            Block::Space(height) => {
                cursor.top += height;
                if cursor.top > geometry.bottom() {
                    cursor.break_page(sink)?;
                }
            }
            Block::PageBreak => {
                if !cursor.page.is_empty() {
                    cursor.break_page(sink)?;
                }
            }
            Block::Rule => {
                cursor.reserve(RULE_SPACING, sink)?;
                let top = cursor.top + RULE_SPACING / 2.0;
                cursor.page.rule(left, top, content_width, RULE_THICKNESS);
                cursor.top += RULE_SPACING;
            }
            Block::Text {
                text,
                font_size,
                align,
                indent,
                width,
            } => {
                let available = (content_width - indent).max(1.0);
                let box_width = width.map_or(available, |w| w.min(available));
                let line_height = font.line_height(*font_size);
                for line in wrap(font, text, *font_size, box_width) {
                    cursor.reserve(line_height, sink)?;
                    let x = left + indent + align.offset(box_width, font.text_width(&line, *font_size));
                    cursor.page.text(font, x, cursor.top, *font_size, &line)?;
                    cursor.top += line_height;
                }
            }
            Block::Image {
                src,
                width,
                height,
                align,
                indent,
            } => {
                let Some(xobject) = sink.image(src)? else {
                    continue;
                };
                let (w, h) = image_box(&xobject, *width, *height);
                let available = (content_width - indent).max(1.0);
                let (w, h) = if w > available {
                    (available, h * available / w)
                } else {
                    (w, h)
                };
                cursor.reserve(h, sink)?;
                let x = left + indent + align.offset(available, w);
                cursor.page.image(&xobject, x, cursor.top, w, h);
                cursor.top += h;
            }
        }
    }

    if !cursor.page.is_empty() || cursor.emitted == 0 {
        cursor.break_page(sink)?;
    }
    Ok(cursor.emitted)
}

/// Display size of an image: explicit box, or the missing side from the
/// aspect ratio, or natural pixel size at 96 dpi.
fn image_box(image: &XObject, width: Option<f32>, height: Option<f32>) -> (f32, f32) {
    let natural_w = image.width as f32 * 0.75;
    let natural_h = image.height as f32 * 0.75;
    let ratio = if natural_w > 0.0 { natural_h / natural_w } else { 1.0 };
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, w * ratio),
        (None, Some(h)) => (if ratio > 0.0 { h / ratio } else { h }, h),
        (None, None) => (natural_w, natural_h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetDir;
    use crate::pdf::Align;

    #[derive(Default)]
    struct Collect {
        pages: Vec<PageCanvas>,
    }

    impl PageSink for Collect {
        fn image(&mut self, _src: &str) -> Result<Option<XObject>> {
            Ok(None)
        }

        fn page(&mut self, page: PageCanvas) -> Result<()> {
            self.pages.push(page);
            Ok(())
        }
    }

    fn font() -> FontProgram {
        FontProgram::load(&AssetDir::bundled().font().unwrap()).unwrap()
    }

    fn text(s: &str) -> Block {
        Block::Text {
            text: s.to_string(),
            font_size: 10.0,
            align: Align::Left,
            indent: 0.0,
            width: None,
        }
    }

    #[test]
    fn test_empty_input_yields_one_page() {
        let mut sink = Collect::default();
        let pages = lay_out(&[], &font(), &PageGeometry::default(), &mut sink).unwrap();
        assert_eq!(pages, 1);
        assert_eq!(sink.pages.len(), 1);
    }

    #[test]
    fn test_overflow_starts_new_pages() {
        let blocks: Vec<Block> = (0..200).map(|i| text(&format!("Zeile {i}"))).collect();
        let mut sink = Collect::default();
        let pages = lay_out(&blocks, &font(), &PageGeometry::default(), &mut sink).unwrap();
        assert!(pages > 1);
        assert!(sink.pages.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn test_explicit_page_break() {
        let blocks = vec![text("eins"), Block::PageBreak, text("zwei"), Block::PageBreak];
        let mut sink = Collect::default();
        assert_eq!(lay_out(&blocks, &font(), &PageGeometry::default(), &mut sink).unwrap(), 2);
    }

    #[test]
    fn test_dropped_image_is_skipped() {
        let blocks = vec![Block::Image {
            src: "logo.png".into(),
            width: None,
            height: None,
            align: Align::Left,
            indent: 0.0,
        }];
        let mut sink = Collect::default();
        assert_eq!(lay_out(&blocks, &font(), &PageGeometry::default(), &mut sink).unwrap(), 1);
        assert!(sink.pages[0].is_empty());
    }

    #[test]
    fn test_image_box_keeps_aspect_ratio() {
        let xobject = XObject {
            name: "Im1".into(),
            id: (1, 0),
            width: 200,
            height: 100,
        };
        assert_eq!(image_box(&xobject, Some(50.0), None), (50.0, 25.0));
        assert_eq!(image_box(&xobject, None, Some(50.0)), (100.0, 50.0));
        assert_eq!(image_box(&xobject, None, None), (150.0, 75.0));
    }
}
