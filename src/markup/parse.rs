//! XHTML subset → flat list of layout blocks.
//!
//! Supported: block elements (`div`, `p`, `h1`..`h3`, `section`, `header`,
//! `footer`, `address`), `br`, `hr`, `img`, and inline elements whose text is
//! folded into the enclosing block. Inline `style` attributes understand
//! `font-size`, `margin-top`, `margin-bottom`, `margin-left`, `text-align`,
//! `width`, `height` and `page-break-before`. Margins become explicit
//! [`Block::Space`] entries, so blocks never carry vertical spacing themselves.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::pdf::{Align, MM};
use crate::{Error, Result};

const BLOCK_TAGS: &[&str] = &[
    "html", "body", "div", "p", "h1", "h2", "h3", "section", "header", "footer", "address",
];
const SKIPPED_TAGS: &[&str] = &["head", "style", "script", "title"];

pub const DEFAULT_FONT_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Elements carrying any of these classes are dropped with their subtree.
    pub skip_classes: Vec<String>,
}

impl ParseOptions {
    pub fn skipping(classes: &[&str]) -> Self {
        Self {
            skip_classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// One unit of content for the layout stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text {
        text: String,
        font_size: f32,
        align: Align,
        indent: f32,
        width: Option<f32>,
    },
    Image {
        src: String,
        width: Option<f32>,
        height: Option<f32>,
        align: Align,
        indent: f32,
    },
    Space(f32),
    Rule,
    PageBreak,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Style {
    font_size: f32,
    align: Align,
    indent: f32,
    width: Option<f32>,
    height: Option<f32>,
    margin_top: f32,
    margin_bottom: f32,
    page_break_before: bool,
}

impl Style {
    fn root() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            align: Align::Left,
            indent: 0.0,
            width: None,
            height: None,
            margin_top: 0.0,
            margin_bottom: 0.0,
            page_break_before: false,
        }
    }

    /// Inherited properties of `self` plus the tag defaults of `tag`.
    fn child(&self, tag: &str) -> Self {
        let mut style = Self {
            height: None,
            margin_top: 0.0,
            margin_bottom: 0.0,
            page_break_before: false,
            ..*self
        };
        match tag {
            "h1" => {
                style.font_size = 16.0;
                style.margin_bottom = 8.0;
            }
            "h2" => {
                style.font_size = 13.0;
                style.margin_bottom = 6.0;
            }
            "h3" => {
                style.font_size = 11.0;
                style.margin_bottom = 4.0;
            }
            "p" => style.margin_bottom = 6.0,
            _ => {}
        }
        style
    }

    fn apply(&mut self, css: &str) {
        for decl in css.split(';') {
            let Some((prop, value)) = decl.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match prop.trim().to_ascii_lowercase().as_str() {
                "font-size" => {
                    if let Some(v) = parse_length(value) {
                        self.font_size = v;
                    }
                }
                "margin-top" => self.margin_top = parse_length(value).unwrap_or(0.0),
                "margin-bottom" => self.margin_bottom = parse_length(value).unwrap_or(0.0),
                "margin-left" => self.indent += parse_length(value).unwrap_or(0.0),
                "width" => self.width = parse_length(value).or(self.width),
                "height" => self.height = parse_length(value),
                "text-align" => {
                    self.align = match value {
                        "center" => Align::Center,
                        "right" => Align::Right,
                        _ => Align::Left,
                    }
                }
                "page-break-before" => self.page_break_before = value == "always",
                _ => {}
            }
        }
    }
}

/// A CSS length in points. Bare numbers are points.
pub fn parse_length(value: &str) -> Option<f32> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f32 = number.parse().ok()?;
    let factor = match unit.trim() {
        "" | "pt" => 1.0,
        "px" => 0.75,
        "mm" => MM,
        "cm" => MM * 10.0,
        "in" => 72.0,
        _ => return None,
    };
    Some(number * factor)
}

struct Frame {
    tag: String,
    style: Style,
    hidden: bool,
    block: bool,
}

struct Parser<'o> {
    options: &'o ParseOptions,
    stack: Vec<Frame>,
    text: String,
    blocks: Vec<Block>,
}

impl<'o> Parser<'o> {
    fn current(&self) -> (Style, bool) {
        self.stack
            .last()
            .map(|f| (f.style, f.hidden))
            .unwrap_or((Style::root(), false))
    }

    fn block_style(&self) -> Style {
        self.stack
            .iter()
            .rev()
            .find(|f| f.block)
            .map(|f| f.style)
            .unwrap_or_else(Style::root)
    }

    fn flush(&mut self) {
        let joined = self
            .text
            .split('\n')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join("\n");
        self.text.clear();
        let text = joined.trim_matches('\n');
        if text.is_empty() {
            return;
        }
        let style = self.block_style();
        self.blocks.push(Block::Text {
            text: text.to_string(),
            font_size: style.font_size,
            align: style.align,
            indent: style.indent,
            width: style.width,
        });
    }

    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<()> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
        let (parent, parent_hidden) = self.current();

        let mut class = None;
        let mut css = None;
        let mut src = None;
        let mut width_attr = None;
        let mut height_attr = None;
        for attr in e.attributes() {
            let attr = attr.map_err(|e| Error::Markup(e.to_string()))?;
            let value = attr.unescape_value()?.into_owned();
            match attr.key.as_ref() {
                b"class" => class = Some(value),
                b"style" => css = Some(value),
                b"src" => src = Some(value),
                b"width" => width_attr = parse_length(&value),
                b"height" => height_attr = parse_length(&value),
                _ => {}
            }
        }

        let skipped_class = class.as_deref().is_some_and(|c| {
            c.split_whitespace()
                .any(|c| self.options.skip_classes.iter().any(|s| s == c))
        });
        let hidden = parent_hidden || skipped_class || SKIPPED_TAGS.contains(&tag.as_str());

        let mut style = parent.child(&tag);
        if let Some(css) = css.as_deref() {
            style.apply(css);
        }
        let block = BLOCK_TAGS.contains(&tag.as_str());

        if !hidden {
            match tag.as_str() {
                "br" => self.text.push('\n'),
                "hr" => {
                    self.flush();
                    self.blocks.push(Block::Rule);
                }
                "img" => {
                    self.flush();
                    if let Some(src) = src {
                        self.push_margin(style.margin_top);
                        self.blocks.push(Block::Image {
                            src,
                            width: style.width.filter(|_| css_sets(&css, "width")).or(width_attr),
                            height: style.height.or(height_attr),
                            align: style.align,
                            indent: style.indent,
                        });
                        self.push_margin(style.margin_bottom);
                    }
                }
                _ if block => {
                    self.flush();
                    if style.page_break_before {
                        self.blocks.push(Block::PageBreak);
                    }
                    self.push_margin(style.margin_top);
                }
                _ => {}
            }
        }

        if empty {
            if block && !hidden {
                self.push_margin(style.margin_bottom);
            }
            return Ok(());
        }
        self.stack.push(Frame {
            tag,
            style,
            hidden,
            block,
        });
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> Result<()> {
        let tag = String::from_utf8_lossy(name).to_ascii_lowercase();
        let Some(frame) = self.stack.last() else {
            return Err(Error::Markup(format!("unexpected closing tag </{tag}>")));
        };
        if frame.tag != tag {
            return Err(Error::Markup(format!(
                "closing tag </{tag}> does not match <{}>",
                frame.tag
            )));
        }
        if frame.block && !frame.hidden {
            self.flush();
        }
        if let Some(frame) = self.stack.pop() {
            if frame.block && !frame.hidden {
                self.push_margin(frame.style.margin_bottom);
            }
        }
        Ok(())
    }

    fn push_margin(&mut self, points: f32) {
        if points > 0.0 {
            self.blocks.push(Block::Space(points));
        }
    }
}

fn css_sets(css: &Option<String>, prop: &str) -> bool {
    css.as_deref().is_some_and(|c| {
        c.split(';')
            .filter_map(|d| d.split_once(':'))
            .any(|(p, _)| p.trim().eq_ignore_ascii_case(prop))
    })
}

/// Parse `markup` into layout blocks.
pub fn parse(markup: &str, options: &ParseOptions) -> Result<Vec<Block>> {
    let mut reader = Reader::from_str(markup);
    reader.check_end_names(false);

    let mut parser = Parser {
        options,
        stack: Vec::new(),
        text: String::new(),
        blocks: Vec::new(),
    };

    loop {
        match reader.read_event()? {
            Event::Start(e) => parser.open(&e, false)?,
            Event::Empty(e) => parser.open(&e, true)?,
            Event::End(e) => parser.close(e.name().as_ref())?,
            Event::Text(e) => {
                if !parser.current().1 {
                    let text: Cow<'_, str> = e.unescape()?;
                    crate::pdf::text::push_collapsed(&mut parser.text, &text);
                }
            }
            Event::CData(e) => {
                if !parser.current().1 {
                    let raw = String::from_utf8_lossy(&e);
                    crate::pdf::text::push_collapsed(&mut parser.text, &raw);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = parser.stack.last() {
        return Err(Error::Markup(format!("unclosed element <{}>", open.tag)));
    }
    parser.flush();
    Ok(parser.blocks)
}
