//! Compiled report definitions: positioned elements with `$P{name}`
//! expressions, filled from a parameter map into a page print.
//!
//! A definition is an XML document:
//!
//! ```xml
//! <report name="letter" margin-top="42" margin-left="70">
//!   <parameter name="recipient_name" required="true"/>
//!   <text x="0" y="84" width="240" height="12" stretch="true">$P{recipient_name}</text>
//!   <image x="0" y="315" width="85" height="85" print-when="$P{qr_code_base64}">$P{qr_code_base64}</image>
//!   <line x="0" y="420" width="469"/>
//! </report>
//! ```
//!
//! Coordinates are points relative to the top-left of the margin box.
//! Elements are laid out in `y` order. A stretching text element that needs
//! more room than its declared height pushes every element below it down by
//! the difference; an element with `collapse="true"` whose `print-when` is
//! false pulls the elements below it up by its height. Content that runs past
//! the bottom margin continues on a new page.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::engine::layout::PageGeometry;
use crate::model::{FieldValue, Parameters};
use crate::pdf::{wrap, Align, DecodedImage, FontProgram, PageCanvas, PageSize, PdfBuilder};
use crate::{Error, Result};

/// Built-in parameter holding the current page number during fill.
pub const REPORT_PAGE: &str = "REPORT_PAGE";
/// Built-in parameter holding the report name.
pub const REPORT_NAME: &str = "REPORT_NAME";

const DEFAULT_TEXT_SIZE: f32 = 10.0;

#[derive(Debug, Deserialize)]
struct ReportXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@page-width", default)]
    page_width: Option<f32>,
    #[serde(rename = "@page-height", default)]
    page_height: Option<f32>,
    #[serde(rename = "@margin-top", default)]
    margin_top: Option<f32>,
    #[serde(rename = "@margin-right", default)]
    margin_right: Option<f32>,
    #[serde(rename = "@margin-bottom", default)]
    margin_bottom: Option<f32>,
    #[serde(rename = "@margin-left", default)]
    margin_left: Option<f32>,
    #[serde(rename = "$value", default)]
    items: Vec<ItemXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ItemXml {
    Parameter(ParameterXml),
    Text(ElementXml),
    Image(ElementXml),
    Line(ElementXml),
}

#[derive(Debug, Deserialize)]
struct ParameterXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@required", default)]
    required: bool,
}

/// Attributes shared by `text`, `image` and `line` elements.
#[derive(Debug, Deserialize)]
struct ElementXml {
    #[serde(rename = "@x")]
    x: f32,
    #[serde(rename = "@y")]
    y: f32,
    #[serde(rename = "@width")]
    width: f32,
    #[serde(rename = "@height", default)]
    height: f32,
    #[serde(rename = "@print-when", default)]
    print_when: Option<String>,
    #[serde(rename = "@collapse", default)]
    collapse: bool,
    #[serde(rename = "@size", default)]
    size: Option<f32>,
    #[serde(rename = "@align", default)]
    align: Option<String>,
    #[serde(rename = "@stretch", default)]
    stretch: bool,
    #[serde(rename = "$text", default)]
    expression: String,
}

/// A text template with parameter references resolved to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source.trim();
        while let Some(start) = rest.find("$P{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 3..];
            let end = after.find('}').ok_or_else(|| {
                Error::Report(format!("unterminated parameter reference in '{source}'"))
            })?;
            let name = after[..end].trim();
            if name.is_empty() {
                return Err(Error::Report(format!("empty parameter reference in '{source}'")));
            }
            segments.push(Segment::Param(name.to_string()));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn evaluate(&self, params: &Parameters) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(name) => match params.get(name) {
                    Some(FieldValue::Text(text)) => out.push_str(text),
                    Some(FieldValue::Flag(flag)) => out.push_str(if *flag { "true" } else { "false" }),
                    Some(FieldValue::Image(_)) | None => {}
                },
            }
        }
        out
    }

    /// Condition semantics: every referenced parameter is present, or, for a
    /// pure literal, the literal is non-empty.
    pub fn is_true(&self, params: &Parameters) -> bool {
        let mut referenced = false;
        for name in self.parameters() {
            referenced = true;
            if !params.get(name).is_some_and(FieldValue::is_present) {
                return false;
            }
        }
        referenced || !self.segments.is_empty()
    }

    /// The single parameter this expression consists of, if any.
    fn single_parameter(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Param(name)] => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone)]
enum ElementKind {
    Text {
        expression: Expression,
        size: f32,
        align: Align,
        stretch: bool,
    },
    Image {
        parameter: String,
    },
    Line,
}

#[derive(Debug, Clone)]
struct Element {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    print_when: Option<Expression>,
    collapse: bool,
    kind: ElementKind,
}

#[derive(Debug, Clone)]
pub struct ReportDefinition {
    name: String,
    geometry: PageGeometry,
    parameters: Vec<ParameterDef>,
    elements: Vec<Element>,
}

impl ReportDefinition {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::AssetMissing(path.to_path_buf()));
        }
        Self::compile(&std::fs::read_to_string(path)?)
    }

    /// Parse the XML, compile every expression and check parameter references.
    pub fn compile(source: &str) -> Result<Self> {
        let xml: ReportXml = quick_xml::de::from_str(source)?;
        let defaults = PageGeometry::default();
        let geometry = PageGeometry {
            size: PageSize {
                width: xml.page_width.unwrap_or(defaults.size.width),
                height: xml.page_height.unwrap_or(defaults.size.height),
            },
            margin_top: xml.margin_top.unwrap_or(defaults.margin_top),
            margin_right: xml.margin_right.unwrap_or(defaults.margin_right),
            margin_bottom: xml.margin_bottom.unwrap_or(defaults.margin_bottom),
            margin_left: xml.margin_left.unwrap_or(defaults.margin_left),
        };

        let mut parameters = vec![
            ParameterDef {
                name: REPORT_PAGE.to_string(),
                required: false,
            },
            ParameterDef {
                name: REPORT_NAME.to_string(),
                required: false,
            },
        ];
        let mut elements = Vec::new();
        for item in xml.items {
            match item {
                ItemXml::Parameter(p) => parameters.push(ParameterDef {
                    name: p.name,
                    required: p.required,
                }),
                ItemXml::Text(t) => {
                    let align = match t.align.as_deref() {
                        None | Some("left") => Align::Left,
                        Some("center") => Align::Center,
                        Some("right") => Align::Right,
                        Some(other) => {
                            return Err(Error::Report(format!("unknown alignment '{other}'")))
                        }
                    };
                    let kind = ElementKind::Text {
                        expression: Expression::compile(&t.expression)?,
                        size: t.size.unwrap_or(DEFAULT_TEXT_SIZE),
                        align,
                        stretch: t.stretch,
                    };
                    elements.push(Element::new(t, kind)?);
                }
                ItemXml::Image(i) => {
                    let expression = Expression::compile(&i.expression)?;
                    let parameter = expression.single_parameter().ok_or_else(|| {
                        Error::Report(format!(
                            "image expression must be a single parameter: '{}'",
                            i.expression
                        ))
                    })?;
                    let kind = ElementKind::Image {
                        parameter: parameter.to_string(),
                    };
                    elements.push(Element::new(i, kind)?);
                }
                ItemXml::Line(l) => elements.push(Element::new(l, ElementKind::Line)?),
            }
        }
        elements.sort_by(|a, b| a.y.total_cmp(&b.y));

        let definition = Self {
            name: xml.name,
            geometry,
            parameters,
            elements,
        };
        definition.check_references()?;
        debug!(
            report = %definition.name,
            elements = definition.elements.len(),
            "report definition compiled"
        );
        Ok(definition)
    }

    fn check_references(&self) -> Result<()> {
        for element in &self.elements {
            let mut names: Vec<&str> = element
                .print_when
                .iter()
                .flat_map(Expression::parameters)
                .collect();
            match &element.kind {
                ElementKind::Text { expression, .. } => names.extend(expression.parameters()),
                ElementKind::Image { parameter } => names.push(parameter),
                ElementKind::Line => {}
            }
            if let Some(unknown) = names
                .into_iter()
                .find(|n| !self.parameters.iter().any(|p| p.name == *n))
            {
                return Err(Error::Report(format!("undeclared parameter '{unknown}'")));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    /// Left margin that print item `x` coordinates are relative to.
    pub fn margin_left(&self) -> f32 {
        self.geometry.margin_left
    }

    /// Evaluate all elements against `params` and lay them out into pages.
    ///
    /// The map is consumed; page and report built-ins are written into it as
    /// the fill advances.
    pub fn fill(&self, font: &FontProgram, mut params: Parameters) -> Result<ReportPrint> {
        if let Some(missing) = self
            .parameters
            .iter()
            .find(|p| p.required && !params.get(&p.name).is_some_and(FieldValue::is_present))
        {
            return Err(Error::InvalidInput(format!(
                "missing required parameter '{}'",
                missing.name
            )));
        }
        params.insert(REPORT_NAME.to_string(), FieldValue::Text(self.name.clone()));

        let mut fill = Fill {
            geometry: &self.geometry,
            print: ReportPrint {
                size: self.geometry.size,
                pages: vec![Vec::new()],
                images: Vec::new(),
            },
            page_start: 0.0,
            shifts: Vec::new(),
        };
        fill.set_page_number(&mut params);

        for element in &self.elements {
            let y = element.y + fill.shift_at(element.y);
            let visible = element
                .print_when
                .as_ref()
                .map_or(true, |cond| cond.is_true(&params));
            if !visible {
                if element.collapse {
                    fill.shifts.push((element.y + element.height, -element.height));
                }
                continue;
            }

            match &element.kind {
                ElementKind::Text {
                    expression,
                    size,
                    align,
                    stretch,
                } => {
                    fill.break_before(y, &mut params);
                    let text = expression.evaluate(&params);
                    let line_height = font.line_height(*size);
                    let mut lines = wrap(font, &text, *size, element.width);
                    let needed = lines.len() as f32 * line_height;
                    if *stretch {
                        if needed > element.height {
                            fill.shifts.push((element.y + element.height, needed - element.height));
                        }
                    } else {
                        let fits = ((element.height / line_height).floor() as usize).max(1);
                        lines.truncate(fits);
                    }
                    let mut line_y = y;
                    for line in lines {
                        fill.break_before_span(line_y, line_height, &mut params);
                        let offset = align.offset(element.width, font.text_width(&line, *size));
                        let top = fill.top(line_y);
                        fill.current().push(PrintItem::Text {
                            x: element.x + offset,
                            top,
                            size: *size,
                            text: line,
                        });
                        line_y += line_height;
                    }
                }
                ElementKind::Image { parameter } => {
                    let image = match params.get(parameter) {
                        Some(FieldValue::Image(image)) => DecodedImage::from_ref(image)?,
                        Some(FieldValue::Text(payload)) if !payload.trim().is_empty() => {
                            DecodedImage::from_base64(payload)?
                        }
                        _ => continue,
                    };
                    fill.break_before_span(y, element.height, &mut params);
                    let index = fill.print.images.len();
                    fill.print.images.push(image);
                    let top = fill.top(y);
                    fill.current().push(PrintItem::Image {
                        index,
                        x: element.x,
                        top,
                        width: element.width,
                        height: element.height,
                    });
                }
                ElementKind::Line => {
                    fill.break_before(y, &mut params);
                    let top = fill.top(y);
                    fill.current().push(PrintItem::Line {
                        x: element.x,
                        top,
                        width: element.width,
                    });
                }
            }
        }

        Ok(fill.print)
    }
}

impl Element {
    fn new(xml: ElementXml, kind: ElementKind) -> Result<Self> {
        let print_when = xml
            .print_when
            .as_deref()
            .map(Expression::compile)
            .transpose()?;
        Ok(Self {
            x: xml.x,
            y: xml.y,
            width: xml.width,
            height: xml.height,
            print_when,
            collapse: xml.collapse,
            kind,
        })
    }
}

struct Fill<'d> {
    geometry: &'d PageGeometry,
    print: ReportPrint,
    /// Virtual y at which the current page begins.
    page_start: f32,
    /// `(threshold, delta)`: elements declared at or below `threshold` move by `delta`.
    shifts: Vec<(f32, f32)>,
}

impl Fill<'_> {
    fn body_height(&self) -> f32 {
        self.geometry.size.height - self.geometry.margin_top - self.geometry.margin_bottom
    }

    fn shift_at(&self, declared_y: f32) -> f32 {
        self.shifts
            .iter()
            .filter(|(threshold, _)| declared_y >= *threshold)
            .map(|(_, delta)| delta)
            .sum()
    }

    fn set_page_number(&self, params: &mut Parameters) {
        params.insert(
            REPORT_PAGE.to_string(),
            FieldValue::Text(self.print.pages.len().to_string()),
        );
    }

    fn new_page(&mut self, start: f32, params: &mut Parameters) {
        self.print.pages.push(Vec::new());
        self.page_start = start;
        self.set_page_number(params);
    }

    fn break_before(&mut self, y: f32, params: &mut Parameters) {
        if y >= self.page_start + self.body_height() {
            self.new_page(y, params);
        }
    }

    fn break_before_span(&mut self, y: f32, height: f32, params: &mut Parameters) {
        let page_has_content = self.print.pages.last().is_some_and(|p| !p.is_empty());
        if y + height > self.page_start + self.body_height() && page_has_content {
            self.new_page(y, params);
        }
    }

    fn top(&self, y: f32) -> f32 {
        self.geometry.margin_top + (y - self.page_start)
    }

    fn current(&mut self) -> &mut Vec<PrintItem> {
        let last = self.print.pages.len() - 1;
        &mut self.print.pages[last]
    }
}

/// A positioned element on a filled page. `x` is relative to the left margin.
#[derive(Debug, Clone, PartialEq)]
pub enum PrintItem {
    Text {
        x: f32,
        top: f32,
        size: f32,
        text: String,
    },
    Image {
        index: usize,
        x: f32,
        top: f32,
        width: f32,
        height: f32,
    },
    Line {
        x: f32,
        top: f32,
        width: f32,
    },
}

/// Output of the fill step: pages of positioned items and decoded images.
#[derive(Debug, Clone)]
pub struct ReportPrint {
    size: PageSize,
    pages: Vec<Vec<PrintItem>>,
    images: Vec<DecodedImage>,
}

impl ReportPrint {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &PrintItem> {
        self.pages.iter().flatten()
    }

    /// Write the print to a PDF; `left` is the left margin the items are relative to.
    pub fn export(&self, font: &FontProgram, left: f32, title: &str) -> Result<Vec<u8>> {
        let mut builder = PdfBuilder::new(font, true);
        let xobjects: Vec<_> = self.images.iter().map(|img| builder.add_image(img)).collect();

        for items in &self.pages {
            let mut page = PageCanvas::new(self.size);
            for item in items {
                match item {
                    PrintItem::Text { x, top, size, text } => {
                        page.text(font, left + x, *top, *size, text)?
                    }
                    PrintItem::Image {
                        index,
                        x,
                        top,
                        width,
                        height,
                    } => page.image(&xobjects[*index], left + x, *top, *width, *height),
                    PrintItem::Line { x, top, width } => page.rule(left + x, *top, *width, 0.5),
                }
            }
            builder.push_page(page)?;
        }
        builder.finish(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetDir;

    const SMALL: &str = r#"
        <report name="small" margin-top="40" margin-left="50">
          <parameter name="title" required="true"/>
          <parameter name="note"/>
          <text x="0" y="0" width="200" height="14" stretch="true">$P{title}</text>
          <text x="0" y="20" width="200" height="12" print-when="$P{note}" collapse="true">Hinweis: $P{note}</text>
          <text x="0" y="40" width="200" height="12">Seite $P{REPORT_PAGE} von $P{REPORT_NAME}</text>
        </report>"#;

    fn font() -> FontProgram {
        FontProgram::load(&AssetDir::bundled().font().unwrap()).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::from(*v)))
            .collect()
    }

    fn text_tops(print: &ReportPrint) -> Vec<(String, f32)> {
        print
            .items()
            .filter_map(|i| match i {
                PrintItem::Text { text, top, .. } => Some((text.clone(), *top)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_expression_compile_and_evaluate() {
        let expr = Expression::compile("Hallo $P{name}, $P{ city }!").unwrap();
        assert_eq!(expr.parameters().collect::<Vec<_>>(), vec!["name", "city"]);
        let p = params(&[("name", "Anna"), ("city", "Köln")]);
        assert_eq!(expr.evaluate(&p), "Hallo Anna, Köln!");
        assert!(expr.is_true(&p));
        assert!(!expr.is_true(&params(&[("name", "Anna")])));
        assert!(Expression::compile("$P{open").is_err());
    }

    #[test]
    fn test_fill_evaluates_and_collapses() {
        let definition = ReportDefinition::compile(SMALL).unwrap();
        let print = definition.fill(&font(), params(&[("title", "Brief")])).unwrap();
        let tops = text_tops(&print);
        assert_eq!(tops[0], ("Brief".to_string(), 40.0));
        assert_eq!(tops[1].0, "Seite 1 von small");
        assert_eq!(tops[1].1, 40.0 + 40.0 - 12.0);
    }

    #[test]
    fn test_stretch_pushes_following_elements_down() {
        let definition = ReportDefinition::compile(SMALL).unwrap();
        let long = "Prof. Dr. Dr. h.c. mult. Maximilian Alexander Friedrich Wilhelm von und zu \
                    Hohenstaufen-Schwarzenberg";
        let print = definition
            .fill(&font(), params(&[("title", long), ("note", "x")]))
            .unwrap();
        let tops = text_tops(&print);
        let joined: Vec<&str> = tops
            .iter()
            .take_while(|(t, _)| !t.starts_with("Hinweis"))
            .map(|(t, _)| t.as_str())
            .collect();
        assert!(joined.len() > 1);
        assert_eq!(joined.join(" "), long.split_whitespace().collect::<Vec<_>>().join(" "));

        let last_title_top = tops[joined.len() - 1].1;
        let note_top = tops[joined.len()].1;
        assert!(note_top > last_title_top);
    }

    #[test]
    fn test_missing_required_parameter() {
        let definition = ReportDefinition::compile(SMALL).unwrap();
        let err = definition.fill(&font(), Parameters::new()).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_undeclared_parameter_is_rejected() {
        let source = r#"<report name="bad"><text x="0" y="0" width="10">$P{nope}</text></report>"#;
        assert!(matches!(ReportDefinition::compile(source), Err(Error::Report(_))));
    }

    #[test]
    fn test_overflow_continues_on_new_page() {
        let mut source = String::from(r#"<report name="long"><parameter name="t"/>"#);
        for i in 0..120 {
            source.push_str(&format!(
                r#"<text x="0" y="{}" width="300" height="12">$P{{t}} {i}</text>"#,
                i * 12
            ));
        }
        source.push_str("</report>");
        let definition = ReportDefinition::compile(&source).unwrap();
        let print = definition.fill(&font(), params(&[("t", "Zeile")])).unwrap();
        assert!(print.page_count() > 1);

        let pdf = print.export(&font(), definition.margin_left(), "long").unwrap();
        assert_eq!(crate::pdf::inspect::page_count(&pdf).unwrap(), print.page_count());
    }

    #[test]
    fn test_bundled_definition_compiles() {
        let definition = ReportDefinition::load(&AssetDir::bundled().report_definition().unwrap()).unwrap();
        assert_eq!(definition.name(), "letter");
        assert!(definition.parameters().iter().any(|p| p.name == "recipient_name" && p.required));
    }
}
