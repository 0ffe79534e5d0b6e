//! The letter model: an ordered field map every rendering engine accepts.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::address::Address;
use crate::qr::QrPayload;
use crate::{Error, Result};

/// Field names shared by templates, report definitions and the builder.
pub mod fields {
    pub const RECIPIENT_NAME: &str = "recipient_name";
    pub const RECIPIENT_STREET: &str = "recipient_street";
    pub const RECIPIENT_CITY: &str = "recipient_city";
    pub const RECIPIENT_COMPANY: &str = "recipient_company";
    pub const RECIPIENT_DEPARTMENT: &str = "recipient_department";
    pub const RECIPIENT_EXTRA: &str = "recipient_extra";
    pub const SENDER_LINE: &str = "sender_line";
    pub const DATE: &str = "date";
    pub const SUBJECT: &str = "subject";
    pub const BODY_TEXT: &str = "body_text";
    pub const SHOW_NOTICE: &str = "show_notice";
    pub const NOTICE_TEXT: &str = "notice_text";
    pub const SHOW_DISCLAIMER: &str = "show_disclaimer";
    pub const DISCLAIMER_TEXT: &str = "disclaimer_text";
    pub const SENDER_NAME: &str = "sender_name";
    pub const TERMS_TEXT: &str = "terms_text";
    pub const CONTACT_INFO: &str = "contact_info";
    pub const QR_CODE_DATA_URI: &str = "qr_code_data_uri";
    pub const QR_CODE_BASE64: &str = "qr_code_base64";

    /// Fields without which no engine can produce a letter.
    pub const REQUIRED: &[&str] = &[
        RECIPIENT_NAME,
        RECIPIENT_STREET,
        RECIPIENT_CITY,
        SUBJECT,
        BODY_TEXT,
    ];

    // Product information sheet.
    pub const TITLE: &str = "title";
    pub const SUBTITLE: &str = "subtitle";
    pub const PRODUCT_NAME: &str = "product_name";
    pub const PRODUCT_DESCRIPTION: &str = "product_description";
    pub const PRICE: &str = "price";
    pub const AVAILABILITY: &str = "availability";
    pub const CONTACT_PERSON: &str = "contact_person";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const COMPANY_ADDRESS: &str = "company_address";
    pub const SHOW_SPECIAL_OFFER: &str = "show_special_offer";
    pub const SPECIAL_OFFER_TEXT: &str = "special_offer_text";
    pub const FOOTER_TEXT: &str = "footer_text";

    pub const PRODUCT_REQUIRED: &[&str] = &[TITLE, PRODUCT_NAME, PRICE, CONTACT_PERSON, COMPANY_ADDRESS];
}

/// The kind of document a template lays out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DocumentKind {
    #[default]
    Letter,
    ProductSheet,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Letter => "letter",
            DocumentKind::ProductSheet => "product-sheet",
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            DocumentKind::Letter => fields::REQUIRED,
            DocumentKind::ProductSheet => fields::PRODUCT_REQUIRED,
        }
    }

    /// Benchmark model of this kind for one address.
    pub fn model(&self, address: &Address, qr: Option<&QrPayload>, repr: ImageRepr) -> LetterModel {
        LetterBuilder::for_address(address)
            .content(*self)
            .qr(qr, repr)
            .build()
    }
}

const STANDARD_DATE: &str = "24. Februar 2026";
const STANDARD_SUBJECT: &str = "Betreff: Wichtige Mitteilung";
const STANDARD_BODY: &str = "Sehr geehrte Damen und Herren, hiermit möchten wir Sie über wichtige \
Änderungen informieren. Bitte lesen Sie dieses Schreiben sorgfältig durch und bewahren Sie es \
für Ihre Unterlagen auf.";
const STANDARD_NOTICE: &str = "Hinweis: Bitte beachten Sie die beigefügten Unterlagen und senden \
Sie uns Ihre Rückmeldung bis zum 15.03.2026.";
const STANDARD_SENDER_NAME: &str = "Dr. Anna Schmidt";
const STANDARD_SENDER_LINE: &str = "ACME GmbH | Innovationsweg 10 | 80339 München";
const STANDARD_TERMS: &str = "Es gelten die Allgemeinen Geschäftsbedingungen der ACME GmbH in der \
jeweils gültigen Fassung. Änderungen bedürfen der Schriftform. Der Gerichtsstand ist München.";
const STANDARD_DISCLAIMER: &str = "Haftungsausschluss: Dieses Dokument dient ausschließlich zu \
Informationszwecken. Eine Haftung für die Richtigkeit und Vollständigkeit wird nicht übernommen.";
const PRODUCT_TITLE: &str = "Produktinformation";
const PRODUCT_NAME: &str = "Premium Dienstleistungspaket";
const PRODUCT_DESCRIPTION: &str = "Unser umfassendes Dienstleistungspaket bietet Ihnen \
maßgeschneiderte Lösungen.";
const PRODUCT_PRICE: &str = "EUR 2.499,00 zzgl. MwSt.";
const PRODUCT_AVAILABILITY: &str = "Sofort verfügbar";
const PRODUCT_CONTACT: &str = "Thomas Müller";
const PRODUCT_PHONE: &str = "+49 89 123456-10";
const PRODUCT_EMAIL: &str = "vertrieb@acme-gmbh.de";
const PRODUCT_COMPANY: &str = "ACME GmbH, Innovationsweg 10, 80339 München";
const PRODUCT_OFFER: &str = "Sonderangebot: 15% Rabatt bei Bestellung bis zum 31.03.2026!";
const PRODUCT_FOOTER: &str = "Alle Preise verstehen sich zzgl. der gesetzlichen Mehrwertsteuer.";
const STANDARD_CONTACT: &str =
    "Kontakt: info@acme-gmbh.de | Tel: +49 89 123456-0 | Fax: +49 89 123456-99";

/// How an engine wants the QR image handed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRepr {
    /// `data:image/png;base64,...` string under `qr_code_data_uri` (markup engines).
    DataUri,
    /// Bare base64 PNG under `qr_code_base64` (report engine).
    Base64,
}

/// Opaque reference to an image carried by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Raw encoded image bytes.
    Bytes(Arc<[u8]>),
    /// Base64 of the encoded image.
    Base64(Arc<str>),
    /// Complete data URI.
    DataUri(Arc<str>),
}

impl ImageRef {
    /// The image as a `src`-ready data URI; bare base64 is returned unchanged.
    pub fn to_data_uri(&self) -> String {
        match self {
            ImageRef::Bytes(bytes) => {
                let mime = image::guess_format(bytes)
                    .map(|format| format.to_mime_type())
                    .unwrap_or("application/octet-stream");
                format!("data:{mime};base64,{}", STANDARD.encode(bytes))
            }
            ImageRef::Base64(payload) => payload.to_string(),
            ImageRef::DataUri(uri) => uri.to_string(),
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Image(ImageRef),
}

impl FieldValue {
    /// Truthiness used by optional sections: set flags, non-empty text, any image.
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::Flag(b) => *b,
            FieldValue::Image(_) => true,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Flag(b)
    }
}

impl From<ImageRef> for FieldValue {
    fn from(img: ImageRef) -> Self {
        FieldValue::Image(img)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Flag(b) => serializer.serialize_bool(*b),
            FieldValue::Image(ImageRef::Base64(s)) | FieldValue::Image(ImageRef::DataUri(s)) => {
                serializer.serialize_str(s)
            }
            FieldValue::Image(image @ ImageRef::Bytes(_)) => {
                serializer.serialize_str(&image.to_data_uri())
            }
        }
    }
}

/// Parameter map handed to engines that consume the model directly.
pub type Parameters = IndexMap<String, FieldValue>;

/// Ordered mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LetterModel {
    fields: Parameters,
}

impl LetterModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(FieldValue::Flag(true)))
    }

    pub fn image(&self, key: &str) -> Option<&ImageRef> {
        match self.fields.get(key) {
            Some(FieldValue::Image(img)) => Some(img),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reject models that lack a required letter field.
    pub fn validate(&self) -> Result<()> {
        self.validate_as(DocumentKind::Letter)
    }

    /// Reject models that lack a text field `kind` requires.
    pub fn validate_as(&self, kind: DocumentKind) -> Result<()> {
        for key in kind.required_fields() {
            match self.fields.get(*key) {
                Some(FieldValue::Text(_)) => {}
                Some(_) => {
                    return Err(Error::InvalidInput(format!(
                        "field '{key}' must be text"
                    )))
                }
                None => {
                    return Err(Error::InvalidInput(format!(
                        "missing required field '{key}'"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Owned copy of the fields for engines whose fill step mutates its parameters.
    pub fn to_parameters(&self) -> Parameters {
        self.fields.clone()
    }
}

impl Serialize for LetterModel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Assembles the standard letter around one address.
#[derive(Debug, Clone)]
pub struct LetterBuilder {
    model: LetterModel,
}

impl LetterBuilder {
    /// Start a model carrying only the address fields.
    pub fn for_address(address: &Address) -> Self {
        let mut model = LetterModel::new();
        model.insert(fields::RECIPIENT_NAME, address.recipient_name.as_str());
        model.insert(fields::RECIPIENT_STREET, address.recipient_street.as_str());
        model.insert(fields::RECIPIENT_CITY, address.recipient_city.as_str());
        Self { model }
    }

    /// Fill in the shared constant content used by every benchmark document.
    pub fn standard_content(mut self) -> Self {
        let m = &mut self.model;
        m.insert(fields::SENDER_LINE, STANDARD_SENDER_LINE);
        m.insert(fields::DATE, STANDARD_DATE);
        m.insert(fields::SUBJECT, STANDARD_SUBJECT);
        m.insert(fields::BODY_TEXT, STANDARD_BODY);
        m.insert(fields::SHOW_NOTICE, true);
        m.insert(fields::NOTICE_TEXT, STANDARD_NOTICE);
        m.insert(fields::SENDER_NAME, STANDARD_SENDER_NAME);
        m.insert(fields::TERMS_TEXT, STANDARD_TERMS);
        m.insert(fields::SHOW_DISCLAIMER, true);
        m.insert(fields::DISCLAIMER_TEXT, STANDARD_DISCLAIMER);
        m.insert(fields::CONTACT_INFO, STANDARD_CONTACT);
        self
    }

    /// Fill in the constant content of `kind`.
    pub fn content(self, kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Letter => self.standard_content(),
            DocumentKind::ProductSheet => self.product_content(),
        }
    }

    /// Fill in the product information sheet content.
    pub fn product_content(mut self) -> Self {
        let m = &mut self.model;
        m.insert(fields::TITLE, PRODUCT_TITLE);
        m.insert(fields::SUBTITLE, PRODUCT_NAME);
        m.insert(fields::PRODUCT_NAME, PRODUCT_NAME);
        m.insert(fields::PRODUCT_DESCRIPTION, PRODUCT_DESCRIPTION);
        m.insert(fields::PRICE, PRODUCT_PRICE);
        m.insert(fields::AVAILABILITY, PRODUCT_AVAILABILITY);
        m.insert(fields::CONTACT_PERSON, PRODUCT_CONTACT);
        m.insert(fields::PHONE, PRODUCT_PHONE);
        m.insert(fields::EMAIL, PRODUCT_EMAIL);
        m.insert(fields::COMPANY_ADDRESS, PRODUCT_COMPANY);
        m.insert(fields::SHOW_SPECIAL_OFFER, true);
        m.insert(fields::SPECIAL_OFFER_TEXT, PRODUCT_OFFER);
        m.insert(fields::FOOTER_TEXT, PRODUCT_FOOTER);
        self
    }

    /// Attach the QR image in the representation the target engine expects.
    /// `None` leaves the QR field out so the section is omitted.
    pub fn qr(mut self, payload: Option<&QrPayload>, repr: ImageRepr) -> Self {
        if let Some(payload) = payload {
            match repr {
                ImageRepr::DataUri => self.model.insert(
                    fields::QR_CODE_DATA_URI,
                    ImageRef::DataUri(payload.data_uri()),
                ),
                ImageRepr::Base64 => self
                    .model
                    .insert(fields::QR_CODE_BASE64, ImageRef::Base64(payload.base64())),
            }
        }
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.model.insert(key, value);
        self
    }

    pub fn build(self) -> LetterModel {
        self.model
    }
}

/// Build the benchmark model for one address.
pub fn standard_letter(
    address: &Address,
    qr: Option<&QrPayload>,
    repr: ImageRepr,
) -> LetterModel {
    LetterBuilder::for_address(address)
        .standard_content()
        .qr(qr, repr)
        .build()
}

/// Build the product information sheet, personalised for one address.
pub fn product_sheet(address: &Address, qr: Option<&QrPayload>, repr: ImageRepr) -> LetterModel {
    LetterBuilder::for_address(address)
        .product_content()
        .qr(qr, repr)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Address {
        Address::new("Hans Müller", "Königstraße 42", "80331 München")
    }

    #[test]
    fn test_standard_letter_is_valid() {
        let model = standard_letter(&sample(), None, ImageRepr::DataUri);
        model.validate().unwrap();
        assert_eq!(model.text(fields::RECIPIENT_NAME), Some("Hans Müller"));
        assert!(model.flag(fields::SHOW_NOTICE));
        assert!(model.get(fields::QR_CODE_DATA_URI).is_none());
    }

    #[test]
    fn test_field_order_is_insertion_order() {
        let model = standard_letter(&sample(), None, ImageRepr::DataUri);
        let keys: Vec<&str> = model.iter().map(|(k, _)| k).take(4).collect();
        assert_eq!(
            keys,
            vec![
                fields::RECIPIENT_NAME,
                fields::RECIPIENT_STREET,
                fields::RECIPIENT_CITY,
                fields::SENDER_LINE
            ]
        );
    }

    #[test]
    fn test_missing_required_field_is_invalid_input() {
        let mut model = standard_letter(&sample(), None, ImageRepr::DataUri);
        model.remove(fields::RECIPIENT_CITY);
        let err = model.validate().unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_qr_representation_selects_field() {
        let payload = QrPayload::from_png(vec![1, 2, 3]);
        let uri = standard_letter(&sample(), Some(&payload), ImageRepr::DataUri);
        assert!(matches!(
            uri.image(fields::QR_CODE_DATA_URI),
            Some(ImageRef::DataUri(s)) if s.starts_with("data:image/png;base64,")
        ));
        assert!(uri.image(fields::QR_CODE_BASE64).is_none());

        let b64 = standard_letter(&sample(), Some(&payload), ImageRepr::Base64);
        assert!(matches!(
            b64.image(fields::QR_CODE_BASE64),
            Some(ImageRef::Base64(s)) if s.as_ref() == "AQID"
        ));
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let model = LetterBuilder::for_address(&sample())
            .set(fields::SHOW_NOTICE, false)
            .build();
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["recipient_name"], "Hans Müller");
        assert_eq!(json["show_notice"], false);
    }

    #[test]
    fn test_raw_image_bytes_serialize_as_data_uri() {
        let png = crate::qr::encode_png("x", 64).unwrap();
        let model = LetterBuilder::for_address(&sample())
            .set(fields::QR_CODE_DATA_URI, ImageRef::Bytes(Arc::from(png.clone())))
            .build();
        let json = serde_json::to_value(&model).unwrap();
        let uri = json["qr_code_data_uri"].as_str().unwrap();
        assert_eq!(uri, QrPayload::from_png(png).data_uri().as_ref());

        let unknown = ImageRef::Bytes(Arc::from(vec![1u8, 2, 3])).to_data_uri();
        assert_eq!(unknown, "data:application/octet-stream;base64,AQID");
    }

    #[test]
    fn test_product_sheet_is_validated_by_its_own_fields() {
        let sheet = product_sheet(&sample(), None, ImageRepr::DataUri);
        sheet.validate_as(DocumentKind::ProductSheet).unwrap();
        assert!(sheet.validate().unwrap_err().is_invalid_input());
        assert_eq!(sheet.text(fields::CONTACT_PERSON), Some("Thomas Müller"));

        let letter = DocumentKind::Letter.model(&sample(), None, ImageRepr::DataUri);
        assert!(letter.validate_as(DocumentKind::ProductSheet).is_err());
    }

    #[test]
    fn test_presence_rules() {
        assert!(!FieldValue::from("  ").is_present());
        assert!(FieldValue::from("x").is_present());
        assert!(!FieldValue::from(false).is_present());
        assert!(FieldValue::Image(ImageRef::Bytes(Arc::from(vec![0u8]))).is_present());
    }
}
