//! Behaviour every engine variant must share, checked against the bundled assets.

use std::sync::Arc;

use letter_render_bench::address::{self, Address};
use letter_render_bench::assets::AssetDir;
use letter_render_bench::engine::PRODUCT_SHEET_TEMPLATE;
use letter_render_bench::harness::{DEFAULT_QR_SIZE, DEFAULT_QR_TEXT};
use letter_render_bench::model::{
    fields, product_sheet, standard_letter, ImageRef, ImageRepr, LetterBuilder,
};
use letter_render_bench::pdf::inspect;
use letter_render_bench::qr::{self, QrPayload};
use letter_render_bench::{EngineContext, EngineKind, Error, RenderingEngine};

fn ctx() -> EngineContext {
    EngineContext::new(AssetDir::bundled())
}

fn engines() -> Vec<Box<dyn RenderingEngine>> {
    let ctx = ctx();
    EngineKind::ALL
        .iter()
        .map(|kind| kind.build(&ctx).unwrap())
        .collect()
}

fn qr() -> QrPayload {
    QrPayload::from_text(DEFAULT_QR_TEXT, DEFAULT_QR_SIZE).unwrap()
}

#[test]
fn test_every_engine_renders_address() {
    let address = Address::new("Jürgen Schröder", "Königstraße 42", "80331 München");
    let qr = qr();
    for engine in engines() {
        let model = standard_letter(&address, Some(&qr), engine.image_repr());
        let pdf = engine.render(&model).unwrap();

        assert!(inspect::is_pdf(&pdf), "{} output lacks %PDF", engine.name());
        let text = inspect::extract_text(&pdf).unwrap();
        assert!(text.contains("Jürgen Schröder"), "{}: name missing", engine.name());
        assert!(text.contains("80331 München"), "{}: city missing", engine.name());
        assert!(inspect::page_count(&pdf).unwrap() >= 1);
    }
}

#[test]
fn test_every_engine_renders_generated_addresses() {
    let qr = qr();
    let addresses = address::generate(42, 5);
    for engine in engines() {
        for address in &addresses {
            let model = standard_letter(address, Some(&qr), engine.image_repr());
            let text = inspect::extract_text(&engine.render(&model).unwrap()).unwrap();
            assert!(text.contains(&address.recipient_name), "{}", engine.name());
            assert!(text.contains(&address.recipient_city), "{}", engine.name());
        }
    }
}

#[test]
fn test_without_qr_no_image_is_embedded() {
    let address = Address::new("Maria Weber", "Lindenstraße 3", "50667 Köln");
    for engine in engines() {
        let model = standard_letter(&address, None, engine.image_repr());
        let pdf = engine.render(&model).unwrap();
        assert!(inspect::is_pdf(&pdf));
        assert_eq!(inspect::image_count(&pdf).unwrap(), 0, "{}", engine.name());
    }
}

#[test]
fn test_qr_image_matches_input_text() {
    let expected = qr::render(DEFAULT_QR_TEXT, DEFAULT_QR_SIZE).unwrap();
    let qr = qr();
    let address = Address::new("Uwe Braun", "Am Markt 1", "53111 Bonn");
    for engine in engines() {
        let model = standard_letter(&address, Some(&qr), engine.image_repr());
        let images = inspect::images(&engine.render(&model).unwrap()).unwrap();

        assert_eq!(images.len(), 1, "{}", engine.name());
        let image = &images[0];
        assert_eq!((image.width, image.height), expected.dimensions());
        assert_eq!(image.samples, expected.as_raw().as_slice(), "{}", engine.name());
    }
}

#[test]
fn test_very_long_recipient_name_renders() {
    let name = format!("Dr. {}", "Maximilian-Alexander von Hohenzollern-Sigmaringen ".repeat(3));
    assert!(name.len() > 90);
    let address = Address::new(name.trim(), "Schillerstraße 200", "04109 Leipzig");
    for engine in engines() {
        let model = standard_letter(&address, None, engine.image_repr());
        let pdf = engine.render(&model).unwrap();
        assert!(inspect::is_pdf(&pdf), "{}", engine.name());
        let text = inspect::extract_text(&pdf).unwrap();
        assert!(text.contains("Hohenzollern"), "{}", engine.name());
        assert!(text.contains("04109 Leipzig"), "{}", engine.name());
    }
}

#[test]
fn test_names_beyond_latin1_are_printed_literally() {
    let address = Address::new("Aylin Yıldız", "Łódźer Straße 5", "90402 Nürnberg");
    for engine in engines() {
        let model = standard_letter(&address, None, engine.image_repr());
        let text = inspect::extract_text(&engine.render(&model).unwrap()).unwrap();
        assert!(text.contains("Aylin Yıldız"), "{}: {text}", engine.name());
        assert!(text.contains("Łódźer Straße 5"), "{}: {text}", engine.name());
    }
}

#[test]
fn test_characters_without_glyph_fail_the_render() {
    let address = Address::new("山田 太郎", "Hauptstraße 1", "10115 Berlin");
    for engine in engines() {
        let model = standard_letter(&address, None, engine.image_repr());
        match engine.render(&model) {
            Err(Error::Font(message)) => assert!(message.contains("U+"), "{}: {message}", engine.name()),
            Err(other) => panic!("{}: unexpected error: {other}", engine.name()),
            Ok(_) => panic!("{} rendered text it has no glyphs for", engine.name()),
        }
    }
}

#[test]
fn test_long_sender_name_is_printed_in_full() {
    let address = Address::new("Petra Schulz", "Gartenweg 4", "01067 Dresden");
    let sender = "Dr. Anna Schmidt, Abteilungsleiterin Forderungsmanagement und Vertragswesen, \
                  im Auftrag der Beispiel Versicherungsgesellschaft AG Kundenservice";
    for engine in engines() {
        let model = LetterBuilder::for_address(&address)
            .standard_content()
            .set(fields::SENDER_NAME, sender)
            .build();
        let text = inspect::extract_text(&engine.render(&model).unwrap()).unwrap();
        assert!(text.contains("Abteilungsleiterin"), "{}", engine.name());
        assert!(text.contains("Kundenservice"), "{}: sender name cut off", engine.name());
    }
}

#[test]
fn test_raw_image_bytes_are_embedded() {
    let expected = qr::render(DEFAULT_QR_TEXT, DEFAULT_QR_SIZE).unwrap();
    let png: Arc<[u8]> = Arc::from(qr().png());
    let address = Address::new("Olaf Becker", "Mühlenweg 2", "24103 Kiel");
    for engine in engines() {
        let field = match engine.image_repr() {
            ImageRepr::DataUri => fields::QR_CODE_DATA_URI,
            ImageRepr::Base64 => fields::QR_CODE_BASE64,
        };
        let model = LetterBuilder::for_address(&address)
            .standard_content()
            .set(field, ImageRef::Bytes(Arc::clone(&png)))
            .build();
        let images = inspect::images(&engine.render(&model).unwrap()).unwrap();
        assert_eq!(images.len(), 1, "{}: byte image dropped", engine.name());
        assert_eq!(images[0].samples, expected.as_raw().as_slice(), "{}", engine.name());
    }
}

#[test]
fn test_missing_required_field_is_invalid_input() {
    let address = Address::new("Karin Lange", "Rosenweg 8", "33602 Bielefeld");
    for engine in engines() {
        let mut model = standard_letter(&address, None, engine.image_repr());
        model.remove(fields::RECIPIENT_CITY);
        let err = engine.render(&model).unwrap_err();
        assert!(err.is_invalid_input(), "{}: {err}", engine.name());
    }
}

#[test]
fn test_optional_sections_may_be_absent() {
    let address = Address::new("Frank Koch", "Waldstraße 17", "28195 Bremen");
    for engine in engines() {
        let mut model = standard_letter(&address, None, engine.image_repr());
        for field in [
            fields::SHOW_NOTICE,
            fields::NOTICE_TEXT,
            fields::SHOW_DISCLAIMER,
            fields::DISCLAIMER_TEXT,
            fields::TERMS_TEXT,
            fields::CONTACT_INFO,
            fields::SENDER_LINE,
        ] {
            model.remove(field);
        }
        let text = inspect::extract_text(&engine.render(&model).unwrap()).unwrap();
        assert!(text.contains("Frank Koch"), "{}", engine.name());
    }
}

#[test]
fn test_address_window_extras_are_printed() {
    let address = Address::new("Sabine Klein", "Parkstraße 5", "70173 Stuttgart");
    for engine in engines() {
        let model = LetterBuilder::for_address(&address)
            .standard_content()
            .set(fields::RECIPIENT_COMPANY, "Klein & Partner GmbH")
            .set(fields::RECIPIENT_DEPARTMENT, "Buchhaltung")
            .build();
        let text = inspect::extract_text(&engine.render(&model).unwrap()).unwrap();
        assert!(text.contains("Klein & Partner GmbH"), "{}", engine.name());
        assert!(text.contains("Buchhaltung"), "{}", engine.name());
    }
}

#[test]
fn test_missing_assets_fail_construction() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = EngineContext::new(AssetDir::new(dir.path()));
    for kind in EngineKind::ALL {
        match kind.build(&ctx) {
            Err(err) => assert!(err.is_asset_missing(), "{}: {err}", kind.as_str()),
            Ok(_) => panic!("{} built without assets", kind.as_str()),
        }
    }
}

#[test]
fn test_missing_template_is_reported_by_path() {
    let mut ctx = ctx();
    ctx.template = "template-z".into();
    for kind in [EngineKind::Flow, EngineKind::Print] {
        match kind.build(&ctx) {
            Err(Error::AssetMissing(path)) => {
                assert!(path.ends_with("template-z.html"), "{}", path.display())
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("{} built without its template", kind.as_str()),
        }
    }
}

#[test]
fn test_engine_reuse_keeps_no_state() {
    let qr = qr();
    let first = Address::new("Hans Müller", "Hauptstraße 1", "10115 Berlin");
    let second = Address::new("Ingrid Wolf", "Birkenweg 9", "20095 Hamburg");
    for engine in engines() {
        let repr = engine.image_repr();
        engine.render(&standard_letter(&first, Some(&qr), repr)).unwrap();
        let pdf = engine.render(&standard_letter(&second, Some(&qr), repr)).unwrap();
        let text = inspect::extract_text(&pdf).unwrap();
        assert!(text.contains("Ingrid Wolf"));
        assert!(!text.contains("Hans Müller"), "{} leaked state", engine.name());
    }
}

#[test]
fn test_product_sheet_renders_through_markup_engines() {
    let ctx = ctx().with_template(PRODUCT_SHEET_TEMPLATE);
    let qr = qr();
    let address = Address::new("Lena Hoffmann", "Schlossallee 12", "69117 Heidelberg");
    for kind in [EngineKind::Flow, EngineKind::Print] {
        let engine = kind.build(&ctx).unwrap();
        let model = product_sheet(&address, Some(&qr), engine.image_repr());
        let pdf = engine.render(&model).unwrap();

        assert!(inspect::is_pdf(&pdf), "{}", engine.name());
        let text = inspect::extract_text(&pdf).unwrap();
        for expected in ["Thomas Müller", "Produktinformation", "EUR 2.499", "ACME GmbH", "Sonderangebot"] {
            assert!(text.contains(expected), "{}: '{expected}' missing", engine.name());
        }
        assert!(text.contains("Lena Hoffmann"), "{}", engine.name());
        assert_eq!(inspect::image_count(&pdf).unwrap(), 1, "{}", engine.name());
    }
}

#[test]
fn test_product_sheet_requires_its_own_fields() {
    let ctx = ctx().with_template(PRODUCT_SHEET_TEMPLATE);
    let address = Address::new("Lena Hoffmann", "Schlossallee 12", "69117 Heidelberg");
    for kind in [EngineKind::Flow, EngineKind::Print] {
        let engine = kind.build(&ctx).unwrap();
        let letter = standard_letter(&address, None, engine.image_repr());
        assert!(engine.render(&letter).unwrap_err().is_invalid_input(), "{}", engine.name());

        let mut sheet = product_sheet(&address, None, engine.image_repr());
        sheet.remove(fields::PRICE);
        assert!(engine.render(&sheet).unwrap_err().is_invalid_input(), "{}", engine.name());
    }
}

#[test]
fn test_report_engine_has_no_product_sheet() {
    let ctx = ctx().with_template(PRODUCT_SHEET_TEMPLATE);
    match EngineKind::Report.build(&ctx) {
        Err(Error::Config(message)) => assert!(message.contains(PRODUCT_SHEET_TEMPLATE)),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("report engine accepted the product sheet template"),
    }
}
