//! Integration tests for the timeline merge library

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use lopdf::{Dictionary, Document, Object, Stream};
use tempfile::TempDir;
use timeline_merge::pdf::{count_pages, count_pages_in_bytes, extract_metadata};
use timeline_merge::{
    merge, Error, FailurePolicy, Length, MergeOptions, PageGeometry, SourceItem, SourceKind,
};

/// Build an in-memory PDF whose pages each show their label as text
fn pdf_fixture(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let mut kids = Vec::new();
    for label in labels {
        let content = format!("BT /F1 24 Tf 72 700 Td ({}) Tj ET", label);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            (
                "Resources",
                Object::Dictionary(Dictionary::from_iter([(
                    "Font",
                    Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
                )])),
            ),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            ),
        ]));
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(labels.len() as i64)),
            ("Kids", Object::Array(kids)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).expect("Failed to write fixture PDF");
    output
}

fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([200u8, 100, 50])));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).expect("Failed to encode PNG");
    bytes.into_inner()
}

fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(width, height, Luma([90u8])));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Jpeg).expect("Failed to encode JPEG");
    bytes.into_inner()
}

/// A fixture PDF carrying a standard security handler in its trailer
fn encrypted_pdf_fixture(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::load_mem(&pdf_fixture(labels)).expect("Fixture should parse");
    let encrypt_id = doc.add_object(Dictionary::from_iter([
        ("Filter", Object::Name(b"Standard".to_vec())),
        ("V", Object::Integer(1)),
        ("R", Object::Integer(2)),
        ("O", Object::string_literal(vec![0x4Fu8; 32])),
        ("U", Object::string_literal(vec![0x55u8; 32])),
        ("P", Object::Integer(-44)),
    ]));
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::string_literal(vec![0x22u8; 16]),
            Object::string_literal(vec![0x22u8; 16]),
        ]),
    );

    let mut output = Vec::new();
    doc.save_to(&mut output).expect("Failed to write encrypted fixture");
    output
}

fn pdf_item(id: &str, labels: &[&str], timestamp: i64) -> SourceItem {
    SourceItem::new(id, pdf_fixture(labels), "application/pdf", timestamp)
}

/// Describe every page of a merged PDF: the text label of copied pages,
/// `image WxH` for image pages
fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("Merged output should parse");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content = doc.get_page_content(page_id).expect("Page content");
            let text = String::from_utf8_lossy(&content).to_string();

            if text.contains(" Do") {
                let page = doc.get_dictionary(page_id).unwrap();
                let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
                let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
                let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
                let image = doc.get_object(image_id).unwrap().as_stream().unwrap();
                format!(
                    "image {}x{}",
                    image.dict.get(b"Width").unwrap().as_i64().unwrap(),
                    image.dict.get(b"Height").unwrap().as_i64().unwrap()
                )
            } else {
                let start = text.find('(').expect("Label start") + 1;
                let end = text[start..].find(')').expect("Label end") + start;
                text[start..end].to_string()
            }
        })
        .collect()
}

#[test]
fn test_mixed_scenario_orders_and_skips() {
    let items = vec![
        SourceItem::new("imageA.png", png_fixture(300, 200), "image/png", 100),
        pdf_item("pdfB.pdf", &["B1", "B2"], 50),
        SourceItem::new("imageC.gif", b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec(), "image/gif", 75),
    ];

    let output = merge(&items, &MergeOptions::default()).expect("Failed to merge");

    assert_eq!(output.page_count, 3);
    assert_eq!(page_labels(&output.bytes), vec!["B1", "B2", "image 300x200"]);

    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].id, "imageC.gif");
    assert!(output.skipped[0].reason.contains("gif"));

    let ids: Vec<&str> = output.items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["pdfB.pdf", "imageA.png"]);
    assert_eq!(output.items[0].pages, 2);
    assert_eq!(output.items[1].kind, SourceKind::Image(timeline_merge::ImageEncoding::Png));
}

#[test]
fn test_corrupt_pdf_fails_without_output() {
    let items = vec![SourceItem::new(
        "pdfX.pdf",
        b"%PDF-1.7\n1 0 obj << /Type /Catalog".to_vec(),
        "application/pdf",
        10,
    )];

    let result = merge(&items, &MergeOptions::default());
    match result {
        Err(Error::MalformedDocument { item, .. }) => assert_eq!(item, "pdfX.pdf"),
        other => panic!("expected MalformedDocument, got {:?}", other.map(|o| o.page_count)),
    }
}

#[test]
fn test_empty_input_list() {
    let result = merge(&[], &MergeOptions::default());
    assert!(matches!(result, Err(Error::EmptyInput)));
}

#[test]
fn test_one_bad_image_aborts_everything() {
    let items = vec![
        pdf_item("good.pdf", &["G1"], 1),
        SourceItem::new("bad.png", b"\x89PNG\r\n\x1a\nnot really".to_vec(), "image/png", 2),
        pdf_item("later.pdf", &["L1"], 3),
    ];

    let result = merge(&items, &MergeOptions::default());
    assert!(matches!(result, Err(Error::DecodeError { ref item, .. }) if item == "bad.png"));
}

#[test]
fn test_skip_policy_leaves_out_broken_items() {
    let items = vec![
        pdf_item("good.pdf", &["G1"], 1),
        SourceItem::new("bad.jpg", b"garbage".to_vec(), "image/jpeg", 2),
        SourceItem::new("bad.pdf", b"%PDF-1.4 garbage".to_vec(), "application/pdf", 3),
        pdf_item("later.pdf", &["L1"], 4),
    ];
    let options = MergeOptions {
        on_malformed: FailurePolicy::Skip,
        ..MergeOptions::default()
    };

    let output = merge(&items, &options).expect("Best-effort merge should succeed");
    assert_eq!(page_labels(&output.bytes), vec!["G1", "L1"]);

    let skipped: Vec<&str> = output.skipped.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(skipped, vec!["bad.jpg", "bad.pdf"]);
}

#[test]
fn test_skip_policy_with_nothing_valid_is_empty_input() {
    let items = vec![SourceItem::new("bad.pdf", b"nope".to_vec(), "application/pdf", 1)];
    let options = MergeOptions {
        on_malformed: FailurePolicy::Skip,
        ..MergeOptions::default()
    };

    assert!(matches!(merge(&items, &options), Err(Error::EmptyInput)));
}

#[test]
fn test_equal_timestamps_keep_insertion_order() {
    let items = vec![
        pdf_item("first.pdf", &["F"], 500),
        pdf_item("second.pdf", &["S"], 500),
        pdf_item("early.pdf", &["E"], 100),
        pdf_item("third.pdf", &["T"], 500),
    ];

    // Re-running must give the identical order
    for _ in 0..3 {
        let output = merge(&items, &MergeOptions::default()).expect("Failed to merge");
        assert_eq!(page_labels(&output.bytes), vec!["E", "F", "S", "T"]);
    }
}

#[test]
fn test_page_count_invariant() {
    let items = vec![
        pdf_item("three.pdf", &["a", "b", "c"], 30),
        SourceItem::new("photo.jpg", jpeg_fixture(64, 48), "image/jpeg", 10),
        pdf_item("one.pdf", &["d"], 20),
        SourceItem::new("chart.png", png_fixture(10, 10), "image/png", 40),
        SourceItem::new("readme.txt", b"hello".to_vec(), "text/plain", 0),
        SourceItem::new("anim.webp", b"RIFF\0\0\0\0WEBPVP8 ".to_vec(), "image/webp", 5),
    ];

    let output = merge(&items, &MergeOptions::default()).expect("Failed to merge");

    // 3 + 1 pdf pages, one page per valid image, nothing for the rest
    assert_eq!(output.page_count, 3 + 1 + 2);
    assert_eq!(count_pages_in_bytes(&output.bytes).unwrap(), output.page_count);
    assert_eq!(
        page_labels(&output.bytes),
        vec!["image 64x48", "d", "a", "b", "c", "image 10x10"]
    );

    let skipped: Vec<&str> = output.skipped.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(skipped, vec!["readme.txt", "anim.webp"]);
}

#[test]
fn test_parallel_matches_sequential_order() {
    let items: Vec<SourceItem> = (0..8)
        .map(|i| {
            if i % 2 == 0 {
                SourceItem::new(format!("img{}.png", i), png_fixture(10 + i, 20), "image/png", 100 - i as i64)
            } else {
                pdf_item(&format!("doc{}.pdf", i), &[format!("P{}", i).as_str()], 100 - i as i64)
            }
        })
        .collect();

    let sequential = merge(&items, &MergeOptions::default()).expect("Sequential merge");
    let parallel = merge(
        &items,
        &MergeOptions {
            parallel: true,
            ..MergeOptions::default()
        },
    )
    .expect("Parallel merge");

    let expected = page_labels(&sequential.bytes);
    assert_eq!(page_labels(&parallel.bytes), expected);
    assert_eq!(expected.first().map(String::as_str), Some("P7"));
    assert_eq!(expected.last().map(String::as_str), Some("image 10x20"));
}

#[test]
fn test_parallel_still_all_or_nothing() {
    let items = vec![
        SourceItem::new("ok.png", png_fixture(4, 4), "image/png", 1),
        SourceItem::new("broken.jpg", b"\xFF\xD8\xFF\x00".to_vec(), "image/jpeg", 2),
    ];
    let options = MergeOptions {
        parallel: true,
        ..MergeOptions::default()
    };

    assert!(matches!(merge(&items, &options), Err(Error::DecodeError { .. })));
}

#[test]
fn test_mislabelled_image_is_sniffed() {
    let items = vec![SourceItem::new("actually-png.jpg", png_fixture(8, 6), "image/jpeg", 1)];

    let output = merge(&items, &MergeOptions::default()).expect("Failed to merge");
    assert_eq!(page_labels(&output.bytes), vec!["image 8x6"]);
    assert_eq!(output.items[0].kind, SourceKind::Image(timeline_merge::ImageEncoding::Png));
}

#[test]
fn test_image_pages_use_configured_geometry() {
    let items = vec![SourceItem::new("tiny.jpg", jpeg_fixture(40, 20), "image/jpeg", 1)];
    let options = MergeOptions {
        geometry: PageGeometry::a4(),
        ..MergeOptions::default()
    };

    let output = merge(&items, &options).expect("Failed to merge");
    let doc = Document::load_mem(&output.bytes).unwrap();
    let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
    let page = doc.get_dictionary(page_id).unwrap();

    let media_box: Vec<f32> = page
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|value| value.as_float().unwrap())
        .collect();
    assert_eq!(media_box[0], 0.0);
    assert!((media_box[2] - 595.28).abs() < 0.01);
    assert!((media_box[3] - 841.89).abs() < 0.01);

    // Native size, centered: (595.28 - 40) / 2 and (841.89 - 20) / 2
    let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).to_string();
    assert!(content.contains("40.0000 0 0 20.0000 277.6378 410.9449 cm"), "{}", content);
}

#[test]
fn test_upscale_policy() {
    let items = vec![SourceItem::new("small.png", png_fixture(100, 50), "image/png", 1)];
    let options = MergeOptions {
        allow_upscale: true,
        ..MergeOptions::default()
    };

    let output = merge(&items, &options).expect("Failed to merge");
    let doc = Document::load_mem(&output.bytes).unwrap();
    let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
    let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).to_string();

    // Width-bound: 572 x 286 centered on Letter
    assert!(content.contains("572.0000 0 0 286.0000 20.0000 253.0000 cm"), "{}", content);
}

#[test]
fn test_merged_file_round_trip() {
    let items = vec![
        pdf_item("b.pdf", &["B1", "B2"], 2),
        pdf_item("a.pdf", &["A1"], 1),
    ];
    let output = merge(&items, &MergeOptions::default()).expect("Failed to merge");

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let output_path = temp_dir.path().join("merged.pdf");
    std::fs::write(&output_path, &output.bytes).expect("Failed to write merged PDF");

    assert_eq!(count_pages(&output_path).expect("Failed to count pages"), 3);

    let metadata = extract_metadata(&output_path).expect("Failed to read metadata");
    assert_eq!(metadata.page_count, 3);
    assert!(metadata
        .producer
        .expect("Producer should be set")
        .starts_with("timeline-merge"));
}

#[test]
fn test_encrypted_pdf_aborts_mixed_merge() {
    let items = vec![
        pdf_item("open.pdf", &["O1"], 1),
        SourceItem::new("locked.pdf", encrypted_pdf_fixture(&["secret"]), "application/pdf", 2),
        SourceItem::new("photo.png", png_fixture(20, 10), "image/png", 3),
    ];

    let result = merge(&items, &MergeOptions::default());
    assert!(
        matches!(result, Err(Error::EncryptedDocument { ref item }) if item == "locked.pdf"),
        "expected EncryptedDocument, got {:?}",
        result.map(|o| o.page_count)
    );
}

#[test]
fn test_text_note_mentioning_pdf_header_is_skipped() {
    let note = b"Reminder: a PDF file must start with %PDF-1.4 followed by a binary comment.";
    let items = vec![
        SourceItem::new("good.png", png_fixture(30, 20), "image/png", 1),
        SourceItem::new("notes.txt", note.to_vec(), "text/plain", 2),
    ];

    let output = merge(&items, &MergeOptions::default()).expect("Note must not abort the merge");
    assert_eq!(page_labels(&output.bytes), vec!["image 30x20"]);
    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].id, "notes.txt");
}

#[test]
fn test_margin_leaving_no_room_is_rejected() {
    let items = vec![SourceItem::new("photo.png", png_fixture(30, 20), "image/png", 1)];
    let options = MergeOptions {
        geometry: PageGeometry::letter().with_margin(Length::from_pt(400.0)),
        ..MergeOptions::default()
    };

    assert!(matches!(merge(&items, &options), Err(Error::InvalidGeometry(_))));
}
