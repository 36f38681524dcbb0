//! Shared helpers for integration tests.
//!
//! Fixture PDFs are assembled with `lopdf`; the encrypted variant applies
//! the standard security handler (RC4, 40-bit, revision 2) by hand so
//! password handling can be tested without checked-in binaries.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// A text run placed at `(x, y)` in PDF points, origin bottom-left.
pub struct TextRun<'a> {
    pub x: f32,
    pub y: f32,
    pub text: &'a str,
}

pub fn run(x: f32, y: f32, text: &str) -> TextRun<'_> {
    TextRun { x, y, text }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn content_stream(runs: &[TextRun<'_>]) -> Vec<u8> {
    runs.iter()
        .map(|r| format!("BT /F1 9 Tf {:.1} {:.1} Td ({}) Tj ET\n", r.x, r.y, escape(r.text)))
        .collect::<String>()
        .into_bytes()
}

/// A4 pages, Helvetica 9pt.
fn statement_document(pages: &[Vec<TextRun<'_>>]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let media_box: Vec<Object> = vec![0.into(), 0.into(), 595.into(), 842.into()];

    let kids: Vec<Object> = pages
        .iter()
        .map(|runs| {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content_stream(runs)));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box.clone(),
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => Object::Reference(font_id) },
                },
            });
            Object::Reference(page_id)
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("failed to save fixture PDF");
    buf
}

/// Build an unencrypted statement PDF.
pub fn build_pdf(pages: &[Vec<TextRun<'_>>]) -> Vec<u8> {
    save(statement_document(pages))
}

/// Password padding string from the standard security handler.
const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s: Vec<u8> = (0..=255).collect();
    let mut j = 0usize;
    for i in 0..256 {
        j = (j + s[i] as usize + key[i % key.len()] as usize) & 0xFF;
        s.swap(i, j);
    }
    let (mut i, mut j) = (0usize, 0usize);
    data.iter()
        .map(|&byte| {
            i = (i + 1) & 0xFF;
            j = (j + s[i] as usize) & 0xFF;
            s.swap(i, j);
            byte ^ s[(s[i] as usize + s[j] as usize) & 0xFF]
        })
        .collect()
}

/// Build a statement PDF that opens only with `user_password` (the owner
/// password is the same).
pub fn build_encrypted_pdf(pages: &[Vec<TextRun<'_>>], user_password: &str) -> Vec<u8> {
    let file_id = b"pdf2txn-fixture!";
    let permissions: i32 = -4;

    let password = user_password.as_bytes();
    let len = password.len().min(32);
    let mut padded = password[..len].to_vec();
    padded.extend_from_slice(&PAD_BYTES[..32 - len]);

    let owner_key = md5::compute(&padded);
    let o_value = rc4(&owner_key[..5], &padded);

    let mut key_input = padded.clone();
    key_input.extend_from_slice(&o_value);
    key_input.extend_from_slice(&(permissions as u32).to_le_bytes());
    key_input.extend_from_slice(file_id);
    let file_key = md5::compute(&key_input)[..5].to_vec();
    let u_value = rc4(&file_key, &PAD_BYTES);

    let mut doc = statement_document(pages);
    for (&(num, generation), object) in doc.objects.iter_mut() {
        let mut object_key = file_key.clone();
        object_key.extend_from_slice(&num.to_le_bytes()[..3]);
        object_key.extend_from_slice(&generation.to_le_bytes()[..2]);
        let digest = md5::compute(&object_key);
        let key = &digest[..(file_key.len() + 5).min(16)];

        match object {
            Object::Stream(stream) => {
                let encrypted = rc4(key, &stream.content);
                stream.set_content(encrypted);
            }
            Object::String(bytes, _) => *bytes = rc4(key, bytes),
            _ => {}
        }
    }

    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1_i64,
        "R" => 2_i64,
        "Length" => 40_i64,
        "O" => Object::String(o_value, StringFormat::Literal),
        "U" => Object::String(u_value, StringFormat::Literal),
        "P" => permissions as i64,
    });
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(file_id.to_vec(), StringFormat::Literal),
            Object::String(file_id.to_vec(), StringFormat::Literal),
        ]),
    );
    save(doc)
}

/// A one-page bank statement: an account block, a transaction table and a
/// closing summary box.
pub fn bank_statement_page() -> Vec<TextRun<'static>> {
    vec![
        run(40.0, 800.0, "ACME BANK - STATEMENT OF ACCOUNT"),
        run(40.0, 785.0, "Account No: 123456789012"),
        run(40.0, 700.0, "Date"),
        run(120.0, 700.0, "Narration"),
        run(330.0, 700.0, "Withdrawal"),
        run(420.0, 700.0, "Deposit"),
        run(500.0, 700.0, "Balance"),
        run(40.0, 680.0, "02/01/2024"),
        run(120.0, 680.0, "UPI/SWIGGY/1234"),
        run(330.0, 680.0, "450.00"),
        run(500.0, 680.0, "12,550.00"),
        run(40.0, 665.0, "05/01/2024"),
        run(120.0, 665.0, "SALARY JAN"),
        run(420.0, 665.0, "85,000.00"),
        run(500.0, 665.0, "97,550.00"),
        run(40.0, 650.0, "09/01/2024"),
        run(120.0, 650.0, "ATM CASH"),
        run(330.0, 650.0, "2,000.00"),
        run(500.0, 650.0, "95,550.00"),
        run(40.0, 500.0, "Closing balance as on 31/01/2024: 95,550.00"),
    ]
}

/// A page with text but no transaction table.
pub fn terms_page() -> Vec<TextRun<'static>> {
    vec![
        run(40.0, 800.0, "Terms and conditions"),
        run(40.0, 780.0, "Please report discrepancies within 30 days."),
    ]
}
