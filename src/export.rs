//! ODS export adapter.
//!
//! Serializes the visible (non-anonymous) signatures of one campaign into a
//! minimal single-sheet OpenDocument spreadsheet. An ODS file is a zip
//! container whose first entry must be an uncompressed `mimetype` member;
//! the sheet itself is one `content.xml` plus a manifest.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AppError, AppResult};
use crate::orcid;
use crate::storage::signatures::Signature;

const ODS_MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>
"#;

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn row_xml(cells: &[&str]) -> String {
    let mut row = String::from("   <table:table-row>\n");
    for cell in cells {
        row.push_str(&format!(
            "    <table:table-cell office:value-type=\"string\"><text:p>{}</text:p></table:table-cell>\n",
            xml_escape(cell)
        ));
    }
    row.push_str("   </table:table-row>\n");
    row
}

fn content_xml(sheet_name: &str, signatures: &[Signature], orcid_url: &str) -> String {
    let mut body = String::new();
    body.push_str(&row_xml(&["Name", "Affiliation", "ORCID iD", "Profile"]));
    for sig in signatures {
        let affiliation = sig.affiliation.as_deref().unwrap_or("");
        let profile = orcid::profile_url(orcid_url, &sig.orcid);
        body.push_str(&row_xml(&[&sig.name, affiliation, &sig.orcid, &profile]));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <office:document-content \
         xmlns:office=\"urn:oasis:names:tc:opendocument:xmlns:office:1.0\" \
         xmlns:table=\"urn:oasis:names:tc:opendocument:xmlns:table:1.0\" \
         xmlns:text=\"urn:oasis:names:tc:opendocument:xmlns:text:1.0\" \
         office:version=\"1.2\">\n\
         <office:body>\n <office:spreadsheet>\n\
         \x20 <table:table table:name=\"{}\">\n{}\x20 </table:table>\n\
         \x20</office:spreadsheet>\n</office:body>\n\
         </office:document-content>\n",
        xml_escape(sheet_name),
        body
    )
}

/// Build the ODS bytes for one campaign's visible signatures. The caller
/// derives the download filename from the slug.
pub fn signatures_to_ods(
    sheet_name: &str,
    signatures: &[Signature],
    orcid_url: &str,
) -> AppResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    // The mimetype member must come first and be stored uncompressed.
    zip.start_file(
        "mimetype",
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
    )
    .map_err(|e| AppError::io(e.to_string()))?;
    zip.write_all(ODS_MIMETYPE.as_bytes())?;

    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("META-INF/manifest.xml", deflated)
        .map_err(|e| AppError::io(e.to_string()))?;
    zip.write_all(MANIFEST.as_bytes())?;

    zip.start_file("content.xml", deflated)
        .map_err(|e| AppError::io(e.to_string()))?;
    zip.write_all(content_xml(sheet_name, signatures, orcid_url).as_bytes())?;

    let cursor = zip.finish().map_err(|e| AppError::io(e.to_string()))?;
    Ok(cursor.into_inner())
}
