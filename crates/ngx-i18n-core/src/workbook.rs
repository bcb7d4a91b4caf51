//! The translators' workbook: a single-sheet `.xlsx` with one row per key.
//!
//! Only the first sheet is read. Row 1 is `key, <locale>, <locale>...`; each
//! following row is a key and its values. Writing emits a minimal
//! SpreadsheetML package with inline strings and fixed zip timestamps, so the
//! same table always produces the same bytes.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::i18n::{Key, KeyLocaleValueMap, Locale, LocaleValueMap};
use crate::xml::{escape_attr, escape_text};

pub const KEY_COLUMN_LABEL: &str = "key";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
pub const DEFAULT_COLUMN_WIDTH: u32 = 50;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const FALLBACK_SHEET_PART: &str = "xl/worksheets/sheet1.xml";

#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("not a readable xlsx package: {0}")]
    Zip(#[from] ZipError),

    #[error("workbook I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed XML in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("workbook part {0} is missing")]
    MissingPart(String),

    #[error("invalid cell {reference} in {part}: {detail}")]
    InvalidCell {
        part: String,
        reference: String,
        detail: String,
    },
}

/// Sheet name and column width used when writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub sheet_name: String,
    pub column_width: u32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            column_width: DEFAULT_COLUMN_WIDTH,
        }
    }
}

/// The table held by a workbook: header locales and key → locale → value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    locales: Vec<Locale>,
    rows: KeyLocaleValueMap,
}

impl Workbook {
    /// `locales` fixes the column order after the key column.
    pub fn new(locales: Vec<Locale>, rows: KeyLocaleValueMap) -> Self {
        Self { locales, rows }
    }

    pub fn header_only(locales: Vec<Locale>) -> Self {
        Self::new(locales, KeyLocaleValueMap::new())
    }

    pub fn locales(&self) -> &[Locale] {
        &self.locales
    }

    pub fn rows(&self) -> &KeyLocaleValueMap {
        &self.rows
    }

    pub fn into_rows(self) -> KeyLocaleValueMap {
        self.rows
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkbookError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let sheet_part = first_sheet_part(&mut archive)?;
        let shared = match read_part(&mut archive, SHARED_STRINGS_PART)? {
            Some(text) => parse_shared_strings(&text)?,
            None => Vec::new(),
        };
        let sheet = read_part(&mut archive, &sheet_part)?
            .ok_or_else(|| WorkbookError::MissingPart(sheet_part.clone()))?;
        let grid = parse_sheet(&sheet_part, &sheet, &shared)?;

        Ok(Self::from_grid(grid))
    }

    fn from_grid(grid: BTreeMap<usize, BTreeMap<usize, String>>) -> Self {
        let mut rows_iter = grid.into_values();
        let Some(header) = rows_iter.next() else {
            return Self::default();
        };

        let columns: Vec<(usize, Locale)> = header
            .into_iter()
            .filter(|(col, name)| *col > 0 && !name.is_empty())
            .map(|(col, name)| (col, Locale::from(name)))
            .collect();

        let mut rows = KeyLocaleValueMap::new();
        for mut cells in rows_iter {
            let key = cells.remove(&0).unwrap_or_default();
            if key.is_empty() {
                continue;
            }
            let by_locale: LocaleValueMap = columns
                .iter()
                .map(|(col, locale)| (locale.clone(), cells.remove(col).unwrap_or_default()))
                .collect();
            rows.insert(Key::from(key), by_locale);
        }

        Self {
            locales: columns.into_iter().map(|(_, locale)| locale).collect(),
            rows,
        }
    }

    /// Serialize as an xlsx package. Rows come out sorted by key.
    pub fn to_bytes(&self, layout: &SheetLayout) -> Result<Vec<u8>, WorkbookError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", PACKAGE_RELS.to_string()),
            (WORKBOOK_PART, workbook_xml(&layout.sheet_name)),
            (WORKBOOK_RELS_PART, WORKBOOK_RELS.to_string()),
            ("xl/styles.xml", STYLES.to_string()),
            (FALLBACK_SHEET_PART, self.sheet_xml(layout.column_width)),
        ];

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            zip.start_file(name, options)?;
            zip.write_all(content.as_bytes())?;
        }
        Ok(zip.finish()?.into_inner())
    }

    fn sheet_xml(&self, column_width: u32) -> String {
        let column_count = self.locales.len() + 1;
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(&format!(r#"<worksheet xmlns="{MAIN_NS}">"#));
        xml.push_str(&format!(
            r#"<cols><col min="1" max="{column_count}" width="{column_width}" customWidth="1"/></cols>"#
        ));
        xml.push_str("<sheetData>");

        let header = std::iter::once(KEY_COLUMN_LABEL).chain(self.locales.iter().map(Locale::as_str));
        push_row(&mut xml, 1, header);

        for (i, (key, by_locale)) in self.rows.iter().enumerate() {
            let values = std::iter::once(key.as_str()).chain(
                self.locales
                    .iter()
                    .map(|locale| by_locale.get(locale).map(String::as_str).unwrap_or_default()),
            );
            push_row(&mut xml, i + 2, values);
        }

        xml.push_str("</sheetData></worksheet>");
        xml
    }
}

fn push_row<'a>(xml: &mut String, row: usize, values: impl Iterator<Item = &'a str>) {
    xml.push_str(&format!(r#"<row r="{row}">"#));
    for (col, value) in values.enumerate() {
        if value.is_empty() {
            continue;
        }
        xml.push_str(&format!(
            r#"<c r="{}{row}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            column_name(col),
            escape_text(value)
        ));
    }
    xml.push_str("</row>");
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape_attr(sheet_name)
    )
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, WorkbookError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(Some(text))
}

fn parse_xml<'a>(part: &str, text: &'a str) -> Result<roxmltree::Document<'a>, WorkbookError> {
    roxmltree::Document::parse(text).map_err(|source| WorkbookError::Xml {
        part: part.to_string(),
        source,
    })
}

/// Locate the first sheet through workbook.xml and its relationships.
fn first_sheet_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<String, WorkbookError> {
    let Some(workbook) = read_part(archive, WORKBOOK_PART)? else {
        return Ok(FALLBACK_SHEET_PART.to_string());
    };
    let rel_id = {
        let doc = parse_xml(WORKBOOK_PART, &workbook)?;
        doc.descendants()
            .find(|n| n.has_tag_name("sheet"))
            .and_then(|sheet| sheet.attribute((REL_NS, "id")))
            .map(str::to_string)
    };
    let Some(rel_id) = rel_id else {
        return Ok(FALLBACK_SHEET_PART.to_string());
    };

    let Some(rels) = read_part(archive, WORKBOOK_RELS_PART)? else {
        return Ok(FALLBACK_SHEET_PART.to_string());
    };
    let doc = parse_xml(WORKBOOK_RELS_PART, &rels)?;
    let target = doc
        .descendants()
        .filter(|n| n.has_tag_name("Relationship"))
        .find(|n| n.attribute("Id") == Some(rel_id.as_str()))
        .and_then(|n| n.attribute("Target"));

    Ok(match target {
        Some(absolute) if absolute.starts_with('/') => absolute.trim_start_matches('/').to_string(),
        Some(relative) => format!("xl/{relative}"),
        None => FALLBACK_SHEET_PART.to_string(),
    })
}

fn parse_shared_strings(text: &str) -> Result<Vec<String>, WorkbookError> {
    let doc = parse_xml(SHARED_STRINGS_PART, text)?;
    Ok(doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("si"))
        .map(string_item_text)
        .collect())
}

/// Text of an `<si>` or `<is>`: every `<t>`, phonetic runs excluded.
fn string_item_text(item: roxmltree::Node<'_, '_>) -> String {
    item.descendants()
        .filter(|n| n.has_tag_name("t"))
        .filter(|t| !t.ancestors().any(|a| a.has_tag_name("rPh")))
        .filter_map(|t| t.text())
        .collect()
}

fn parse_sheet(
    part: &str,
    text: &str,
    shared: &[String],
) -> Result<BTreeMap<usize, BTreeMap<usize, String>>, WorkbookError> {
    let doc = parse_xml(part, text)?;
    let mut grid: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();

    let mut next_row = 0;
    for row in doc.descendants().filter(|n| n.has_tag_name("row")) {
        let row_index = row
            .attribute("r")
            .and_then(|r| r.parse::<usize>().ok())
            .and_then(|r| r.checked_sub(1))
            .unwrap_or(next_row);
        next_row = row_index + 1;

        let cells = grid.entry(row_index).or_default();
        let mut next_col = 0;
        for cell in row.children().filter(|n| n.has_tag_name("c")) {
            let reference = cell.attribute("r").unwrap_or_default();
            let col = column_index(reference).unwrap_or(next_col);
            next_col = col + 1;

            let value = cell_value(cell, shared).map_err(|detail| WorkbookError::InvalidCell {
                part: part.to_string(),
                reference: reference.to_string(),
                detail,
            })?;
            if !value.is_empty() {
                cells.insert(col, value);
            }
        }
    }

    Ok(grid)
}

fn cell_value(cell: roxmltree::Node<'_, '_>, shared: &[String]) -> Result<String, String> {
    let raw = cell
        .children()
        .find(|n| n.has_tag_name("v"))
        .and_then(|v| v.text())
        .unwrap_or_default();

    match cell.attribute("t").unwrap_or("n") {
        "s" => {
            if raw.is_empty() {
                return Ok(String::new());
            }
            let index: usize = raw
                .trim()
                .parse()
                .map_err(|_| format!("shared string index {raw:?} is not a number"))?;
            shared
                .get(index)
                .cloned()
                .ok_or_else(|| format!("shared string index {index} out of range"))
        }
        "inlineStr" => Ok(cell
            .children()
            .find(|n| n.has_tag_name("is"))
            .map(string_item_text)
            .unwrap_or_default()),
        "b" => Ok(match raw.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            _ => raw.to_string(),
        }),
        _ => Ok(raw.to_string()),
    }
}

/// Zero-based column of a cell reference such as `AB12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters
        .bytes()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?
                .checked_add(usize::from(b.to_ascii_uppercase() - b'A' + 1))
        })
        .map(|n| n - 1)
}

fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &[(&str, &str)])]) -> KeyLocaleValueMap {
        rows.iter()
            .map(|(key, values)| {
                (
                    Key::from(*key),
                    values
                        .iter()
                        .map(|(l, v)| (Locale::from(*l), v.to_string()))
                        .collect(),
                )
            })
            .collect()
    }

    fn locales(names: &[&str]) -> Vec<Locale> {
        names.iter().map(|n| Locale::from(*n)).collect()
    }

    fn package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_write_then_read() {
        let workbook = Workbook::new(
            locales(&["en", "fr", "nl"]),
            table(&[
                ("b.key", &[("en", "Bye & <see> you"), ("fr", "Au revoir"), ("nl", "")]),
                ("a.key", &[("en", "Hello ${{NAME}}"), ("fr", " Salut ")]),
            ]),
        );
        let bytes = workbook.to_bytes(&SheetLayout::default()).unwrap();
        let read = Workbook::from_bytes(&bytes).unwrap();

        assert_eq!(read.locales(), locales(&["en", "fr", "nl"]).as_slice());
        assert_eq!(read.rows()["a.key"]["en"], "Hello ${{NAME}}");
        assert_eq!(read.rows()["a.key"]["fr"], " Salut ");
        assert_eq!(read.rows()["a.key"]["nl"], "");
        assert_eq!(read.rows()["b.key"]["en"], "Bye & <see> you");
        let keys: Vec<&str> = read.rows().keys().map(Key::as_str).collect();
        assert_eq!(keys, ["a.key", "b.key"]);
    }

    #[test]
    fn test_output_is_deterministic() {
        let workbook = Workbook::new(
            locales(&["en", "fr"]),
            table(&[("k", &[("en", "v"), ("fr", "w")])]),
        );
        let layout = SheetLayout::default();
        assert_eq!(
            workbook.to_bytes(&layout).unwrap(),
            workbook.clone().to_bytes(&layout).unwrap()
        );
    }

    #[test]
    fn test_sheet_layout() {
        let workbook = Workbook::header_only(locales(&["en", "fr"]));
        let sheet = workbook.sheet_xml(50);
        assert!(sheet.contains(r#"<col min="1" max="3" width="50" customWidth="1"/>"#));
        assert!(sheet.contains(r#"<c r="A1" t="inlineStr"><is><t xml:space="preserve">key</t></is></c>"#));
        assert!(sheet.contains(r#"<c r="C1""#));
        assert!(!sheet.contains(r#"<row r="2">"#));
    }

    #[test]
    fn test_header_only_reads_empty() {
        let bytes = Workbook::header_only(locales(&["en", "de"]))
            .to_bytes(&SheetLayout::default())
            .unwrap();
        let read = Workbook::from_bytes(&bytes).unwrap();
        assert_eq!(read.locales(), locales(&["en", "de"]).as_slice());
        assert!(read.rows().is_empty());
    }

    #[test]
    fn test_read_shared_strings_and_cell_types() {
        let workbook = format!(
            r#"<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Translations" sheetId="3" r:id="rId7"/></sheets></workbook>"#
        );
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId7" Target="worksheets/sheet3.xml"/></Relationships>"#;
        let shared = format!(
            r#"<sst xmlns="{MAIN_NS}"><si><t>key</t></si><si><t>en</t></si><si><t>fr</t></si><si><r><t>Hello </t></r><r><rPr><b/></rPr><t>world</t></r><rPh><t>ignored</t></rPh></si><si><t>greeting</t></si></sst>"#
        );
        let sheet = format!(
            r#"<worksheet xmlns="{MAIN_NS}"><sheetData>
                <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c></row>
                <row r="2"><c r="A2" t="s"><v>4</v></c><c r="B2" t="s"><v>3</v></c></row>
                <row r="3"><c r="A3" t="str"><v>count</v></c><c r="B3"><v>42</v></c><c r="C3" t="b"><v>1</v></c></row>
                <row r="5"><c r="B5" t="inlineStr"><is><t>orphan</t></is></c></row>
            </sheetData></worksheet>"#
        );
        let bytes = package(&[
            (WORKBOOK_PART, workbook.as_str()),
            (WORKBOOK_RELS_PART, rels),
            (SHARED_STRINGS_PART, shared.as_str()),
            ("xl/worksheets/sheet3.xml", sheet.as_str()),
        ]);

        let read = Workbook::from_bytes(&bytes).unwrap();
        assert_eq!(read.locales(), locales(&["en", "fr"]).as_slice());
        assert_eq!(read.rows()["greeting"]["en"], "Hello world");
        assert_eq!(read.rows()["greeting"]["fr"], "");
        assert_eq!(read.rows()["count"]["en"], "42");
        assert_eq!(read.rows()["count"]["fr"], "TRUE");
        assert_eq!(read.rows().len(), 2, "row without key is skipped");
    }

    #[test]
    fn test_fallback_sheet_without_workbook_part() {
        let sheet = format!(
            r#"<worksheet xmlns="{MAIN_NS}"><sheetData><row><c t="inlineStr"><is><t>key</t></is></c><c t="inlineStr"><is><t>en</t></is></c></row><row><c t="inlineStr"><is><t>k</t></is></c><c t="inlineStr"><is><t>v</t></is></c></row></sheetData></worksheet>"#
        );
        let bytes = package(&[(FALLBACK_SHEET_PART, sheet.as_str())]);
        let read = Workbook::from_bytes(&bytes).unwrap();
        assert_eq!(read.rows()["k"]["en"], "v");
    }

    #[test]
    fn test_bad_shared_string_index() {
        let sheet = format!(
            r#"<worksheet xmlns="{MAIN_NS}"><sheetData><row r="1"><c r="A1" t="s"><v>9</v></c></row></sheetData></worksheet>"#
        );
        let bytes = package(&[(FALLBACK_SHEET_PART, sheet.as_str())]);
        let err = Workbook::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, WorkbookError::InvalidCell { reference, .. } if reference == "A1"));
    }

    #[test]
    fn test_missing_sheet_part() {
        let bytes = package(&[("docProps/app.xml", "<Properties/>")]);
        assert!(matches!(
            Workbook::from_bytes(&bytes),
            Err(WorkbookError::MissingPart(part)) if part == FALLBACK_SHEET_PART
        ));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            Workbook::from_bytes(b"key,en\n"),
            Err(WorkbookError::Zip(_))
        ));
    }

    #[test]
    fn test_column_refs() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("12"), None);
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(701), "ZZ");
    }
}
