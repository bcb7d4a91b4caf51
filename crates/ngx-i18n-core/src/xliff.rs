//! XLIFF 1.2 files as produced by `ng extract-i18n`.
//!
//! Reading flattens each `<source>` into text where every `<x/>` placeholder
//! is spelled `${{ID}}`. Writing starts from the source document's own text
//! and splices a `<target>` into each translated unit, so formatting, notes
//! and context groups survive byte for byte.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::i18n::{Key, KeyValueMap, Locale};
use crate::xml::{escape_attr, escape_text, start_tag_end};

static PLACEHOLDER_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{([\s\S]*?)\}\}").expect("static regex"));

#[derive(Debug, thiserror::Error)]
pub enum XliffError {
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("expected an <xliff> document, found <{0}>")]
    NotXliff(String),

    #[error("trans-unit at byte {0} has no id")]
    MissingId(usize),

    #[error("trans-unit {0:?} has no <source>")]
    MissingSource(String),
}

/// An `<x/>` placeholder inside a source string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub id: String,
    pub equiv_text: Option<String>,
}

impl Placeholder {
    /// The `${{ID}}` spelling used in workbook cells.
    pub fn token(&self) -> String {
        placeholder_token(&self.id)
    }

    pub fn to_xml(&self) -> String {
        match &self.equiv_text {
            Some(equiv) => format!(
                r#"<x id="{}" equiv-text="{}"/>"#,
                escape_attr(&self.id),
                escape_attr(equiv)
            ),
            None => format!(r#"<x id="{}"/>"#, escape_attr(&self.id)),
        }
    }
}

pub fn placeholder_token(id: &str) -> String {
    format!("${{{{{id}}}}}")
}

/// Placeholder ids referenced as `${{ID}}` in a translation, in order.
pub fn placeholder_ids_in_text(text: &str) -> Vec<String> {
    PLACEHOLDER_IN_TEXT
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// A placeholder inconsistency between a source string and its translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaceholderIssue {
    CountMismatch {
        key: Key,
        source_ids: Vec<String>,
        translation_ids: Vec<String>,
        source_text: String,
    },
    MissingFromTranslation {
        key: Key,
        id: String,
        translation: String,
    },
    UnknownInTranslation {
        key: Key,
        id: String,
    },
}

impl PlaceholderIssue {
    pub fn key(&self) -> &Key {
        match self {
            PlaceholderIssue::CountMismatch { key, .. }
            | PlaceholderIssue::MissingFromTranslation { key, .. }
            | PlaceholderIssue::UnknownInTranslation { key, .. } => key,
        }
    }

    /// Human-readable detail, without the key.
    pub fn detail(&self) -> String {
        match self {
            PlaceholderIssue::CountMismatch {
                source_ids,
                translation_ids,
                source_text,
                ..
            } => format!(
                "placeholder count in translation does not match placeholder count in source string.\n\
                 \tsource had {} ({}) but translation has {} ({}).\n\
                 \tsource string was {:?}",
                source_ids.len(),
                source_ids.join(", "),
                translation_ids.len(),
                translation_ids.join(", "),
                source_text
            ),
            PlaceholderIssue::MissingFromTranslation { id, translation, .. } => format!(
                "placeholder {id:?} present in source string is missing from translation {translation:?}"
            ),
            PlaceholderIssue::UnknownInTranslation { id, .. } => format!(
                "could not find corresponding placeholder {id:?} in source string; created a made up one"
            ),
        }
    }
}

/// One `<trans-unit>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransUnit {
    pub id: Key,
    /// Source string with placeholders spelled `${{ID}}`, entities decoded.
    pub source_text: String,
    pub placeholders: Vec<Placeholder>,
    pub target_text: Option<String>,
    source_range: Range<usize>,
    target: Option<TargetSpan>,
    indent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetSpan {
    range: Range<usize>,
    /// Start tag with its attributes, always in `<target ...>` form.
    start_tag: String,
}

impl TransUnit {
    /// Render `value` as target inner XML, reporting placeholder issues.
    ///
    /// Known `${{ID}}` tokens become the source's `<x/>` element. Unknown ones
    /// get a made-up placeholder whose equiv-text is the id. Empty values are
    /// untranslated and are not checked.
    pub fn render_target(&self, value: &str) -> (String, Vec<PlaceholderIssue>) {
        let mut issues = Vec::new();

        if !value.is_empty() {
            let translation_ids = placeholder_ids_in_text(value);
            if translation_ids.len() != self.placeholders.len() {
                issues.push(PlaceholderIssue::CountMismatch {
                    key: self.id.clone(),
                    source_ids: self.placeholders.iter().map(|p| p.id.clone()).collect(),
                    translation_ids: translation_ids.clone(),
                    source_text: self.source_text.clone(),
                });
            }
            for placeholder in &self.placeholders {
                if !translation_ids.contains(&placeholder.id) {
                    issues.push(PlaceholderIssue::MissingFromTranslation {
                        key: self.id.clone(),
                        id: placeholder.id.clone(),
                        translation: value.to_string(),
                    });
                }
            }
        }

        let mut out = String::with_capacity(value.len());
        let mut last = 0;
        for caps in PLACEHOLDER_IN_TEXT.captures_iter(value) {
            let Some(whole) = caps.get(0) else { continue };
            let id = &caps[1];
            out.push_str(&escape_text(&value[last..whole.start()]));
            match self.placeholders.iter().find(|p| p.id == id) {
                Some(placeholder) => out.push_str(&placeholder.to_xml()),
                None => {
                    issues.push(PlaceholderIssue::UnknownInTranslation {
                        key: self.id.clone(),
                        id: id.to_string(),
                    });
                    let made_up = Placeholder {
                        id: id.to_string(),
                        equiv_text: Some(id.to_string()),
                    };
                    out.push_str(&made_up.to_xml());
                }
            }
            last = whole.end();
        }
        out.push_str(&escape_text(&value[last..]));

        (out, issues)
    }
}

/// A parsed XLIFF document that remembers its own text.
#[derive(Debug, Clone)]
pub struct XliffDocument {
    raw: String,
    source_language: Option<Locale>,
    units: Vec<TransUnit>,
}

/// A locale file rendered from the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedXliff {
    pub text: String,
    pub issues: Vec<PlaceholderIssue>,
}

impl XliffDocument {
    pub fn parse(raw: String) -> Result<Self, XliffError> {
        let (source_language, units) = {
            let doc = roxmltree::Document::parse(&raw)?;
            let root = doc.root_element();
            if !root.has_tag_name("xliff") {
                return Err(XliffError::NotXliff(root.tag_name().name().to_string()));
            }

            let source_language = root
                .descendants()
                .find(|n| n.has_tag_name("file"))
                .and_then(|file| file.attribute("source-language"))
                .map(Locale::from);

            let units = root
                .descendants()
                .filter(|n| n.has_tag_name("trans-unit"))
                .map(|node| parse_unit(&raw, node))
                .collect::<Result<Vec<_>, _>>()?;

            (source_language, units)
        };

        Ok(Self {
            raw,
            source_language,
            units,
        })
    }

    pub fn source_language(&self) -> Option<&Locale> {
        self.source_language.as_ref()
    }

    pub fn units(&self) -> &[TransUnit] {
        &self.units
    }

    pub fn unit(&self, key: &str) -> Option<&TransUnit> {
        self.units.iter().find(|u| u.id.as_str() == key)
    }

    /// Key → source text for every unit.
    pub fn key_values(&self) -> KeyValueMap {
        self.units
            .iter()
            .map(|u| (u.id.clone(), u.source_text.clone()))
            .collect()
    }

    /// Key → target text for units that carry a `<target>`.
    pub fn target_values(&self) -> KeyValueMap {
        self.units
            .iter()
            .filter_map(|u| u.target_text.clone().map(|t| (u.id.clone(), t)))
            .collect()
    }

    /// Render this document with `translations` as targets.
    ///
    /// Keys absent from the document are ignored. Units absent from
    /// `translations` are left exactly as they are.
    pub fn render_with_targets(&self, translations: &KeyValueMap) -> RenderedXliff {
        let mut issues = Vec::new();
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        let newline = line_ending(&self.raw);

        for unit in &self.units {
            let Some(value) = translations.get(&unit.id) else {
                continue;
            };
            let (inner, unit_issues) = unit.render_target(value);
            issues.extend(unit_issues);

            match &unit.target {
                Some(span) => {
                    edits.push((span.range.clone(), format!("{}{inner}</target>", span.start_tag)));
                }
                None => {
                    let at = unit.source_range.end;
                    edits.push((at..at, format!("{newline}{}<target>{inner}</target>", unit.indent)));
                }
            }
        }

        let mut text = self.raw.clone();
        edits.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
        for (range, replacement) in edits {
            text.replace_range(range, &replacement);
        }

        RenderedXliff { text, issues }
    }
}

fn parse_unit(raw: &str, node: roxmltree::Node<'_, '_>) -> Result<TransUnit, XliffError> {
    let id = node
        .attribute("id")
        .ok_or(XliffError::MissingId(node.range().start))?;
    let source = node
        .children()
        .find(|n| n.has_tag_name("source"))
        .ok_or_else(|| XliffError::MissingSource(id.to_string()))?;

    let mut source_text = String::new();
    let mut placeholders = Vec::new();
    flatten(source, &mut source_text, &mut placeholders);

    let target = node.children().find(|n| n.has_tag_name("target"));
    let target_text = target.map(|t| {
        let mut text = String::new();
        flatten(t, &mut text, &mut Vec::new());
        text
    });
    let target = target.map(|t| {
        let range = t.range();
        let tag = &raw[range.start..start_tag_end(raw, range.start)];
        let start_tag = match tag.strip_suffix("/>") {
            Some(open) => format!("{}>", open.trim_end()),
            None => tag.to_string(),
        };
        TargetSpan { range, start_tag }
    });

    let source_range = source.range();
    Ok(TransUnit {
        id: Key::from(id),
        source_text,
        placeholders,
        target_text,
        indent: indent_before(raw, source_range.start),
        source_range,
        target,
    })
}

/// Concatenate text under `node`, spelling each `<x/>` as `${{ID}}`.
fn flatten(node: roxmltree::Node<'_, '_>, out: &mut String, placeholders: &mut Vec<Placeholder>) {
    for child in node.children() {
        if child.is_text() {
            out.push_str(child.text().unwrap_or_default());
        } else if child.has_tag_name("x") {
            let id = child.attribute("id").unwrap_or_default().to_string();
            out.push_str(&placeholder_token(&id));
            placeholders.push(Placeholder {
                id,
                equiv_text: child.attribute("equiv-text").map(str::to_string),
            });
        } else if child.is_element() {
            flatten(child, out, placeholders);
        }
    }
}

/// The document's line terminator, judged by its first line.
fn line_ending(raw: &str) -> &'static str {
    match raw.find('\n') {
        Some(i) if raw[..i].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Whitespace between the start of the line and `pos`, if that is all there is.
fn indent_before(raw: &str, pos: usize) -> String {
    let line_start = raw[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &raw[line_start..pos];
    if prefix.chars().all(char::is_whitespace) {
        prefix.to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<xliff version="1.2" xmlns="urn:oasis:names:tc:xliff:document:1.2">
  <file source-language="en" datatype="plaintext" original="ng2.template">
    <body>
      <trans-unit id="greeting" datatype="html">
        <source>Hello <x id="INTERPOLATION" equiv-text="{{ name }}"/>, you have <x id="INTERPOLATION_1" equiv-text="{{ count }}"/> messages</source>
        <context-group purpose="location">
          <context context-type="sourcefile">src/app/app.component.html</context>
          <context context-type="linenumber">3</context>
        </context-group>
      </trans-unit>
      <trans-unit id="tos" datatype="html">
        <source>Terms &amp; conditions</source>
        <note priority="1" from="description">Footer link</note>
      </trans-unit>
    </body>
  </file>
</xliff>
"#;

    fn doc() -> XliffDocument {
        XliffDocument::parse(SOURCE.to_string()).unwrap()
    }

    fn kv(pairs: &[(&str, &str)]) -> KeyValueMap {
        pairs
            .iter()
            .map(|(k, v)| (Key::from(*k), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_units() {
        let doc = doc();
        assert_eq!(doc.source_language(), Some(&Locale::from("en")));
        assert_eq!(doc.units().len(), 2);

        let greeting = doc.unit("greeting").unwrap();
        assert_eq!(
            greeting.source_text,
            "Hello ${{INTERPOLATION}}, you have ${{INTERPOLATION_1}} messages"
        );
        assert_eq!(greeting.placeholders.len(), 2);
        assert_eq!(greeting.placeholders[0].equiv_text.as_deref(), Some("{{ name }}"));
        assert!(greeting.target_text.is_none());
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(doc().key_values()["tos"], "Terms & conditions");
    }

    #[test]
    fn test_render_inserts_targets_and_keeps_everything_else() {
        let rendered = doc().render_with_targets(&kv(&[
            ("greeting", "Bonjour ${{INTERPOLATION}}, vous avez ${{INTERPOLATION_1}} messages"),
            ("tos", "Conditions & modalités"),
            ("not-in-xlf", "ignored"),
        ]));

        assert!(rendered.issues.is_empty(), "{:?}", rendered.issues);
        let text = &rendered.text;
        assert!(text.contains(
            "<target>Bonjour <x id=\"INTERPOLATION\" equiv-text=\"{{ name }}\"/>, vous avez <x id=\"INTERPOLATION_1\" equiv-text=\"{{ count }}\"/> messages</target>"
        ));
        assert!(text.contains("</source>\n        <target>Conditions &amp; modalités</target>"));
        assert!(text.contains("<note priority=\"1\" from=\"description\">Footer link</note>"));
        assert!(text.contains("<context context-type=\"linenumber\">3</context>"));
        assert!(!text.contains("ignored"));

        let reparsed = XliffDocument::parse(rendered.text.clone()).unwrap();
        assert_eq!(
            reparsed.target_values()["greeting"],
            "Bonjour ${{INTERPOLATION}}, vous avez ${{INTERPOLATION_1}} messages"
        );
        assert_eq!(reparsed.target_values()["tos"], "Conditions & modalités");
    }

    #[test]
    fn test_render_replaces_existing_target_keeping_attributes() {
        let translated = doc().render_with_targets(&kv(&[("tos", "old")])).text;
        let translated = translated.replace("<target>old</target>", "<target state=\"translated\">old</target>");
        let doc = XliffDocument::parse(translated).unwrap();

        let rendered = doc.render_with_targets(&kv(&[("tos", "new")]));
        assert!(rendered.text.contains("<target state=\"translated\">new</target>"));
        assert!(!rendered.text.contains(">old<"));
        assert_eq!(rendered.text.matches("<target").count(), 1);
    }

    #[test]
    fn test_render_replaces_self_closing_target() {
        let raw = SOURCE.replace(
            "<source>Terms &amp; conditions</source>",
            "<source>Terms &amp; conditions</source><target/>",
        );
        let doc = XliffDocument::parse(raw).unwrap();
        assert_eq!(doc.unit("tos").unwrap().target_text.as_deref(), Some(""));

        let rendered = doc.render_with_targets(&kv(&[("tos", "CGU")]));
        assert!(rendered.text.contains("<target>CGU</target>"));
        assert!(!rendered.text.contains("<target/>"));
    }

    #[test]
    fn test_units_without_translation_untouched() {
        let rendered = doc().render_with_targets(&KeyValueMap::new());
        assert_eq!(rendered.text, SOURCE);
    }

    #[test]
    fn test_placeholder_issues() {
        let doc = doc();
        let unit = doc.unit("greeting").unwrap();

        let (_, issues) = unit.render_target("Salut ${{INTERPOLATION}}");
        assert!(matches!(issues[0], PlaceholderIssue::CountMismatch { .. }));
        assert!(matches!(
            &issues[1],
            PlaceholderIssue::MissingFromTranslation { id, .. } if id == "INTERPOLATION_1"
        ));
        assert_eq!(issues.len(), 2);

        let (xml, issues) =
            unit.render_target("${{INTERPOLATION}} ${{INTERPOLATION_1}} ${{BOGUS}}");
        assert!(issues
            .iter()
            .any(|i| matches!(i, PlaceholderIssue::UnknownInTranslation { id, .. } if id == "BOGUS")));
        assert!(xml.ends_with(r#"<x id="BOGUS" equiv-text="BOGUS"/>"#));
        assert!(issues.iter().all(|i| i.key().as_str() == "greeting"));
    }

    #[test]
    fn test_empty_translation_not_checked() {
        let doc = doc();
        let (xml, issues) = doc.unit("greeting").unwrap().render_target("");
        assert!(xml.is_empty());
        assert!(issues.is_empty());
    }

    #[test]
    fn test_placeholder_ids_in_text() {
        assert_eq!(
            placeholder_ids_in_text("a ${{X}} b ${{START_TAG_SPAN}}c${{CLOSE_TAG_SPAN}}"),
            ["X", "START_TAG_SPAN", "CLOSE_TAG_SPAN"]
        );
        assert!(placeholder_ids_in_text("no placeholders {{ here }}").is_empty());
        assert_eq!(placeholder_token("ICU"), "${{ICU}}");
    }

    #[test]
    fn test_issue_detail() {
        let issue = PlaceholderIssue::UnknownInTranslation {
            key: Key::from("k"),
            id: "X".into(),
        };
        assert!(issue.detail().contains("made up one"));
    }

    #[test]
    fn test_not_xliff() {
        let err = XliffDocument::parse("<html/>".to_string()).unwrap_err();
        assert!(matches!(err, XliffError::NotXliff(name) if name == "html"));
    }

    #[test]
    fn test_missing_source() {
        let err = XliffDocument::parse(
            r#"<xliff version="1.2"><file><body><trans-unit id="a"/></body></file></xliff>"#.to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, XliffError::MissingSource(id) if id == "a"));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            XliffDocument::parse("<xliff><file>".to_string()),
            Err(XliffError::Xml(_))
        ));
    }

    #[test]
    fn test_inserted_target_keeps_crlf_line_endings() {
        let crlf = SOURCE.replace('\n', "\r\n");
        let doc = XliffDocument::parse(crlf).unwrap();
        let rendered = doc.render_with_targets(&kv(&[("tos", "Conditions")]));

        assert!(rendered.text.contains("</source>\r\n        <target>Conditions</target>"));
        let bare_newlines = rendered
            .text
            .match_indices('\n')
            .filter(|(i, _)| !rendered.text[..*i].ends_with('\r'))
            .count();
        assert_eq!(bare_newlines, 0);
    }
}
