//! Batch extractor: osc XML -> per-changeset delta records
//!
//! A batch carries three edit sections (`<create>`, `<modify>`,
//! `<delete>`), each holding elementary `<node>`, `<way>` and
//! `<relation>` edits. All elementary edits are folded by changeset id
//! into one [`ChangesetDelta`] per changeset touched in the batch.
//!
//! An elementary edit without a changeset id, account id, or timestamp
//! makes the whole batch fail: that is corrupt input and the decision
//! to retry or skip belongs to the driver, not here.

use crate::limiter_core::types::{ChangesetDelta, EditCategory, EditCounts};
use chrono::{DateTime, Utc};
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

#[derive(Debug)]
pub enum ExtractError {
    Xml(quick_xml::Error),
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },
}

impl From<quick_xml::Error> for ExtractError {
    fn from(err: quick_xml::Error) -> Self {
        ExtractError::Xml(err)
    }
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Xml(e) => write!(f, "batch XML error: {}", e),
            ExtractError::MissingAttribute { element, attribute } => {
                write!(f, "<{}> is missing required attribute '{}'", element, attribute)
            }
            ExtractError::InvalidAttribute {
                element,
                attribute,
                value,
            } => write!(
                f,
                "<{}> has invalid '{}' value: {}",
                element, attribute, value
            ),
        }
    }
}

impl std::error::Error for ExtractError {}

#[derive(Debug, Clone, Copy)]
enum Section {
    Create,
    Modify,
    Delete,
}

/// Map a section and a wire element name onto one of the nine categories
///
/// The wire format calls points "node"; everything downstream uses the
/// point vocabulary.
fn category_for(section: Section, name: &[u8]) -> Option<EditCategory> {
    match (section, name) {
        (Section::Create, b"node") => Some(EditCategory::CreatedPoints),
        (Section::Modify, b"node") => Some(EditCategory::ModifiedPoints),
        (Section::Delete, b"node") => Some(EditCategory::DeletedPoints),
        (Section::Create, b"way") => Some(EditCategory::CreatedWays),
        (Section::Modify, b"way") => Some(EditCategory::ModifiedWays),
        (Section::Delete, b"way") => Some(EditCategory::DeletedWays),
        (Section::Create, b"relation") => Some(EditCategory::CreatedRelations),
        (Section::Modify, b"relation") => Some(EditCategory::ModifiedRelations),
        (Section::Delete, b"relation") => Some(EditCategory::DeletedRelations),
        _ => None,
    }
}

/// Extract the deduplicated per-changeset deltas from one batch
pub fn extract_deltas(xml: &[u8]) -> Result<Vec<ChangesetDelta>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut section: Option<Section> = None;
    let mut deltas: HashMap<i64, ChangesetDelta> = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"create" => section = Some(Section::Create),
                b"modify" => section = Some(Section::Modify),
                b"delete" => section = Some(Section::Delete),
                name => {
                    if let Some(category) = section.and_then(|s| category_for(s, name)) {
                        record_edit(&mut deltas, category, &e)?;
                    }
                }
            },
            Event::Empty(e) => {
                if let Some(category) = section.and_then(|s| category_for(s, e.name().as_ref())) {
                    record_edit(&mut deltas, category, &e)?;
                }
            }
            Event::End(e) => {
                if matches!(e.name().as_ref(), b"create" | b"modify" | b"delete") {
                    section = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut out: Vec<ChangesetDelta> = deltas.into_values().collect();
    out.sort_by_key(|d| d.changeset_id);
    Ok(out)
}

/// Fold one elementary edit into the delta for its changeset
///
/// The first edit seen for a changeset fixes the account id, username
/// and timestamp of the whole delta.
fn record_edit(
    deltas: &mut HashMap<i64, ChangesetDelta>,
    category: EditCategory,
    element: &BytesStart<'_>,
) -> Result<(), ExtractError> {
    let element_name = String::from_utf8_lossy(element.name().as_ref()).into_owned();

    let mut changeset_id = None;
    let mut account_id = None;
    let mut username = None;
    let mut timestamp = None;

    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        match attr.key.as_ref() {
            b"changeset" => {
                changeset_id = Some(parse_i64(&element_name, "changeset", &attr.value)?)
            }
            b"uid" => account_id = Some(parse_i64(&element_name, "uid", &attr.value)?),
            b"user" => {
                username = Some(
                    attr.unescape_value()
                        .map_err(quick_xml::Error::from)?
                        .into_owned(),
                )
            }
            b"timestamp" => {
                timestamp = Some(parse_timestamp(&element_name, &attr.value)?)
            }
            _ => {}
        }
    }

    let changeset_id = changeset_id.ok_or(ExtractError::MissingAttribute {
        element: element_name.clone(),
        attribute: "changeset",
    })?;
    let account_id = account_id.ok_or(ExtractError::MissingAttribute {
        element: element_name.clone(),
        attribute: "uid",
    })?;
    let timestamp = timestamp.ok_or(ExtractError::MissingAttribute {
        element: element_name,
        attribute: "timestamp",
    })?;

    let delta = deltas.entry(changeset_id).or_insert_with(|| ChangesetDelta {
        changeset_id,
        account_id,
        // Anonymous edits exist in historic data
        username: username.unwrap_or_default(),
        timestamp,
        counts: EditCounts::new(),
    });
    delta.counts.increment(category);
    Ok(())
}

fn parse_i64(element: &str, attribute: &'static str, value: &[u8]) -> Result<i64, ExtractError> {
    let text = String::from_utf8_lossy(value);
    text.trim().parse::<i64>().map_err(|_| ExtractError::InvalidAttribute {
        element: element.to_string(),
        attribute,
        value: text.into_owned(),
    })
}

fn parse_timestamp(element: &str, value: &[u8]) -> Result<DateTime<Utc>, ExtractError> {
    let text = String::from_utf8_lossy(value);
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ExtractError::InvalidAttribute {
            element: element.to_string(),
            attribute: "timestamp",
            value: text.into_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_BATCH: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osmChange version="0.6" generator="test">
  <create>
    <node id="1" changeset="100" uid="7" user="alice" timestamp="2025-08-30T10:00:00Z" lat="0" lon="0"/>
    <node id="2" changeset="100" uid="7" user="alice" timestamp="2025-08-30T10:00:05Z" lat="0" lon="0"/>
    <way id="3" changeset="100" uid="7" user="alice" timestamp="2025-08-30T10:00:10Z">
      <nd ref="1"/>
      <nd ref="2"/>
    </way>
    <node id="4" changeset="200" uid="8" user="bob" timestamp="2025-08-30T10:01:00Z" lat="1" lon="1"/>
  </create>
  <modify>
    <relation id="5" changeset="100" uid="7" user="alice" timestamp="2025-08-30T10:02:00Z">
      <member type="way" ref="3" role=""/>
    </relation>
  </modify>
  <delete>
    <node id="6" changeset="200" uid="8" user="bob" timestamp="2025-08-30T10:03:00Z" lat="1" lon="1"/>
  </delete>
</osmChange>"#;

    #[test]
    fn test_extract_folds_edits_by_changeset() {
        let deltas = extract_deltas(SAMPLE_BATCH.as_bytes()).unwrap();
        assert_eq!(deltas.len(), 2);

        let alice = &deltas[0];
        assert_eq!(alice.changeset_id, 100);
        assert_eq!(alice.account_id, 7);
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.counts.get(EditCategory::CreatedPoints), 2);
        assert_eq!(alice.counts.get(EditCategory::CreatedWays), 1);
        assert_eq!(alice.counts.get(EditCategory::ModifiedRelations), 1);
        assert_eq!(alice.counts.total(), 4);

        let bob = &deltas[1];
        assert_eq!(bob.changeset_id, 200);
        assert_eq!(bob.counts.get(EditCategory::CreatedPoints), 1);
        assert_eq!(bob.counts.get(EditCategory::DeletedPoints), 1);
    }

    #[test]
    fn test_first_edit_fixes_delta_metadata() {
        let deltas = extract_deltas(SAMPLE_BATCH.as_bytes()).unwrap();
        let alice = &deltas[0];
        // First <node> of changeset 100 was at 10:00:00
        assert_eq!(alice.timestamp.to_rfc3339(), "2025-08-30T10:00:00+00:00");
    }

    #[test]
    fn test_missing_changeset_fails_batch() {
        let xml = r#"<osmChange><create>
            <node id="1" uid="7" user="x" timestamp="2025-08-30T10:00:00Z"/>
        </create></osmChange>"#;
        let err = extract_deltas(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::MissingAttribute {
                attribute: "changeset",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_uid_fails_batch() {
        let xml = r#"<osmChange><delete>
            <way id="1" changeset="9" timestamp="2025-08-30T10:00:00Z"/>
        </delete></osmChange>"#;
        let err = extract_deltas(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::MissingAttribute {
                attribute: "uid",
                ..
            }
        ));
    }

    #[test]
    fn test_bad_timestamp_fails_batch() {
        let xml = r#"<osmChange><create>
            <node id="1" changeset="9" uid="7" timestamp="yesterday"/>
        </create></osmChange>"#;
        let err = extract_deltas(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_escaped_username_is_unescaped() {
        let xml = r#"<osmChange><create>
            <node id="1" changeset="9" uid="7" user="a &amp; b" timestamp="2025-08-30T10:00:00Z"/>
        </create></osmChange>"#;
        let deltas = extract_deltas(xml.as_bytes()).unwrap();
        assert_eq!(deltas[0].username, "a & b");
    }

    #[test]
    fn test_missing_username_defaults_to_empty() {
        let xml = r#"<osmChange><create>
            <node id="1" changeset="9" uid="7" timestamp="2025-08-30T10:00:00Z"/>
        </create></osmChange>"#;
        let deltas = extract_deltas(xml.as_bytes()).unwrap();
        assert_eq!(deltas[0].username, "");
    }

    #[test]
    fn test_elements_outside_sections_are_ignored() {
        let xml = r#"<osmChange>
            <node id="1" changeset="9" uid="7" timestamp="2025-08-30T10:00:00Z"/>
        </osmChange>"#;
        let deltas = extract_deltas(xml.as_bytes()).unwrap();
        assert!(deltas.is_empty());
    }
}
