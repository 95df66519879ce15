//! Targeted section scanning for tag-delimited configuration exports.
//!
//! Firewall exports routinely run to hundreds of megabytes, most of which is
//! irrelevant to any one question. The scanner streams `quick-xml` events and
//! only materialises `<entry name="...">` blocks that sit directly beneath a
//! requested collection path. Everything else is walked past without building
//! a tree.
//!
//! ## Targets
//!
//! - **capture** targets hand the caller the full entry subtree once its
//!   closing tag is seen (`address`, `security/rules`, ...).
//! - **marker** targets report the entry as soon as its opening tag is seen and
//!   keep scanning inside it (`device-group` entries enclose everything else).
//!
//! Every reported entry carries the chain of enclosing named entries so the
//! caller can tell `shared` objects from device-group objects.

use std::ops::ControlFlow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use thiserror::Error;

use crate::tree::XmlNode;

/// Errors that can occur while scanning an export.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Input XML could not be decoded or tokenized.
    #[error("failed to parse XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Input bytes were not valid UTF-8 for tag/attribute/text extraction.
    #[error("invalid UTF-8 while parsing XML: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// Failed to decode text entity or bytes.
    #[error("failed to decode XML text: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    /// Structural issue in XML document.
    #[error("malformed XML: {0}")]
    Malformed(String),
}

/// A collection path whose named entries should be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTarget {
    /// Caller-chosen label copied onto every entry found under this target.
    pub label: String,
    /// Tags that must directly enclose the `<entry>`, outermost first.
    pub parents: Vec<String>,
    /// Whether the entry subtree is materialised.
    pub capture: bool,
}

impl SectionTarget {
    /// Report entries under `parents` together with their full subtree.
    pub fn capture(label: impl Into<String>, parents: &[&str]) -> Self {
        Self::new(label, parents, true)
    }

    /// Report entries under `parents` on their opening tag only.
    pub fn marker(label: impl Into<String>, parents: &[&str]) -> Self {
        Self::new(label, parents, false)
    }

    fn new(label: impl Into<String>, parents: &[&str], capture: bool) -> Self {
        Self {
            label: label.into(),
            parents: parents.iter().map(|tag| (*tag).to_string()).collect(),
            capture,
        }
    }

    fn encloses(&self, stack: &[Frame]) -> bool {
        if self.parents.len() > stack.len() {
            return false;
        }
        stack[stack.len() - self.parents.len()..]
            .iter()
            .zip(&self.parents)
            .all(|(frame, parent)| frame.tag == *parent)
    }
}

/// A named entry enclosing a reported entry, e.g. `device-group` / `DG1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryScope {
    /// Tag of the collection holding the enclosing entry.
    pub collection: String,
    /// Value of the enclosing entry's `name` attribute.
    pub name: String,
}

/// One entry found beneath a [`SectionTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    /// Label of the matching target.
    pub label: String,
    /// Value of the entry's `name` attribute.
    pub name: String,
    /// Captured subtree; marker entries carry only the `<entry>` element itself.
    pub node: XmlNode,
    /// Tags from the document root down to the entry's parent.
    pub path: Vec<String>,
    /// Enclosing named entries, outermost first.
    pub scopes: Vec<EntryScope>,
    /// 1-based line of the entry's opening tag.
    pub line: usize,
    /// Byte offset of the entry's opening tag.
    pub offset: usize,
}

impl ScannedEntry {
    /// Innermost enclosing entry name held by `collection`.
    pub fn scope_name(&self, collection: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find(|scope| scope.collection == collection)
            .map(|scope| scope.name.as_str())
    }

    /// Whether `tag` appears anywhere on the path to this entry.
    pub fn has_ancestor(&self, tag: &str) -> bool {
        self.path.iter().any(|segment| segment == tag)
    }
}

/// Totals for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Entries handed to the callback.
    pub entries: usize,
    /// `false` when the callback stopped the scan early.
    pub completed: bool,
}

#[derive(Debug)]
struct Frame {
    tag: String,
    entry_name: Option<String>,
}

struct Capture {
    target: usize,
    nodes: Vec<XmlNode>,
    path: Vec<String>,
    scopes: Vec<EntryScope>,
    line: usize,
    offset: usize,
}

#[derive(Default)]
struct LineCounter {
    offset: usize,
    line: usize,
}

impl LineCounter {
    fn line_at(&mut self, xml: &[u8], offset: usize) -> usize {
        let offset = offset.min(xml.len());
        if offset > self.offset {
            self.line += xml[self.offset..offset]
                .iter()
                .filter(|byte| **byte == b'\n')
                .count();
            self.offset = offset;
        }
        self.line + 1
    }
}

/// Scan `xml` and hand every entry beneath one of `targets` to `on_entry`.
///
/// The callback may return [`ControlFlow::Break`] to stop early (cancellation);
/// the summary then reports `completed == false`.
///
/// # Arguments
///
/// * `xml` - The raw export bytes.
/// * `targets` - Collection paths to report; the first matching target wins.
/// * `on_entry` - Receives entries in document order.
pub fn scan_sections<F>(
    xml: &[u8],
    targets: &[SectionTarget],
    mut on_entry: F,
) -> Result<ScanSummary, ScanError>
where
    F: FnMut(ScannedEntry) -> ControlFlow<()>,
{
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut capture: Option<Capture> = None;
    let mut lines = LineCounter::default();
    let mut summary = ScanSummary::default();

    loop {
        let event_start = tag_start(xml, position(&reader));
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let node = build_node_start(&e, &reader)?;
                let frame = Frame {
                    tag: node.tag.clone(),
                    entry_name: node.entry_name().map(str::to_string),
                };
                if let Some(active) = capture.as_mut() {
                    active.nodes.push(node);
                } else if let Some(index) = matching_target(targets, &stack, &node) {
                    let line = lines.line_at(xml, event_start);
                    if targets[index].capture {
                        capture = Some(Capture {
                            target: index,
                            nodes: vec![node],
                            path: path_of(&stack),
                            scopes: scopes_of(&stack),
                            line,
                            offset: event_start,
                        });
                    } else {
                        let entry = entry_from(&targets[index], node, &stack, line, event_start);
                        summary.entries += 1;
                        if on_entry(entry).is_break() {
                            return Ok(summary);
                        }
                    }
                }
                stack.push(frame);
            }
            Event::Empty(e) => {
                let node = build_node_start(&e, &reader)?;
                if let Some(active) = capture.as_mut() {
                    if let Some(parent) = active.nodes.last_mut() {
                        parent.children.push(node);
                    }
                } else if let Some(index) = matching_target(targets, &stack, &node) {
                    let line = lines.line_at(xml, event_start);
                    let entry = entry_from(&targets[index], node, &stack, line, event_start);
                    summary.entries += 1;
                    if on_entry(entry).is_break() {
                        return Ok(summary);
                    }
                }
            }
            Event::Text(e) => {
                if let Some(current) = capture.as_mut().and_then(|active| active.nodes.last_mut()) {
                    let text = e.unescape()?.into_owned();
                    append_text(current, text);
                }
            }
            Event::CData(e) => {
                if let Some(current) = capture.as_mut().and_then(|active| active.nodes.last_mut()) {
                    let text = std::str::from_utf8(e.as_ref())?.to_string();
                    append_text(current, text);
                }
            }
            Event::End(_) => {
                stack.pop().ok_or_else(|| {
                    ScanError::Malformed("encountered closing tag without open tag".to_string())
                })?;

                if let Some(mut active) = capture.take() {
                    let node = active.nodes.pop().ok_or_else(|| {
                        ScanError::Malformed("capture lost its open element".to_string())
                    })?;
                    if let Some(parent) = active.nodes.last_mut() {
                        parent.children.push(node);
                        capture = Some(active);
                    } else {
                        let target = &targets[active.target];
                        let entry = ScannedEntry {
                            label: target.label.clone(),
                            name: node.entry_name().unwrap_or_default().to_string(),
                            node,
                            path: active.path,
                            scopes: active.scopes,
                            line: active.line,
                            offset: active.offset,
                        };
                        summary.entries += 1;
                        if on_entry(entry).is_break() {
                            return Ok(summary);
                        }
                    }
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ScanError::Malformed(
            "unclosed element(s) at end of document".to_string(),
        ));
    }

    summary.completed = true;
    Ok(summary)
}

fn matching_target(targets: &[SectionTarget], stack: &[Frame], node: &XmlNode) -> Option<usize> {
    if node.tag != "entry" || node.entry_name().is_none() {
        return None;
    }
    targets.iter().position(|target| target.encloses(stack))
}

fn entry_from(
    target: &SectionTarget,
    node: XmlNode,
    stack: &[Frame],
    line: usize,
    offset: usize,
) -> ScannedEntry {
    ScannedEntry {
        label: target.label.clone(),
        name: node.entry_name().unwrap_or_default().to_string(),
        node,
        path: path_of(stack),
        scopes: scopes_of(stack),
        line,
        offset,
    }
}

fn path_of(stack: &[Frame]) -> Vec<String> {
    stack.iter().map(|frame| frame.tag.clone()).collect()
}

fn scopes_of(stack: &[Frame]) -> Vec<EntryScope> {
    stack
        .windows(2)
        .filter_map(|pair| {
            let name = pair[1].entry_name.as_ref()?;
            (pair[1].tag == "entry").then(|| EntryScope {
                collection: pair[0].tag.clone(),
                name: name.clone(),
            })
        })
        .collect()
}

fn append_text(node: &mut XmlNode, text: String) {
    if text.trim().is_empty() {
        return;
    }
    match &mut node.text {
        Some(existing) => existing.push_str(&text),
        None => node.text = Some(text),
    }
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

// Trimmed whitespace sits between the reader position and the tag itself.
fn tag_start(xml: &[u8], from: usize) -> usize {
    let from = from.min(xml.len());
    xml[from..]
        .iter()
        .position(|byte| *byte == b'<')
        .map_or(from, |delta| from + delta)
}

fn build_node_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<XmlNode, ScanError> {
    let tag = qname_to_string(e.name())?;
    let mut node = XmlNode::new(tag);

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = qname_to_string(attr.key)?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())?
            .into_owned();
        node.attributes.insert(key, value);
    }

    Ok(node)
}

fn qname_to_string(name: QName<'_>) -> Result<String, ScanError> {
    Ok(std::str::from_utf8(name.as_ref())?.to_string())
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use super::{scan_sections, SectionTarget};

    const EXPORT: &str = r#"<config>
  <shared>
    <address>
      <entry name="web"><ip-netmask>10.0.0.1/32</ip-netmask></entry>
    </address>
  </shared>
  <devices><entry name="localhost">
    <device-group>
      <entry name="DG1">
        <address>
          <entry name="db"><fqdn>db.example.com</fqdn></entry>
        </address>
      </entry>
    </device-group>
  </entry></devices>
</config>"#;

    #[test]
    fn captures_entries_with_enclosing_scope() {
        let targets = vec![
            SectionTarget::capture("address", &["address"]),
            SectionTarget::marker("device-group", &["device-group"]),
        ];
        let mut seen = Vec::new();
        let summary = scan_sections(EXPORT.as_bytes(), &targets, |entry| {
            seen.push(entry);
            ControlFlow::Continue(())
        })
        .expect("scan");

        assert!(summary.completed);
        assert_eq!(summary.entries, 3);
        assert_eq!(seen[0].name, "web");
        assert_eq!(seen[0].scope_name("device-group"), None);
        assert_eq!(seen[0].node.get_text(&["ip-netmask"]), Some("10.0.0.1/32"));
        assert_eq!(seen[0].line, 4);
        assert_eq!(seen[1].label, "device-group");
        assert_eq!(seen[1].name, "DG1");
        assert_eq!(seen[2].name, "db");
        assert_eq!(seen[2].scope_name("device-group"), Some("DG1"));
        assert!(seen[2].has_ancestor("devices"));
    }

    #[test]
    fn break_stops_the_scan() {
        let targets = vec![SectionTarget::capture("address", &["address"])];
        let summary = scan_sections(EXPORT.as_bytes(), &targets, |_| ControlFlow::Break(()))
            .expect("scan");
        assert_eq!(summary.entries, 1);
        assert!(!summary.completed);
    }

    #[test]
    fn rejects_unclosed_document() {
        let targets = vec![SectionTarget::capture("address", &["address"])];
        let result = scan_sections(b"<config><address>", &targets, |_| ControlFlow::Continue(()));
        assert!(result.is_err());
    }
}
