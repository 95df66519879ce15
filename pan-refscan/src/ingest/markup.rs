//! Markup export dialect.
//!
//! Only four collections matter for address analysis:
//!
//! | collection            | record                          |
//! |-----------------------|---------------------------------|
//! | `address/entry`       | [`EntityRecord::Address`]       |
//! | `address-group/entry` | [`EntityRecord::AddressGroup`]  |
//! | `security/rules/entry`| [`EntityRecord::RuleFragment`]  |
//! | `nat/rules/entry`     | [`EntityRecord::RuleFragment`]  |
//!
//! Entries nested in a `device-group/entry` belong to that device group;
//! everything else is shared. Rule fields are re-serialized into the same
//! fragment text the set-statement dialect produces (`source [ a b ]`).

use std::ops::ControlFlow;

use panconf_core::{render_list, scan_sections, ScannedEntry, SectionTarget, XmlNode};

use super::{IngestError, IngestOptions};
use crate::cancel::Canceled;
use crate::model::{
    AddressAttr, AddressValue, EntityRecord, GroupAttr, RuleField, RuleKind, Scope,
};

const ADDRESS: &str = "address";
const ADDRESS_GROUP: &str = "address-group";
const SECURITY: &str = "security";
const NAT: &str = "nat";
const DEVICE_GROUP: &str = "device-group";
const RULEBASES: &[&str] = &["pre-rulebase", "post-rulebase", "rulebase"];
const CANCEL_CHECK_EVERY: usize = 256;

fn section_targets() -> Vec<SectionTarget> {
    vec![
        SectionTarget::capture(ADDRESS, &["address"]),
        SectionTarget::capture(ADDRESS_GROUP, &["address-group"]),
        SectionTarget::capture(SECURITY, &["security", "rules"]),
        SectionTarget::capture(NAT, &["nat", "rules"]),
        SectionTarget::marker(DEVICE_GROUP, &["device-group"]),
    ]
}

/// Scan a markup export into records, in document order.
pub fn parse_markup(xml: &[u8], options: IngestOptions<'_>) -> Result<Vec<EntityRecord>, IngestError> {
    let total = xml.len().max(1);
    let every = options.config.progress_every.max(1);
    let mut records = Vec::new();
    let mut stopped: Option<Canceled> = None;
    let mut seen = 0usize;

    let summary = scan_sections(xml, &section_targets(), |entry| {
        seen += 1;
        if seen % CANCEL_CHECK_EVERY == 0 {
            if let Err(canceled) = options.cancel.check() {
                stopped = Some(canceled);
                return ControlFlow::Break(());
            }
        }
        if seen % every == 0 {
            options.progress.report(
                entry.offset as f64 / total as f64,
                format!("scanned {seen} entries"),
            );
        }
        convert_entry(entry, &mut records);
        ControlFlow::Continue(())
    })?;

    if let Some(canceled) = stopped {
        return Err(canceled.into());
    }
    tracing::debug!(entries = summary.entries, "markup scan complete");
    Ok(records)
}

fn convert_entry(entry: ScannedEntry, out: &mut Vec<EntityRecord>) {
    let scope = entry
        .scope_name(DEVICE_GROUP)
        .map_or(Scope::Shared, Scope::device_group);
    let position = entry.line;

    match entry.label.as_str() {
        DEVICE_GROUP => out.push(EntityRecord::DeviceGroup {
            name: entry.name,
            position,
        }),
        ADDRESS => address_records(&entry.node, &entry.name, &scope, position, out),
        ADDRESS_GROUP => group_records(&entry.node, &entry.name, &scope, position, out),
        SECURITY | NAT => {
            let kind = if entry.label == NAT {
                RuleKind::Nat
            } else {
                RuleKind::Security
            };
            let rulebase = entry
                .path
                .iter()
                .filter(|tag| RULEBASES.contains(&tag.as_str()))
                .last()
                .cloned();
            let fragments = rule_fragments(&entry.node);
            if fragments.is_empty() {
                out.push(EntityRecord::RuleFragment {
                    kind,
                    scope,
                    rulebase,
                    name: entry.name,
                    text: String::new(),
                    position,
                });
                return;
            }
            for text in fragments {
                out.push(EntityRecord::RuleFragment {
                    kind,
                    scope: scope.clone(),
                    rulebase: rulebase.clone(),
                    name: entry.name.clone(),
                    text,
                    position,
                });
            }
        }
        _ => {}
    }
}

fn address_records(
    node: &XmlNode,
    name: &str,
    scope: &Scope,
    position: usize,
    out: &mut Vec<EntityRecord>,
) {
    let mut push = |attr| {
        out.push(EntityRecord::Address {
            scope: scope.clone(),
            name: name.to_string(),
            attr,
            position,
        })
    };
    for attribute in ["ip-netmask", "ip-range", "fqdn"] {
        if let Some(value) = node.get_text(&[attribute]) {
            if let Some(value) = AddressValue::from_attribute(attribute, value) {
                push(AddressAttr::Value(value));
            }
        }
    }
    if let Some(description) = node.get_text(&["description"]) {
        push(AddressAttr::Description(description.trim().to_string()));
    }
}

fn group_records(
    node: &XmlNode,
    name: &str,
    scope: &Scope,
    position: usize,
    out: &mut Vec<EntityRecord>,
) {
    let mut push = |attr| {
        out.push(EntityRecord::AddressGroup {
            scope: scope.clone(),
            name: name.to_string(),
            attr,
            position,
        })
    };
    if let Some(members) = node.get_child("static") {
        push(GroupAttr::Static(members.member_texts()));
    }
    if let Some(filter) = node.get_text(&["dynamic", "filter"]) {
        push(GroupAttr::Dynamic(filter.trim().to_string()));
    }
    if let Some(description) = node.get_text(&["description"]) {
        push(GroupAttr::Description(description.trim().to_string()));
    }
}

/// Serialize recognised rule fields, one fragment per field.
fn rule_fragments(rule: &XmlNode) -> Vec<String> {
    rule.children
        .iter()
        .filter_map(|child| {
            let field = RuleField::from_keyword(&child.tag)?;
            if field.is_translation() {
                let translated: Vec<String> = child
                    .find_descendants("translated-address")
                    .into_iter()
                    .flat_map(XmlNode::member_texts)
                    .collect();
                if translated.is_empty() {
                    return None;
                }
                return Some(format!(
                    "{} translated-address {}",
                    child.tag,
                    render_list(&translated)
                ));
            }
            let values = child.member_texts();
            if values.is_empty() {
                return None;
            }
            Some(format!("{} {}", child.tag, render_list(&values)))
        })
        .collect()
}
