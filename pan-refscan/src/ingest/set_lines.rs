//! Set-statement dialect.
//!
//! ```text
//! set shared address web ip-netmask 10.0.0.1/32
//! set device-group DG1 address-group servers static [ web db ]
//! set device-group DG1 pre-rulebase security rules "Allow Web" source servers
//! ```
//!
//! Address and address-group statements are recognised structurally from the
//! token stream. Everything else is offered to the configured rule-header
//! patterns; statements matching nothing are skipped.
//!
//! Lines are converted in parallel over disjoint chunks. Chunks are collected
//! back in input order, so the store sees records exactly as written.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use panconf_core::{tokenize, Token};
use rayon::prelude::*;

use super::{IngestError, IngestOptions};
use crate::config::AnalyzerConfig;
use crate::model::{AddressAttr, AddressValue, EntityRecord, GroupAttr, Scope};

const RULEBASES: &[&str] = &["pre-rulebase", "post-rulebase", "rulebase"];

/// Convert set-statement text into records, preserving input order.
pub fn parse_set_lines(
    text: &str,
    options: IngestOptions<'_>,
) -> Result<Vec<EntityRecord>, IngestError> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .collect();
    let total = lines.len().max(1);
    let every = options.config.progress_every.max(1);
    let processed = AtomicUsize::new(0);

    let chunks = lines
        .par_chunks(options.config.chunk_lines.max(1))
        .map(|chunk| {
            options.cancel.check()?;
            let mut records = Vec::with_capacity(chunk.len());
            let mut device_groups = HashSet::new();
            for (position, line) in chunk {
                parse_statement(line, *position, options.config, &mut device_groups, &mut records);
            }

            let before = processed.fetch_add(chunk.len(), Ordering::Relaxed);
            let after = before + chunk.len();
            if after / every > before / every {
                options.progress.report(
                    after as f64 / total as f64,
                    format!("processed {after} of {total} lines"),
                );
            }
            Ok(records)
        })
        .collect::<Result<Vec<Vec<EntityRecord>>, IngestError>>()?;

    Ok(chunks.into_iter().flatten().collect())
}

/// Convert one statement, appending zero or more records to `out`.
///
/// `device_groups` suppresses repeated device-group markers within a chunk.
pub fn parse_statement(
    line: &str,
    position: usize,
    config: &AnalyzerConfig,
    device_groups: &mut HashSet<String>,
    out: &mut Vec<EntityRecord>,
) {
    let line = line.trim();
    if !line.starts_with("set ") {
        return;
    }
    let tokens = tokenize(line);
    let (scope, next) = statement_scope(&tokens);

    if let Some(name) = scope.device_group_name() {
        if device_groups.insert(name.to_string()) {
            out.push(EntityRecord::DeviceGroup {
                name: name.to_string(),
                position,
            });
        }
    }

    let record = match word_at(&tokens, next) {
        Some("address") => address_record(&tokens[next + 1..], scope, position),
        Some("address-group") => group_record(&tokens[next + 1..], scope, position),
        _ => rule_record(line, scope, position, config),
    };
    out.extend(record);
}

fn statement_scope(tokens: &[Token]) -> (Scope, usize) {
    match (word_at(tokens, 1), word_at(tokens, 2)) {
        (Some("shared"), _) => (Scope::Shared, 2),
        (Some("device-group"), Some(name)) => (Scope::device_group(name), 3),
        (Some("vsys"), Some(_)) => (Scope::Shared, 3),
        _ => (Scope::Shared, 1),
    }
}

fn address_record(tokens: &[Token], scope: Scope, position: usize) -> Option<EntityRecord> {
    let name = word_at(tokens, 0)?;
    let attribute = word_at(tokens, 1)?;
    let value = first_value(tokens.get(2)?)?;
    let attr = match attribute {
        "description" => AddressAttr::Description(value.to_string()),
        other => AddressAttr::Value(AddressValue::from_attribute(other, value)?),
    };
    Some(EntityRecord::Address {
        scope,
        name: name.to_string(),
        attr,
        position,
    })
}

fn group_record(tokens: &[Token], scope: Scope, position: usize) -> Option<EntityRecord> {
    let name = word_at(tokens, 0)?;
    let attr = match word_at(tokens, 1)? {
        "static" => {
            let members = tokens[2..]
                .iter()
                .flat_map(Token::values)
                .map(str::to_string)
                .collect();
            GroupAttr::Static(members)
        }
        "dynamic" => {
            let filter = match word_at(tokens, 2) {
                Some("filter") => tokens.get(3).and_then(first_value)?,
                _ => tokens.get(2).and_then(first_value)?,
            };
            GroupAttr::Dynamic(filter.to_string())
        }
        "description" => GroupAttr::Description(tokens.get(2).and_then(first_value)?.to_string()),
        _ => return None,
    };
    Some(EntityRecord::AddressGroup {
        scope,
        name: name.to_string(),
        attr,
        position,
    })
}

fn rule_record(
    line: &str,
    scope: Scope,
    position: usize,
    config: &AnalyzerConfig,
) -> Option<EntityRecord> {
    let header = config.match_rule_header(line)?;
    let name = header.name.trim_matches(|ch| ch == '"' || ch == '\'');
    if name.is_empty() {
        return None;
    }
    let rulebase = tokenize(header.prefix)
        .iter()
        .filter_map(Token::as_word)
        .filter(|word| RULEBASES.contains(word))
        .last()
        .map(str::to_string);
    Some(EntityRecord::RuleFragment {
        kind: header.kind,
        scope,
        rulebase,
        name: name.to_string(),
        text: header.rest.to_string(),
        position,
    })
}

fn word_at(tokens: &[Token], index: usize) -> Option<&str> {
    tokens.get(index).and_then(Token::as_word)
}

fn first_value(token: &Token) -> Option<&str> {
    token.values().into_iter().next()
}
