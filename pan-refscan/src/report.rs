use colored::Colorize;

use crate::analysis::{RedundancyReport, TargetReport};
use crate::cleanup::{CleanupCommand, CleanupPlan, CommandKind, PlanSection};
use crate::copy::{CopyMode, CopyPlan};
use crate::hierarchy::HierarchyReport;
use crate::resolver::ReferenceEdge;

/// Render one target's analysis for terminal output.
pub fn render_target_text(report: &TargetReport, verbose: bool) -> String {
    let mut out = Vec::new();
    let status = if report.defined {
        "defined".green()
    } else {
        "not defined".yellow()
    };
    out.push(format!("{} {} ({status})", "target".bold(), report.target.bold()));

    out.push("definitions".cyan().to_string());
    if report.definitions.is_empty() {
        out.push("- none".to_string());
    }
    for def in &report.definitions {
        let value = def
            .value
            .as_ref()
            .map_or_else(|| "(no value)".to_string(), ToString::to_string);
        let mut line = format!("- {} {value}", def.scope);
        if let Some(description) = &def.description {
            line.push_str(&format!(" \"{description}\""));
        }
        if verbose {
            line.push_str(&format!(" line={}", def.position));
        }
        out.push(line);
    }

    out.push("device_groups".cyan().to_string());
    append_list(&mut out, &report.device_groups);

    out.push(format!("direct_rules ({})", report.direct_rules.len()).cyan().to_string());
    append_edges(&mut out, &report.direct_rules, verbose);

    out.push(format!("indirect_rules ({})", report.indirect_rules.len()).cyan().to_string());
    append_edges(&mut out, &report.indirect_rules, verbose);

    out.push(format!("address_groups ({})", report.address_groups.len()).cyan().to_string());
    if report.address_groups.is_empty() {
        out.push("- none".to_string());
    }
    for group in &report.address_groups {
        out.push(format!(
            "- {} [{}] depth={} via={} {}",
            group.name, group.scope, group.depth, group.via, group.definition
        ));
    }

    if !report.cycles.is_empty() {
        out.push("cycles".magenta().to_string());
        for cycle in &report.cycles {
            out.push(format!("! {}", cycle.message()).magenta().to_string());
        }
    }

    out.push(format!("redundant ({})", report.redundant.len()).cyan().to_string());
    if report.redundant.is_empty() {
        out.push("- none".to_string());
    }
    for peer in &report.redundant {
        let value = peer
            .value
            .as_ref()
            .map_or_else(|| "(no value)".to_string(), ToString::to_string);
        out.push(format!("- {} [{}] {value}", peer.name, peer.scope).yellow().to_string());
    }

    if let Some(decision) = &report.scope_decision {
        out.push("scope".cyan().to_string());
        out.push(format!("- {} ({})", decision.scope, decision.reason));
        if !decision.affected.is_empty() {
            out.push(format!("  affected: {}", decision.affected.join(", ")));
        }
    }

    if let Some(plan) = &report.cleanup {
        out.push(String::new());
        out.push(render_cleanup_text(plan));
    }

    out.join("\n")
}

fn append_edges(out: &mut Vec<String>, edges: &[ReferenceEdge], verbose: bool) {
    if edges.is_empty() {
        out.push("- none".to_string());
        return;
    }
    for edge in edges {
        let field = edge.field.map_or("", |field| field.keyword());
        let mut line = format!(
            "- {} [{}] {:?} context={} field={field}",
            edge.source, edge.scope, edge.source_type, edge.context
        );
        if let Some(via) = &edge.via {
            line.push_str(&format!(" via={via} depth={}", edge.depth));
        }
        if verbose {
            line.push_str(&format!(" line={}", edge.position));
        }
        out.push(line);
    }
}

/// Render a cleanup plan as commented sections of `set`/`delete` commands.
pub fn render_cleanup_text(plan: &CleanupPlan) -> String {
    let mut out = Vec::new();
    out.push(format!("# cleanup plan for {}", plan.target).bold().to_string());
    out.push(format!("# canonical scope: {} ({})", plan.scope, plan.reason));
    for section in PlanSection::ALL {
        let commands: Vec<_> = plan.commands_in(section).collect();
        if commands.is_empty() {
            continue;
        }
        out.push(format!("# {section}").cyan().to_string());
        append_commands(&mut out, commands);
    }
    if plan.commands.is_empty() {
        out.push("# nothing to do".to_string());
    }
    for note in &plan.notes {
        out.push(format!("# note: {note}").magenta().to_string());
    }
    out.join("\n")
}

fn append_commands<'a>(out: &mut Vec<String>, commands: impl IntoIterator<Item = &'a CleanupCommand>) {
    for command in commands {
        let line = if command.manual_review {
            command.text.yellow().to_string()
        } else {
            match command.kind {
                CommandKind::Delete => command.text.red().to_string(),
                CommandKind::Create | CommandKind::Add => command.text.green().to_string(),
                CommandKind::Replace => command.text.clone(),
            }
        };
        out.push(line);
    }
}

/// Render a copy plan like a cleanup plan, plus its summary.
pub fn render_copy_text(plan: &CopyPlan) -> String {
    let mut out = Vec::new();
    let mode = match plan.mode {
        CopyMode::Add => "add",
        CopyMode::Replace => "replace",
    };
    out.push(format!("# copy {} to {}", plan.source, plan.copy).bold().to_string());
    out.push(format!("# value: {} mode: {mode}", plan.value));
    for section in PlanSection::ALL {
        let commands: Vec<_> = plan.commands_in(section).collect();
        if commands.is_empty() {
            continue;
        }
        let title = match section {
            PlanSection::TargetCreation => "New address".to_string(),
            other => other.to_string(),
        };
        out.push(format!("# {title}").cyan().to_string());
        append_commands(&mut out, commands);
    }
    let summary = &plan.summary;
    out.push(format!(
        "# groups={} security_rules={} nat_rules={} manual_review={}",
        summary.address_groups, summary.security_rules, summary.nat_rules, summary.manual_review
    ));
    for note in &plan.notes {
        out.push(format!("# note: {note}").magenta().to_string());
    }
    out.join("\n")
}

/// Render the group hierarchy pass.
pub fn render_hierarchy_text(report: &HierarchyReport) -> String {
    let mut out = Vec::new();
    out.push(
        format!(
            "address_groups ({}) roots={} max_depth={}",
            report.groups.len(),
            report.roots.len(),
            report.max_depth
        )
        .cyan()
        .to_string(),
    );
    if report.groups.is_empty() {
        out.push("- none".to_string());
    }
    for group in &report.groups {
        let marker = if group.root { " root" } else { "" };
        let mut line = format!("- {} [{}] depth={}{marker}", group.name, group.scope, group.depth);
        if !group.children.is_empty() {
            let children: Vec<&str> = group.children.iter().map(|key| key.name.as_str()).collect();
            line.push_str(&format!(" children={}", children.join(",")));
        }
        out.push(line);
    }

    out.push(format!("cycles ({})", report.cycles.len()).cyan().to_string());
    if report.cycles.is_empty() {
        out.push("- none".to_string());
    }
    for cycle in &report.cycles {
        out.push(format!("! {}", cycle.message()).magenta().to_string());
    }

    out.push(format!("cross_scope ({})", report.cross_scope.len()).cyan().to_string());
    if report.cross_scope.is_empty() {
        out.push("- none".to_string());
    }
    for reference in &report.cross_scope {
        let field = reference.field.map_or("member", |field| field.keyword());
        out.push(
            format!(
                "- {} [{}] {:?} {field} {} defined in {}",
                reference.holder,
                reference.scope,
                reference.holder_type,
                reference.name,
                reference.defined_in.join(", ")
            )
            .yellow()
            .to_string(),
        );
    }
    out.join("\n")
}

/// Render the store-wide redundancy pass.
pub fn render_redundancy_text(report: &RedundancyReport) -> String {
    let mut out = Vec::new();
    out.push(
        format!(
            "redundancy_classes ({}) redundant_objects={}",
            report.classes.len(),
            report.redundant_objects()
        )
        .cyan()
        .to_string(),
    );
    if report.classes.is_empty() {
        out.push("- none".to_string());
    }
    for class in &report.classes {
        out.push(format!("- {}", class.key).bold().to_string());
        for member in &class.members {
            let usage = if member.referenced {
                "referenced".green()
            } else {
                "unused".yellow()
            };
            let value = member
                .value
                .as_ref()
                .map_or_else(|| "(no value)".to_string(), ToString::to_string);
            out.push(format!("  {} [{}] {value} {usage}", member.name, member.scope));
        }
    }
    out.push(String::new());
    out.push(format!("unused_addresses ({})", report.unused.len()).cyan().to_string());
    if report.unused.is_empty() {
        out.push("- none".to_string());
    }
    for key in &report.unused {
        out.push(format!("- {} [{}]", key.name, key.scope));
    }
    out.join("\n")
}

fn append_list(out: &mut Vec<String>, values: &[String]) {
    if values.is_empty() {
        out.push("- none".to_string());
    } else {
        for value in values {
            out.push(format!("- {value}"));
        }
    }
}
