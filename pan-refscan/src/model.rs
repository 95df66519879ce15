//! Entities extracted from Panorama / PAN-OS configuration exports.
//!
//! Both input dialects are lowered into [`EntityRecord`]s; the store folds
//! records into the entity types defined here. Names are scoped: `web` in
//! `shared` and `web` in device-group `DG1` are different objects.
//!
//! ## Rule text
//!
//! Rules keep their serialized fragments (`source [ a b ]`,
//! `destination-translation translated-address x`, ...) alongside the parsed
//! member lists. Reference lookups classify each occurrence by walking that
//! text with [`field_values`], so set-lines and markup exports share one
//! classification path.

use std::fmt::{self, Display, Formatter};

use panconf_core::{quote_token, tokenize, Token};
use serde::{Deserialize, Serialize, Serializer};

/// Where an object or rule lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Shared,
    DeviceGroup(String),
}

impl Scope {
    pub fn device_group(name: impl Into<String>) -> Self {
        Scope::DeviceGroup(name.into())
    }

    pub fn device_group_name(&self) -> Option<&str> {
        match self {
            Scope::Shared => None,
            Scope::DeviceGroup(name) => Some(name),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Scope::Shared)
    }

    /// Scope as written in a `set` command: `shared` or `device-group <name>`.
    pub fn command_prefix(&self) -> String {
        match self {
            Scope::Shared => "shared".to_string(),
            Scope::DeviceGroup(name) => format!("device-group {}", quote_token(name)),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Shared => write!(f, "shared"),
            Scope::DeviceGroup(name) => write!(f, "device-group:{name}"),
        }
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The single value an address object resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum AddressValue {
    IpNetmask(String),
    IpRange(String),
    Fqdn(String),
}

impl AddressValue {
    /// Build a value from its attribute keyword, e.g. `ip-netmask`.
    pub fn from_attribute(attribute: &str, value: &str) -> Option<Self> {
        let value = value.trim().to_string();
        match attribute {
            "ip-netmask" => Some(AddressValue::IpNetmask(value)),
            "ip-range" => Some(AddressValue::IpRange(value)),
            "fqdn" => Some(AddressValue::Fqdn(value)),
            _ => None,
        }
    }

    pub fn attribute(&self) -> &'static str {
        match self {
            AddressValue::IpNetmask(_) => "ip-netmask",
            AddressValue::IpRange(_) => "ip-range",
            AddressValue::Fqdn(_) => "fqdn",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            AddressValue::IpNetmask(value)
            | AddressValue::IpRange(value)
            | AddressValue::Fqdn(value) => value,
        }
    }
}

impl Display for AddressValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.attribute(), self.text())
    }
}

/// Identity of an address object or group: its name within a scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObjectKey {
    pub scope: Scope,
    pub name: String,
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.scope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressObject {
    pub name: String,
    pub scope: Scope,
    /// `None` when only description or tag statements were seen.
    pub value: Option<AddressValue>,
    pub description: Option<String>,
    /// Line of the first statement or entry defining the object.
    pub position: usize,
}

impl AddressObject {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            scope: self.scope.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressGroup {
    pub name: String,
    pub scope: Scope,
    /// Static members in first-seen order. Forward references are legal.
    pub members: Vec<String>,
    /// Dynamic filter expression, kept opaque.
    pub dynamic_filter: Option<String>,
    pub description: Option<String>,
    pub position: usize,
}

impl AddressGroup {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            scope: self.scope.clone(),
            name: self.name.clone(),
        }
    }

    pub fn names_member(&self, name: &str) -> bool {
        self.members.iter().any(|member| member == name)
    }

    /// Human-readable definition, e.g. `static [ a b ]`.
    pub fn definition(&self) -> String {
        let mut parts = Vec::new();
        if !self.members.is_empty() {
            let members: Vec<String> = self.members.iter().map(|m| quote_token(m)).collect();
            parts.push(format!("static [ {} ]", members.join(" ")));
        }
        if let Some(filter) = &self.dynamic_filter {
            parts.push(format!("dynamic filter {}", quote_token(filter)));
        }
        if parts.is_empty() {
            "(empty)".to_string()
        } else {
            parts.join("; ")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    Security,
    Nat,
}

impl RuleKind {
    /// Keyword used in rulebase paths (`security rules`, `nat rules`).
    pub fn keyword(self) -> &'static str {
        match self {
            RuleKind::Security => "security",
            RuleKind::Nat => "nat",
        }
    }
}

impl Display for RuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Security => write!(f, "security rule"),
            RuleKind::Nat => write!(f, "NAT rule"),
        }
    }
}

/// Direction of a reference inside a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldContext {
    Source,
    Destination,
    Service,
    Unknown,
}

impl Display for FieldContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldContext::Source => "source",
            FieldContext::Destination => "destination",
            FieldContext::Service => "service",
            FieldContext::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Rule attribute a value was found under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleField {
    From,
    To,
    Source,
    Destination,
    Service,
    Application,
    SourceTranslation,
    DestinationTranslation,
    /// Any other recognised attribute (action, description, tag, ...).
    Other,
    /// A value seen before any attribute keyword.
    Unscoped,
}

const OTHER_KEYWORDS: &[&str] = &[
    "action",
    "active-active-device-binding",
    "category",
    "description",
    "destination-hip",
    "disabled",
    "group-tag",
    "hip-profiles",
    "icmp-unreachable",
    "log-end",
    "log-setting",
    "log-start",
    "nat-type",
    "negate-destination",
    "negate-source",
    "option",
    "profile-setting",
    "qos",
    "rule-type",
    "schedule",
    "source-hip",
    "source-user",
    "tag",
    "target",
    "to-interface",
    "uuid",
];

const TRANSLATION_KEYWORDS: &[&str] = &[
    "bi-directional",
    "distribution",
    "dynamic-destination-translation",
    "dynamic-ip",
    "dynamic-ip-and-port",
    "fallback",
    "floating-ip",
    "interface",
    "interface-address",
    "ip",
    "static-ip",
    "translated-address",
    "translated-port",
];

impl RuleField {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let field = match word {
            "from" => RuleField::From,
            "to" => RuleField::To,
            "source" => RuleField::Source,
            "destination" => RuleField::Destination,
            "service" => RuleField::Service,
            "application" => RuleField::Application,
            "source-translation" => RuleField::SourceTranslation,
            "destination-translation" => RuleField::DestinationTranslation,
            other if OTHER_KEYWORDS.contains(&other) => RuleField::Other,
            _ => return None,
        };
        Some(field)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            RuleField::From => "from",
            RuleField::To => "to",
            RuleField::Source => "source",
            RuleField::Destination => "destination",
            RuleField::Service => "service",
            RuleField::Application => "application",
            RuleField::SourceTranslation => "source-translation",
            RuleField::DestinationTranslation => "destination-translation",
            RuleField::Other => "other",
            RuleField::Unscoped => "unscoped",
        }
    }

    pub fn is_translation(self) -> bool {
        matches!(
            self,
            RuleField::SourceTranslation | RuleField::DestinationTranslation
        )
    }

    /// Reference context for fields that can name address objects.
    pub fn address_context(self) -> Option<FieldContext> {
        match self {
            RuleField::Source | RuleField::SourceTranslation => Some(FieldContext::Source),
            RuleField::Destination | RuleField::DestinationTranslation => {
                Some(FieldContext::Destination)
            }
            RuleField::Service => Some(FieldContext::Service),
            RuleField::Unscoped => Some(FieldContext::Unknown),
            RuleField::From | RuleField::To | RuleField::Application | RuleField::Other => None,
        }
    }
}

/// Walk serialized rule text and attribute every value to its field.
///
/// Inside NAT translation blocks only the values following
/// `translated-address` are reported; ports, interfaces and flags are not
/// object names.
pub fn field_values(text: &str) -> Vec<(RuleField, String)> {
    let mut out = Vec::new();
    let mut field = RuleField::Unscoped;
    let mut collecting = true;

    for token in tokenize(text) {
        if let Token::Word(word) = &token {
            if let Some(next) = RuleField::from_keyword(word) {
                field = next;
                collecting = !field.is_translation();
                continue;
            }
            if field.is_translation() && TRANSLATION_KEYWORDS.contains(&word.as_str()) {
                collecting = word == "translated-address";
                continue;
            }
        }
        if collecting {
            out.extend(
                token
                    .values()
                    .into_iter()
                    .map(|value| (field, value.to_string())),
            );
        }
    }
    out
}

/// One serialized fragment of a rule with its source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleLine {
    pub position: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RuleKey {
    pub kind: RuleKind,
    pub scope: Scope,
    pub name: String,
}

/// A security or NAT rule assembled from one or more fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub name: String,
    pub kind: RuleKind,
    pub scope: Scope,
    /// `pre-rulebase`, `post-rulebase` or `rulebase`, when the input said so.
    pub rulebase: Option<String>,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub source: Vec<String>,
    pub destination: Vec<String>,
    pub service: Vec<String>,
    pub application: Vec<String>,
    pub source_translation: Vec<String>,
    pub destination_translation: Vec<String>,
    pub position: usize,
    pub lines: Vec<RuleLine>,
}

impl Rule {
    pub fn new(
        kind: RuleKind,
        scope: Scope,
        rulebase: Option<String>,
        name: impl Into<String>,
        position: usize,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            scope,
            rulebase,
            from: Vec::new(),
            to: Vec::new(),
            source: Vec::new(),
            destination: Vec::new(),
            service: Vec::new(),
            application: Vec::new(),
            source_translation: Vec::new(),
            destination_translation: Vec::new(),
            position,
            lines: Vec::new(),
        }
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            kind: self.kind,
            scope: self.scope.clone(),
            name: self.name.clone(),
        }
    }

    pub fn device_group(&self) -> Option<&str> {
        self.scope.device_group_name()
    }

    /// Fold one serialized fragment into the rule. Member lists accumulate.
    pub fn absorb(&mut self, text: &str, position: usize) {
        for (field, value) in field_values(text) {
            if let Some(list) = self.members_mut(field) {
                if !list.contains(&value) {
                    list.push(value);
                }
            }
        }
        self.lines.push(RuleLine {
            position,
            text: text.to_string(),
        });
    }

    pub fn members(&self, field: RuleField) -> &[String] {
        match field {
            RuleField::From => &self.from,
            RuleField::To => &self.to,
            RuleField::Source => &self.source,
            RuleField::Destination => &self.destination,
            RuleField::Service => &self.service,
            RuleField::Application => &self.application,
            RuleField::SourceTranslation => &self.source_translation,
            RuleField::DestinationTranslation => &self.destination_translation,
            RuleField::Other | RuleField::Unscoped => &[],
        }
    }

    fn members_mut(&mut self, field: RuleField) -> Option<&mut Vec<String>> {
        match field {
            RuleField::From => Some(&mut self.from),
            RuleField::To => Some(&mut self.to),
            RuleField::Source => Some(&mut self.source),
            RuleField::Destination => Some(&mut self.destination),
            RuleField::Service => Some(&mut self.service),
            RuleField::Application => Some(&mut self.application),
            RuleField::SourceTranslation => Some(&mut self.source_translation),
            RuleField::DestinationTranslation => Some(&mut self.destination_translation),
            RuleField::Other | RuleField::Unscoped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressAttr {
    Value(AddressValue),
    Description(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupAttr {
    Static(Vec<String>),
    Dynamic(String),
    Description(String),
}

/// Uniform output of both ingestion dialects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRecord {
    DeviceGroup {
        name: String,
        position: usize,
    },
    Address {
        scope: Scope,
        name: String,
        attr: AddressAttr,
        position: usize,
    },
    AddressGroup {
        scope: Scope,
        name: String,
        attr: GroupAttr,
        position: usize,
    },
    RuleFragment {
        kind: RuleKind,
        scope: Scope,
        rulebase: Option<String>,
        name: String,
        text: String,
        position: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::{field_values, Rule, RuleField, RuleKind, Scope};

    #[test]
    fn field_values_tracks_nearest_keyword() {
        let values = field_values("from trust to untrust source [ a b ] destination c action allow");
        assert!(values.contains(&(RuleField::Source, "a".to_string())));
        assert!(values.contains(&(RuleField::Source, "b".to_string())));
        assert!(values.contains(&(RuleField::Destination, "c".to_string())));
        assert!(values.contains(&(RuleField::From, "trust".to_string())));
        assert!(values.contains(&(RuleField::Other, "allow".to_string())));
    }

    #[test]
    fn values_before_any_keyword_are_unscoped() {
        let values = field_values("web");
        assert_eq!(values, vec![(RuleField::Unscoped, "web".to_string())]);
    }

    #[test]
    fn translation_blocks_only_yield_translated_addresses() {
        let values = field_values(
            "source-translation dynamic-ip-and-port translated-address [ pool1 pool2 ] \
             destination-translation translated-address srv translated-port 8080",
        );
        assert_eq!(
            values,
            vec![
                (RuleField::SourceTranslation, "pool1".to_string()),
                (RuleField::SourceTranslation, "pool2".to_string()),
                (RuleField::DestinationTranslation, "srv".to_string()),
            ]
        );
    }

    #[test]
    fn absorb_accumulates_members_across_fragments() {
        let mut rule = Rule::new(RuleKind::Security, Scope::device_group("DG1"), None, "R1", 3);
        rule.absorb("source [ a b ]", 3);
        rule.absorb("source [ b c ]", 7);
        rule.absorb("destination any", 8);

        assert_eq!(rule.source, vec!["a", "b", "c"]);
        assert_eq!(rule.destination, vec!["any"]);
        assert_eq!(rule.lines.len(), 3);
        assert_eq!(rule.device_group(), Some("DG1"));
    }

    #[test]
    fn scope_renders_for_reports_and_commands() {
        let scope = Scope::device_group("Branch Offices");
        assert_eq!(scope.to_string(), "device-group:Branch Offices");
        assert_eq!(scope.command_prefix(), "device-group \"Branch Offices\"");
        assert_eq!(Scope::Shared.command_prefix(), "shared");
    }
}
