//! Structured job analysis delivered alongside the letter.
//!
//! Two payload shapes exist in the wild. The canonical one is modelled by
//! [`Analysis`]; the older shape is rewritten into it by
//! [`Analysis::from_value`] before deserialization, and every rewrite is
//! logged so the legacy producer can be tracked down and retired.
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Legacy field name and the canonical field it migrates to.
const LEGACY_FIELDS: &[(&str, &str)] = &[
    ("technologies_needed", "required_technologies"),
    ("non_tech_requirements", "non_technical_requirements"),
    ("reference_sites", "reference_websites"),
    ("tool_recommendations", "recommendations"),
    ("project_category", "project_type"),
    ("project_scope", "experience_summary"),
];

/// A free-form analysis value: text, a list, or a category mapping.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Section {
    Text(String),
    List(Vec<String>),
    Grouped(BTreeMap<String, Section>),
    Other(serde_json::Value),
}

impl Section {
    /// Flattens the section into its non-blank text items, in order.
    pub fn items(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_items(&mut out);
        out
    }

    /// Splits the section into labelled groups of items.
    ///
    /// A category mapping yields one group per non-empty category; any other
    /// shape yields a single unlabelled group.
    pub fn groups(&self) -> Vec<(Option<&str>, Vec<&str>)> {
        match self {
            Section::Grouped(groups) => groups
                .iter()
                .map(|(label, section)| (Some(label.as_str()), section.items()))
                .filter(|(_, items)| !items.is_empty())
                .collect(),
            other => {
                let items = other.items();
                if items.is_empty() {
                    Vec::new()
                } else {
                    vec![(None, items)]
                }
            }
        }
    }

    /// True when the section holds no displayable text.
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    fn collect_items<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Section::Text(text) => {
                if !text.trim().is_empty() {
                    out.push(text);
                }
            }
            Section::List(items) => out.extend(
                items
                    .iter()
                    .filter(|item| !item.trim().is_empty())
                    .map(String::as_str),
            ),
            Section::Grouped(groups) => {
                for section in groups.values() {
                    section.collect_items(out);
                }
            }
            Section::Other(_) => {}
        }
    }
}

/// Canonical structured analysis of the client brief.
///
/// Every field tolerates the value shapes producers actually send: a field
/// of the wrong shape, `null` or empty is read as absent instead of failing
/// the whole analysis.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Analysis {
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub main_objective: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub important_point: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub job_summary: Option<String>,
    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub reference_websites: Vec<String>,
    #[serde(default, deserialize_with = "optional_section", skip_serializing_if = "Option::is_none")]
    pub experience_summary: Option<Section>,
    /// Technologies, usually grouped by category.
    #[serde(default, deserialize_with = "optional_section", skip_serializing_if = "Option::is_none")]
    pub required_technologies: Option<Section>,
    /// Tool or plugin recommendations, usually grouped by category.
    #[serde(default, deserialize_with = "optional_section", skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Section>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub non_technical_requirements: Vec<String>,
    #[serde(default, deserialize_with = "optional_section", skip_serializing_if = "Option::is_none")]
    pub technical_questions: Option<Section>,
    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub non_technical_questions: Vec<String>,
    #[serde(default, deserialize_with = "string_list", skip_serializing_if = "Vec::is_empty")]
    pub clarifying_questions: Vec<String>,
    /// Keys this client does not know about, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Analysis {
    /// Builds an analysis from an event payload value.
    ///
    /// A JSON string is parsed first; legacy field names are migrated to the
    /// canonical shape.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut value = match value {
            serde_json::Value::String(raw) => serde_json::from_str(raw)?,
            other => other.clone(),
        };
        let serde_json::Value::Object(map) = &mut value else {
            return Err(serde::de::Error::custom("analysis must be a JSON object"));
        };
        let migrated = migrate_legacy_fields(map);
        if !migrated.is_empty() {
            warn!(fields = ?migrated, "migrated legacy analysis fields to canonical names");
        }
        serde_json::from_value(value)
    }
}

fn migrate_legacy_fields(map: &mut serde_json::Map<String, serde_json::Value>) -> Vec<&'static str> {
    let mut migrated = Vec::new();
    for (legacy, canonical) in LEGACY_FIELDS {
        let Some(value) = map.remove(*legacy) else {
            continue;
        };
        if !map.contains_key(*canonical) {
            map.insert((*canonical).to_string(), value);
        }
        migrated.push(*legacy);
    }
    migrated
}

/// Accepts a list of strings, a single string, or null; drops blank entries
/// and non-string items.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        serde_json::Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// Accepts a string, a number or a list of strings (joined with newlines).
/// Anything else, including blank text, reads as absent.
fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let text = match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };
    Ok((!text.trim().is_empty()).then_some(text))
}

/// Accepts any shape; `null` and sections with no text read as absent.
fn optional_section<'de, D>(deserializer: D) -> Result<Option<Section>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    let section = serde_json::from_value::<Section>(value).map_err(serde::de::Error::custom)?;
    Ok((!section.is_empty()).then_some(section))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_canonical_shape() {
        let analysis = Analysis::from_value(&json!({
            "greeting": "Hello Sam,",
            "experience_summary": "Built ten stores.",
            "required_technologies": {"Frontend": ["React", "Tailwind"]},
            "non_technical_requirements": ["Launch in May", "", null],
            "technical_questions": ["Which payment provider?"],
            "project_type": "new_website"
        }))
        .expect("analysis");

        assert_eq!(analysis.greeting.as_deref(), Some("Hello Sam,"));
        assert_eq!(
            analysis.experience_summary,
            Some(Section::Text("Built ten stores.".into()))
        );
        assert_eq!(
            analysis.required_technologies.expect("technologies").groups(),
            vec![(Some("Frontend"), vec!["React", "Tailwind"])]
        );
        assert_eq!(analysis.non_technical_requirements, vec!["Launch in May"]);
        assert_eq!(analysis.project_type.as_deref(), Some("new_website"));
        assert!(analysis.extra.is_empty());
    }

    #[test]
    fn migrates_legacy_shape() {
        let analysis = Analysis::from_value(&json!({
            "technologies_needed": {"CMS": ["WordPress"]},
            "non_tech_requirements": ["Budget $2k"],
            "reference_sites": ["https://example.com"],
            "tool_recommendations": {"SEO": ["Yoast"]},
            "project_category": "existing_website",
            "suggested_response": "Dear client"
        }))
        .expect("analysis");

        assert_eq!(
            analysis.required_technologies.as_ref().map(Section::items),
            Some(vec!["WordPress"])
        );
        assert_eq!(analysis.non_technical_requirements, vec!["Budget $2k"]);
        assert_eq!(analysis.reference_websites, vec!["https://example.com"]);
        assert_eq!(
            analysis.recommendations.as_ref().map(Section::items),
            Some(vec!["Yoast"])
        );
        assert_eq!(analysis.project_type.as_deref(), Some("existing_website"));
        assert_eq!(analysis.extra["suggested_response"], "Dear client");
    }

    #[test]
    fn canonical_field_wins_over_legacy_duplicate() {
        let analysis = Analysis::from_value(&json!({
            "non_technical_requirements": ["canonical"],
            "non_tech_requirements": ["legacy"]
        }))
        .expect("analysis");
        assert_eq!(analysis.non_technical_requirements, vec!["canonical"]);
        assert!(!analysis.extra.contains_key("non_tech_requirements"));
    }

    #[test]
    fn parses_json_delivered_as_string() {
        let analysis =
            Analysis::from_value(&json!("{\"main_objective\":\"Redesign the shop\"}")).expect("analysis");
        assert_eq!(analysis.main_objective.as_deref(), Some("Redesign the shop"));
    }

    #[test]
    fn rejects_unparseable_string_and_non_objects() {
        assert!(Analysis::from_value(&json!("{not json")).is_err());
        assert!(Analysis::from_value(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn grouped_technical_questions_flatten_in_order() {
        let analysis = Analysis::from_value(&json!({
            "technical_questions": {"Hosting": ["Which host?"], "Payments": "Stripe or PayPal?"}
        }))
        .expect("analysis");
        let questions = analysis.technical_questions.expect("questions");
        assert_eq!(questions.items(), vec!["Which host?", "Stripe or PayPal?"]);
    }

    #[test]
    fn odd_shaped_fields_do_not_discard_the_analysis() {
        let analysis = Analysis::from_value(&json!({
            "greeting": "Hello Sam,",
            "required_technologies": ["React", "Node"],
            "recommendations": null,
            "technical_questions": [],
            "main_objective": ["Migrate the store", "Keep SEO"],
            "job_summary": {"unexpected": true},
            "experience_summary": {}
        }))
        .expect("analysis");

        assert_eq!(analysis.greeting.as_deref(), Some("Hello Sam,"));
        assert_eq!(
            analysis.required_technologies.expect("technologies").groups(),
            vec![(None, vec!["React", "Node"])]
        );
        assert_eq!(analysis.recommendations, None);
        assert_eq!(analysis.technical_questions, None);
        assert_eq!(
            analysis.main_objective.as_deref(),
            Some("Migrate the store\nKeep SEO")
        );
        assert_eq!(analysis.job_summary, None);
        assert_eq!(analysis.experience_summary, None);
    }

    #[test]
    fn empty_list_recommendations_are_absent() {
        let analysis = Analysis::from_value(&json!({
            "client_name": "Sam",
            "recommendations": []
        }))
        .expect("analysis");
        assert_eq!(analysis.client_name.as_deref(), Some("Sam"));
        assert!(analysis.recommendations.is_none());
    }

    #[test]
    fn groups_skip_empty_categories() {
        let section = Section::Grouped(BTreeMap::from([
            ("CMS".to_string(), Section::List(vec!["WordPress".into()])),
            ("Hosting".to_string(), Section::List(Vec::new())),
        ]));
        assert_eq!(section.groups(), vec![(Some("CMS"), vec!["WordPress"])]);
    }
}
