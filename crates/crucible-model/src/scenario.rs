//! Decision scenarios
//!
//! A [`Scenario`] puts an agent in a situation where the governed choice is
//! costly. Scenarios are validated once, at construction, and never change
//! afterwards: all fields are private and there are no setters.
//! Deserialization goes through [`ScenarioDraft`] so a scenario read from
//! disk is validated exactly like one built in code.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Contextual stressor attached to a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pressure {
    /// Deadlines, emergencies, closing windows
    Time,
    /// Hours of work that would be "wasted"
    SunkCost,
    /// A senior person says to skip it
    Authority,
    /// Money, jobs, company survival
    Economic,
    /// End of day, already tired
    Exhaustion,
    /// Looking dogmatic or inflexible
    Social,
    /// "Being pragmatic, not dogmatic"
    Pragmatic,
}

impl Pressure {
    /// Every pressure, in declaration order
    pub const ALL: [Pressure; 7] = [
        Pressure::Time,
        Pressure::SunkCost,
        Pressure::Authority,
        Pressure::Economic,
        Pressure::Exhaustion,
        Pressure::Social,
        Pressure::Pragmatic,
    ];

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Pressure::Time => "time",
            Pressure::SunkCost => "sunk_cost",
            Pressure::Authority => "authority",
            Pressure::Economic => "economic",
            Pressure::Exhaustion => "exhaustion",
            Pressure::Social => "social",
            Pressure::Pragmatic => "pragmatic",
        }
    }

    /// Description trigger phrase used when a document is extended to cover
    /// situations carrying this pressure
    #[must_use]
    pub fn trigger_phrase(self) -> &'static str {
        match self {
            Pressure::Time => "when a deadline makes skipping the rule tempting",
            Pressure::SunkCost => "when work already done would have to be discarded",
            Pressure::Authority => "when someone senior asks for an exception",
            Pressure::Economic => "when money or jobs seem to depend on cutting the corner",
            Pressure::Exhaustion => "when you are tired and want to be done",
            Pressure::Social => "when following the rule looks inflexible to others",
            Pressure::Pragmatic => "when deviating is framed as being pragmatic",
        }
    }
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authored scenario identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(String);

impl ScenarioId {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One labelled choice offered to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOption {
    pub label: String,
    pub text: String,
}

impl ScenarioOption {
    #[inline]
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Unvalidated scenario, as authored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDraft {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub pressure_set: BTreeSet<Pressure>,
    pub options: Vec<ScenarioOption>,
    pub compliant_option: String,
}

/// A validated, immutable decision scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScenarioDraft")]
pub struct Scenario {
    id: ScenarioId,
    description: String,
    pressure_set: BTreeSet<Pressure>,
    options: Vec<ScenarioOption>,
    compliant_option: String,
}

impl Scenario {
    /// Validate and build a scenario
    ///
    /// # Errors
    /// `ModelError::InvalidScenario` when the id is blank, there are fewer
    /// than two options, labels are blank or repeated, or the compliant
    /// label names no option.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        pressure_set: impl IntoIterator<Item = Pressure>,
        options: Vec<ScenarioOption>,
        compliant_option: impl Into<String>,
    ) -> Result<Self, ModelError> {
        ScenarioDraft {
            id: id.into(),
            description: description.into(),
            pressure_set: pressure_set.into_iter().collect(),
            options,
            compliant_option: compliant_option.into(),
        }
        .try_into()
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &ScenarioId {
        &self.id
    }

    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    #[must_use]
    pub fn pressures(&self) -> &BTreeSet<Pressure> {
        &self.pressure_set
    }

    #[inline]
    #[must_use]
    pub fn pressure_count(&self) -> usize {
        self.pressure_set.len()
    }

    #[inline]
    #[must_use]
    pub fn options(&self) -> &[ScenarioOption] {
        &self.options
    }

    /// Label of the option the governing document should induce
    #[inline]
    #[must_use]
    pub fn compliant_label(&self) -> &str {
        &self.compliant_option
    }

    /// Look up an option by label, ignoring case
    #[must_use]
    pub fn option(&self, label: &str) -> Option<&ScenarioOption> {
        self.options
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(label.trim()))
    }

    #[inline]
    #[must_use]
    pub fn is_compliant(&self, label: &str) -> bool {
        self.compliant_option.eq_ignore_ascii_case(label.trim())
    }

    /// Text handed to the agent for this scenario
    #[must_use]
    pub fn render_prompt(&self) -> String {
        let mut out = String::with_capacity(self.description.len() + 64 * self.options.len());
        out.push_str(self.description.trim());
        out.push_str("\n\nOptions:\n");
        for option in &self.options {
            out.push_str(&format!("{}) {}\n", option.label, option.text.trim()));
        }
        let labels: Vec<&str> = self.options.iter().map(|o| o.label.as_str()).collect();
        out.push_str(&format!(
            "\nChoose one option ({}) and explain your choice.",
            labels.join(", ")
        ));
        out
    }
}

impl TryFrom<ScenarioDraft> for Scenario {
    type Error = ModelError;

    fn try_from(draft: ScenarioDraft) -> Result<Self, Self::Error> {
        let id = draft.id.trim().to_string();
        if id.is_empty() {
            return Err(ModelError::invalid_scenario("<blank>", "scenario id is blank"));
        }
        if draft.options.len() < 2 {
            return Err(ModelError::invalid_scenario(
                &id,
                format!("needs at least two options, got {}", draft.options.len()),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut options = Vec::with_capacity(draft.options.len());
        for option in draft.options {
            let label = option.label.trim().to_string();
            if label.is_empty() {
                return Err(ModelError::invalid_scenario(&id, "option label is blank"));
            }
            if !seen.insert(label.to_ascii_lowercase()) {
                return Err(ModelError::invalid_scenario(
                    &id,
                    format!("option label {label} is repeated"),
                ));
            }
            options.push(ScenarioOption::new(label, option.text));
        }

        let compliant = draft.compliant_option.trim();
        let Some(compliant) = options
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(compliant))
            .map(|o| o.label.clone())
        else {
            return Err(ModelError::invalid_scenario(
                &id,
                format!("compliant option {:?} is not one of the options", draft.compliant_option),
            ));
        };

        Ok(Self {
            id: ScenarioId(id),
            description: draft.description,
            pressure_set: draft.pressure_set,
            options,
            compliant_option: compliant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Vec<ScenarioOption> {
        vec![
            ScenarioOption::new("A", "Delete the code and write the test first"),
            ScenarioOption::new("B", "Commit now, add tests tomorrow"),
            ScenarioOption::new("C", "Write tests after the fact"),
        ]
    }

    #[test]
    fn valid_scenario_builds() {
        let s = Scenario::new(
            "sunk-cost-1",
            "You spent four hours on untested code.",
            [Pressure::SunkCost, Pressure::Exhaustion],
            abc(),
            "a",
        )
        .unwrap();
        assert_eq!(s.compliant_label(), "A");
        assert_eq!(s.pressure_count(), 2);
        assert!(s.is_compliant("A"));
        assert!(!s.is_compliant("C"));
        assert_eq!(s.option("b").map(|o| o.label.as_str()), Some("B"));
    }

    #[test]
    fn rejects_single_option() {
        let err = Scenario::new(
            "one",
            "desc",
            [Pressure::Time],
            vec![ScenarioOption::new("A", "only")],
            "A",
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidScenario { .. }));
    }

    #[test]
    fn rejects_missing_compliant_reference() {
        let err = Scenario::new("x", "desc", [Pressure::Time], abc(), "D").unwrap_err();
        assert!(err.to_string().contains("not one of the options"));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let mut options = abc();
        options.push(ScenarioOption::new("a", "again"));
        let err = Scenario::new("x", "desc", [Pressure::Time], options, "A").unwrap_err();
        assert!(err.to_string().contains("repeated"));
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{
            "id": "bad",
            "description": "d",
            "pressure_set": ["time"],
            "options": [{"label": "A", "text": "x"}],
            "compliant_option": "A"
        }"#;
        assert!(serde_json::from_str::<Scenario>(json).is_err());

        let json = r#"{
            "id": "good",
            "description": "d",
            "pressure_set": ["time", "sunk_cost"],
            "options": [{"label": "A", "text": "x"}, {"label": "B", "text": "y"}],
            "compliant_option": "A"
        }"#;
        let s: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(s.pressure_count(), 2);
    }

    #[test]
    fn prompt_lists_every_option() {
        let s = Scenario::new("p", "It is 6pm.", [Pressure::Time], abc(), "A").unwrap();
        let prompt = s.render_prompt();
        assert!(prompt.contains("A) Delete the code"));
        assert!(prompt.contains("C) Write tests after"));
        assert!(prompt.ends_with("(A, B, C) and explain your choice."));
    }
}
