//! The classification record and its closed label sets.
//!
//! Every categorical field is a Rust enum, so an unknown label cannot be
//! stored in a [`ClassificationRecord`]. Untyped model output goes through
//! [`ClassificationRecord::from_json`], which is the only way in and reports
//! every problem it finds as one [`SchemaViolation`].
//!
//! Labels are matched case- and accent-insensitively against the English
//! names used for serialization and the Portuguese labels used by the
//! default codebook, so `"Acadêmica"`, `"academica"` and `"Academic"` all
//! parse to [`Classification::Academic`].

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// A candidate record failed validation.
///
/// Carries every issue found so a model can fix all fields in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .issues.join("; "))]
pub struct SchemaViolation {
    /// Individual problems, one per field.
    pub issues: Vec<String>,
}

impl SchemaViolation {
    fn single(issue: impl Into<String>) -> Self {
        Self {
            issues: vec![issue.into()],
        }
    }
}

/// Normalizes a label for comparison: trims, lowercases, folds Portuguese
/// diacritics and collapses `_`, `-` and whitespace runs to one space.
pub(crate) fn fold_label(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.trim().chars() {
        let c = match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
            'é' | 'è' | 'ê' | 'É' | 'È' | 'Ê' => 'e',
            'í' | 'ì' | 'î' | 'Í' | 'Ì' | 'Î' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'Ó' | 'Ò' | 'Ô' | 'Õ' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
            'ç' | 'Ç' => 'c',
            other => other.to_ascii_lowercase(),
        };
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Error returned when a label is not a member of its closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized value `{value}` for `{field}`; expected one of: {expected}")]
pub struct UnknownLabel {
    /// Field the label was meant for.
    pub field: &'static str,
    /// The rejected input.
    pub value: String,
    /// Accepted canonical labels.
    pub expected: String,
}

macro_rules! closed_set {
    (
        $(#[$meta:meta])*
        pub enum $name:ident in $field:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $canonical:literal, $label:literal $(, $alias:literal)*;
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every member, in codebook order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Record field this set belongs to.
            pub const FIELD: &'static str = $field;

            /// Canonical (serialized) name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $canonical,)+
                }
            }

            /// Label used in the default codebook.
            #[must_use]
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }

            /// Parses a canonical name, codebook label or known alias.
            #[must_use]
            pub fn parse(s: &str) -> Option<Self> {
                let folded = fold_label(s);
                if folded.is_empty() {
                    return None;
                }
                $(
                    if folded == fold_label($canonical)
                        || folded == fold_label($label)
                        $(|| folded == fold_label($alias))*
                    {
                        return Some(Self::$variant);
                    }
                )+
                None
            }

            /// Comma-separated canonical names, for error messages.
            #[must_use]
            pub fn expected() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }

            /// Canonical names and codebook labels, for tool schemas.
            #[must_use]
            pub fn schema_values() -> Vec<&'static str> {
                let mut values: Vec<&'static str> = Vec::with_capacity(Self::ALL.len() * 2);
                for v in Self::ALL {
                    values.push(v.as_str());
                    if v.label() != v.as_str() {
                        values.push(v.label());
                    }
                }
                values
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s).ok_or_else(|| UnknownLabel {
                    field: Self::FIELD,
                    value: s.to_string(),
                    expected: Self::expected(),
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(D::Error::custom)
            }
        }
    };
}

closed_set! {
    /// Nature of the work.
    pub enum Classification in "classification" {
        /// Methodological rigor, theoretical grounding, literature review.
        Academic => "Academic", "Acadêmica", "Academico", "Acadêmico";
        /// Execution, operating procedures, practical or management results.
        Technical => "Technical", "Técnica", "Tecnico", "Técnico";
    }
}

closed_set! {
    /// Research approach.
    pub enum Methodology in "methodology" {
        /// Qualitative methods.
        Qualitative => "Qualitative", "Qualitativa";
        /// Quantitative methods.
        Quantitative => "Quantitative", "Quantitativa";
        /// Mixed methods.
        Mixed => "Mixed", "Mista", "Mixed Methods", "Misto";
    }
}

closed_set! {
    /// Policy area the work evaluates.
    pub enum EvaluatedDomain in "evaluated_domain" {
        /// Education.
        Education => "Education", "Educação";
        /// Health.
        Health => "Health", "Saúde";
        /// Environment.
        Environment => "Environment", "Meio Ambiente";
        /// Gender.
        Gender => "Gender", "Gênero";
        /// Race.
        Race => "Race", "Raça";
        /// Poverty.
        Poverty => "Poverty", "Pobreza";
        /// Social development.
        SocialDevelopment => "Social Development", "Desenvolvimento Social";
    }
}

closed_set! {
    /// Stage of the public-policy cycle (Insper/IAS 2019 evidence handbook).
    pub enum CycleStage in "cycle_stage" {
        /// Specifying, measuring and stating the consequences of the problem.
        Definition => "Definition", "Definição e Dimensão", "Definition and Dimension", "Definição";
        /// Awareness, key-actor perception and mobilization effectiveness.
        Mobilization => "Mobilization", "Mobilização";
        /// Identifying and prioritizing modifiable causes.
        DeterminantMapping => "Determinant Mapping", "Mapeamento dos Determinantes", "Mapeamento";
        /// Strategy, change model, hypothesis validity and targets.
        Solution => "Solution", "Solução";
        /// Impact description, cost/benefit valuation, cost-effectiveness.
        Justification => "Justification", "Justificativa";
        /// Monitoring, efficiency, allocative efficacy, implementation validation.
        Improvement => "Improvement", "Aprimoramento";
        /// Final impact and cost estimates, adequacy and resolution.
        Certification => "Certification", "Certificação";
    }
}

/// A Sustainable Development Goal number, always within `1..=17`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SdgGoal(u8);

impl SdgGoal {
    /// Lowest goal number.
    pub const MIN: u8 = 1;
    /// Highest goal number.
    pub const MAX: u8 = 17;

    /// Creates a goal, returning `None` outside `1..=17`.
    #[must_use]
    pub const fn new(n: u8) -> Option<Self> {
        if n >= Self::MIN && n <= Self::MAX {
            Some(Self(n))
        } else {
            None
        }
    }

    /// The goal number.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for SdgGoal {
    type Error = String;

    fn try_from(n: i64) -> Result<Self, Self::Error> {
        u8::try_from(n)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("goal {n} is outside 1..=17"))
    }
}

impl fmt::Display for SdgGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for SdgGoal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = i64::deserialize(deserializer)?;
        Self::try_from(n).map_err(D::Error::custom)
    }
}

/// Structured coding of one research work.
///
/// Immutable once produced; callers persist or discard it as a whole.
/// Fields are read through accessors so a record can only come out of
/// [`ClassificationRecord::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationRecord {
    title: String,
    classification: Classification,
    methodology: Methodology,
    evaluated_domain: EvaluatedDomain,
    cycle_stage: CycleStage,
    goals: Vec<SdgGoal>,
    justification: String,
}

// Canonical key first, then the codebook's Portuguese keys.
const TITLE_KEYS: &[&str] = &["title", "titulo", "título"];
const CLASSIFICATION_KEYS: &[&str] = &["classification", "classificacao", "classificação"];
const METHODOLOGY_KEYS: &[&str] = &["methodology", "metodologia"];
const DOMAIN_KEYS: &[&str] = &["evaluated_domain", "area_avaliada", "área_avaliada", "domain"];
const STAGE_KEYS: &[&str] = &["cycle_stage", "etapa", "stage"];
const GOALS_KEYS: &[&str] = &["goals", "ods", "sdgs"];
const JUSTIFICATION_KEYS: &[&str] = &["justification", "resumo_justificativa", "justificativa"];

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn text_field(
    obj: &Map<String, Value>,
    keys: &[&str],
    issues: &mut Vec<String>,
) -> Option<String> {
    let field = keys[0];
    match lookup(obj, keys) {
        None => {
            issues.push(format!("missing field `{field}`"));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            issues.push(format!("`{field}` must not be blank"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(format!("`{field}` must be a string, got {other}"));
            None
        }
    }
}

fn label_field<T>(obj: &Map<String, Value>, keys: &[&str], issues: &mut Vec<String>) -> Option<T>
where
    T: FromStr<Err = UnknownLabel>,
{
    let field = keys[0];
    match lookup(obj, keys) {
        None => {
            issues.push(format!("missing field `{field}`"));
            None
        }
        Some(Value::String(s)) => match s.parse::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                issues.push(e.to_string());
                None
            }
        },
        Some(Value::Array(_)) => {
            issues.push(format!(
                "`{field}` takes exactly one value; pick the single best fit"
            ));
            None
        }
        Some(other) => {
            issues.push(format!("`{field}` must be a string, got {other}"));
            None
        }
    }
}

/// Parses one goal token such as `3`, `"3"`, `"ODS 3"` or `"SDG 3"`.
fn parse_goal_token(token: &str) -> Result<SdgGoal, String> {
    let folded = fold_label(token);
    let digits = folded
        .trim_start_matches("ods")
        .trim_start_matches("sdg")
        .trim();
    digits
        .parse::<i64>()
        .map_err(|_| format!("`{}` is not a goal number", token.trim()))
        .and_then(SdgGoal::try_from)
}

fn goals_field(obj: &Map<String, Value>, issues: &mut Vec<String>) -> Option<Vec<SdgGoal>> {
    let raw: Vec<Result<SdgGoal, String>> = match lookup(obj, GOALS_KEYS) {
        None => {
            issues.push("missing field `goals`".to_string());
            return None;
        }
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| format!("goal {n} is not an integer"))
                    .and_then(SdgGoal::try_from),
                Value::String(s) => parse_goal_token(s),
                other => Err(format!("goal {other} is not an integer")),
            })
            .collect(),
        Some(Value::String(s)) => s
            .split([';', ','])
            .filter(|t| !t.trim().is_empty())
            .map(parse_goal_token)
            .collect(),
        Some(Value::Number(n)) => vec![
            n.as_i64()
                .ok_or_else(|| format!("goal {n} is not an integer"))
                .and_then(SdgGoal::try_from),
        ],
        Some(other) => {
            issues.push(format!("`goals` must be a list of integers, got {other}"));
            return None;
        }
    };

    let mut goals: Vec<SdgGoal> = Vec::with_capacity(raw.len());
    let before = issues.len();
    for entry in raw {
        match entry {
            Ok(goal) if !goals.contains(&goal) => goals.push(goal),
            Ok(_) => {}
            Err(e) => issues.push(e),
        }
    }
    if issues.len() > before {
        return None;
    }
    if goals.is_empty() {
        issues.push("`goals` must list at least one goal (1..=17)".to_string());
        return None;
    }
    Some(goals)
}

impl ClassificationRecord {
    /// Title of the source work, verbatim.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Academic or technical.
    #[must_use]
    pub const fn classification(&self) -> Classification {
        self.classification
    }

    /// Research approach.
    #[must_use]
    pub const fn methodology(&self) -> Methodology {
        self.methodology
    }

    /// Single best-fit policy area.
    #[must_use]
    pub const fn evaluated_domain(&self) -> EvaluatedDomain {
        self.evaluated_domain
    }

    /// Single best-fit policy-cycle stage.
    #[must_use]
    pub const fn cycle_stage(&self) -> CycleStage {
        self.cycle_stage
    }

    /// Related goals, most relevant first, without duplicates.
    #[must_use]
    pub fn goals(&self) -> &[SdgGoal] {
        &self.goals
    }

    /// Short rationale tying stage and goals to the source text.
    #[must_use]
    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Builds a record from untyped JSON, the validation gate for model output.
    ///
    /// Accepts the object bare or wrapped as `{"output": {...}}`, canonical or
    /// codebook field names, and `goals` as an integer array or a `"1; 5"`
    /// string. Duplicate goals are dropped keeping first occurrence.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaViolation`] listing every missing field, unknown
    /// label and out-of-range goal.
    pub fn from_json(value: &Value) -> Result<Self, SchemaViolation> {
        let obj = match value {
            Value::Object(obj) => match obj.get("output") {
                Some(Value::Object(inner)) if obj.len() == 1 => inner,
                _ => obj,
            },
            other => {
                return Err(SchemaViolation::single(format!(
                    "expected a JSON object, got {other}"
                )));
            }
        };

        let mut issues = Vec::new();
        let title = text_field(obj, TITLE_KEYS, &mut issues);
        let classification = label_field::<Classification>(obj, CLASSIFICATION_KEYS, &mut issues);
        let methodology = label_field::<Methodology>(obj, METHODOLOGY_KEYS, &mut issues);
        let evaluated_domain = label_field::<EvaluatedDomain>(obj, DOMAIN_KEYS, &mut issues);
        let cycle_stage = label_field::<CycleStage>(obj, STAGE_KEYS, &mut issues);
        let goals = goals_field(obj, &mut issues);
        let justification = text_field(obj, JUSTIFICATION_KEYS, &mut issues);

        match (
            title,
            classification,
            methodology,
            evaluated_domain,
            cycle_stage,
            goals,
            justification,
        ) {
            (
                Some(title),
                Some(classification),
                Some(methodology),
                Some(evaluated_domain),
                Some(cycle_stage),
                Some(goals),
                Some(justification),
            ) if issues.is_empty() => Ok(Self {
                title,
                classification,
                methodology,
                evaluated_domain,
                cycle_stage,
                goals,
                justification,
            }),
            _ => Err(SchemaViolation { issues }),
        }
    }

    /// Parses a record from a JSON string through the same gate.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaViolation`] for malformed JSON or invalid content.
    pub fn from_json_str(s: &str) -> Result<Self, SchemaViolation> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| SchemaViolation::single(format!("invalid JSON: {e}")))?;
        Self::from_json(&value)
    }

    /// Checks the invariants a typed record cannot express on its own.
    ///
    /// Pure: validating an already valid record always succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaViolation`] for blank text, empty or duplicated goals.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        let mut issues = Vec::new();
        if self.title.trim().is_empty() {
            issues.push("`title` must not be blank".to_string());
        }
        if self.justification.trim().is_empty() {
            issues.push("`justification` must not be blank".to_string());
        }
        if self.goals.is_empty() {
            issues.push("`goals` must list at least one goal (1..=17)".to_string());
        }
        for (i, goal) in self.goals.iter().enumerate() {
            if self.goals[..i].contains(goal) {
                issues.push(format!("goal {goal} is listed more than once"));
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation { issues })
        }
    }

    /// Goals in the codebook's `"1; 5; 10"` form.
    #[must_use]
    pub fn goals_display(&self) -> String {
        self.goals
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl<'de> Deserialize<'de> for ClassificationRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    fn valid_json() -> Value {
        json!({
            "title": "Merenda escolar e pobreza",
            "classification": "Academic",
            "methodology": "Qualitative",
            "evaluated_domain": "Poverty",
            "cycle_stage": "Definition",
            "goals": [1, 4],
            "justification": "Dimensiona o problema da fome escolar; ODS 1 e 4."
        })
    }

    #[test_case("Acadêmica", Classification::Academic ; "codebook label")]
    #[test_case("academica", Classification::Academic ; "unaccented")]
    #[test_case("ACADEMIC", Classification::Academic ; "canonical upper")]
    #[test_case("Técnica", Classification::Technical ; "technical label")]
    #[test_case(" tecnico ", Classification::Technical ; "alias padded")]
    fn test_classification_parse(input: &str, expected: Classification) {
        assert_eq!(Classification::parse(input), Some(expected));
    }

    #[test_case("Definição e Dimensão", CycleStage::Definition)]
    #[test_case("mapeamento_dos_determinantes", CycleStage::DeterminantMapping)]
    #[test_case("Determinant-Mapping", CycleStage::DeterminantMapping)]
    #[test_case("Certificação", CycleStage::Certification)]
    #[test_case("aprimoramento", CycleStage::Improvement)]
    fn test_stage_parse(input: &str, expected: CycleStage) {
        assert_eq!(CycleStage::parse(input), Some(expected));
    }

    #[test_case("Meio Ambiente", EvaluatedDomain::Environment)]
    #[test_case("desenvolvimento social", EvaluatedDomain::SocialDevelopment)]
    #[test_case("Raça", EvaluatedDomain::Race)]
    #[test_case("Saude", EvaluatedDomain::Health)]
    fn test_domain_parse(input: &str, expected: EvaluatedDomain) {
        assert_eq!(EvaluatedDomain::parse(input), Some(expected));
    }

    #[test]
    fn test_unknown_label_rejected() {
        assert_eq!(Classification::parse("Hybrid"), None);
        assert_eq!(Methodology::parse(""), None);
        let err = "Hybrid".parse::<Classification>().unwrap_err();
        assert_eq!(err.field, "classification");
        assert!(err.to_string().contains("Academic, Technical"));
    }

    #[test]
    fn test_closed_set_sizes() {
        assert_eq!(Classification::ALL.len(), 2);
        assert_eq!(Methodology::ALL.len(), 3);
        assert_eq!(EvaluatedDomain::ALL.len(), 7);
        assert_eq!(CycleStage::ALL.len(), 7);
    }

    #[test]
    fn test_every_label_round_trips() {
        for v in CycleStage::ALL {
            assert_eq!(CycleStage::parse(v.as_str()), Some(*v));
            assert_eq!(CycleStage::parse(v.label()), Some(*v));
        }
        for v in EvaluatedDomain::ALL {
            assert_eq!(EvaluatedDomain::parse(v.label()), Some(*v));
        }
    }

    #[test]
    fn test_from_json_valid() {
        let record = ClassificationRecord::from_json(&valid_json())
            .unwrap_or_else(|e| panic!("expected valid record: {e}"));
        assert_eq!(record.classification(), Classification::Academic);
        assert_eq!(record.evaluated_domain(), EvaluatedDomain::Poverty);
        assert_eq!(record.goals_display(), "1; 4");
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_from_json_codebook_keys_and_goal_string() {
        let value = json!({
            "output": {
                "titulo": "Avaliação do Bolsa Família",
                "classificacao": "Técnica",
                "metodologia": "Mista",
                "area_avaliada": "Pobreza",
                "etapa": "Justificativa",
                "ods": "1; 10; 1",
                "resumo_justificativa": "Valoração de custo-efetividade."
            }
        });
        let record = ClassificationRecord::from_json(&value)
            .unwrap_or_else(|e| panic!("expected valid record: {e}"));
        assert_eq!(record.classification(), Classification::Technical);
        assert_eq!(record.methodology(), Methodology::Mixed);
        assert_eq!(record.cycle_stage(), CycleStage::Justification);
        let goals: Vec<u8> = record.goals().iter().map(|g| g.get()).collect();
        assert_eq!(goals, vec![1, 10]);
    }

    #[test]
    fn test_hybrid_classification_is_violation() {
        let mut value = valid_json();
        value["classification"] = json!("Hybrid");
        let err = ClassificationRecord::from_json(&value).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.issues[0].contains("`Hybrid`"));
        assert!(err.issues[0].contains("classification"));
    }

    #[test]
    fn test_collects_all_issues() {
        let value = json!({
            "title": "  ",
            "classification": "Academic",
            "methodology": ["Qualitative", "Quantitative"],
            "cycle_stage": "Evaluation",
            "goals": [0, 4, 18],
            "justification": "ok"
        });
        let err = ClassificationRecord::from_json(&value).unwrap_err();
        let joined = err.to_string();
        assert!(joined.contains("`title` must not be blank"));
        assert!(joined.contains("exactly one value"));
        assert!(joined.contains("missing field `evaluated_domain`"));
        assert!(joined.contains("`Evaluation`"));
        assert!(joined.contains("goal 0 is outside"));
        assert!(joined.contains("goal 18 is outside"));
    }

    #[test]
    fn test_empty_goals_rejected() {
        let mut value = valid_json();
        value["goals"] = json!([]);
        assert!(ClassificationRecord::from_json(&value).is_err());
        value["goals"] = json!("");
        assert!(ClassificationRecord::from_json(&value).is_err());
    }

    #[test]
    fn test_goal_tokens() {
        assert_eq!(parse_goal_token("ODS 3").map(SdgGoal::get), Ok(3));
        assert_eq!(parse_goal_token("sdg-16").map(SdgGoal::get), Ok(16));
        assert!(parse_goal_token("three").is_err());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(ClassificationRecord::from_json(&json!([1, 2])).is_err());
        assert!(ClassificationRecord::from_json_str("not json").is_err());
    }

    #[test]
    fn test_serializes_canonical_labels() {
        let record = ClassificationRecord::from_json(&json!({
            "titulo": "T",
            "classificacao": "Acadêmica",
            "metodologia": "Qualitativa",
            "area_avaliada": "Desenvolvimento Social",
            "etapa": "Mapeamento dos Determinantes",
            "ods": [10],
            "resumo_justificativa": "J"
        }))
        .unwrap_or_else(|e| panic!("expected valid record: {e}"));
        let out = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(out["evaluated_domain"], "Social Development");
        assert_eq!(out["cycle_stage"], "Determinant Mapping");
        assert_eq!(out["goals"], json!([10]));
    }

    #[test]
    fn test_deserialize_goes_through_gate() {
        let ok: Result<ClassificationRecord, _> = serde_json::from_value(valid_json());
        assert!(ok.is_ok());

        let mut bad = valid_json();
        bad["goals"] = json!([42]);
        let err: Result<ClassificationRecord, _> = serde_json::from_value(bad);
        assert!(err.is_err());
    }

    #[test]
    fn test_title_kept_verbatim() {
        let mut value = valid_json();
        value["title"] = json!("  Merenda escolar: um estudo  ");
        let record = ClassificationRecord::from_json(&value)
            .unwrap_or_else(|e| panic!("expected valid record: {e}"));
        assert_eq!(record.title(), "  Merenda escolar: um estudo  ");
    }

    proptest! {
        #[test]
        fn prop_goal_range(n in -100i64..100) {
            let goal = SdgGoal::try_from(n);
            prop_assert_eq!(goal.is_ok(), (1..=17).contains(&n));
        }

        #[test]
        fn prop_valid_records_revalidate(goals in proptest::collection::vec(1u8..=17, 1..6)) {
            let mut value = valid_json();
            value["goals"] = json!(goals);
            let record = ClassificationRecord::from_json(&value);
            prop_assert!(record.is_ok());
            let record = record.unwrap_or_else(|e| panic!("{e}"));
            prop_assert!(record.validate().is_ok());
            prop_assert!(record.validate().is_ok());
            let reparsed = ClassificationRecord::from_json(
                &serde_json::to_value(&record).unwrap_or_default(),
            );
            prop_assert_eq!(reparsed.ok(), Some(record));
        }
    }
}
