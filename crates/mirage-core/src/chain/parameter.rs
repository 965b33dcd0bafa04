use serde::{Deserialize, Serialize};

/// `data` of a parameter that has not been placed yet.
pub const UNSET_DATA: i64 = -1;
/// Internal index of a NULL value.
pub const NULL_INDEX: i64 = i64::MIN;
/// Index that no generated row ever takes; used for zero-probability
/// equality literals.
pub const ABSENT_INDEX: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Literal that appears in the query text.
    Actual,
    /// Placeholder with no literal in the query, e.g. a derived bound.
    Virtual,
    /// LIKE pattern; the bucket renders as an instantiation of the pattern.
    Like,
    /// Literal compared against a substring of the column.
    Substring,
}

/// A placeholder in a filter predicate that must receive concrete data.
///
/// `data` holds the internal bucket index chosen during bucket placement and
/// `data_value` the rendered literal written back to the query template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: u32,
    #[serde(default = "unset_data")]
    pub data: i64,
    #[serde(default)]
    pub data_value: String,
    #[serde(default = "actual_kind")]
    pub kind: ParameterKind,
    #[serde(default = "can_merge_default")]
    pub can_merge: bool,
}

fn unset_data() -> i64 {
    UNSET_DATA
}

fn actual_kind() -> ParameterKind {
    ParameterKind::Actual
}

fn can_merge_default() -> bool {
    true
}

impl Parameter {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            data: UNSET_DATA,
            data_value: String::new(),
            kind: ParameterKind::Actual,
            can_merge: true,
        }
    }

    pub fn with_kind(id: u32, kind: ParameterKind) -> Self {
        Self {
            kind,
            ..Self::new(id)
        }
    }

    pub fn is_set(&self) -> bool {
        self.data != UNSET_DATA
    }

    /// Whether the parameter stands for a literal written into the query.
    pub fn has_literal(&self) -> bool {
        self.kind != ParameterKind::Virtual
    }
}

/// Handle to a parameter recorded inside a distribution. Distributions do
/// not own parameters; they hand back `id → data` assignments instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRef {
    pub id: u32,
    pub can_merge: bool,
}

impl From<&Parameter> for ParamRef {
    fn from(p: &Parameter) -> Self {
        ParamRef {
            id: p.id,
            can_merge: p.can_merge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_defaults_from_json() {
        let p: Parameter = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(p.id, 7);
        assert_eq!(p.data, UNSET_DATA);
        assert_eq!(p.kind, ParameterKind::Actual);
        assert!(p.can_merge);
        assert!(!p.is_set());
        assert!(p.has_literal());
    }

    #[test]
    fn test_virtual_kind_has_no_literal() {
        let p: Parameter =
            serde_json::from_str(r#"{"id": 4, "kind": "virtual", "is_equal_predicate": true}"#).unwrap();
        assert_eq!(p.kind, ParameterKind::Virtual);
        assert!(!p.has_literal());
    }

    #[test]
    fn test_like_kind_parses() {
        let p: Parameter =
            serde_json::from_str(r#"{"id": 1, "kind": "like", "data_value": "%green%"}"#).unwrap();
        assert_eq!(p.kind, ParameterKind::Like);
        assert_eq!(p.data_value, "%green%");
    }
}
