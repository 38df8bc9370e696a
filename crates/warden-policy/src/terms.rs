use serde::{Deserialize, Serialize};

/// The three kinds of identifier in a policy lexicon.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TermKind {
    Action,
    Actor,
    DataClass,
}

impl TermKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TermKind::Action => "action",
            TermKind::Actor => "actor",
            TermKind::DataClass => "data_class",
        }
    }

    /// Name of the numeric attribute this kind carries.
    pub fn attribute_name(self) -> &'static str {
        match self {
            TermKind::Action => "risk_level",
            TermKind::Actor => "trust_level",
            TermKind::DataClass => "sensitivity",
        }
    }
}

/// One lexicon entry. Ids are case-sensitive and matched exactly.
///
/// `level` is the kind-specific 1..=5 attribute: risk_level for actions,
/// trust_level for actors, sensitivity for data classes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Term {
    pub id: String,
    pub description: Option<String>,
    pub level: Option<u8>,
}
