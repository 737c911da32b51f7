//! Mapping between grouping modes, card fields and group keys.
//!
//! Rendering and persisting both resolve a mode's field through
//! [`GroupingMode::field`], so the group a card is shown in and the field a
//! cross-group move writes are always the same.

use serde::{Deserialize, Serialize};

use super::Card;

/// Reserved group for cards whose grouping field is absent or empty.
pub const UNASSIGNED: &str = "Unassigned";

/// Card field that decides group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Status,
    Category,
    DeliveryDrop,
}

/// Active grouping of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingMode {
    Status,
    Category,
    DeliveryDrop,
}

impl GroupingMode {
    pub fn field(self) -> GroupField {
        match self {
            Self::Status => GroupField::Status,
            Self::Category => GroupField::Category,
            Self::DeliveryDrop => GroupField::DeliveryDrop,
        }
    }

    /// Free-form modes take any value; status has a fixed workflow.
    pub fn is_free_form(self) -> bool {
        !matches!(self, Self::Status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Category => "category",
            Self::DeliveryDrop => "delivery-drop",
        }
    }
}

impl std::str::FromStr for GroupingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "category" => Ok(Self::Category),
            "delivery-drop" | "drop" => Ok(Self::DeliveryDrop),
            other => Err(format!(
                "unknown grouping mode '{other}': use status, category, delivery-drop"
            )),
        }
    }
}

impl std::fmt::Display for GroupingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The group `card` belongs to under `mode`.
///
/// A missing or blank field maps to [`UNASSIGNED`]; the card is never hidden.
pub fn group_key_of(card: &Card, mode: GroupingMode) -> String {
    match card.field(mode.field()) {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => UNASSIGNED.to_string(),
    }
}

/// A partial update to one card: its grouping field and optionally its
/// position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    pub field: GroupField,
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}

impl FieldChanges {
    pub fn apply(&self, card: &mut Card) {
        card.set_field(self.field, self.value.clone());
        if let Some(sort_order) = self.sort_order {
            card.sort_order = sort_order;
        }
    }
}

/// Field update that moves a card into the group `destination` under `mode`.
/// Moving to [`UNASSIGNED`] clears the field.
pub fn field_change_for(mode: GroupingMode, destination: &str) -> FieldChanges {
    let value = if destination == UNASSIGNED {
        None
    } else {
        Some(destination.to_string())
    };
    FieldChanges {
        field: mode.field(),
        value,
        sort_order: None,
    }
}
