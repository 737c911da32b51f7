use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board::GroupCatalog;

/// `.rangeboard/config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    pub board: BoardSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    pub name: String,
    pub next_card_id: u32,
    /// Season the boards are scoped to. None = every season.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(default)]
    pub cross_group_placement: CrossGroupPlacement,
    /// Range categories that always render, in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Delivery drops that always render, in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drops: Vec<String>,
    /// When the board was created (ISO-8601 string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl BoardConfig {
    /// Generate the next card ID and increment the counter.
    pub fn next_card_id(&mut self) -> String {
        let n = self.board.next_card_id;
        self.board.next_card_id += 1;
        n.to_string()
    }

    pub fn catalog(&self) -> GroupCatalog {
        GroupCatalog {
            categories: self.board.categories.clone(),
            drops: self.board.drops.clone(),
        }
    }
}

/// Where a card dropped into another group ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossGroupPlacement {
    /// After the last card of the destination group; one single-record write.
    #[default]
    Append,
    /// At the dropped index; the destination group is renumbered.
    Exact,
}

/// `.rangeboard/local.toml`: per-user preferences, never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Group display order keyed by `"{board}:{mode}"`.
    #[serde(default)]
    pub group_order: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_config_defaults() {
        let config: BoardConfig = toml::from_str("[board]\nname = \"SS27\"\nnext_card_id = 1\n").unwrap();
        assert_eq!(config.board.cross_group_placement, CrossGroupPlacement::Append);
        assert!(config.board.categories.is_empty());
        assert_eq!(config.board.season, None);
    }

    #[test]
    fn test_board_config_exact_placement_and_catalog() {
        let config: BoardConfig = toml::from_str(
            "[board]\nname = \"SS27\"\nnext_card_id = 4\ncross_group_placement = \"exact\"\n\
             categories = [\"Tops\", \"Bottoms\"]\ndrops = [\"Drop 1\"]\n",
        )
        .unwrap();
        assert_eq!(config.board.cross_group_placement, CrossGroupPlacement::Exact);
        let catalog = config.catalog();
        assert_eq!(catalog.categories, vec!["Tops", "Bottoms"]);
        assert_eq!(catalog.drops, vec!["Drop 1"]);
    }

    #[test]
    fn test_next_card_id_increments() {
        let mut config: BoardConfig = toml::from_str("[board]\nname = \"x\"\nnext_card_id = 7\n").unwrap();
        assert_eq!(config.next_card_id(), "7");
        assert_eq!(config.next_card_id(), "8");
        assert_eq!(config.board.next_card_id, 9);
    }

    #[test]
    fn test_unknown_placement_is_rejected() {
        let result: Result<BoardConfig, _> = toml::from_str(
            "[board]\nname = \"x\"\nnext_card_id = 1\ncross_group_placement = \"loose\"\n",
        );
        assert!(result.is_err());
    }
}
