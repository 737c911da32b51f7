pub mod controller;
pub mod grouping;
pub mod prefs;
pub mod storage;
pub mod store;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use grouping::{group_key_of, GroupField, GroupingMode, UNASSIGNED};

/// The kind of domain entity a card stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Sample,
    Task,
    Style,
}

impl EntityKind {
    /// Status values in workflow order.
    pub fn statuses(self) -> &'static [&'static str] {
        match self {
            Self::Sample => &["requested", "in_progress", "received", "approved", "rejected"],
            Self::Task => &["todo", "in_progress", "blocked", "done"],
            Self::Style => &["concept", "development", "adopted", "dropped"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Task => "task",
            Self::Style => "style",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which board is being shown. Each board shows exactly one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    Samples,
    Tasks,
    Range,
}

impl BoardKind {
    pub const ALL: [BoardKind; 3] = [Self::Samples, Self::Tasks, Self::Range];

    pub fn entity(self) -> EntityKind {
        match self {
            Self::Samples => EntityKind::Sample,
            Self::Tasks => EntityKind::Task,
            Self::Range => EntityKind::Style,
        }
    }

    /// Grouping modes offered by this board. The first one is the default.
    pub fn modes(self) -> &'static [GroupingMode] {
        match self {
            Self::Samples | Self::Tasks => &[GroupingMode::Status],
            Self::Range => &[
                GroupingMode::Category,
                GroupingMode::DeliveryDrop,
                GroupingMode::Status,
            ],
        }
    }

    pub fn default_mode(self) -> GroupingMode {
        self.modes()[0]
    }

    pub fn supports_mode(self, mode: GroupingMode) -> bool {
        self.modes().contains(&mode)
    }

    /// Whether whole groups can be dragged to reorder lanes.
    pub fn supports_group_drag(self) -> bool {
        matches!(self, Self::Range)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Samples => "samples",
            Self::Tasks => "tasks",
            Self::Range => "range",
        }
    }
}

impl std::str::FromStr for BoardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "samples" | "sample" => Ok(Self::Samples),
            "tasks" | "task" => Ok(Self::Tasks),
            "range" | "styles" => Ok(Self::Range),
            other => Err(format!("unknown board '{other}': use samples, tasks, range")),
        }
    }
}

impl std::fmt::Display for BoardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which board a controller shows and which season it is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardScope {
    pub kind: BoardKind,
    pub season: Option<String>,
}

impl BoardScope {
    pub fn new(kind: BoardKind, season: Option<String>) -> Self {
        Self { kind, season }
    }

    /// Whether a card belongs on this board.
    pub fn contains(&self, card: &Card) -> bool {
        card.entity == self.kind.entity()
            && self
                .season
                .as_deref()
                .is_none_or(|season| card.season.as_deref() == Some(season))
    }
}

/// A single board card: one sample, task or range style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub entity: EntityKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_drop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    /// Position within the card's group. Ascending.
    #[serde(default)]
    pub sort_order: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// The markdown notes body (not serialized into frontmatter).
    #[serde(skip)]
    pub notes: String,
}

impl Card {
    pub fn new(id: String, entity: EntityKind, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity,
            title,
            status: None,
            category: None,
            delivery_drop: None,
            season: None,
            sort_order: 0,
            created: now,
            updated: now,
            notes: String::new(),
        }
    }

    /// Touch the card, updating its `updated` timestamp.
    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }

    pub fn field(&self, field: GroupField) -> Option<&str> {
        match field {
            GroupField::Status => self.status.as_deref(),
            GroupField::Category => self.category.as_deref(),
            GroupField::DeliveryDrop => self.delivery_drop.as_deref(),
        }
    }

    pub fn set_field(&mut self, field: GroupField, value: Option<String>) {
        match field {
            GroupField::Status => self.status = value,
            GroupField::Category => self.category = value,
            GroupField::DeliveryDrop => self.delivery_drop = value,
        }
    }
}

/// Category and delivery-drop values declared in the board config, so that
/// empty lanes still render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCatalog {
    pub categories: Vec<String>,
    pub drops: Vec<String>,
}

impl GroupCatalog {
    /// Groups that always exist for `mode`, in their default order.
    pub fn declared(&self, entity: EntityKind, mode: GroupingMode) -> Vec<String> {
        match mode {
            GroupingMode::Status => entity.statuses().iter().map(|s| s.to_string()).collect(),
            GroupingMode::Category => self.categories.clone(),
            GroupingMode::DeliveryDrop => self.drops.clone(),
        }
    }
}

/// A named partition of cards (column / lane).
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    pub cards: Vec<Card>,
}

impl Group {
    pub fn position(&self, card_id: &str) -> Option<usize> {
        self.cards.iter().position(|c| c.id == card_id)
    }

    /// The `sort_order` that places a new card after every card in the group.
    pub fn next_sort_order(&self) -> i64 {
        self.cards
            .iter()
            .map(|c| c.sort_order)
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// The projected board: ordered groups, each with its ordered cards.
///
/// Holds no state of its own; rebuild it from the card collection whenever
/// the collection, the grouping mode or the group order changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub kind: BoardKind,
    pub mode: GroupingMode,
    pub groups: Vec<Group>,
}

impl Board {
    /// Build the board for `cards` under `mode`.
    ///
    /// Group order: declared groups, then other observed values sorted, then
    /// `Unassigned` (always for free-form modes, otherwise only when a card
    /// lands there). `group_order` then moves its known keys to the front.
    pub fn project(
        kind: BoardKind,
        mode: GroupingMode,
        cards: &[Card],
        catalog: &GroupCatalog,
        group_order: &[String],
    ) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for key in catalog.declared(kind.entity(), mode) {
            if key != UNASSIGNED && !keys.contains(&key) {
                keys.push(key);
            }
        }

        let card_keys: Vec<String> = cards.iter().map(|c| group_key_of(c, mode)).collect();
        let observed: BTreeSet<&String> = card_keys
            .iter()
            .filter(|k| k.as_str() != UNASSIGNED && !keys.contains(*k))
            .collect();
        keys.extend(observed.into_iter().cloned());

        if mode.is_free_form() || card_keys.iter().any(|k| k == UNASSIGNED) {
            keys.push(UNASSIGNED.to_string());
        }

        let mut groups: Vec<Group> = apply_group_order(keys, group_order)
            .into_iter()
            .map(|key| Group { key, cards: Vec::new() })
            .collect();

        for (card, key) in cards.iter().zip(&card_keys) {
            if let Some(group) = groups.iter_mut().find(|g| &g.key == key) {
                group.cards.push(card.clone());
            }
        }
        // Stable: equal sort orders keep collection order.
        for group in &mut groups {
            group.cards.sort_by_key(|c| c.sort_order);
        }

        Self { kind, mode, groups }
    }

    pub fn group(&self, key: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn group_keys(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.key.clone()).collect()
    }

    /// Find which group a card is in and its index.
    pub fn find_card(&self, card_id: &str) -> Option<(usize, usize)> {
        for (group_idx, group) in self.groups.iter().enumerate() {
            if let Some(card_idx) = group.position(card_id) {
                return Some((group_idx, card_idx));
            }
        }
        None
    }

    pub fn card_count(&self) -> usize {
        self.groups.iter().map(|g| g.cards.len()).sum()
    }
}

/// Reorder `defaults` so that keys named in `stored` come first, in stored
/// order. Stored keys that no longer exist are dropped; new keys keep their
/// default position after the stored ones.
pub fn apply_group_order(defaults: Vec<String>, stored: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::with_capacity(defaults.len());
    for key in stored {
        if defaults.contains(key) && !ordered.contains(key) {
            ordered.push(key.clone());
        }
    }
    for key in defaults {
        if !ordered.contains(&key) {
            ordered.push(key);
        }
    }
    ordered
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a sample card with a status and sort order.
    pub(crate) fn sample(id: &str, status: Option<&str>, sort_order: i64) -> Card {
        let mut card = Card::new(id.into(), EntityKind::Sample, format!("Sample {id}"));
        card.status = status.map(str::to_string);
        card.sort_order = sort_order;
        card
    }

    pub(crate) fn style(id: &str, category: Option<&str>, sort_order: i64) -> Card {
        let mut card = Card::new(id.into(), EntityKind::Style, format!("Style {id}"));
        card.category = category.map(str::to_string);
        card.sort_order = sort_order;
        card
    }

    fn ids(group: &Group) -> Vec<&str> {
        group.cards.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_project_status_board_has_every_status() {
        let cards = vec![sample("A", Some("requested"), 0)];
        let board = Board::project(
            BoardKind::Samples,
            GroupingMode::Status,
            &cards,
            &GroupCatalog::default(),
            &[],
        );
        assert_eq!(
            board.group_keys(),
            vec!["requested", "in_progress", "received", "approved", "rejected"]
        );
        assert_eq!(ids(&board.groups[0]), vec!["A"]);
    }

    #[test]
    fn test_project_orders_cards_by_sort_order() {
        let cards = vec![
            sample("A", Some("requested"), 2),
            sample("B", Some("requested"), 0),
            sample("C", Some("requested"), 1),
        ];
        let board = Board::project(
            BoardKind::Samples,
            GroupingMode::Status,
            &cards,
            &GroupCatalog::default(),
            &[],
        );
        assert_eq!(ids(board.group("requested").unwrap()), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_project_ties_keep_collection_order() {
        let cards = vec![
            sample("A", Some("requested"), 0),
            sample("B", Some("requested"), 0),
            sample("C", Some("requested"), 0),
        ];
        let board = Board::project(
            BoardKind::Samples,
            GroupingMode::Status,
            &cards,
            &GroupCatalog::default(),
            &[],
        );
        assert_eq!(ids(board.group("requested").unwrap()), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_project_status_unassigned_only_when_used() {
        let catalog = GroupCatalog::default();
        let board = Board::project(
            BoardKind::Samples,
            GroupingMode::Status,
            &[sample("A", Some("approved"), 0)],
            &catalog,
            &[],
        );
        assert!(board.group(UNASSIGNED).is_none());

        let board = Board::project(
            BoardKind::Samples,
            GroupingMode::Status,
            &[sample("A", None, 0)],
            &catalog,
            &[],
        );
        assert_eq!(board.groups.last().unwrap().key, UNASSIGNED);
        assert_eq!(ids(board.group(UNASSIGNED).unwrap()), vec!["A"]);
    }

    #[test]
    fn test_project_free_form_always_has_unassigned() {
        let board = Board::project(
            BoardKind::Range,
            GroupingMode::Category,
            &[style("S1", Some("Knitwear"), 0)],
            &GroupCatalog::default(),
            &[],
        );
        assert_eq!(board.group_keys(), vec!["Knitwear", UNASSIGNED]);
    }

    #[test]
    fn test_project_declared_then_observed_sorted() {
        let catalog = GroupCatalog {
            categories: vec!["Tops".into(), "Bottoms".into()],
            drops: Vec::new(),
        };
        let cards = vec![
            style("S1", Some("Outerwear"), 0),
            style("S2", Some("Accessories"), 0),
            style("S3", Some("Tops"), 0),
        ];
        let board = Board::project(BoardKind::Range, GroupingMode::Category, &cards, &catalog, &[]);
        assert_eq!(
            board.group_keys(),
            vec!["Tops", "Bottoms", "Accessories", "Outerwear", UNASSIGNED]
        );
    }

    #[test]
    fn test_project_unknown_status_still_gets_a_group() {
        let board = Board::project(
            BoardKind::Samples,
            GroupingMode::Status,
            &[sample("A", Some("on_hold"), 0)],
            &GroupCatalog::default(),
            &[],
        );
        assert_eq!(board.find_card("A"), Some((5, 0)));
        assert_eq!(board.groups[5].key, "on_hold");
    }

    #[test]
    fn test_project_applies_group_order() {
        let catalog = GroupCatalog {
            categories: vec!["Tops".into(), "Bottoms".into(), "Dresses".into()],
            drops: Vec::new(),
        };
        let order = vec![UNASSIGNED.to_string(), "Dresses".to_string(), "Gone".to_string()];
        let board = Board::project(BoardKind::Range, GroupingMode::Category, &[], &catalog, &order);
        assert_eq!(
            board.group_keys(),
            vec![UNASSIGNED, "Dresses", "Tops", "Bottoms"]
        );
    }

    #[test]
    fn test_every_card_in_exactly_one_group() {
        let cards = vec![
            style("S1", Some("Tops"), 0),
            style("S2", None, 0),
            style("S3", Some(""), 3),
            style("S4", Some("Knitwear"), 1),
        ];
        let board = Board::project(
            BoardKind::Range,
            GroupingMode::Category,
            &cards,
            &GroupCatalog::default(),
            &[],
        );
        for card in &cards {
            let holders = board
                .groups
                .iter()
                .filter(|g| g.position(&card.id).is_some())
                .count();
            assert_eq!(holders, 1, "card {} in {holders} groups", card.id);
        }
        assert_eq!(board.card_count(), cards.len());
    }

    #[test]
    fn test_next_sort_order() {
        let group = Group {
            key: "requested".into(),
            cards: vec![sample("A", Some("requested"), 4), sample("B", Some("requested"), 7)],
        };
        assert_eq!(group.next_sort_order(), 8);
        let empty = Group { key: "x".into(), cards: Vec::new() };
        assert_eq!(empty.next_sort_order(), 0);
    }

    #[test]
    fn test_scope_filters_entity_and_season() {
        let mut card = sample("A", Some("requested"), 0);
        card.season = Some("SS27".into());
        assert!(BoardScope::new(BoardKind::Samples, None).contains(&card));
        assert!(BoardScope::new(BoardKind::Samples, Some("SS27".into())).contains(&card));
        assert!(!BoardScope::new(BoardKind::Samples, Some("FW27".into())).contains(&card));
        assert!(!BoardScope::new(BoardKind::Tasks, None).contains(&card));
    }

    #[test]
    fn test_board_kind_parse() {
        assert_eq!("range".parse::<BoardKind>().unwrap(), BoardKind::Range);
        assert_eq!("Samples".parse::<BoardKind>().unwrap(), BoardKind::Samples);
        assert!("kanban".parse::<BoardKind>().is_err());
    }

    #[test]
    fn test_board_kind_modes() {
        assert_eq!(BoardKind::Tasks.default_mode(), GroupingMode::Status);
        assert_eq!(BoardKind::Range.default_mode(), GroupingMode::Category);
        assert!(!BoardKind::Samples.supports_mode(GroupingMode::Category));
        assert!(BoardKind::Range.supports_group_drag());
        assert!(!BoardKind::Tasks.supports_group_drag());
    }

    #[test]
    fn test_board_kind_display_round_trips() {
        for kind in BoardKind::ALL {
            assert_eq!(kind.to_string().parse::<BoardKind>().unwrap(), kind);
            assert!(kind.supports_mode(kind.default_mode()));
        }
    }
}
