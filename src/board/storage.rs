use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::grouping::{group_key_of, FieldChanges, GroupingMode};
use super::prefs::ensure_local_gitignore;
use super::store::{CardStore, SortOrderUpdate, StoreError};
use super::{BoardScope, Card, EntityKind};
use crate::config::{BoardConfig, BoardSection, CrossGroupPlacement};

pub const BOARD_DIR: &str = ".rangeboard";

/// Card ids become file names: `[A-Za-z0-9_-]+` only.
fn validate_card_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Find the .rangeboard directory by walking up from `start`.
pub fn find_board_dir(start: &Path) -> Result<PathBuf, StoreError> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(BOARD_DIR);
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !dir.pop() {
            return Err(StoreError::NotFound(start.to_path_buf()));
        }
    }
}

/// Initialize a new .rangeboard directory with a default config.
pub fn init_board(root: &Path, name: &str, season: Option<&str>) -> Result<PathBuf, StoreError> {
    let board_dir = root.join(BOARD_DIR);
    fs::create_dir_all(board_dir.join("cards"))?;

    let config = BoardConfig {
        board: BoardSection {
            name: name.to_string(),
            next_card_id: 1,
            season: season.map(|s| s.to_string()),
            cross_group_placement: CrossGroupPlacement::default(),
            categories: Vec::new(),
            drops: Vec::new(),
            created_at: Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        },
    };
    save_config(&board_dir, &config)?;
    if let Err(e) = ensure_local_gitignore(&board_dir) {
        warn!(error = %e, "could not write .gitignore");
    }
    Ok(board_dir)
}

pub fn load_config(board_dir: &Path) -> Result<BoardConfig, StoreError> {
    let config_str = fs::read_to_string(board_dir.join("config.toml"))?;
    Ok(toml::from_str(&config_str)?)
}

pub fn save_config(board_dir: &Path, config: &BoardConfig) -> Result<(), StoreError> {
    let config_str = toml::to_string_pretty(config)?;
    fs::write(board_dir.join("config.toml"), config_str)?;
    Ok(())
}

fn cards_dir(board_dir: &Path) -> PathBuf {
    board_dir.join("cards")
}

fn card_path(board_dir: &Path, id: &str) -> PathBuf {
    cards_dir(board_dir).join(format!("{id}.md"))
}

/// Load every card on disk, sorted by id. Invalid files are skipped.
pub fn load_cards(board_dir: &Path) -> Result<Vec<Card>, StoreError> {
    let dir = cards_dir(board_dir);
    let mut cards = Vec::new();
    if !dir.exists() {
        return Ok(cards);
    }
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        match load_card(&path) {
            Ok(card) => cards.push(card),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid card"),
        }
    }
    // read_dir order is platform-defined; keep ties in sort_order stable.
    cards.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    Ok(cards)
}

/// Load a single card by id.
pub fn read_card(board_dir: &Path, id: &str) -> Result<Card, StoreError> {
    let path = card_path(board_dir, id);
    if !validate_card_id(id) || !path.exists() {
        return Err(StoreError::MissingCard(id.to_string()));
    }
    load_card(&path)
}

/// Write a card file, skipping the write if the content is unchanged.
pub fn save_card(board_dir: &Path, card: &Card) -> Result<(), StoreError> {
    if !validate_card_id(&card.id) {
        return Err(StoreError::InvalidCard {
            path: card_path(board_dir, &card.id),
            reason: format!("unsafe card id: {:?}", card.id),
        });
    }
    fs::create_dir_all(cards_dir(board_dir))?;
    let path = card_path(board_dir, &card.id);
    let content = serialize_card(card)?;
    let needs_write = match fs::read_to_string(&path) {
        Ok(existing) => existing.replace("\r\n", "\n") != content,
        Err(_) => true,
    };
    if needs_write {
        fs::write(&path, content)?;
    }
    Ok(())
}

/// Fields for a card created outside the board (forms, CLI).
#[derive(Debug, Clone)]
pub struct NewCard {
    pub entity: EntityKind,
    pub title: String,
    pub status: Option<String>,
    pub category: Option<String>,
    pub delivery_drop: Option<String>,
    pub season: Option<String>,
    pub notes: String,
}

/// Create a card at the end of its group under `mode`.
pub fn create_card(board_dir: &Path, new: NewCard, mode: GroupingMode) -> Result<Card, StoreError> {
    let mut config = load_config(board_dir)?;
    let mut card = Card::new(config.next_card_id(), new.entity, new.title);
    card.status = new.status;
    card.category = new.category;
    card.delivery_drop = new.delivery_drop;
    card.season = new.season;
    card.notes = new.notes;

    let key = group_key_of(&card, mode);
    card.sort_order = load_cards(board_dir)?
        .iter()
        .filter(|c| c.entity == card.entity && group_key_of(c, mode) == key)
        .map(|c| c.sort_order)
        .max()
        .map_or(0, |max| max + 1);

    save_card(board_dir, &card)?;
    save_config(board_dir, &config)?;
    Ok(card)
}

/// Parse a card .md file with TOML frontmatter.
fn load_card(path: &Path) -> Result<Card, StoreError> {
    let content = fs::read_to_string(path)?;
    let (frontmatter, body) = parse_frontmatter(&content).ok_or_else(|| StoreError::InvalidCard {
        path: path.to_path_buf(),
        reason: "missing or invalid TOML frontmatter".into(),
    })?;

    let mut card: Card = toml::from_str(&frontmatter).map_err(|e| StoreError::InvalidCard {
        path: path.to_path_buf(),
        reason: format!("invalid TOML: {e}"),
    })?;
    if !validate_card_id(&card.id) {
        return Err(StoreError::InvalidCard {
            path: path.to_path_buf(),
            reason: format!("unsafe card id: {:?}", card.id),
        });
    }
    card.notes = body;
    Ok(card)
}

/// Serialize a card to the frontmatter + markdown body format.
fn serialize_card(card: &Card) -> Result<String, StoreError> {
    let mut out = String::from("---\n");
    out.push_str(&toml::to_string(card)?);
    out.push_str("---\n");
    if !card.notes.is_empty() {
        out.push('\n');
        out.push_str(&card.notes);
        if !card.notes.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

/// Parse `---` delimited TOML frontmatter from a string.
/// Returns (frontmatter, body).
///
/// Normalizes `\r\n` to `\n` so files edited on Windows parse correctly.
fn parse_frontmatter(content: &str) -> Option<(String, String)> {
    let content = content.replace("\r\n", "\n");
    let content = content.trim_start();
    let after_first = content.strip_prefix("---")?;
    let after_first = after_first.strip_prefix('\n').unwrap_or(after_first);
    let end = after_first.find("\n---")?;
    let frontmatter = after_first[..end].to_string();
    let rest = &after_first[end + 4..];
    let body = rest.strip_prefix('\n').unwrap_or(rest).trim().to_string();
    Some((frontmatter, body))
}

// ---------------------------------------------------------------------------
// Activity log (.rangeboard/activity.log, append-only JSONL)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub ts: DateTime<Utc>,
    pub action: String,
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,
}

impl ActivityEntry {
    fn for_card(action: &str, card: &Card) -> Self {
        Self {
            ts: Utc::now(),
            action: action.to_string(),
            id: card.id.clone(),
            title: card.title.clone(),
            group: None,
            sort_order: Some(card.sort_order),
        }
    }
}

/// Append one entry to `.rangeboard/activity.log`.
///
/// Best-effort: a log failure is reported at `warn` and never fails the
/// write it describes.
pub fn append_activity(board_dir: &Path, entry: &ActivityEntry) {
    if let Err(e) = try_append_activity(board_dir, entry) {
        warn!(error = %e, "could not append to activity log");
    }
}

fn try_append_activity(board_dir: &Path, entry: &ActivityEntry) -> std::io::Result<()> {
    use std::io::Write;
    let line = serde_json::to_string(entry)?;
    let mut file = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(board_dir.join("activity.log"))?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Read the activity log. Lines that do not parse are skipped.
pub fn read_activity(board_dir: &Path) -> Result<Vec<ActivityEntry>, StoreError> {
    let path = board_dir.join("activity.log");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// A [`CardStore`] over a `.rangeboard/` directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    board_dir: PathBuf,
    scope: BoardScope,
}

impl FileStore {
    pub fn new(board_dir: impl Into<PathBuf>, scope: BoardScope) -> Self {
        Self {
            board_dir: board_dir.into(),
            scope,
        }
    }
}

fn update_entity_field_blocking(
    board_dir: &Path,
    id: &str,
    changes: &FieldChanges,
) -> Result<Card, StoreError> {
    let mut card = read_card(board_dir, id)?;
    changes.apply(&mut card);
    card.touch();
    save_card(board_dir, &card)?;

    let mut entry = ActivityEntry::for_card("move", &card);
    entry.group = card.field(changes.field).map(str::to_string);
    append_activity(board_dir, &entry);
    Ok(card)
}

fn batch_update_sort_order_blocking(
    board_dir: &Path,
    updates: &[SortOrderUpdate],
) -> Result<(), StoreError> {
    // Read everything first so a missing id fails before any write.
    let mut cards = updates
        .iter()
        .map(|u| read_card(board_dir, &u.id))
        .collect::<Result<Vec<_>, _>>()?;
    for (card, update) in cards.iter_mut().zip(updates) {
        card.sort_order = update.sort_order;
        card.touch();
        save_card(board_dir, card)?;
        append_activity(board_dir, &ActivityEntry::for_card("reorder", card));
    }
    Ok(())
}

#[async_trait]
impl CardStore for FileStore {
    async fn update_entity_field(&self, id: &str, changes: &FieldChanges) -> Result<Card, StoreError> {
        let board_dir = self.board_dir.clone();
        let id = id.to_string();
        let changes = changes.clone();
        tokio::task::spawn_blocking(move || update_entity_field_blocking(&board_dir, &id, &changes))
            .await?
    }

    async fn batch_update_sort_order(&self, updates: &[SortOrderUpdate]) -> Result<(), StoreError> {
        let board_dir = self.board_dir.clone();
        let updates = updates.to_vec();
        tokio::task::spawn_blocking(move || batch_update_sort_order_blocking(&board_dir, &updates))
            .await?
    }

    async fn reload(&self) -> Result<Vec<Card>, StoreError> {
        let board_dir = self.board_dir.clone();
        let scope = self.scope.clone();
        let cards = tokio::task::spawn_blocking(move || load_cards(&board_dir)).await??;
        Ok(cards.into_iter().filter(|c| scope.contains(c)).collect())
    }
}
