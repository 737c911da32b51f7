//! Optimistic drag-and-drop controller for one board.
//!
//! A completed drag is applied to the in-memory card collection at once and
//! then written to the [`CardStore`] on a spawned task. Write outcomes come
//! back over a channel; [`BoardController::reconcile`] turns any failure into
//! a full reload plus an error notification.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::grouping::{field_change_for, FieldChanges, GroupingMode};
use super::prefs::{group_order_key, PreferenceStore};
use super::store::{CardStore, SortOrderUpdate, StoreError};
use super::{Board, BoardKind, BoardScope, Card, Group, GroupCatalog};
use crate::config::CrossGroupPlacement;
use crate::notify::Notifier;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("{kind} boards cannot be grouped by {mode}")]
    UnsupportedMode { kind: BoardKind, mode: GroupingMode },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a controller talks to, passed in explicitly.
#[derive(Clone)]
pub struct BoardDeps {
    pub scope: BoardScope,
    pub store: Arc<dyn CardStore>,
    pub prefs: Arc<dyn PreferenceStore>,
    pub notifier: Arc<dyn Notifier>,
    pub catalog: GroupCatalog,
    pub placement: CrossGroupPlacement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    Card,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragLocation {
    pub group: String,
    pub index: usize,
}

impl DragLocation {
    pub fn new(group: impl Into<String>, index: usize) -> Self {
        Self {
            group: group.into(),
            index,
        }
    }
}

/// A settled drag gesture.
///
/// For [`DragKind::Card`], `draggable_id` is a card id and locations name
/// groups. For [`DragKind::Group`], `draggable_id` is a group key and only
/// the indices (positions in the group list) matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEvent {
    pub kind: DragKind,
    pub draggable_id: String,
    pub source: DragLocation,
    /// None when the drag was dropped outside any target.
    pub destination: Option<DragLocation>,
}

impl DragEvent {
    pub fn card(
        card_id: impl Into<String>,
        source: DragLocation,
        destination: Option<DragLocation>,
    ) -> Self {
        Self {
            kind: DragKind::Card,
            draggable_id: card_id.into(),
            source,
            destination,
        }
    }

    /// A lane drag from position `from` to position `to` (None = cancelled).
    pub fn group(key: impl Into<String>, from: usize, to: Option<usize>) -> Self {
        Self {
            kind: DragKind::Group,
            draggable_id: key.into(),
            source: DragLocation::new("board", from),
            destination: to.map(|index| DragLocation::new("board", index)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Reorder,
    Move,
}

impl WriteOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Reorder => "reorder",
            Self::Move => "move",
        }
    }
}

#[derive(Debug)]
struct PersistOutcome {
    card_id: String,
    op: WriteOp,
    result: Result<(), StoreError>,
}

/// What a [`BoardController::reconcile`] pass saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub settled: usize,
    pub failed: usize,
    pub reloaded: bool,
}

pub struct BoardController {
    scope: BoardScope,
    mode: GroupingMode,
    cards: Vec<Card>,
    group_order: Vec<String>,
    store: Arc<dyn CardStore>,
    prefs: Arc<dyn PreferenceStore>,
    notifier: Arc<dyn Notifier>,
    catalog: GroupCatalog,
    placement: CrossGroupPlacement,
    outcomes_tx: mpsc::UnboundedSender<PersistOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<PersistOutcome>,
    /// Writes spawned whose outcome has not been recorded yet.
    in_flight: usize,
}

impl BoardController {
    /// Fetch the collection from the store and build a controller over it.
    pub async fn mount(deps: BoardDeps, mode: GroupingMode) -> Result<Self, BoardError> {
        check_mode(deps.scope.kind, mode)?;
        let cards = deps.store.reload().await?;
        Self::new(deps, mode, cards)
    }

    /// Build a controller over an already fetched collection.
    ///
    /// Cards outside the board's scope are dropped.
    pub fn new(deps: BoardDeps, mode: GroupingMode, cards: Vec<Card>) -> Result<Self, BoardError> {
        check_mode(deps.scope.kind, mode)?;
        let cards = in_scope(&deps.scope, cards);
        let group_order = deps
            .prefs
            .get(&group_order_key(deps.scope.kind, mode))
            .unwrap_or_default();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Ok(Self {
            scope: deps.scope,
            mode,
            cards,
            group_order,
            store: deps.store,
            prefs: deps.prefs,
            notifier: deps.notifier,
            catalog: deps.catalog,
            placement: deps.placement,
            outcomes_tx,
            outcomes_rx,
            in_flight: 0,
        })
    }

    pub fn scope(&self) -> &BoardScope {
        &self.scope
    }

    pub fn mode(&self) -> GroupingMode {
        self.mode
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// The current projection of the collection.
    pub fn board(&self) -> Board {
        Board::project(
            self.scope.kind,
            self.mode,
            &self.cards,
            &self.catalog,
            &self.group_order,
        )
    }

    /// Switch grouping mode, picking up the stored group order for it.
    pub fn set_mode(&mut self, mode: GroupingMode) -> Result<(), BoardError> {
        check_mode(self.scope.kind, mode)?;
        self.mode = mode;
        self.group_order = self
            .prefs
            .get(&group_order_key(self.scope.kind, mode))
            .unwrap_or_default();
        Ok(())
    }

    /// Handle a settled drag.
    ///
    /// Local state changes before this returns. When a store write was
    /// started, its handle is returned; the write's outcome is picked up by
    /// [`reconcile`](Self::reconcile) or [`settle`](Self::settle).
    pub fn on_drag_end(&mut self, event: &DragEvent) -> Option<JoinHandle<()>> {
        let Some(destination) = event.destination.as_ref() else {
            debug!(id = %event.draggable_id, "drag cancelled");
            return None;
        };
        if *destination == event.source {
            debug!(id = %event.draggable_id, "drag dropped where it started");
            return None;
        }
        match event.kind {
            DragKind::Group => {
                self.reorder_group(&event.draggable_id, destination.index);
                None
            }
            DragKind::Card => self.move_card(&event.draggable_id, destination),
        }
    }

    fn move_card(&mut self, card_id: &str, destination: &DragLocation) -> Option<JoinHandle<()>> {
        let board = self.board();
        let Some((from_group, from_index)) = board.find_card(card_id) else {
            warn!(card_id, "dragged card is not on the board");
            return None;
        };
        let Some(to_group) = board.groups.iter().position(|g| g.key == destination.group) else {
            warn!(card_id, group = %destination.group, mode = %self.mode, "drop target is not a group on this board");
            return None;
        };

        if from_group == to_group {
            self.reorder_within(&board.groups[from_group], from_index, destination.index)
        } else {
            let card = board.groups[from_group].cards[from_index].clone();
            self.move_across(&card, &board.groups[to_group], destination.index)
        }
    }

    fn reorder_within(&mut self, group: &Group, from: usize, to: usize) -> Option<JoinHandle<()>> {
        let to = to.min(group.cards.len().saturating_sub(1));
        if from == to {
            debug!(group = %group.key, index = to, "card already at drop index");
            return None;
        }

        let mut ordered: Vec<&Card> = group.cards.iter().collect();
        let moved = ordered.remove(from);
        ordered.insert(to, moved);

        let updates: Vec<SortOrderUpdate> = ordered
            .iter()
            .enumerate()
            .filter(|(position, card)| card.sort_order != *position as i64)
            .map(|(position, card)| SortOrderUpdate::new(card.id.clone(), position as i64))
            .collect();
        if updates.is_empty() {
            return None;
        }

        self.apply_sort_orders(&updates);
        info!(card_id = %moved.id, group = %group.key, from, to, "reordered card");

        let store = Arc::clone(&self.store);
        Some(self.spawn_write(moved.id.clone(), WriteOp::Reorder, async move {
            store.batch_update_sort_order(&updates).await
        }))
    }

    fn move_across(&mut self, card: &Card, destination: &Group, index: usize) -> Option<JoinHandle<()>> {
        let mut changes = field_change_for(self.mode, &destination.key);
        let mut others: Vec<SortOrderUpdate> = Vec::new();

        match self.placement {
            CrossGroupPlacement::Append => {
                changes.sort_order = Some(destination.next_sort_order());
            }
            CrossGroupPlacement::Exact => {
                let mut ordered: Vec<&Card> = destination.cards.iter().collect();
                ordered.insert(index.min(ordered.len()), card);
                for (position, other) in ordered.iter().enumerate() {
                    let position = position as i64;
                    if other.id == card.id {
                        changes.sort_order = Some(position);
                    } else if other.sort_order != position {
                        others.push(SortOrderUpdate::new(other.id.clone(), position));
                    }
                }
            }
        }

        if let Some(local) = self.cards.iter_mut().find(|c| c.id == card.id) {
            changes.apply(local);
        }
        self.apply_sort_orders(&others);
        info!(
            card_id = %card.id,
            group = %destination.key,
            mode = %self.mode,
            "moved card to another group"
        );

        let store = Arc::clone(&self.store);
        let card_id = card.id.clone();
        Some(self.spawn_write(card.id.clone(), WriteOp::Move, async move {
            write_move(store.as_ref(), &card_id, &changes, &others).await
        }))
    }

    fn reorder_group(&mut self, key: &str, to: usize) {
        if !self.scope.kind.supports_group_drag() {
            debug!(board = %self.scope.kind, "board does not reorder groups");
            return;
        }
        let mut keys = self.board().group_keys();
        let Some(from) = keys.iter().position(|k| k == key) else {
            warn!(group = key, mode = %self.mode, "dragged group is not on the board");
            return;
        };
        let to = to.min(keys.len() - 1);
        if from == to {
            return;
        }
        let moved = keys.remove(from);
        keys.insert(to, moved);

        let pref_key = group_order_key(self.scope.kind, self.mode);
        if let Err(e) = self.prefs.set(&pref_key, &keys) {
            warn!(key = %pref_key, error = %e, "could not save group order");
        }
        info!(group = key, from, to, mode = %self.mode, "reordered group");
        self.group_order = keys;
    }

    fn apply_sort_orders(&mut self, updates: &[SortOrderUpdate]) {
        for update in updates {
            if let Some(card) = self.cards.iter_mut().find(|c| c.id == update.id) {
                card.sort_order = update.sort_order;
            }
        }
    }

    fn spawn_write<F>(&mut self, card_id: String, op: WriteOp, write: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let tx = self.outcomes_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let result = write.await;
            // The receiver lives as long as the controller; a dropped
            // controller has nothing left to reconcile.
            let _ = tx.send(PersistOutcome { card_id, op, result });
        })
    }

    /// Process every write outcome that has arrived so far.
    pub async fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.record(outcome, &mut report);
        }
        self.recover_if_failed(&mut report).await;
        report
    }

    /// Wait for at least one write outcome, then reconcile.
    ///
    /// Returns an empty report right away when no write is in flight.
    pub async fn settle(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if self.in_flight == 0 {
            return report;
        }
        let first = self.outcomes_rx.recv().await;
        if let Some(outcome) = first {
            self.record(outcome, &mut report);
        }
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.record(outcome, &mut report);
        }
        self.recover_if_failed(&mut report).await;
        report
    }

    fn record(&mut self, outcome: PersistOutcome, report: &mut ReconcileReport) {
        self.in_flight = self.in_flight.saturating_sub(1);
        report.settled += 1;
        match outcome.result {
            Ok(()) => debug!(card_id = %outcome.card_id, op = outcome.op.as_str(), "write saved"),
            Err(e) => {
                report.failed += 1;
                error!(card_id = %outcome.card_id, op = outcome.op.as_str(), error = %e, "write failed");
            }
        }
    }

    async fn recover_if_failed(&mut self, report: &mut ReconcileReport) {
        if report.failed == 0 {
            return;
        }
        match self.store.reload().await {
            Ok(cards) => {
                self.cards = in_scope(&self.scope, cards);
                report.reloaded = true;
                self.notifier
                    .error("Couldn't save board changes; reloaded the latest board");
            }
            Err(e) => {
                error!(error = %e, "reload after failed write also failed");
                self.notifier
                    .error("Couldn't save board changes and the board could not be refreshed");
            }
        }
    }
}

fn in_scope(scope: &BoardScope, cards: Vec<Card>) -> Vec<Card> {
    let total = cards.len();
    let cards: Vec<Card> = cards.into_iter().filter(|c| scope.contains(c)).collect();
    if cards.len() < total {
        debug!(board = %scope.kind, skipped = total - cards.len(), "cards outside board scope");
    }
    cards
}

fn check_mode(kind: BoardKind, mode: GroupingMode) -> Result<(), BoardError> {
    if kind.supports_mode(mode) {
        Ok(())
    } else {
        Err(BoardError::UnsupportedMode { kind, mode })
    }
}

async fn write_move(
    store: &dyn CardStore,
    card_id: &str,
    changes: &FieldChanges,
    others: &[SortOrderUpdate],
) -> Result<(), StoreError> {
    store.update_entity_field(card_id, changes).await?;
    if !others.is_empty() {
        store.batch_update_sort_order(others).await?;
    }
    Ok(())
}
