use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rangeboard::board::controller::{BoardController, BoardDeps, BoardError, DragEvent, DragLocation};
use rangeboard::board::grouping::GroupingMode;
use rangeboard::board::prefs::FilePreferences;
use rangeboard::board::storage::{
    create_card, find_board_dir, init_board, load_config, read_activity, FileStore, NewCard, BOARD_DIR,
};
use rangeboard::board::store::StoreError;
use rangeboard::board::{BoardKind, BoardScope};
use rangeboard::notify::ToastQueue;

#[derive(Parser)]
#[command(name = "rangeboard", about = "Sample, task and range-planning boards for apparel sourcing")]
struct Cli {
    /// Board to work on (samples, tasks, range)
    #[arg(short, long, global = true, default_value = "samples")]
    board: BoardKind,

    /// Season to scope the board to (defaults to the configured season)
    #[arg(long, global = true)]
    season: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new .rangeboard/ directory here
    Init {
        /// Board name (defaults to current directory name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Add a card at the end of its group
    Add {
        /// Card title
        title: String,
        /// Status (defaults to the first workflow status)
        #[arg(short, long)]
        status: Option<String>,
        /// Range category
        #[arg(short, long)]
        category: Option<String>,
        /// Delivery drop
        #[arg(short, long)]
        drop: Option<String>,
        /// Free-text notes
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Show the board, grouped
    List {
        /// Grouping mode (status, category, delivery-drop)
        #[arg(short, long)]
        mode: Option<GroupingMode>,
    },
    /// Drag a card to a group and position
    Move {
        /// Card ID
        card_id: String,
        /// Destination group
        group: String,
        /// Position in the destination group (defaults to the end)
        #[arg(short, long)]
        index: Option<usize>,
        #[arg(short, long)]
        mode: Option<GroupingMode>,
    },
    /// Drag a whole group to a new position (range board only)
    MoveGroup {
        /// Group key
        group: String,
        /// New position, 0-based
        index: usize,
        #[arg(short, long)]
        mode: Option<GroupingMode>,
    },
    /// Print the group order
    Groups {
        #[arg(short, long)]
        mode: Option<GroupingMode>,
    },
    /// Print the activity log (JSONL, one entry per line)
    Log,
}

#[tokio::main]
async fn main() {
    // Install color_eyre for unexpected panics/errors (developer bugs).
    let _ = color_eyre::install();
    init_tracing();
    let cli = Cli::parse();
    let cwd = match env::current_dir() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: cannot determine current directory: {e}");
            std::process::exit(1);
        }
    };

    let kind = cli.board;
    let season = cli.season;
    let result = match cli.command {
        Command::Init { name } => {
            let name = name.unwrap_or_else(|| {
                cwd.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("Sourcing")
                    .to_string()
            });
            cmd_init(&cwd, &name, season.as_deref())
        }
        Command::Add {
            title,
            status,
            category,
            drop,
            notes,
        } => cmd_add(&cwd, kind, season, &title, status, category, drop, notes),
        Command::List { mode } => cmd_list(&cwd, kind, season, mode).await,
        Command::Move {
            card_id,
            group,
            index,
            mode,
        } => cmd_move(&cwd, kind, season, mode, &card_id, &group, index).await,
        Command::MoveGroup { group, index, mode } => {
            cmd_move_group(&cwd, kind, season, mode, &group, index).await
        }
        Command::Groups { mode } => cmd_groups(&cwd, kind, season, mode).await,
        Command::Log => cmd_log(&cwd),
    };

    if let Err(e) = result {
        print_user_error(&e);
        std::process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Print a user-friendly error message, with actionable hints for known error types.
fn print_user_error(error: &color_eyre::Report) {
    if let Some(store_err) = error.downcast_ref::<StoreError>() {
        match store_err {
            StoreError::NotFound(_) => {
                eprintln!("error: no {BOARD_DIR} directory found here or in any parent.");
                eprintln!("  Run `rangeboard init` to create one.");
            }
            StoreError::InvalidCard { path, reason } => {
                eprintln!("error: invalid card file: {}", path.display());
                eprintln!("  {reason}");
            }
            StoreError::TomlDe(e) => {
                eprintln!("error: config file has invalid TOML syntax.");
                eprintln!("  {e}");
            }
            other => eprintln!("error: {other}"),
        }
        return;
    }
    if let Some(BoardError::UnsupportedMode { kind, .. }) = error.downcast_ref::<BoardError>() {
        let modes: Vec<&str> = kind.modes().iter().map(|m| m.as_str()).collect();
        eprintln!("error: {error}");
        eprintln!("  The {kind} board groups by: {}", modes.join(", "));
        return;
    }
    eprintln!("error: {e:#}", e = error);
}

/// A mounted controller plus the toast queue it reports to.
struct Session {
    controller: BoardController,
    toasts: Arc<ToastQueue>,
}

async fn open_board(
    cwd: &Path,
    kind: BoardKind,
    season: Option<String>,
    mode: Option<GroupingMode>,
) -> color_eyre::Result<Session> {
    let board_dir = find_board_dir(cwd)?;
    let config = load_config(&board_dir)?;
    let scope = BoardScope::new(kind, season.or(config.board.season.clone()));
    let toasts = Arc::new(ToastQueue::default());
    let deps = BoardDeps {
        scope: scope.clone(),
        store: Arc::new(FileStore::new(&board_dir, scope)),
        prefs: Arc::new(FilePreferences::new(&board_dir)),
        notifier: toasts.clone(),
        catalog: config.catalog(),
        placement: config.board.cross_group_placement,
    };
    let controller = BoardController::mount(deps, mode.unwrap_or(kind.default_mode())).await?;
    Ok(Session { controller, toasts })
}

fn cmd_init(cwd: &Path, name: &str, season: Option<&str>) -> color_eyre::Result<()> {
    if cwd.join(BOARD_DIR).exists() {
        bail!("Board already exists in this directory.");
    }
    let board_dir: PathBuf = init_board(cwd, name, season)?;
    println!("Initialized board '{}' in {}", name, board_dir.display());
    if let Some(season) = season {
        println!("Scoped to season {season}");
    }
    println!("Run `rangeboard add \"Title\"` to add cards.");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    cwd: &Path,
    kind: BoardKind,
    season: Option<String>,
    title: &str,
    status: Option<String>,
    category: Option<String>,
    drop: Option<String>,
    notes: String,
) -> color_eyre::Result<()> {
    let board_dir = find_board_dir(cwd)?;
    let config = load_config(&board_dir)?;
    let entity = kind.entity();
    let status = status.or_else(|| entity.statuses().first().map(|s| s.to_string()));

    let card = create_card(
        &board_dir,
        NewCard {
            entity,
            title: title.to_string(),
            status,
            category,
            delivery_drop: drop,
            season: season.or(config.board.season),
            notes,
        },
        kind.default_mode(),
    )?;
    println!("Created {} {}: {}", entity, card.id, card.title);
    Ok(())
}

async fn cmd_list(
    cwd: &Path,
    kind: BoardKind,
    season: Option<String>,
    mode: Option<GroupingMode>,
) -> color_eyre::Result<()> {
    let session = open_board(cwd, kind, season, mode).await?;
    let board = session.controller.board();

    match &session.controller.scope().season {
        Some(season) => println!("{} board ({season}), by {}", board.kind, board.mode),
        None => println!("{} board, by {}", board.kind, board.mode),
    }
    for group in &board.groups {
        println!("\n{} ({})", group.key, group.cards.len());
        println!("{}", "─".repeat(40));
        for card in &group.cards {
            println!("  {:>4}  {}", card.id, card.title);
        }
    }
    println!();
    Ok(())
}

async fn cmd_move(
    cwd: &Path,
    kind: BoardKind,
    season: Option<String>,
    mode: Option<GroupingMode>,
    card_id: &str,
    group: &str,
    index: Option<usize>,
) -> color_eyre::Result<()> {
    let mut session = open_board(cwd, kind, season, mode).await?;
    let board = session.controller.board();

    let (from_group, from_index) = board
        .find_card(card_id)
        .ok_or_else(|| eyre!("Card '{}' is not on the {} board", card_id, kind))?;
    let target = board.group(group).ok_or_else(|| {
        eyre!(
            "Group '{}' not found. Groups: {}",
            group,
            board.group_keys().join(", ")
        )
    })?;
    let source_key = board.groups[from_group].key.clone();
    let index = index.unwrap_or(if source_key == target.key {
        target.cards.len().saturating_sub(1)
    } else {
        target.cards.len()
    });

    let event = DragEvent::card(
        card_id,
        DragLocation::new(source_key, from_index),
        Some(DragLocation::new(group, index)),
    );
    let Some(write) = session.controller.on_drag_end(&event) else {
        println!("Card {card_id} is already there");
        return Ok(());
    };
    write.await?;
    let report = session.controller.reconcile().await;
    if report.failed > 0 {
        let message = session
            .toasts
            .take()
            .map(|t| t.message)
            .unwrap_or_else(|| "Couldn't save board changes".to_string());
        bail!(message);
    }
    println!("Moved {card_id} to {group} at position {index}");
    Ok(())
}

async fn cmd_move_group(
    cwd: &Path,
    kind: BoardKind,
    season: Option<String>,
    mode: Option<GroupingMode>,
    group: &str,
    index: usize,
) -> color_eyre::Result<()> {
    if !kind.supports_group_drag() {
        bail!("Groups on the {kind} board have a fixed order");
    }
    let mut session = open_board(cwd, kind, season, mode).await?;
    let keys = session.controller.board().group_keys();
    let from = keys
        .iter()
        .position(|k| k == group)
        .ok_or_else(|| eyre!("Group '{}' not found. Groups: {}", group, keys.join(", ")))?;

    session
        .controller
        .on_drag_end(&DragEvent::group(group, from, Some(index)));
    println!("{}", session.controller.board().group_keys().join(" | "));
    Ok(())
}

async fn cmd_groups(
    cwd: &Path,
    kind: BoardKind,
    season: Option<String>,
    mode: Option<GroupingMode>,
) -> color_eyre::Result<()> {
    let session = open_board(cwd, kind, season, mode).await?;
    for (i, group) in session.controller.board().groups.iter().enumerate() {
        println!("{i:>3}  {} ({})", group.key, group.cards.len());
    }
    Ok(())
}

fn cmd_log(cwd: &Path) -> color_eyre::Result<()> {
    let board_dir = find_board_dir(cwd)?;
    for entry in read_activity(&board_dir)? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}
