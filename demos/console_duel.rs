//! Console duel
//!
//! Plays one game against a relay from the terminal. Cells are named
//! `a1`..`c3` (column letter, row number); type one and press Enter when it
//! is your turn.
//!
//! ```bash
//! DUEL_RELAY=127.0.0.1:5000 cargo run --example console_duel -- Alice
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use duel_client::sink::dispatch;
use duel_client::{ConnectionTarget, DuelClient, DuelConfig, PlayerSign, PresentationSink};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default relay address when `DUEL_RELAY` is not set.
const DEFAULT_RELAY: &str = "127.0.0.1:5000";

const COLUMNS: [char; 3] = ['a', 'b', 'c'];
const ROWS: [char; 3] = ['1', '2', '3'];

/// Prints every presentation update to stdout.
#[derive(Default)]
struct ConsoleBoard {
    cells: BTreeMap<String, PlayerSign>,
    input_enabled: bool,
}

impl ConsoleBoard {
    fn render(&self) {
        for row in ROWS {
            let line: Vec<String> = COLUMNS
                .iter()
                .map(|col| {
                    let id = format!("{col}{row}");
                    self.cells
                        .get(&id)
                        .map_or_else(|| ".".to_string(), |sign| sign.to_string())
                })
                .collect();
            println!("  {row} {}", line.join(" "));
        }
        println!("    a b c");
    }
}

impl PresentationSink for ConsoleBoard {
    fn append_status_line(&mut self, text: &str) {
        println!("> {text}");
    }

    fn set_cell(&mut self, cell_id: &str, sign: PlayerSign) {
        self.cells.insert(cell_id.to_string(), sign);
        self.render();
    }

    fn set_board_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    fn announce_outcome(&mut self, won: bool) {
        println!("{}", if won { "You won!" } else { "You lost." });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` to see every frame.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let relay = std::env::var("DUEL_RELAY").unwrap_or_else(|_| DEFAULT_RELAY.to_string());
    let name = std::env::args().nth(1).unwrap_or_else(|| "Player".to_string());
    let target = ConnectionTarget::parse(&relay, &name)?;
    let config = DuelConfig::default().with_connect_timeout(Duration::from_secs(5));

    // ── Connect ─────────────────────────────────────────────────────
    let (mut client, mut events) = DuelClient::connect(target, config);
    let mut board = ConsoleBoard::default();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let last = event.is_terminal();
                dispatch(event, &mut board);
                if last {
                    break;
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let cell = line.trim();
                if cell.is_empty() {
                    continue;
                }
                if !board.input_enabled {
                    println!("> Wait for your turn.");
                    continue;
                }
                if board.cells.contains_key(cell) {
                    println!("> {cell} is taken.");
                    continue;
                }
                if let Err(e) = client.submit_move(cell) {
                    println!("> {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
