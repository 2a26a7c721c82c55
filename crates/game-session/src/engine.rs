//! UCI engine subprocess wrapper (async I/O).

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::error::SessionError;
use crate::protocol::{self, InfoLine};

/// Result of one completed search. Created once per search and replaced,
/// never mutated, on the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvaluation {
    /// Centipawns from White's perspective; mate encoded as ±(5000 + plies).
    pub evaluation: i32,
    /// Chosen move in UCI notation.
    pub best_move: String,
    /// Predicted continuation in UCI notation.
    pub principal_variation: Vec<String>,
    pub depth: u32,
    pub calculation_time_ms: u64,
}

/// Handle to one engine subprocess. Exclusively owned by a single live game
/// or review run; a fresh game gets a fresh process.
pub struct UciEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl UciEngine {
    /// Spawn the engine and run the UCI handshake.
    pub async fn spawn(path: &str) -> Result<Self, SessionError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| SessionError::Engine(format!("failed to spawn engine: {e}")))?;

        let stdin = process.stdin.take().unwrap();
        let stdout = BufReader::new(process.stdout.take().unwrap());

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        engine.send("uci").await?;
        engine.wait_for(protocol::is_uci_ok).await?;

        engine.send("setoption name Threads value 1").await?;
        engine.send("setoption name Hash value 128").await?;
        engine.send("isready").await?;
        engine.wait_for(protocol::is_ready_ok).await?;

        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), SessionError> {
        debug!(cmd, "engine <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| SessionError::Engine(format!("failed to write to engine: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| SessionError::Engine(format!("failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, SessionError> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| SessionError::Engine(format!("failed to read from engine: {e}")))?;
        if n == 0 {
            return Err(SessionError::Engine("engine closed its stdout".into()));
        }
        let trimmed = line.trim().to_string();
        debug!(line = %trimmed, "engine >");
        Ok(trimmed)
    }

    async fn wait_for(&mut self, matches: fn(&str) -> bool) -> Result<(), SessionError> {
        loop {
            let line = self.read_line().await?;
            if matches(&line) {
                return Ok(());
            }
        }
    }

    /// Forward a strength change. Sent as-is; an in-flight search keeps
    /// running and picks the level up on the next `go`.
    pub async fn set_skill(&mut self, level: u8) -> Result<(), SessionError> {
        self.send(&format!("setoption name Skill Level value {level}"))
            .await
    }

    /// Reset engine state between games.
    pub async fn new_game(&mut self) -> Result<(), SessionError> {
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for(protocol::is_ready_ok).await
    }

    /// Run a fixed-time search and collect the evaluation. Progress lines
    /// below `min_depth` are discarded; the evaluation comes from the deepest
    /// line at or beyond it.
    pub async fn search(
        &mut self,
        fen: &str,
        movetime_ms: u64,
        min_depth: u32,
    ) -> Result<EngineEvaluation, SessionError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go movetime {movetime_ms}")).await?;

        let started = Instant::now();
        let mut best: Option<InfoLine> = None;

        let chosen = loop {
            let line = self.read_line().await?;
            if let Some(info) = protocol::parse_info(&line) {
                if info.depth >= min_depth {
                    best = Some(info);
                }
            } else if let Some(bm) = protocol::parse_bestmove(&line) {
                break bm;
            }
        };

        let black_to_move = fen.split_whitespace().nth(1) == Some("b");
        let (evaluation, depth, pv) = match best {
            Some(info) => (
                protocol::normalized_cp(info.score, black_to_move),
                info.depth,
                info.pv,
            ),
            // Nothing at or beyond target depth; keep the move, report a
            // neutral evaluation.
            None => (0, 0, Vec::new()),
        };

        Ok(EngineEvaluation {
            evaluation,
            best_move: chosen.uci,
            principal_variation: pv,
            depth,
            calculation_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Send quit and wait for the process to exit.
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}
