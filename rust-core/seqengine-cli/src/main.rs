// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! seqctl: operator tool for the sequence engine.
//!
//! Works against a data directory holding the file partition logs
//! (`<data-dir>/plog`) and a redb file with the checkpoint and
//! recovery-point views (`<data-dir>/views.redb`).
//!
//! - `append` runs synthetic events through a sequencer and commits them
//! - `recover` rebuilds a partition's counters and prints them
//! - `prp show` / `prp sync` inspect or advance a recovery point

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use seqengine_plog::{
    Cud, DocCategory, FilePLog, IdSequence, PLogEvent, PLogReader, PartitionId, ReadLimit,
    RecordId, SyncMode, WorkspaceId,
};
use seqengine_sequences::{
    Counters, PartitionRecoveryPoint, Recovers, SequencerConfig, SequencerRegistry,
};
use seqengine_storage::{RedbBackend, StorageBackend};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "seqctl", version = VERSION, about = "Sequence engine operator tool")]
struct Cli {
    /// Directory holding the partition logs and the view file.
    #[arg(long, default_value = "./seqengine-data")]
    data_dir: PathBuf,

    /// JSON file with sequencer settings. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to wait for a partition to recover.
    #[arg(long, default_value_t = 30)]
    recovery_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate and commit synthetic events to a partition log.
    Append {
        #[arg(long)]
        partition: u64,
        #[arg(long)]
        workspace: u64,
        /// Number of events to commit.
        #[arg(long, default_value_t = 1)]
        events: usize,
        /// Ordinary records created per event.
        #[arg(long, default_value_t = 1)]
        records: usize,
        /// Compacting records created per event.
        #[arg(long, default_value_t = 0)]
        compacting: usize,
    },
    /// Recover a partition's sequencer and print its counters.
    Recover {
        #[arg(long)]
        partition: u64,
    },
    /// Partition recovery points.
    Prp {
        #[command(subcommand)]
        command: PrpCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PrpCommand {
    /// Print the stored recovery point of a partition.
    Show {
        #[arg(long)]
        partition: u64,
    },
    /// Incorporate every log event past the stored recovery point.
    Sync {
        #[arg(long)]
        partition: u64,
    },
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

struct Env {
    data_dir: PathBuf,
    views: Arc<dyn StorageBackend>,
    config: SequencerConfig,
    recovery_timeout: Duration,
}

impl Env {
    fn open(cli: &Cli) -> Result<Self> {
        std::fs::create_dir_all(&cli.data_dir)
            .with_context(|| format!("creating {}", cli.data_dir.display()))?;
        let views = RedbBackend::open(cli.data_dir.join("views.redb"))
            .context("opening view storage")?;
        info!(backend = views.name(), path = %views.path().display(), "Opened view storage");
        let config = match &cli.config {
            Some(path) => load_config(path)?,
            None => SequencerConfig::default(),
        };
        Ok(Self {
            data_dir: cli.data_dir.clone(),
            views: Arc::new(views),
            config,
            recovery_timeout: Duration::from_secs(cli.recovery_timeout),
        })
    }

    fn plog(&self) -> FilePLog {
        FilePLog::new(self.data_dir.join("plog"))
    }

    fn registry(&self) -> Result<SequencerRegistry> {
        Ok(SequencerRegistry::new(
            Arc::clone(&self.views),
            Arc::new(self.plog()),
            self.config.clone(),
        )?)
    }
}

fn load_config(path: &Path) -> Result<SequencerConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(SequencerConfig::from_json(&text)?)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn append(
    env: &Env,
    pid: PartitionId,
    ws: WorkspaceId,
    events: usize,
    records: usize,
    compacting: usize,
) -> Result<()> {
    let registry = env.registry()?;
    let seq = registry.deploy(pid).await;
    if !seq.wait_for_recovery(env.recovery_timeout).await {
        registry.shutdown().await;
        bail!("partition {pid} did not recover within {:?}", env.recovery_timeout);
    }

    let mut writer = env.plog().writer(pid, SyncMode::Fsync)?;
    let mut committed = 0usize;
    let mut failure = None;

    for _ in 0..events {
        let Some((plog, wlog)) = seq.start_event(env.recovery_timeout, ws).await else {
            failure = Some(anyhow::anyhow!("sequencer of partition {pid} is not ready"));
            break;
        };
        let mut event = PLogEvent::new(plog, ws, wlog);
        for _ in 0..records {
            event = event.with_cud(Cud::create(seq.next_rec_id(), DocCategory::WDoc));
        }
        for _ in 0..compacting {
            event = event.with_cud(Cud::create(seq.next_crec_id(), DocCategory::CDoc));
        }

        match writer.append(&event) {
            Ok(_) => {
                seq.finish_event();
                committed += 1;
            }
            Err(e) => {
                seq.cancel_event();
                failure = Some(anyhow::Error::new(e).context(format!("committing offset {plog}")));
                break;
            }
        }
    }

    let counters = seq.snapshot();
    registry.shutdown().await;
    info!(partition = %pid, workspace = %ws, committed, "Append finished");
    if let Some(e) = failure {
        return Err(e);
    }
    print_json(&counters_json(pid, &counters))
}

async fn recover(env: &Env, pid: PartitionId) -> Result<()> {
    let registry = env.registry()?;
    let seq = registry.deploy(pid).await;
    let recovered = seq.wait_for_recovery(env.recovery_timeout).await;
    let counters = seq.snapshot();
    registry.shutdown().await;

    if !recovered {
        bail!("partition {pid} did not recover within {:?}", env.recovery_timeout);
    }
    print_json(&counters_json(pid, &counters))
}

async fn prp_show(env: &Env, pid: PartitionId) -> Result<()> {
    let point = Recovers::new(Arc::clone(&env.views)).get(pid).await?;
    print_json(&point_json(&point))
}

async fn prp_sync(env: &Env, pid: PartitionId) -> Result<()> {
    let recovers = Recovers::new(Arc::clone(&env.views));
    let mut point = recovers.get(pid).await?;
    let from = point.plog_offset().next();

    let mut incorporated = 0usize;
    env.plog()
        .read_plog(pid, from, ReadLimit::ToTheEnd, &mut |event| {
            incorporate(&mut point, event);
            incorporated += 1;
            Ok(())
        })
        .await?;

    if point.dirty_count() > 0 || incorporated > 0 {
        recovers.put(&mut point).await?;
    }
    info!(partition = %pid, incorporated, "Recovery point synced");
    print_json(&point_json(&point))
}

/// Record `event` in the point, keeping the highest IDs seen per workspace.
fn incorporate(point: &mut PartitionRecoveryPoint, event: &PLogEvent) {
    let (mut id, mut cid) = point
        .workspace(event.workspace)
        .map(|wp| (wp.base_record_id(), wp.c_base_record_id()))
        .unwrap_or((RecordId::NULL, RecordId::NULL));
    for (sequence, used) in event.used_ids() {
        match sequence {
            IdSequence::RecId => id = id.max(used),
            IdSequence::CRecId => cid = cid.max(used),
        }
    }
    point.update(event.offset, event.workspace, event.wlog_offset, id, cid);
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn counters_json(pid: PartitionId, counters: &Counters) -> serde_json::Value {
    let workspaces: Vec<serde_json::Value> = counters
        .wlog_offset
        .keys()
        .map(|&ws| {
            json!({
                "workspace": ws,
                "wlog_offset": counters.wlog_offset(ws),
                "rec_id": counters.rec_id(ws),
                "c_rec_id": counters.c_rec_id(ws),
            })
        })
        .collect();
    json!({
        "partition": pid,
        "plog_offset": counters.plog_offset,
        "workspaces": workspaces,
    })
}

fn point_json(point: &PartitionRecoveryPoint) -> serde_json::Value {
    let workspaces: Vec<serde_json::Value> = point
        .workspaces()
        .values()
        .map(|wp| {
            json!({
                "workspace": wp.wsid(),
                "wlog_offset": wp.wlog_offset(),
                "base_record_id": wp.base_record_id(),
                "c_base_record_id": wp.c_base_record_id(),
            })
        })
        .collect();
    json!({
        "partition": point.pid(),
        "plog_offset": point.plog_offset(),
        "workspaces": workspaces,
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env = Env::open(&cli)?;

    match cli.command {
        Command::Append {
            partition,
            workspace,
            events,
            records,
            compacting,
        } => {
            append(
                &env,
                PartitionId(partition),
                WorkspaceId(workspace),
                events,
                records,
                compacting,
            )
            .await
        }
        Command::Recover { partition } => recover(&env, PartitionId(partition)).await,
        Command::Prp { command } => match command {
            PrpCommand::Show { partition } => prp_show(&env, PartitionId(partition)).await,
            PrpCommand::Sync { partition } => prp_sync(&env, PartitionId(partition)).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqengine_plog::Offset;

    fn env(dir: &Path) -> Env {
        let cli = Cli::parse_from([
            "seqctl",
            "--data-dir",
            dir.to_str().unwrap(),
            "recover",
            "--partition",
            "1",
        ]);
        Env::open(&cli).unwrap()
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from([
            "seqctl", "append", "--partition", "2", "--workspace", "7", "--events", "3",
        ]);
        match cli.command {
            Command::Append {
                partition,
                workspace,
                events,
                records,
                compacting,
            } => {
                assert_eq!((partition, workspace, events), (2, 7, 3));
                assert_eq!((records, compacting), (1, 0));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["seqctl", "prp", "sync", "--partition", "4"]);
        assert!(matches!(
            cli.command,
            Command::Prp {
                command: PrpCommand::Sync { partition: 4 }
            }
        ));
    }

    #[test]
    fn test_incorporate_keeps_highest_ids() {
        let mut point = PartitionRecoveryPoint::new(PartitionId(1));
        let ws = WorkspaceId(3);
        incorporate(
            &mut point,
            &PLogEvent::new(Offset(1), ws, Offset(1))
                .with_cud(Cud::create(RecordId(5), DocCategory::WDoc))
                .with_cud(Cud::create(RecordId(2), DocCategory::CDoc)),
        );
        incorporate(
            &mut point,
            &PLogEvent::new(Offset(2), ws, Offset(2))
                .with_cud(Cud::update(RecordId(9), DocCategory::WDoc)),
        );

        let wp = point.workspace(ws).unwrap();
        assert_eq!(point.plog_offset(), Offset(2));
        assert_eq!(wp.wlog_offset(), Offset(2));
        assert_eq!(wp.base_record_id(), RecordId(5));
        assert_eq!(wp.c_base_record_id(), RecordId(2));
    }

    #[tokio::test]
    async fn test_append_then_recover_and_sync() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid = PartitionId(1);
        let ws = WorkspaceId(10);
        {
            let env = env(dir.path());
            append(&env, pid, ws, 5, 2, 1).await.unwrap();
            prp_sync(&env, pid).await.unwrap();
        }

        let env = env(dir.path());
        let registry = env.registry().unwrap();
        let seq = registry.deploy(pid).await;
        assert!(seq.wait_for_recovery(Duration::from_secs(5)).await);
        let counters = seq.snapshot();
        registry.shutdown().await;
        assert_eq!(counters.plog_offset, Offset(5));
        assert_eq!(counters.rec_id(ws), RecordId(10));
        assert_eq!(counters.c_rec_id(ws), RecordId(5));

        let point = Recovers::new(Arc::clone(&env.views)).get(pid).await.unwrap();
        assert_eq!(point.plog_offset(), Offset(5));
        assert_eq!(point.workspace(ws).unwrap().base_record_id(), RecordId(10));
    }
}
