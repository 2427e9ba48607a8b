use super::output::{emit, event_line, partition_line};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use eventlog::{
    Database, EventCursor, EventLogConfig, InMemoryKvStore, KvStore, ReadOptions, SnapshotManager,
};
use futures::StreamExt;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "eventlog")]
#[command(about = "Publish and query a local, snapshot-backed event log")]
pub struct App {
    /// Snapshot file holding the store; created on first write
    #[arg(long, default_value = "eventlog.snapshot")]
    data: PathBuf,

    #[arg(long, short)]
    namespace: Option<String>,

    /// JSON configuration file; `--namespace` overrides its namespace
    #[arg(long)]
    config: Option<PathBuf>,

    /// Default tracing filter when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish one event
    Publish {
        event_type: String,
        /// JSON payload
        payload: String,
        /// Event time (RFC 3339 or epoch milliseconds); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Look up one event by id
    Find { uuid: Uuid },
    /// List events in a time range
    Events {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<usize>,
        /// Resume after the event this cursor was printed with
        #[arg(long)]
        after: Option<String>,
    },
    /// Count events in a time range
    Count {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// List known event types
    Types,
    /// List the time partitions touched in a range
    Partitions {
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Args)]
struct RangeArgs {
    #[arg(long = "type")]
    event_type: Option<String>,
    /// Range start (RFC 3339 or epoch milliseconds)
    #[arg(long)]
    from: String,
    /// Inclusive range end; defaults to now
    #[arg(long)]
    to: Option<String>,
}

impl RangeArgs {
    fn bounds(&self) -> Result<(i64, i64)> {
        let from = parse_time(&self.from)?;
        let to = match &self.to {
            Some(to) => parse_time(to)?,
            None => Utc::now().timestamp_millis(),
        };
        Ok((from, to))
    }
}

fn parse_time(raw: &str) -> Result<i64> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    let date = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid time '{}': expected RFC 3339 or epoch millis", raw))?;
    Ok(date.with_timezone(&Utc).timestamp_millis())
}

impl App {
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let snapshots = SnapshotManager::new(&self.data);

        let store = match snapshots
            .load()
            .with_context(|| format!("failed to load {}", self.data.display()))?
        {
            Some(snapshot) => InMemoryKvStore::from_snapshot(snapshot),
            None => InMemoryKvStore::new(),
        };
        store.provision(&config).await?;
        let store = Arc::new(store);
        let db = Database::with_store(config, Arc::clone(&store) as Arc<dyn KvStore>)?;

        match self.command {
            Command::Publish {
                event_type,
                payload,
                at,
            } => {
                let payload: Value =
                    serde_json::from_str(&payload).context("payload is not valid JSON")?;
                let date = match at {
                    Some(at) => DateTime::from_timestamp_millis(parse_time(&at)?)
                        .ok_or_else(|| anyhow!("time '{}' is out of range", at))?,
                    None => Utc::now(),
                };
                let event = db.publish_at(&event_type, &payload, date).await?;
                snapshots
                    .save(&store.snapshot().await)
                    .with_context(|| format!("failed to save {}", self.data.display()))?;
                emit(&event_line(&event));
            }
            Command::Find { uuid } => match db.find(uuid).await? {
                Some(event) => emit(&event_line(&event)),
                None => return Err(anyhow!("event {} not found", uuid)),
            },
            Command::Events {
                range,
                desc,
                limit,
                after,
            } => {
                let (from, to) = range.bounds()?;
                let mut options = ReadOptions::new();
                if desc {
                    options = options.descending();
                }
                if let Some(limit) = limit {
                    options = options.limit(limit);
                }
                if let Some(after) = after {
                    let cursor: EventCursor = after.parse().context("invalid --after cursor")?;
                    options = options.after(cursor);
                }

                let mut events = match &range.event_type {
                    Some(event_type) => db.find_events_by_type(event_type, from, to, options).await?,
                    None => db.find_events(from, to, options).await?,
                };
                while let Some(event) = events.next().await {
                    emit(&event_line(&event?));
                }
            }
            Command::Count { range } => {
                let (from, to) = range.bounds()?;
                let count = match &range.event_type {
                    Some(event_type) => db.count_events_by_type(event_type, from, to).await?,
                    None => db.count_events(from, to).await?,
                };
                emit(&json!({ "count": count }));
            }
            Command::Types => {
                for event_type in db.list_event_types().await? {
                    emit(&json!({ "type": event_type }));
                }
            }
            Command::Partitions { range } => {
                let (from, to) = range.bounds()?;
                for partition in db
                    .find_partitions(range.event_type.as_deref(), from, to)
                    .await?
                {
                    emit(&partition_line(&partition));
                }
            }
        }
        Ok(())
    }

    fn load_config(&self) -> Result<EventLogConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                EventLogConfig::from_json(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => {
                let namespace = self
                    .namespace
                    .clone()
                    .ok_or_else(|| anyhow!("--namespace or --config is required"))?;
                EventLogConfig::new(namespace)
            }
        };
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        config.validate()?;
        Ok(config)
    }
}
