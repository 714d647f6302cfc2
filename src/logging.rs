//! JSON-lines logging for trials and batches.
//!
//! Records go to stderr (stdout belongs to the binaries' results) and, when
//! `LOG_DIR` is set, to per-run files under `<LOG_DIR>/<run_id>/`:
//! `events.jsonl` (info and above), `trace.jsonl` (trace/debug) and
//! `audit.jsonl` (digest records, every level).
//!
//! `LOG_LEVEL` and `LOG_DOMAINS` are read once, on the first record.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_lowercase().as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

/// Record categories, selectable with `LOG_DOMAINS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Research,
    Trial,
    Agent,
    Reasoner,
    Batch,
    System,
    Audit,
    Profile,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Research,
        Domain::Trial,
        Domain::Agent,
        Domain::Reasoner,
        Domain::Batch,
        Domain::System,
        Domain::Audit,
        Domain::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Research => "research",
            Domain::Trial => "trial",
            Domain::Agent => "agent",
            Domain::Reasoner => "reasoner",
            Domain::Batch => "batch",
            Domain::System => "system",
            Domain::Audit => "audit",
            Domain::Profile => "profile",
        }
    }
}

/// Minimum level plus the enabled domains; `None` enables every domain.
#[derive(Debug, Clone, PartialEq)]
struct Filter {
    min_level: Level,
    domains: Option<Vec<Domain>>,
}

impl Filter {
    fn from_values(level: Option<&str>, domains: Option<&str>) -> Self {
        let min_level = level.and_then(Level::parse).unwrap_or(Level::Info);
        let domains = domains.map(str::trim).filter(|d| !d.is_empty() && *d != "all").map(|list| {
            let wanted: Vec<&str> = list.split(',').map(str::trim).collect();
            Domain::ALL
                .into_iter()
                .filter(|d| wanted.contains(&d.as_str()))
                .collect()
        });
        Self { min_level, domains }
    }

    fn allows(&self, level: Level, domain: Domain) -> bool {
        level >= self.min_level && self.domains.as_ref().map_or(true, |ds| ds.contains(&domain))
    }
}

struct Sinks {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
    audit: Mutex<BufWriter<File>>,
}

impl Sinks {
    fn open(dir: &Path, run_id: &str) -> std::io::Result<Self> {
        create_dir_all(dir)?;
        let manifest = json!({
            "run_id": run_id,
            "started_at": ts_now(),
            "pid": process::id(),
            "crate": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        });
        std::fs::write(dir.join("manifest.json"), manifest.to_string())?;
        let open = |name: &str| File::create(dir.join(name)).map(|f| Mutex::new(BufWriter::new(f)));
        Ok(Self {
            events: open("events.jsonl")?,
            trace: open("trace.jsonl")?,
            audit: open("audit.jsonl")?,
        })
    }

    fn route(&self, level: Level, domain: Domain) -> &Mutex<BufWriter<File>> {
        match (domain, level) {
            (Domain::Audit, _) => &self.audit,
            (_, Level::Trace | Level::Debug) => &self.trace,
            _ => &self.events,
        }
    }
}

struct Logger {
    run_id: String,
    filter: Filter,
    sinks: Option<Sinks>,
    seq: AtomicU64,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

fn logger() -> &'static Logger {
    LOGGER.get_or_init(|| {
        let run_id = std::env::var("RUN_ID").unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let filter = Filter::from_values(
            std::env::var("LOG_LEVEL").ok().as_deref(),
            std::env::var("LOG_DOMAINS").ok().as_deref(),
        );
        let sinks = std::env::var("LOG_DIR").ok().and_then(|base| {
            let dir = PathBuf::from(base).join(&run_id);
            Sinks::open(&dir, &run_id)
                .map_err(|err| eprintln!("[log] file sinks disabled ({}): {}", dir.display(), err))
                .ok()
        });
        Logger {
            run_id,
            filter,
            sinks,
            seq: AtomicU64::new(0),
        }
    })
}

const REDACTED_KEYS: [&str; 4] = ["api_key", "authorization", "Authorization", "bearer"];
// Lifted out of `data` to the top level of a record.
const PROMOTED_KEYS: [&str; 5] = ["trial_id", "batch_id", "role", "phase", "msg"];

fn redact(fields: &mut Map<String, Value>) {
    for key in REDACTED_KEYS {
        if let Some(v) = fields.get_mut(key) {
            *v = Value::String("[REDACTED]".to_string());
        }
    }
}

fn build_record(seq: u64, run_id: &str, level: Level, domain: Domain, event: &str, mut fields: Map<String, Value>) -> Value {
    redact(&mut fields);
    let mut record = Map::new();
    record.insert("ts".to_string(), json!(ts_now()));
    record.insert("run_id".to_string(), json!(run_id));
    record.insert("seq".to_string(), json!(seq));
    record.insert("lvl".to_string(), json!(level.as_str()));
    record.insert("component".to_string(), json!(domain.as_str()));
    record.insert("event".to_string(), json!(event));
    record.insert("msg".to_string(), fields.remove("msg").unwrap_or_else(|| json!("")));
    for key in PROMOTED_KEYS {
        if let Some(v) = fields.remove(key) {
            record.insert(key.to_string(), v);
        }
    }
    record.insert("data".to_string(), Value::Object(fields));
    Value::Object(record)
}

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit one record if `level` and `domain` pass the filter.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let lg = logger();
    if !lg.filter.allows(level, domain) {
        return;
    }
    let seq = lg.seq.fetch_add(1, Ordering::SeqCst);
    let line = build_record(seq, &lg.run_id, level, domain, event, fields).to_string();
    if let Some(sinks) = &lg.sinks {
        if let Ok(mut w) = sinks.route(level, domain).lock() {
            let _ = writeln!(w, "{}", line).and_then(|_| w.flush());
        }
    }
    eprintln!("{}", line);
}

// =============================================================================
// Trial logs
// =============================================================================

pub fn log_phase(trial_id: &str, phase: &str, state: &str) {
    log(
        Level::Debug,
        Domain::Trial,
        "phase",
        obj(&[
            ("trial_id", v_str(trial_id)),
            ("phase", v_str(phase)),
            ("state", v_str(state)),
        ]),
    );
}

pub fn log_degraded_turn(trial_id: &str, role: &str, phase: &str, reason: &str, fatal: bool) {
    log(
        if fatal { Level::Error } else { Level::Warn },
        Domain::Agent,
        "degraded_turn",
        obj(&[
            ("trial_id", v_str(trial_id)),
            ("role", v_str(role)),
            ("phase", v_str(phase)),
            ("reason", v_str(reason)),
            ("fatal", Value::Bool(fatal)),
        ]),
    );
}

pub fn log_verdict(trial_id: &str, winner: &str, confidence: f64, turns: usize) {
    log(
        Level::Info,
        Domain::Trial,
        "verdict",
        obj(&[
            ("trial_id", v_str(trial_id)),
            ("winner", v_str(winner)),
            ("confidence", v_num(confidence)),
            ("turns", json!(turns)),
        ]),
    );
}

pub fn log_trial_failed(trial_id: &str, phase: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Trial,
        "trial_failed",
        obj(&[
            ("trial_id", v_str(trial_id)),
            ("phase", v_str(phase)),
            ("reason", v_str(reason)),
        ]),
    );
}

/// Log an audit entry for replay verification
pub fn log_audit(trial_id: &str, evidence_digest: &str, transcript_digest: &str) {
    log(
        Level::Info,
        Domain::Audit,
        "trial_digest",
        obj(&[
            ("trial_id", v_str(trial_id)),
            ("evidence_digest", v_str(evidence_digest)),
            ("transcript_digest", v_str(transcript_digest)),
        ]),
    );
}

// =============================================================================
// Batch logs
// =============================================================================

pub fn log_batch_summary(
    batch_id: &str,
    total_runs: usize,
    failed_runs: usize,
    plaintiff_win_rate: f64,
    mean_confidence: f64,
    degraded: bool,
) {
    log(
        if degraded { Level::Warn } else { Level::Info },
        Domain::Batch,
        "batch_summary",
        obj(&[
            ("batch_id", v_str(batch_id)),
            ("total_runs", json!(total_runs)),
            ("failed_runs", json!(failed_runs)),
            ("plaintiff_win_rate", v_num(plaintiff_win_rate)),
            ("mean_confidence", v_num(mean_confidence)),
            ("degraded", Value::Bool(degraded)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
