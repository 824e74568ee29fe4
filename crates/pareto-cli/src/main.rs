use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pareto_store::{
    AuditReport, Candidate, ConflictPolicy, FrontError, FrontSnapshot, ObjectiveVector,
    OracleConfig, ParetoFrontStore, StoreConfig, SubmitReport, Violation,
};
use serde_json::{json, Value};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pareto", version, about = "Shared Pareto front maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    #[value(name = "reconcile")]
    Reconcile,
    #[value(name = "retry")]
    Retry,
    #[value(name = "converge")]
    Converge,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SenseArg {
    #[value(name = "less")]
    Less,
    #[value(name = "greater")]
    Greater,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RelationArg {
    /// VECTOR dominates an input line.
    #[value(name = "dominates")]
    Dominates,
    /// VECTOR is dominated by an input line.
    #[value(name = "dominated")]
    Dominated,
}

#[derive(clap::Args, Clone, Debug)]
struct StoreArgs {
    /// Front file.
    #[arg(short = 'p', long = "front", alias = "pareto-file")]
    front: PathBuf,
    /// Lock file. Defaults to `<front>.lock`.
    #[arg(short = 'l', long = "lock", alias = "lock-file")]
    lock: Option<PathBuf>,
    /// YAML store configuration; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Treat equal objectives with different solutions as distinct members.
    #[arg(long = "allow-duplicate")]
    allow_duplicate: bool,
    #[arg(long)]
    lock_timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge one candidate record into the front.
    Submit {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long, value_enum)]
        conflict_policy: Option<PolicyArg>,
        #[arg(long, default_value_t = 1)]
        max_retries: u32,
        /// External comparator command, split on whitespace.
        #[arg(long)]
        oracle_command: Option<String>,
        #[arg(long)]
        json: bool,
        candidate: String,
    },
    /// Print the current front.
    Show {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        json: bool,
    },
    /// Verify that no stored member dominates or duplicates another.
    Check {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        json: bool,
    },
    /// Comparator: exit 0 if the relation holds against any stdin vector.
    Dominates {
        #[arg(short = 't', long = "type", value_enum, default_value = "less")]
        sense: SenseArg,
        #[arg(short = 'a', long = "relation", value_enum, default_value = "dominates")]
        relation: RelationArg,
        #[arg(allow_hyphen_values = true)]
        vector: String,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                let code = err
                    .downcast_ref::<FrontError>()
                    .map(FrontError::code)
                    .unwrap_or("command_failed");
                emit_json(&json_error(code, format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PARETO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Submit {
            store,
            conflict_policy,
            max_retries,
            oracle_command,
            json,
            candidate,
        } => {
            let mut config = load_config(&store)?;
            if let Some(policy) = conflict_policy {
                config.conflict_policy = match policy {
                    PolicyArg::Reconcile => ConflictPolicy::Reconcile,
                    PolicyArg::Retry => ConflictPolicy::Retry { max_retries },
                    PolicyArg::Converge => ConflictPolicy::Converge,
                };
            }
            if let Some(cmd) = oracle_command {
                config.oracle = OracleConfig::Command {
                    command: cmd.split_whitespace().map(str::to_string).collect(),
                };
            }
            let front = open_store(&store.front, config)?;

            let parsed = match front.parse_candidate(&candidate) {
                Ok(c) => c,
                Err(FrontError::InvalidRecord { reason, .. }) => {
                    // Not fatal: the calling pipeline keeps going.
                    debug!(%candidate, %reason, "candidate rejected before submission");
                    eprintln!("[INVALID Candidate: {}] {}", candidate, reason);
                    if json {
                        return Ok(Some(json!({
                            "ok": true,
                            "command": "submit",
                            "status": "invalid",
                            "candidate": candidate,
                            "reason": reason
                        })));
                    }
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            };
            eprintln!("[Candidate: {}]", candidate);

            let report = front
                .submit(&parsed)
                .with_context(|| format!("submitting to {}", front.front_path().display()))?;
            info!(
                front = %front.front_path().display(),
                policy = front.config().conflict_policy.as_str(),
                status = report.status.as_str(),
                verdict = report.verdict.as_str(),
                attempts = report.attempts,
                digest = %report.digest,
                "submission finished"
            );
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "submit",
                    "candidate": candidate,
                    "front": front.front_path().display().to_string(),
                    "report": submit_report_to_json(&report),
                })));
            }
            print_submit_report(&parsed, &report);
        }
        Commands::Show { store, json } => {
            let front = open_store(&store.front, load_config(&store)?)?;
            let snapshot = front.snapshot()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "show",
                    "front": front.front_path().display().to_string(),
                    "snapshot": snapshot_to_json(&snapshot),
                })));
            }
            for m in &snapshot.members {
                println!("{}", m);
            }
            println!("members: {}", snapshot.members.len());
            println!("dropped: {}", snapshot.dropped);
            println!("digest: {}", snapshot.digest());
        }
        Commands::Check { store, json } => {
            let front = open_store(&store.front, load_config(&store)?)?;
            let report = front.audit()?;
            if json {
                emit_json(&json!({
                    "ok": report.is_clean(),
                    "command": "check",
                    "front": front.front_path().display().to_string(),
                    "members": report.snapshot.members.len(),
                    "dropped": report.snapshot.dropped,
                    "violations": violations_to_json(&report),
                }));
            } else {
                for line in describe_violations(&report) {
                    println!("violation: {}", line);
                }
                println!("members: {}", report.snapshot.members.len());
                println!("dropped: {}", report.snapshot.dropped);
                println!("{}", if report.is_clean() { "ok" } else { "invalid" });
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Commands::Dominates {
            sense,
            relation,
            vector,
        } => {
            let code = match run_comparator(sense, relation, &vector) {
                Ok(true) => 0,
                Ok(false) => 1,
                Err(err) => {
                    eprintln!("{:#}", err);
                    2
                }
            };
            std::process::exit(code);
        }
    }
    Ok(None)
}

fn load_config(args: &StoreArgs) -> Result<StoreConfig> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(lock) = &args.lock {
        config.lock_file = Some(lock.clone());
    }
    if args.allow_duplicate {
        config.track_identity = true;
    }
    if args.lock_timeout_ms.is_some() {
        config.lock_timeout_ms = args.lock_timeout_ms;
    }
    Ok(config)
}

fn open_store(front: &Path, config: StoreConfig) -> Result<ParetoFrontStore> {
    ParetoFrontStore::open(front, config)
        .with_context(|| format!("opening front {}", front.display()))
}

fn run_comparator(sense: SenseArg, relation: RelationArg, vector: &str) -> Result<bool> {
    let orient = |v: ObjectiveVector| match sense {
        SenseArg::Less => v,
        SenseArg::Greater => ObjectiveVector::new(v.as_slice().iter().map(|x| -x).collect()),
    };
    let reference = orient(ObjectiveVector::parse_csv(vector)?);
    let stdin = std::io::stdin();
    let mut holds = false;
    for line in stdin.lock().lines() {
        let line = line.context("reading comparator input")?;
        if line.trim().is_empty() {
            continue;
        }
        let other = orient(ObjectiveVector::parse_csv(&line)?);
        let verdict = match relation {
            RelationArg::Dominates => pareto_store::dominates(&reference, &other)?,
            RelationArg::Dominated => pareto_store::dominates(&other, &reference)?,
        };
        holds |= verdict;
    }
    Ok(holds)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Submit { json, .. } | Commands::Show { json, .. } | Commands::Check { json, .. } => {
            *json
        }
        Commands::Dominates { .. } => false,
    }
}

fn candidate_to_json(c: &Candidate) -> Value {
    json!({
        "record": c.raw(),
        "objectives": c.objectives().as_slice(),
        "identity": c.identity(),
    })
}

fn submit_report_to_json(report: &SubmitReport) -> Value {
    json!({
        "status": report.status.as_str(),
        "verdict": report.verdict.as_str(),
        "changed": report.changed(),
        "evicted": report.evicted.iter().map(candidate_to_json).collect::<Vec<_>>(),
        "attempts": report.attempts,
        "front_size": report.front_len,
        "digest": report.digest,
    })
}

fn snapshot_to_json(snapshot: &FrontSnapshot) -> Value {
    json!({
        "members": snapshot.members.iter().map(candidate_to_json).collect::<Vec<_>>(),
        "dropped": snapshot.dropped,
        "digest": snapshot.digest(),
    })
}

fn violations_to_json(report: &AuditReport) -> Value {
    let members = &report.snapshot.members;
    Value::Array(
        report
            .violations
            .iter()
            .map(|v| match v {
                Violation::Dominates { winner, loser } => json!({
                    "kind": "dominates",
                    "winner": members[*winner].raw(),
                    "loser": members[*loser].raw(),
                }),
                Violation::Duplicate { first, second } => json!({
                    "kind": "duplicate",
                    "first": members[*first].raw(),
                    "second": members[*second].raw(),
                }),
            })
            .collect(),
    )
}

fn describe_violations(report: &AuditReport) -> Vec<String> {
    let members = &report.snapshot.members;
    report
        .violations
        .iter()
        .map(|v| match v {
            Violation::Dominates { winner, loser } => format!(
                "[{}] dominates [{}]",
                members[*winner].raw(),
                members[*loser].raw()
            ),
            Violation::Duplicate { first, second } => format!(
                "[{}] duplicates [{}]",
                members[*second].raw(),
                members[*first].raw()
            ),
        })
        .collect()
}

fn print_submit_report(candidate: &Candidate, report: &SubmitReport) {
    println!("status: {}", report.status.as_str());
    println!("verdict: {}", report.verdict.as_str());
    if report.changed() {
        println!("new_member: {}", candidate.objectives());
    }
    for e in &report.evicted {
        println!("evicted: {}", e.objectives());
    }
    println!("attempts: {}", report.attempts);
    println!("front_size: {}", report.front_len);
    println!("digest: {}", report.digest);
}
