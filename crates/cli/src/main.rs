use anyhow::{bail, Context, Result};
use chrono::Duration;
use origins::{gaps, Config, Fact, GapSet, Store};
use serde_json::{json, Value as JsonValue};
use std::env;
use std::io::{self, BufRead, Write};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: origins [--config FILE] <command>

commands:
  info                              print the store name and version
  write <domain> <tx> [--dry-run]   write JSON-lines facts from stdin as one segment
  dump <domain> [<min> <max>]       print a domain's facts as JSON lines
  gaps <domain> <threshold-micros>  print gap sets for a domain as JSON lines

environment:
  ORIGINS_STORE_NAME, ORIGINS_STORAGE (redb|memory), ORIGINS_PATH";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config_file = take_flag_value(&mut args, "--config")?;

    let Some(command) = (!args.is_empty()).then(|| args.remove(0)) else {
        bail!("missing command\n\n{USAGE}");
    };
    if command == "help" || command == "--help" {
        println!("{USAGE}");
        return Ok(());
    }

    let config = match &config_file {
        Some(file) => Config::load(file).with_context(|| format!("failed to load {file}"))?,
        None => Config::default(),
    }
    .apply_env()
    .context("invalid environment override")?;

    let store = config
        .open_store()
        .with_context(|| format!("failed to open store '{}'", config.name))?;

    debug!("running {command} against store '{store}'");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = run(&store, &command, &args, &mut out);
    store.close().context("failed to close store")?;
    result
}

fn take_flag_value(args: &mut Vec<String>, flag: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{flag} requires a value");
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn take_switch(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|a| a == flag) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn arg<'a>(args: &'a [String], i: usize, name: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("missing <{name}>\n\n{USAGE}"))
}

fn run<W: Write>(store: &Store, command: &str, args: &[String], out: &mut W) -> Result<()> {
    let mut args = args.to_vec();
    match command {
        "info" => {
            let info = json!({ "name": store.name(), "version": store.version() });
            writeln!(out, "{info}")?;
        }
        "write" => {
            let dry_run = take_switch(&mut args, "--dry-run");
            let domain = arg(&args, 0, "domain")?;
            let tx = arg(&args, 1, "tx")?;
            let facts = read_facts(io::stdin().lock())?;
            let bytes = store
                .write_segment(domain, tx, &facts, !dry_run)
                .with_context(|| format!("failed to write segment {tx} to {domain}"))?;
            writeln!(out, "{}", json!({ "bytes": bytes, "committed": !dry_run }))?;
        }
        "dump" => {
            let domain = arg(&args, 0, "domain")?;
            let (min, max) = match args.len() {
                1 => (0, 0),
                3 => (
                    args[1].parse::<u64>().context("invalid <min>")?,
                    args[2].parse::<u64>().context("invalid <max>")?,
                ),
                _ => bail!("dump takes <domain> or <domain> <min> <max>\n\n{USAGE}"),
            };
            for fact in store.range_reader(domain, min, max)? {
                let fact = fact.with_context(|| format!("failed reading {domain}"))?;
                writeln!(out, "{}", serde_json::to_string(&fact)?)?;
            }
        }
        "gaps" => {
            let domain = arg(&args, 0, "domain")?;
            let threshold: i64 = arg(&args, 1, "threshold-micros")?
                .parse()
                .context("invalid <threshold-micros>")?;
            let facts = store
                .reader(domain)?
                .collect::<origins::Result<Vec<Fact>>>()
                .with_context(|| format!("failed reading {domain}"))?;
            for set in gaps(&facts, Duration::microseconds(threshold)) {
                writeln!(out, "{}", gap_set_json(&set))?;
            }
        }
        other => bail!("unknown command: {other}\n\n{USAGE}"),
    }
    out.flush()?;
    Ok(())
}

fn read_facts<R: BufRead>(reader: R) -> Result<Vec<Fact>> {
    let mut facts = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fact: Fact = serde_json::from_str(&line)
            .with_context(|| format!("invalid fact on line {}", n + 1))?;
        facts.push(fact);
    }
    Ok(facts)
}

fn micros(d: Duration) -> i64 {
    d.num_microseconds().unwrap_or(i64::MAX)
}

fn gap_set_json(set: &GapSet) -> JsonValue {
    let items: Vec<JsonValue> = set
        .gaps
        .iter()
        .map(|g| {
            json!({
                "retracted": g.retracted.to_string(),
                "asserted": g.asserted.to_string(),
                "duration_us": micros(g.duration),
            })
        })
        .collect();
    json!({
        "entity": set.entity.to_string(),
        "attribute": set.attribute.to_string(),
        "threshold_us": micros(set.threshold),
        "gaps": items,
    })
}
