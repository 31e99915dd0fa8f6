use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use tracing::{debug, info};

use dor_access::DisseminationResolver;
use dor_codec::DocumentFormat;
use dor_index::{Condition, FieldQuery, ObjectFields, Operator};
use dor_replication::WalJobTable;
use dor_session::{RepositoryConfig, RepositoryContext, SessionManager};
use dor_store::{FileContentStore, HttpContentFetcher};
use dor_types::{parse_timestamp, Pid, Timestamp};

use crate::cli::*;

const DEFAULT_STORAGE_DIR: &str = "dor-data";

/// A repository opened over on-disk storage for one command.
pub struct Repository {
    pub manager: Arc<SessionManager>,
    pub resolver: DisseminationResolver,
    /// Objects registered and indexed while opening.
    pub indexed: usize,
}

/// Open the file-backed stores under the configured storage directory and
/// rebuild the in-process registry and indexes from them.
pub fn open_repository(config: Option<&Path>, storage: Option<&Path>) -> anyhow::Result<Repository> {
    let mut config = match config {
        Some(path) => RepositoryConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RepositoryConfig::default(),
    };
    if let Some(dir) = storage {
        config.storage_dir = Some(dir.to_path_buf());
    }
    let root = config
        .storage_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));

    let fetcher = HttpContentFetcher::new(config.fetch_connect_timeout())?;
    let mut ctx = RepositoryContext::in_memory(config);
    ctx.objects = Arc::new(FileContentStore::open(root.join("objects"))?);
    ctx.datastreams = Arc::new(FileContentStore::open(root.join("datastreams"))?);
    ctx.staging = Arc::new(FileContentStore::open(root.join("staging"))?);
    ctx.jobs = Arc::new(WalJobTable::open(&root.join("replication.wal"))?);
    ctx.fetcher = Arc::new(fetcher);

    let manager = Arc::new(SessionManager::new(ctx));
    let indexed = manager.rebuild_registry()?;
    debug!(root = %root.display(), indexed, "opened repository");
    Ok(Repository {
        resolver: DisseminationResolver::new(Arc::clone(&manager)),
        manager,
        indexed,
    })
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let repo = open_repository(cli.config.as_deref(), cli.storage.as_deref())?;
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::Ingest(args) => cmd_ingest(&repo, args, json),
        Command::Export(args) => cmd_export(&repo, args),
        Command::Purge(args) => cmd_purge(&repo, args, json),
        Command::Methods(args) => cmd_methods(&repo, args, json),
        Command::Disseminate(args) => cmd_disseminate(&repo, args, json),
        Command::NextPid(args) => cmd_next_pid(&repo, args, json),
        Command::Find(args) => cmd_find(&repo, args, json),
        Command::Rebuild(_) => cmd_rebuild(&repo, json),
        Command::Recover(_) => cmd_recover(&repo, json),
    }
}

fn parse_pid(s: &str) -> anyhow::Result<Pid> {
    Pid::parse(s).with_context(|| format!("invalid pid {s:?}"))
}

fn parse_as_of(s: Option<&str>) -> anyhow::Result<Option<Timestamp>> {
    s.map(|s| parse_timestamp(s).with_context(|| format!("invalid date {s:?}")))
        .transpose()
}

fn parse_parms(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut parms = BTreeMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("parameter {pair:?} is not NAME=VALUE");
        };
        parms.insert(name.to_string(), value.to_string());
    }
    Ok(parms)
}

fn write_output(output: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("writing {}", path.display()))?,
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}

/// Ingest `bytes` and commit the new object, releasing the writer either way.
pub fn ingest(
    repo: &Repository,
    bytes: &[u8],
    format: DocumentFormat,
    encoding: &str,
    new_pid: bool,
    message: &str,
) -> anyhow::Result<Pid> {
    let mut writer = repo
        .manager
        .get_ingest_writer(bytes, format, encoding, new_pid)?;
    let committed = repo.manager.do_commit(&mut writer, message, false);
    let pid = writer.pid().clone();
    repo.manager.release_writer(writer);
    committed?;
    info!(%pid, "ingested");
    Ok(pid)
}

fn cmd_ingest(repo: &Repository, args: IngestArgs, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let format: DocumentFormat = args.document_format.parse()?;
    let pid = ingest(repo, &bytes, format, &args.encoding, args.new_pid, &args.message)?;
    if json {
        println!("{}", serde_json::json!({ "pid": pid }));
    } else {
        println!("{} Ingested {}", "✓".green().bold(), pid.as_str().yellow());
    }
    Ok(())
}

fn cmd_export(repo: &Repository, args: ExportArgs) -> anyhow::Result<()> {
    let pid = parse_pid(&args.pid)?;
    let as_of = parse_as_of(args.as_of.as_deref())?;
    let bytes = repo.manager.export(&pid, as_of.as_ref())?;
    write_output(args.output.as_deref(), &bytes)
}

fn cmd_purge(repo: &Repository, args: PurgeArgs, json: bool) -> anyhow::Result<()> {
    let pid = parse_pid(&args.pid)?;
    let mut writer = repo.manager.get_writer(&pid)?;
    let purged = repo.manager.do_commit(&mut writer, &args.message, true);
    repo.manager.release_writer(writer);
    purged?;
    if json {
        println!("{}", serde_json::json!({ "purged": pid }));
    } else {
        println!("{} Purged {}", "✓".green().bold(), pid.as_str().yellow());
    }
    Ok(())
}

fn cmd_methods(repo: &Repository, args: MethodsArgs, json: bool) -> anyhow::Result<()> {
    let pid = parse_pid(&args.pid)?;
    let as_of = parse_as_of(args.as_of.as_deref())?;
    let methods = repo.resolver.get_object_methods(&pid, as_of.as_ref())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&methods)?);
        return Ok(());
    }
    let mut bdef: Option<&Pid> = None;
    for m in &methods {
        if bdef != Some(&m.bdef_pid) {
            println!("{}", m.bdef_pid.as_str().cyan().bold());
            bdef = Some(&m.bdef_pid);
        }
        let parms: Vec<String> = m
            .parms
            .iter()
            .map(|p| match (&p.default_value, p.required) {
                (Some(d), _) => format!("{}={}", p.name, d),
                (None, true) => format!("{}!", p.name),
                (None, false) => p.name.clone(),
            })
            .collect();
        println!("  {} ({})", m.method_name.yellow(), parms.join(", ").dimmed());
    }
    Ok(())
}

fn cmd_disseminate(repo: &Repository, args: DisseminateArgs, json: bool) -> anyhow::Result<()> {
    let pid = parse_pid(&args.pid)?;
    let as_of = parse_as_of(args.as_of.as_deref())?;
    let parms = parse_parms(&args.parms)?;
    let stream = repo
        .resolver
        .resolve(&pid, &args.bdef, &args.method, &parms, as_of.as_ref())?;

    if json {
        let properties: BTreeMap<_, _> = stream
            .properties
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        let body = if stream.is_redirect() {
            serde_json::json!({ "redirect": String::from_utf8_lossy(&stream.bytes) })
        } else {
            serde_json::json!({ "bytes": stream.bytes.len() })
        };
        println!(
            "{}",
            serde_json::json!({ "mime_type": stream.mime_type, "body": body, "properties": properties })
        );
        if stream.is_redirect() || args.output.is_none() {
            return Ok(());
        }
    } else if stream.is_redirect() {
        println!("Redirect: {}", String::from_utf8_lossy(&stream.bytes).blue());
        return Ok(());
    } else if args.output.is_some() {
        eprintln!("{} {} bytes", stream.mime_type.cyan(), stream.bytes.len());
    }
    for p in &stream.properties {
        eprintln!("{} {}: {}", "warning:".yellow(), p.name, p.value);
    }
    write_output(args.output.as_deref(), &stream.bytes)
}

fn cmd_next_pid(repo: &Repository, args: NextPidArgs, json: bool) -> anyhow::Result<()> {
    let pids = repo
        .manager
        .get_next_pid(args.count, args.namespace.as_deref())?;
    if json {
        println!("{}", serde_json::to_string(&pids)?);
    } else {
        for pid in &pids {
            println!("{}", pid.as_str());
        }
    }
    Ok(())
}

fn cmd_find(repo: &Repository, args: FindArgs, json: bool) -> anyhow::Result<()> {
    let query = match &args.terms {
        Some(terms) => FieldQuery::Terms(terms.clone()),
        None => {
            let mut conditions = Vec::new();
            for (operator, pairs) in [(Operator::Eq, &args.equals), (Operator::Has, &args.has)] {
                for (field, value) in parse_parms(pairs)? {
                    conditions.push(Condition::new(field, operator, value));
                }
            }
            FieldQuery::Conditions(conditions)
        }
    };

    let mut page = repo.manager.find_objects(&args.fields, args.max, &query)?;
    let total = page.complete_list_size;
    let mut found: Vec<ObjectFields> = std::mem::take(&mut page.objects);
    while let Some(token) = page.token.take() {
        page = repo.manager.resume_find_objects(&token)?;
        found.append(&mut page.objects);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }
    for object in &found {
        println!("{}", object.pid.as_str().yellow());
        for (field, values) in &object.values {
            if field != "pid" {
                println!("  {}: {}", field.dimmed(), values.join("; "));
            }
        }
    }
    println!("{} of {} objects", found.len(), total);
    Ok(())
}

fn cmd_rebuild(repo: &Repository, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::json!({ "indexed": repo.indexed }));
    } else {
        println!("{} Registered and indexed {} objects", "✓".green().bold(), repo.indexed);
    }
    Ok(())
}

fn cmd_recover(repo: &Repository, json: bool) -> anyhow::Result<()> {
    let report = repo.manager.recover()?;
    if json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(job, error)| serde_json::json!({ "job": job, "error": error }))
            .collect();
        println!(
            "{}",
            serde_json::json!({ "replayed": report.replayed, "failed": failed })
        );
        return Ok(());
    }
    for job in &report.replayed {
        println!("  {} {} {}", "replayed".green(), job.action, job.pid.as_str());
    }
    for (job, error) in &report.failed {
        println!("  {} {} {}: {}", "failed".red(), job.action, job.pid.as_str(), error);
    }
    if report.failed.is_empty() {
        println!("{} {} jobs replayed", "✓".green().bold(), report.replayed.len());
        Ok(())
    } else {
        bail!("{} replication jobs still failing", report.failed.len())
    }
}
