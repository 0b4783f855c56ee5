//! Purpose: `vistascope` CLI entry point and top-level command dispatch.
//! Role: Binary crate; parses args and maps core errors to stable exit codes.
//! Invariants: Successful command output goes to stdout; diagnostics go to stderr.
//! Invariants: Exit code mapping is stable (see `to_exit_code`).
//! Invariants: All store access flows through the library's read-only API.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum, ValueHint};
use serde::Serialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod store_paths;

use store_paths::{STORE_ENV, resolve_store_path};
use vistascope::api::aggregate::DEFAULT_SITE;
use vistascope::api::{
    AggregateOptions, Aggregator, Candidate, DisplayOptions, Error, ErrorKind, FileListing, GlobalEntry,
    GlobalListing, GlobalPath, Listing, NodeView, Page, PatientIdentity, PatientRecord, PatientResolver, Policy,
    RpcDefinition, RpcResolver, SafeReader, SearchOutcome, SnapshotStore, StaffMember, StaffResolver, list_files,
    list_globals, to_exit_code,
};
use vistascope::core::piece;
use vistascope::notice::{Notice, notice_json, truncation_notice, unredacted_notice};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let ctx = RunContext {
        store_path: resolve_store_path(cli.store, std::env::var_os(STORE_ENV)),
        json: cli.json,
        color_mode,
    };

    command_dispatch::dispatch_command(cli.command, &ctx)
        .map_err(add_store_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    name = "vistascope",
    version,
    about = "Read-only explorer for VistA globals",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Every command is read-only. Globals outside the allowlist are refused.

Mental model:
  - `explore` walks raw globals (sensitive ones are redacted by default)
  - `patient`, `staff`, `rpc`, `files` decode FileMan records
  - `aggregate` merges several lookups into one patient record
"#,
    after_help = r#"EXAMPLES
  $ vistascope explore --global ^DIC --max-nodes 5
  $ vistascope patient 1
  $ vistascope rpc --name "ORWPT SELECT"
  $ vistascope aggregate --search SMITH --json

LEARN MORE
  $ vistascope <command> --help"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Store snapshot file (default: $VISTASCOPE_STORE, else ~/.vistascope/store.json)",
        value_hint = ValueHint::FilePath
    )]
    store: Option<PathBuf>,
    #[arg(long, global = true, help = "Emit JSON instead of human-readable text")]
    json: bool,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

struct RunContext {
    store_path: PathBuf,
    json: bool,
    color_mode: ColorMode,
}

impl RunContext {
    fn open_store(&self) -> Result<SnapshotStore, Error> {
        SnapshotStore::load(&self.store_path)
    }

    fn store_label(&self) -> String {
        self.store_path.display().to_string()
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(
        about = "Walk an allowlisted global",
        after_help = r#"EXAMPLES
  $ vistascope explore --global ^XWB --subscript 8994 --max-nodes 10
  $ vistascope explore --global DPT --subscript 1 --include-phi
  $ vistascope explore --list-allowlist

NOTES
  - ^DPT and ^VA are redacted unless --include-phi is given
  - --allow extends the allowlist for this invocation only"#
    )]
    Explore {
        #[arg(long, required_unless_present = "list_allowlist", help = "Global name, with or without ^")]
        global: Option<String>,
        #[arg(long = "subscript", help = "Repeatable subscript below the global")]
        subscripts: Vec<String>,
        #[arg(long, default_value_t = 20, help = "Maximum children to list (>= 1)")]
        max_nodes: usize,
        #[arg(long, help = "Show values as escaped bytes")]
        raw: bool,
        #[arg(long, help = "Show sensitive content instead of redaction summaries")]
        include_phi: bool,
        #[arg(long, help = "Print the allowlist and exit")]
        list_allowlist: bool,
        #[arg(long, help = "Repeatable extra global to allow")]
        allow: Vec<String>,
    },
    #[command(about = "Look up or page through PATIENT (#2) entries")]
    Patient {
        #[arg(help = "Patient IEN (DFN); omit to page")]
        ien: Option<String>,
        #[arg(long, default_value_t = 10, help = "Entries per page")]
        show: usize,
        #[arg(long, default_value = "0", help = "Page after this IEN")]
        start: String,
    },
    #[command(about = "Look up or page through NEW PERSON (#200) entries")]
    Staff {
        #[arg(help = "Staff IEN; omit to page")]
        ien: Option<String>,
        #[arg(long, default_value_t = 10, help = "Entries per page")]
        show: usize,
        #[arg(long, default_value = "0", help = "Page after this IEN")]
        start: String,
    },
    #[command(
        about = "Inspect remote procedure definitions (#8994)",
        after_help = r#"EXAMPLES
  $ vistascope rpc --name "ORWPT SELECT"
  $ vistascope rpc --prefix ORWPT --limit 5 --detail"#
    )]
    Rpc {
        #[arg(long, conflicts_with = "prefix", help = "Exact procedure name")]
        name: Option<String>,
        #[arg(long, help = "Name prefix to list")]
        prefix: Option<String>,
        #[arg(long, default_value_t = 20, help = "Maximum procedures to list")]
        limit: usize,
        #[arg(long, help = "Show full definitions when listing")]
        detail: bool,
    },
    #[command(about = "List FileMan files from ^DIC")]
    Files {
        #[arg(long, default_value = "", help = "File name prefix")]
        prefix: String,
        #[arg(long, default_value_t = 50, help = "Maximum files to list")]
        limit: usize,
    },
    #[command(
        about = "List global roots named by the data dictionary, with their files",
        after_help = r#"EXAMPLES
  $ vistascope globals
  $ vistascope globals --prefix VA --limit 10"#
    )]
    Globals {
        #[arg(long, default_value = "", help = "Global name prefix (leading ^ optional)")]
        prefix: String,
        #[arg(long, default_value_t = 125, help = "Maximum globals to list")]
        limit: usize,
    },
    #[command(
        about = "Aggregate one patient's record across domains",
        group(ArgGroup::new("target").required(true).args(["patient_id", "search"])),
        after_help = r#"EXAMPLES
  $ vistascope aggregate --patient-id 1
  $ vistascope aggregate --search SMITH --concurrent --deadline-ms 2000

NOTES
  - Exit code 8 means the record is partial; failed domains are listed under errors
  - A search with several matches lists candidates without aggregating"#
    )]
    Aggregate {
        #[arg(long, help = "Patient DFN")]
        patient_id: Option<String>,
        #[arg(long, help = "Patient name search term")]
        search: Option<String>,
        #[arg(long, default_value = DEFAULT_SITE, help = "Site code recorded in identifiers")]
        site: String,
        #[arg(long, help = "Total time budget in milliseconds")]
        deadline_ms: Option<u64>,
        #[arg(long, help = "Run domain lookups on separate threads")]
        concurrent: bool,
    },
    #[command(about = "Decode FileMan or HOROLOG date values")]
    Date {
        #[command(subcommand)]
        command: DateCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DateCommand {
    #[command(about = "Decode a FileMan date (YYYMMDD[.HHMMSS])")]
    Fileman {
        #[arg(allow_hyphen_values = true)]
        raw: String,
    },
    #[command(about = "Decode a HOROLOG value (days,seconds)")]
    Horolog {
        #[arg(allow_hyphen_values = true)]
        raw: String,
    },
}

fn explore_path(global: &str, subscripts: &[String]) -> Result<GlobalPath, Error> {
    let mut path = GlobalPath::new(global)?;
    for sub in subscripts {
        if sub.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("subscripts must not be empty")
                .with_hint("Drop the empty --subscript or give it a value."));
        }
        path.push(sub.as_str());
    }
    Ok(path)
}

fn explore_policy(allow: &[String]) -> Policy {
    allow
        .iter()
        .fold(Policy::default(), |policy, global| policy.allow(global))
}

fn aggregate_options(site: String, deadline_ms: Option<u64>, concurrent: bool) -> AggregateOptions {
    AggregateOptions {
        site,
        deadline: deadline_ms.map(Duration::from_millis),
        concurrent,
        ..AggregateOptions::default()
    }
}

fn add_store_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Store => err.with_hint("The store reported a fault; retry, or check the snapshot contents."),
        ErrorKind::Corrupt => err.with_hint("The snapshot is malformed. Regenerate it as {\"nodes\":[...]} JSON."),
        ErrorKind::Timeout => err.with_hint("Raise --deadline-ms or retry when the store is less busy."),
        _ => err,
    }
}

fn add_io_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Io || err.hint().is_some() {
        return err;
    }
    err.with_hint("I/O error. Check the path and file permissions.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint("This is a vistascope bug. Rerun with RUST_LOG=debug and report the command and its stderr.")
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output")
            .with_source(err)
    })
}

/// Label styles for stderr on a terminal.
#[derive(Copy, Clone, Debug)]
enum Tone {
    Fault,
    Advice,
    Info,
}

impl Tone {
    fn sgr(self) -> &'static str {
        match self {
            Tone::Fault => "1;31",
            Tone::Advice => "33",
            Tone::Info => "36",
        }
    }

    fn paint(self, label: &str, enabled: bool) -> String {
        if enabled {
            format!("\u{1b}[{}m{label}\u{1b}[0m", self.sgr())
        } else {
            label.to_string()
        }
    }
}

/// One JSON envelope per stderr line, keyed by `key` (`error` or `notice`).
fn emit_stderr_json(value: &Value, key: &str) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| {
        json!({ key: { "kind": "Internal", "message": "json encode failed" } }).to_string()
    });
    eprintln!("{line}");
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
    } else {
        emit_stderr_json(&error_json(err), "error");
    }
}

fn notice_time_now() -> String {
    use time::format_description::well_known::Rfc3339;
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = Tone::Info.paint("notice:", color_mode.use_color(is_tty));
        eprintln!("{label} {} (store: {})", notice.message, notice.store);
    } else {
        emit_stderr_json(&notice_json(notice), "notice");
    }
}

fn emit_truncation(ctx: &RunContext, cmd: &str, path: &str, limit: usize) {
    let notice = truncation_notice(notice_time_now(), cmd, &ctx.store_label(), path, limit);
    emit_notice(&notice, ctx.color_mode);
}

fn emit_unredacted(ctx: &RunContext, global: &str) {
    let notice = unredacted_notice(notice_time_now(), "explore", &ctx.store_label(), global);
    emit_notice(&notice, ctx.color_mode);
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Policy => "blocked by policy".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Store => "store fault".to_string(),
        ErrorKind::Format => "malformed value".to_string(),
        ErrorKind::Timeout => "deadline exceeded".to_string(),
        ErrorKind::Partial => "partial result".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
    }
}

/// Display chain of the wrapped sources, outermost first.
fn error_causes(err: &Error) -> Vec<String> {
    std::iter::successors(err.source(), |cause: &&(dyn StdError + 'static)| (*cause).source())
        .map(ToString::to_string)
        .collect()
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'static str,
    exit_code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    causes: Vec<String>,
}

fn error_json(err: &Error) -> Value {
    let body = ErrorBody {
        kind: err.kind().as_str(),
        exit_code: to_exit_code(err.kind()),
        message: error_message(err),
        hint: err.hint(),
        path: err.path(),
        causes: error_causes(err),
    };
    json!({ "error": body })
}

/// `error: <message> [<kind>]`, then indented hint, node and cause lines.
fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {} [{}]",
        Tone::Fault.paint("error:", use_color),
        error_message(err),
        err.kind().as_str()
    )];
    if let Some(path) = err.path() {
        lines.push(format!("  {} {path}", Tone::Advice.paint("node:", use_color)));
    }
    for cause in error_causes(err) {
        lines.push(format!("  {} {cause}", Tone::Advice.paint("cause:", use_color)));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("  {} {hint}", Tone::Advice.paint("hint:", use_color)));
    }
    lines.join("\n")
}

/// First non-empty line of clap's rendering, without its `error:` label.
fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").map_or(line, str::trim).to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `vistascope --help`.".to_string();
    };
    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "vistascope") else {
        return "Try `vistascope --help`.".to_string();
    };
    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|t| !(t.starts_with('-') || t.starts_with('<') || t.starts_with('[')))
        .copied()
        .collect();
    if parts.is_empty() {
        return "Try `vistascope --help`.".to_string();
    }
    format!("Try `vistascope {} --help`.", parts.join(" "))
}

fn print_node(node: &NodeView) {
    let marker = if node.has_subtree { " [+]" } else { "" };
    println!("{} = {}{marker}", node.path, node.display);
}

fn print_listing(listing: &Listing) {
    if listing.entries.is_empty() {
        println!("  (no children)");
        return;
    }
    for entry in &listing.entries {
        let marker = if entry.has_subtree { " [+]" } else { "" };
        println!("  {} = {}{marker}", entry.path, entry.display);
    }
    if listing.truncated {
        println!("  ... (more than {} children)", listing.max_nodes);
    }
}

fn print_patient(patient: &PatientIdentity) {
    println!("DFN:   {}", patient.ien);
    println!("Name:  {}", patient.name);
    println!("Sex:   {}", patient.sex);
    println!("DOB:   {}", patient.dob);
    println!("SSN:   {}", patient.ssn);
}

fn print_patient_page(page: &Page<PatientIdentity>) {
    for patient in &page.items {
        println!("{:<8} {:<30} {:<2} {}", patient.ien, patient.name, patient.sex, patient.dob);
    }
    if page.items.is_empty() {
        println!("(no patients)");
    }
}

fn print_staff(member: &StaffMember) {
    let title = if member.title.is_empty() { "(no title)" } else { member.title.as_str() };
    println!("{:<8} {:<30} {title}", member.ien, member.name);
}

fn print_rpc(def: &RpcDefinition) {
    println!("RPC:         {} (IEN {})", def.name, def.ien);
    println!("Entry point: {}", def.entry_point);
    println!("Returns:     {}", def.return_type);
    println!("Description:");
    for line in def.description.lines() {
        println!("  {line}");
    }
    if def.parameters.is_empty() {
        println!("Parameters:  (none)");
    } else {
        println!("Parameters:");
        for param in &def.parameters {
            let required = if param.required { " (required)" } else { "" };
            println!("  - {} type {} length {}{required}", param.name, param.kind, param.length);
        }
    }
}

fn print_files(listing: &FileListing) {
    for file in &listing.files {
        println!("File # {:<12} {:<35} {}", file.number, file.name, file.global_root);
    }
    if listing.files.is_empty() {
        println!("(no files)");
    }
}

/// Up to three `#number name` references, then a count of the rest.
fn file_refs_summary(entry: &GlobalEntry) -> String {
    let mut shown: Vec<String> = entry
        .files
        .iter()
        .take(3)
        .map(|file| format!("#{} {}", file.number, file.name))
        .collect();
    if entry.files.len() > 3 {
        shown.push(format!("+{} more", entry.files.len() - 3));
    }
    shown.join("; ")
}

fn print_globals(listing: &GlobalListing) {
    let width = listing.globals.iter().map(|g| g.global.len()).max().unwrap_or(0) + 2;
    for (idx, entry) in listing.globals.iter().enumerate() {
        println!("{:4}. {:<width$}[{}]", idx + 1, entry.global, file_refs_summary(entry));
    }
    if listing.globals.is_empty() {
        println!("(no globals)");
    }
}

fn print_candidates(candidates: &[Candidate]) {
    println!("Found {} patient(s):", candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        println!("  {}. {} (DFN: {})", idx + 1, candidate.name, candidate.dfn);
    }
}

fn print_list<T>(label: &str, items: Option<&Vec<T>>, render: impl Fn(&T) -> String) {
    match items {
        None => println!("\n{label}: (unavailable)"),
        Some(items) if items.is_empty() => println!("\n{label} (0)\n  (none)"),
        Some(items) => {
            println!("\n{label} ({})", items.len());
            for item in items {
                println!("  - {}", render(item));
            }
        }
    }
}

fn print_record(record: &PatientRecord) {
    println!("PATIENT RECORD - Site {}", record.site);
    println!("\nDEMOGRAPHICS:");
    match &record.demographics {
        Some(demo) => {
            println!("  Name:  {}", demo.name);
            println!("  Sex:   {}", demo.sex);
            println!("  DOB:   {}", demo.dob);
            let age = demo.age.map(|age| age.to_string()).unwrap_or_else(|| "(unknown)".to_string());
            println!("  Age:   {age}");
        }
        None => println!("  (unavailable)"),
    }
    println!("\nIDENTIFIERS:");
    match &record.identifiers {
        Some(ids) => {
            println!("  DFN:   {}", ids.dfn);
            println!("  SSN:   {}", ids.ssn);
            let icn = if ids.icn.is_empty() { "(not recorded)" } else { ids.icn.as_str() };
            println!("  ICN:   {icn}");
        }
        None => println!("  (unavailable)"),
    }
    print_list("MEDICATIONS", record.medications.as_ref(), |med| {
        format!("Rx {} {} [{}]", med.rx_number, med.drug_name, med.status)
    });
    print_list("VITAL SIGNS", record.vitals.as_ref(), |vital| {
        format!("{}: {} ({})", vital.type_name, vital.rate, vital.taken)
    });
    print_list("ALLERGIES", record.allergies.as_ref(), |allergy| allergy.reactant.clone());
    print_list("PROBLEMS", record.problems.as_ref(), |problem| {
        format!("{} [{}]", problem.narrative, problem.status)
    });
    if !record.errors.is_empty() {
        println!("\nERRORS:");
        for error in &record.errors {
            println!("  ! {}: {}", error.domain.label(), error.message);
        }
    }
}

/// Prints the record; a partial record is reported on stderr with exit code 8.
fn finish_record(ctx: &RunContext, record: &PatientRecord) -> RunOutcome {
    match record.partial_error() {
        Some(err) => {
            emit_error(&err, ctx.color_mode);
            RunOutcome::with_code(to_exit_code(err.kind()))
        }
        None => RunOutcome::ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Cli, Error, ErrorKind, aggregate_options, clap_error_summary, error_json, error_text, explore_path,
        explore_policy,
    };
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[1;31merror:\u{1b}[0m"));
        assert!(plain.starts_with("error: bad input [Usage]"));
        assert!(!plain.contains("\u{1b}["));
    }

    #[test]
    fn error_json_carries_kind_hint_and_path() {
        let err = Error::new(ErrorKind::Policy)
            .with_message("blocked")
            .with_hint("Allowed set: ^DIC")
            .with_path("^SECRET");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Policy");
        assert_eq!(value["error"]["exit_code"], 4);
        assert_eq!(value["error"]["hint"], "Allowed set: ^DIC");
        assert_eq!(value["error"]["path"], "^SECRET");
        assert!(value["error"].get("causes").is_none());
    }

    #[test]
    fn error_text_lists_every_cause() {
        let io = std::io::Error::other("disk gone");
        let err = Error::new(ErrorKind::Io).with_message("failed to read store snapshot").with_source(io);
        let text = error_text(&err, false);
        assert!(text.starts_with("error: failed to read store snapshot [Io]"));
        assert!(text.contains("  cause: disk gone"));
    }

    #[test]
    fn clap_summary_drops_the_error_label() {
        let err = Cli::try_parse_from(["vistascope", "files", "--limit", "many"]).expect_err("bad limit");
        let summary = clap_error_summary(&err);
        assert!(!summary.starts_with("error:"), "{summary}");
        assert!(summary.contains("many"), "{summary}");
    }

    #[test]
    fn explore_path_rejects_empty_subscripts() {
        let path = explore_path("XWB", &["8994".to_string(), "B".to_string()]).expect("path");
        assert_eq!(path.to_string(), "^XWB(8994,\"B\")");
        let err = explore_path("XWB", &[String::new()]).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn allow_flags_extend_the_default_policy() {
        let policy = explore_policy(&["LR".to_string()]);
        assert!(policy.is_allowed("^LR"));
        assert!(policy.is_allowed("^DPT"));
    }

    #[test]
    fn aggregate_flags_map_to_options() {
        let options = aggregate_options("640".to_string(), Some(250), true);
        assert_eq!(options.site, "640");
        assert_eq!(options.deadline, Some(Duration::from_millis(250)));
        assert!(options.concurrent);
    }

    #[test]
    fn aggregate_requires_a_target() {
        assert!(Cli::try_parse_from(["vistascope", "aggregate"]).is_err());
        assert!(Cli::try_parse_from(["vistascope", "aggregate", "--patient-id", "1", "--search", "X"]).is_err());
        assert!(Cli::try_parse_from(["vistascope", "aggregate", "--search", "SMITH", "--json"]).is_ok());
    }
}
