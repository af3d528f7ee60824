use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use rulebook_profile::{SchematronError, SchematronRules, SuppressionResult, ValidationProfile};
use rulebook_reload::{ReloadReport, ReloadResult, ReloadStatus};
use rulebook_types::{
    AssetVersion, FileChangeStatus, FileDiffDetail, FileDiffSummary, SyncPreview, WarningSeverity,
};
use rulebook_versioning::{Rulebook, ServiceConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    debug!(config = %cli.config.display(), packages = config.packages.len(), "configuration loaded");
    let rulebook = Rulebook::open(&config)?;
    let out = Output(cli.format);

    match cli.command {
        Command::Shell => cmd_shell(&rulebook, out),
        command => dispatch(&rulebook, out, command),
    }
}

fn dispatch(rb: &Rulebook, out: Output, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Sync(args) => cmd_sync(rb, out, args),
        Command::Approve(args) => cmd_approve(rb, out, args),
        Command::Reject(args) => {
            rb.service.reject_pending(&args.package)?;
            out.emit(&json!({ "package": args.package, "rejected": true }), |_| {
                println!("{} Rejected pending staging for {}", "✓".green().bold(), args.package.to_string().yellow())
            })
        }
        Command::Versions(args) => {
            let versions = rb.service.list_versions(args.package.as_ref())?;
            out.emit(&versions, |v| print_versions(v))
        }
        Command::VersionDiff(args) => {
            let files = rb.service.get_version_diff(&args.version)?;
            out.emit(&files, |f| print_files(f, true))
        }
        Command::VersionFileDiff(args) => {
            let detail = rb.service.get_file_diff(&args.version, &args.path)?;
            out.emit(&detail, print_file_diff)
        }
        Command::Pending(args) => cmd_pending(rb, out, args),
        Command::PendingFileDiff(args) => {
            let detail = rb.service.get_pending_file_diff(&args.package, &args.path)?;
            out.emit(&detail, print_file_diff)
        }
        Command::Profile(args) => cmd_profile(rb, out, args.action),
        Command::GlobalRules(args) => cmd_global_rules(rb, out, args.action),
        Command::Resolve(args) => cmd_resolve(rb, out, args.target),
        Command::Suppress(args) => cmd_suppress(rb, out, args),
        Command::Reload => {
            let report = rb.coordinator.reload();
            out.emit(&report, print_reload_report)?;
            if report.status == ReloadStatus::Failed {
                anyhow::bail!("reload failed");
            }
            Ok(())
        }
        Command::Shell => {
            println!("Already in a shell.");
            Ok(())
        }
    }
}

/// Renders command results as colored text or pretty JSON.
#[derive(Clone, Copy)]
struct Output(OutputFormat);

impl Output {
    fn emit<T: Serialize + ?Sized>(self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.0 {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

fn cmd_sync(rb: &Rulebook, out: Output, args: SyncArgs) -> anyhow::Result<()> {
    if let Some(package) = args.package {
        let preview = rb.service.sync_to_staging(&package)?;
        return out.emit(&preview, print_preview);
    }

    let outcome = rb.service.sync_all_to_staging();
    let failures: Vec<_> = outcome
        .failures
        .iter()
        .map(|(package, error)| json!({ "package": package, "error": error.to_string() }))
        .collect();
    out.emit(&json!({ "previews": outcome.previews, "failures": failures }), |_| {
        for preview in &outcome.previews {
            print_preview(preview);
            println!();
        }
        for (package, error) in &outcome.failures {
            println!("{} {}: {}", "✗".red().bold(), package.to_string().yellow(), error);
        }
    })?;

    if !outcome.is_complete() {
        anyhow::bail!("{} of {} packages failed to sync", outcome.failures.len(), rb.service.packages().count());
    }
    Ok(())
}

fn cmd_approve(rb: &Rulebook, out: Output, args: PackageArgs) -> anyhow::Result<()> {
    let outcome = rb.service.approve_pending(&args.package)?;
    out.emit(&outcome, |o| {
        println!(
            "{} Approved {} as {}",
            "✓".green().bold(),
            o.version.display_name.bold(),
            o.version.id.to_string().yellow().bold()
        );
        println!("  Changes: {}", o.version.summary);
        println!("  Snapshot: {}", o.version.snapshot.dimmed());
        print_reload_report(&o.reload);
        if !o.reload.is_ok() {
            println!(
                "{} The version is committed; run {} once the failing components are fixed.",
                "!".yellow().bold(),
                "rulebook reload".bold()
            );
        }
    })
}

fn cmd_pending(rb: &Rulebook, out: Output, args: PendingArgs) -> anyhow::Result<()> {
    match args.package {
        Some(package) => {
            let preview = rb.service.get_pending_preview(&package)?;
            out.emit(&preview, print_preview)
        }
        None => {
            let previews = rb.service.get_all_pending_previews()?;
            out.emit(&previews, |all| {
                if all.is_empty() {
                    println!("No pending staging.");
                }
                for preview in all {
                    print_preview(preview);
                    println!();
                }
            })
        }
    }
}

/// Serve commands read from stdin until EOF or `exit`.
fn cmd_shell(rb: &Rulebook, out: Output) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("{} ", "rulebook>".cyan().bold());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => return Ok(()),
            _ => {}
        }

        match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => {
                if let Err(e) = dispatch(rb, out, parsed.command) {
                    eprintln!("{} {e:#}", "error:".red().bold());
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

fn cmd_profile(rb: &Rulebook, out: Output, action: ProfileAction) -> anyhow::Result<()> {
    match action {
        ProfileAction::List => {
            let profiles = rb.profiles.list_profiles();
            let invalid = rb.profiles.invalid_profiles();
            out.emit(&json!({ "profiles": profiles, "invalid": invalid }), |_| {
                if profiles.is_empty() && invalid.is_empty() {
                    println!("No profiles.");
                }
                for profile in &profiles {
                    println!(
                        "{}  {}  {}",
                        profile.name.bold(),
                        profile.chain.join(" -> ").dimmed(),
                        profile.description.as_deref().unwrap_or("")
                    );
                }
                for (name, reason) in &invalid {
                    println!("{}  {}", name.red().bold(), reason.red());
                }
            })
        }
        ProfileAction::Show { name, raw } => {
            if raw {
                let profile = rb
                    .profiles
                    .raw_profile(&name)
                    .with_context(|| format!("no profile named '{name}'"))?;
                out.emit(&profile, |p| print_yaml(p))
            } else {
                let profile = rb.profiles.get_profile(&name)?;
                out.emit(&profile, |p| print_yaml(p))
            }
        }
        ProfileAction::Save { name, file } => {
            let profile: ValidationProfile = read_yaml(&file)?;
            let result = rb.profiles.save_profile(&name, profile)?;
            out.emit(&result, |r| {
                println!("{} Saved profile {}", "✓".green().bold(), name.bold());
                print_reload_result(r);
            })
        }
        ProfileAction::Delete { name } => {
            let deleted = rb.profiles.delete_profile(&name)?;
            out.emit(&json!({ "profile": name, "deleted": deleted }), |_| {
                if deleted {
                    println!("{} Deleted profile {}", "✓".green().bold(), name.bold());
                } else {
                    println!("No profile named {}", name.bold());
                }
            })
        }
    }
}

fn cmd_global_rules(rb: &Rulebook, out: Output, action: GlobalRulesAction) -> anyhow::Result<()> {
    match action {
        GlobalRulesAction::Show => {
            let rules = rb.profiles.get_global_schematron_rules();
            out.emit(&rules, |r| print_yaml(r))
        }
        GlobalRulesAction::Save { file } => {
            let rules: SchematronRules = read_yaml(&file)?;
            let result = rb.profiles.save_global_schematron_rules(rules)?;
            out.emit(&result, |r| {
                println!("{} Saved global Schematron rules", "✓".green().bold());
                print_reload_result(r);
            })
        }
    }
}

fn cmd_resolve(rb: &Rulebook, out: Output, target: ResolveTarget) -> anyhow::Result<()> {
    match target {
        ResolveTarget::Overrides { profile, schema_type } => {
            let overrides = rb.profiles.resolve_xsd_overrides(&profile, &schema_type)?;
            out.emit(&overrides, |o| {
                if o.is_empty() {
                    println!("No XSD overrides for {schema_type}.");
                } else {
                    print_yaml(o);
                }
            })
        }
        ResolveTarget::Rules { profile, schematron_type } => {
            let rules = rb.profiles.resolve_schematron_rules(&profile, &schematron_type)?;
            out.emit(&rules, |r| {
                if r.is_empty() {
                    println!("No custom Schematron rules for {schematron_type}.");
                } else {
                    print_yaml(r);
                }
            })
        }
    }
}

fn cmd_suppress(rb: &Rulebook, out: Output, args: SuppressArgs) -> anyhow::Result<()> {
    let types: BTreeSet<String> = args.types.into_iter().collect();
    let profile = args.profile.as_deref();

    if args.xsd {
        let messages: Vec<String> = read_json(&args.errors)?;
        let total = messages.len();
        let remaining = rb.profiles.apply_xsd_suppressions(messages, profile, &args.suppress, &types)?;
        return out.emit(&remaining, |r| {
            println!("{} of {} XSD messages suppressed", total - r.len(), total);
            for message in r {
                println!("  {} {}", "•".red(), message);
            }
        });
    }

    let errors: Vec<SchematronError> = read_json(&args.errors)?;
    let result = rb
        .profiles
        .apply_schematron_suppressions(errors, profile, &args.suppress, &types)?;
    out.emit(&result, print_suppression_result)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_preview(preview: &SyncPreview) {
    println!(
        "{} {} staged as {}",
        "●".cyan().bold(),
        preview.display_name.bold(),
        preview.target_version.to_string().yellow()
    );
    println!("  Staged at: {}", preview.staged_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Changes: {}", preview.summary);
    print_files(&preview.files, false);

    for warning in &preview.fetch_warnings {
        println!("  {} {}", "fetch:".yellow(), warning);
    }
    for warning in &preview.suppression_warnings {
        let label = match warning.severity {
            WarningSeverity::Critical => warning.severity.to_string().red().bold(),
            WarningSeverity::Warning => warning.severity.to_string().yellow().bold(),
            WarningSeverity::Info => warning.severity.to_string().normal(),
        };
        println!("  {} [{}] {}", label, warning.file, warning.message);
    }
    if !preview.has_changes() {
        println!("  {}", "Nothing to approve; the staged tree matches the live tree.".dimmed());
    }
}

fn print_files(files: &[FileDiffSummary], include_unchanged: bool) {
    for file in files {
        let marker = match file.status {
            FileChangeStatus::Added => "+".green().bold(),
            FileChangeStatus::Removed => "-".red().bold(),
            FileChangeStatus::Modified => "~".yellow().bold(),
            FileChangeStatus::Unchanged if include_unchanged => "=".dimmed(),
            FileChangeStatus::Unchanged => continue,
        };
        println!("  {} {}", marker, file.path);
    }
}

fn print_file_diff(detail: &FileDiffDetail) {
    println!("{} ({})", detail.path.bold(), detail.status);
    if detail.is_binary {
        println!("  {}", "Binary or oversized file; no textual diff.".dimmed());
        return;
    }
    if let Some(diff) = &detail.unified_diff {
        for line in diff.lines() {
            if line.starts_with("+++") || line.starts_with("---") {
                println!("{}", line.bold());
            } else if line.starts_with('+') {
                println!("{}", line.green());
            } else if line.starts_with('-') {
                println!("{}", line.red());
            } else if line.starts_with("@@") {
                println!("{}", line.cyan());
            } else {
                println!("{line}");
            }
        }
        println!("  +{} -{}", detail.additions, detail.deletions);
        return;
    }
    match (&detail.old_content, &detail.new_content) {
        (None, Some(content)) => print!("{}", content.green()),
        (Some(content), None) => print!("{}", content.red()),
        _ => println!("  {}", "No changes.".dimmed()),
    }
}

fn print_versions(versions: &[AssetVersion]) {
    if versions.is_empty() {
        println!("No versions.");
    }
    for version in versions {
        println!(
            "{}  {}  {}  {}",
            version.id.to_string().yellow().bold(),
            version.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            version.display_name,
            version.summary
        );
    }
}

fn print_reload_report(report: &ReloadReport) {
    println!("Reload {} in {} ms", status_label(report.status), report.duration_ms);
    for result in &report.components {
        print_reload_result(result);
    }
}

fn print_reload_result(result: &ReloadResult) {
    println!(
        "  {} {} ({} loaded, {} ms)",
        status_label(result.status),
        result.component.bold(),
        result.loaded_count,
        result.duration_ms
    );
    for error in &result.errors {
        println!("      {}", error.red());
    }
}

fn status_label(status: ReloadStatus) -> colored::ColoredString {
    match status {
        ReloadStatus::Ok => status.to_string().green().bold(),
        ReloadStatus::Partial => status.to_string().yellow().bold(),
        ReloadStatus::Failed => status.to_string().red().bold(),
    }
}

fn print_suppression_result(result: &SuppressionResult) {
    println!(
        "{} suppressed, {} active{}",
        result.suppressed_count.to_string().green().bold(),
        result.active.len().to_string().bold(),
        result
            .profile
            .as_deref()
            .map(|p| format!(" (profile {p})"))
            .unwrap_or_default()
    );
    for error in &result.active {
        println!(
            "  {} [{}] {}",
            "•".red(),
            error.rule_id.as_deref().unwrap_or("-").yellow(),
            error.message
        );
    }
}

fn print_yaml<T: Serialize + ?Sized>(value: &T) {
    match serde_yaml_ng::to_string(value) {
        Ok(text) => print!("{text}"),
        Err(e) => eprintln!("{} {e}", "error:".red().bold()),
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml_ng::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
