//! notefold - merge and split Markdown notes while keeping links, footnotes
//! and front matter intact

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use notefold_core::vault::LinkIndex;
use notefold_core::{
    ComposeAction, ComposeOutcome, ComposeReport, ComposeRequest, Composer, Config, Document,
    DocumentStore, FrontmatterStrategy, FsVault, InsertMode, LineSelection, Preview, Replacement,
    ResolvedTarget, Selection, TargetChoice, TargetPicker,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Merge and split Markdown notes
#[derive(Parser, Debug)]
#[command(name = "notefold")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Vault directory
    #[arg(long, value_name = "DIR", default_value = ".")]
    vault: PathBuf,

    /// Config file (defaults to the platform config path)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a whole note into another and delete it
    Merge {
        /// Note to merge, relative to the vault
        source: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Insert before the existing content instead of after it
        #[arg(long)]
        prepend: bool,

        /// Merge sections with matching headings
        #[arg(long)]
        heading_merge: bool,

        /// Front matter strategy
        #[arg(long, value_name = "STRATEGY")]
        strategy: Option<FrontmatterStrategy>,

        /// Show the result without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Move part of a note into another, leaving a link behind
    Split {
        /// Note to split, relative to the vault
        source: String,

        /// 1-based inclusive line span, repeatable
        #[arg(long = "lines", value_name = "A:B")]
        lines: Vec<String>,

        /// Byte range, repeatable
        #[arg(long = "range", value_name = "S:E")]
        ranges: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,

        /// What replaces the moved text
        #[arg(long, value_name = "MODE")]
        replace: Option<Replacement>,

        /// Insert before the existing content instead of after it
        #[arg(long)]
        prepend: bool,

        /// Merge sections with matching headings
        #[arg(long)]
        heading_merge: bool,

        /// Show the result without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Existing note
    #[arg(long, value_name = "PATH")]
    into: Option<String>,

    /// Create a note with this title
    #[arg(long, value_name = "TITLE")]
    new: Option<String>,

    /// Configured bookmark
    #[arg(long, value_name = "NAME")]
    bookmark: Option<String>,

    /// Link text, created when it does not resolve
    #[arg(long, value_name = "LINK")]
    link: Option<String>,

    /// Alias declared in a note's front matter
    #[arg(long, value_name = "ALIAS")]
    alias: Option<String>,
}

/// Target from the command line, with an optional prompt before merging.
struct CliPicker {
    choice: Option<TargetChoice>,
    source: String,
    assume_yes: bool,
}

impl TargetPicker for CliPicker {
    fn pick(&mut self, _action: ComposeAction, _source: &str) -> Option<TargetChoice> {
        self.choice.take()
    }

    fn confirm(&mut self, action: ComposeAction, target: &ResolvedTarget) -> bool {
        if action != ComposeAction::Merge || self.assume_yes {
            return true;
        }
        print!(
            "Merge {} into {} and delete {}? [y/N] ",
            self.source, target.path, self.source
        );
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => {
            let (config, notices) = Config::load().context("Failed to load configuration")?;
            for notice in notices {
                log::debug!("{notice}");
            }
            config
        }
    };

    let vault = FsVault::open(&args.vault)
        .with_context(|| format!("Failed to open vault: {}", args.vault.display()))?;

    let (request, picker) = match args.command {
        Command::Merge {
            source,
            target,
            prepend,
            heading_merge,
            strategy,
            dry_run,
            yes,
        } => {
            apply_layout(&mut config, prepend, heading_merge);
            if let Some(strategy) = strategy {
                config.compose.frontmatter_strategy = strategy;
            }
            let choice = target_choice(&vault, target)?;
            let picker = CliPicker {
                choice: Some(choice),
                source: source.clone(),
                assume_yes: yes || dry_run,
            };
            let request = ComposeRequest::merge(source);
            (if dry_run { request.preview() } else { request }, picker)
        }
        Command::Split {
            source,
            lines,
            ranges,
            target,
            replace,
            prepend,
            heading_merge,
            dry_run,
        } => {
            apply_layout(&mut config, prepend, heading_merge);
            if let Some(replace) = replace {
                config.compose.replacement = replace;
            }
            let selection = selection(&vault, &source, &lines, &ranges)?;
            let choice = target_choice(&vault, target)?;
            let picker = CliPicker {
                choice: Some(choice),
                source: source.clone(),
                assume_yes: true,
            };
            let request = ComposeRequest::split(source, selection);
            (if dry_run { request.preview() } else { request }, picker)
        }
    };

    let composer = Composer::new(&vault, &config).context("Invalid configuration")?;
    let mut picker = picker;
    let outcome = composer
        .run(&request, &mut picker)
        .with_context(|| format!("Failed to {} {}", request.action, request.source))?;

    match outcome {
        ComposeOutcome::Done(report) => print_report(&report),
        ComposeOutcome::Previewed(preview) => print_preview(&preview),
        ComposeOutcome::Cancelled => println!("Cancelled"),
        ComposeOutcome::Rejected { path, reason } => {
            eprintln!("Refused to use {path}: {reason}");
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn apply_layout(config: &mut Config, prepend: bool, heading_merge: bool) {
    if prepend {
        config.compose.insert_mode = InsertMode::Prepend;
    }
    if heading_merge {
        config.compose.heading_merge = true;
    }
}

fn target_choice(vault: &FsVault, target: TargetArgs) -> Result<TargetChoice> {
    let choice = match target {
        TargetArgs { into: Some(path), .. } => TargetChoice::File { path },
        TargetArgs { new: Some(title), .. } => TargetChoice::NewFile { title },
        TargetArgs { bookmark: Some(name), .. } => TargetChoice::Bookmark { name },
        TargetArgs { link: Some(link), .. } => TargetChoice::UnresolvedLink { link },
        TargetArgs { alias: Some(alias), .. } => {
            let path = find_alias(vault, &alias)?;
            TargetChoice::Alias { alias, path }
        }
        _ => bail!("No target given"),
    };
    Ok(choice)
}

/// The one note declaring `alias` in its front matter.
fn find_alias(vault: &FsVault, alias: &str) -> Result<String> {
    let wanted = alias.to_lowercase();
    let matches: Vec<String> = vault
        .documents()?
        .into_iter()
        .filter(|path| {
            vault
                .metadata(path)
                .is_some_and(|meta| meta.aliases().iter().any(|a| a.to_lowercase() == wanted))
        })
        .collect();
    match matches.as_slice() {
        [path] => Ok(path.clone()),
        [] => bail!("No note has the alias {alias:?}"),
        _ => bail!("Alias {alias:?} is ambiguous: {}", matches.join(", ")),
    }
}

fn selection(
    vault: &FsVault,
    source: &str,
    lines: &[String],
    ranges: &[String],
) -> Result<Option<Selection>> {
    if lines.is_empty() && ranges.is_empty() {
        return Ok(None);
    }
    let doc = Document::load(vault, source)
        .with_context(|| format!("Failed to load document: {source}"))?;

    let mut spans = Vec::new();
    for spec in lines {
        let (first, last) = parse_span(spec)?;
        if first == 0 || last == 0 {
            bail!("Line numbers start at 1: {spec}");
        }
        let pos = doc.line_span(LineSelection {
            anchor: first - 1,
            cursor: last - 1,
        });
        spans.push((pos.start, pos.end));
    }
    for spec in ranges {
        spans.push(parse_span(spec)?);
    }
    Ok(Some(Selection::new(spans)))
}

fn parse_span(spec: &str) -> Result<(usize, usize)> {
    let (a, b) = spec
        .split_once(':')
        .with_context(|| format!("Expected START:END, got {spec:?}"))?;
    let a = a.trim().parse().with_context(|| format!("Invalid number in {spec:?}"))?;
    let b = b.trim().parse().with_context(|| format!("Invalid number in {spec:?}"))?;
    Ok((a, b))
}

fn print_report(report: &ComposeReport) {
    let verb = match report.action {
        ComposeAction::Merge => "Merged",
        ComposeAction::Split => "Split",
    };
    let created = if report.created_target { " (new)" } else { "" };
    println!("{verb} {} into {}{created}", report.source, report.target);
    let phases: Vec<String> = report.phases.iter().map(ToString::to_string).collect();
    println!("  phases: {}", phases.join(" -> "));
    println!("  links rewritten in moved text: {}", report.links_rewritten);
    println!(
        "  backlinks updated: {} in {} files",
        report.links_updated, report.files_updated
    );
    for (from, to) in &report.footnotes_renamed {
        println!("  footnote [^{from}] renamed to [^{to}]");
    }
    for notice in &report.notices {
        println!("  {notice}");
    }
}

fn print_preview(preview: &Preview) {
    let created = if preview.creates_target { " (new)" } else { "" };
    println!("Would write {}{created}:", preview.target);
    println!("{}", preview.text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spans() -> Result<()> {
        assert_eq!(parse_span("3:7")?, (3, 7));
        assert_eq!(parse_span(" 10 : 2 ")?, (10, 2));
        assert!(parse_span("3-7").is_err());
        assert!(parse_span("a:b").is_err());
        Ok(())
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn target_flags_are_exclusive() {
        let parsed = Args::try_parse_from(["notefold", "merge", "A.md", "--into", "B.md", "--new", "C"]);
        assert!(parsed.is_err());
        let parsed = Args::try_parse_from(["notefold", "merge", "A.md"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parses_split_arguments() -> Result<()> {
        let args = Args::try_parse_from([
            "notefold", "-v", "split", "A.md", "--lines", "2:4", "--lines", "8:9", "--new", "Idea",
            "--replace", "embed",
        ])?;
        assert_eq!(args.verbose, 1);
        let Command::Split { lines, replace, target, .. } = args.command else {
            panic!("expected split");
        };
        assert_eq!(lines, vec!["2:4".to_string(), "8:9".to_string()]);
        assert_eq!(replace, Some(Replacement::Embed));
        assert_eq!(target.new.as_deref(), Some("Idea"));
        Ok(())
    }

    #[test]
    fn parses_strategy() -> Result<()> {
        let args = Args::try_parse_from([
            "notefold", "merge", "A.md", "--into", "B.md", "--strategy", "preserve-both", "--yes",
        ])?;
        let Command::Merge { strategy, yes, .. } = args.command else {
            panic!("expected merge");
        };
        assert_eq!(strategy, Some(FrontmatterStrategy::PreserveBoth));
        assert!(yes);
        Ok(())
    }
}
