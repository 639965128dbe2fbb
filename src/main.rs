use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use hexpatch::config::{
    apply_patches, check_patches, load_from_path, ApplicationError, PatchResult,
};
use hexpatch::record::decode_hex_bytes;
use hexpatch::{Address, HexFile, HexPatch, PatchError, RecordType};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "hexpatch")]
#[command(about = "Locate and patch bytes in Intel HEX firmware images", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one canonical record line
    Line {
        /// 16-bit record address, 4 hex digits
        #[arg(short, long)]
        address: String,

        /// Record type code, 2 hex digits
        #[arg(short, long, default_value = "00")]
        record_type: String,

        /// Payload as hex digit pairs
        #[arg(short, long, default_value = "")]
        data: String,
    },

    /// Show which line holds an address
    Locate {
        /// HEX file to search
        file: PathBuf,

        /// 4 hex digits (flat) or 8 hex digits (extended linear)
        address: String,
    },

    /// Overwrite bytes starting at an address
    Replace {
        /// HEX file to patch
        file: PathBuf,

        /// 4 hex digits (flat) or 8 hex digits (extended linear)
        address: String,

        /// Replacement bytes as hex digit pairs
        data: String,

        /// Show what would change without writing the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changed lines
        #[arg(short, long)]
        diff: bool,
    },

    /// Check every record's checksum
    Verify {
        /// HEX file to check
        file: PathBuf,
    },

    /// Apply a patch set
    Apply {
        /// Root directory for relative patch targets (default: $HEXPATCH_ROOT or cwd)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Specific patch set to apply (otherwise applies all in <root>/patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report patch status without writing
    Status {
        /// Root directory for relative patch targets (default: $HEXPATCH_ROOT or cwd)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Specific patch set to check (otherwise checks all in <root>/patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Line {
            address,
            record_type,
            data,
        } => cmd_line(&address, &record_type, &data),

        Commands::Locate { file, address } => cmd_locate(&file, &address),

        Commands::Replace {
            file,
            address,
            data,
            dry_run,
            diff,
        } => cmd_replace(file, &address, &data, dry_run, diff),

        Commands::Verify { file } => cmd_verify(&file),

        Commands::Apply {
            root,
            patches,
            dry_run,
            diff,
        } => cmd_apply(root, patches, dry_run, diff),

        Commands::Status { root, patches } => cmd_status(root, patches),
    }
}

/// Resolve the root directory.
///
/// Priority order:
/// 1. Explicit --root flag
/// 2. HEXPATCH_ROOT environment variable
/// 3. Current directory
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_root {
        return path
            .canonicalize()
            .with_context(|| format!("root directory {} not found", path.display()));
    }

    if let Ok(env_path) = env::var("HEXPATCH_ROOT") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: HEXPATCH_ROOT is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Helper: Discover all .toml patch sets in `<root>/patches`, sorted.
fn discover_patch_files(root: &Path) -> Result<Vec<PathBuf>> {
    let patches_dir = root.join("patches");
    if !patches_dir.exists() {
        anyhow::bail!("No patches directory at {}", patches_dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&patches_dir).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No .toml patch sets found in {}", patches_dir.display());
    }
    Ok(files)
}

fn patch_files(root: &Path, patches: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    match patches {
        Some(path) => Ok(vec![path]),
        None => discover_patch_files(root),
    }
}

fn parse_address(text: &str) -> Result<Address> {
    text.parse::<Address>()
        .with_context(|| format!("invalid address '{text}'"))
}

fn parse_data(text: &str) -> Result<Vec<u8>> {
    decode_hex_bytes(text.trim()).with_context(|| format!("invalid data '{text}'"))
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

/// Diff only the rewritten record lines.
fn display_line_diff(file: &Path, original: &[String], modified: &[String]) {
    let mut before = original.join("\n");
    before.push('\n');
    let mut after = modified.join("\n");
    after.push('\n');
    display_diff(file, &before, &after);
}

fn cmd_line(address: &str, record_type: &str, data: &str) -> Result<()> {
    let address = u16::from_str_radix(address.trim(), 16)
        .with_context(|| format!("invalid record address '{address}'"))?;
    let code = u8::from_str_radix(record_type.trim(), 16)
        .with_context(|| format!("invalid record type '{record_type}'"))?;
    let kind = RecordType::from_code(code)
        .with_context(|| format!("unknown record type '{record_type}'"))?;
    let data = parse_data(data)?;

    println!("{}", hexpatch::serialize(address, kind, &data)?);
    Ok(())
}

fn cmd_locate(file: &Path, address: &str) -> Result<()> {
    let address = parse_address(address)?;
    let hex = HexFile::read(file)?;
    let found = hex.locate(address)?;

    println!(
        "{} {} is on {}",
        "✓".green(),
        address,
        format!("line {}", found.line).bold()
    );
    println!("  Record: {}", found.record);
    println!("  Type: {}", found.record.kind);
    println!(
        "  Range: {:04X}..={:04X}",
        found.record.address,
        u32::from(found.record.address) + found.record.len() as u32
    );
    Ok(())
}

fn cmd_replace(
    file: PathBuf,
    address: &str,
    data: &str,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let address = parse_address(address)?;
    let data = parse_data(data)?;
    let patch = HexPatch::new(file, address, data);

    let plan = patch.check()?;
    if plan.already_applied {
        println!(
            "{} {}: Already holds the new bytes",
            "⊙".yellow(),
            patch.file.display()
        );
        return Ok(());
    }

    if dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
    } else {
        hexpatch::atomic_write(&patch.file, plan.content().as_bytes())
            .with_context(|| format!("failed to write {}", patch.file.display()))?;
    }

    println!(
        "{} {}: {} lines {}-{}",
        "✓".green(),
        patch.file.display(),
        if dry_run { "Would rewrite" } else { "Rewrote" },
        plan.start_line,
        plan.end_line
    );

    if show_diff {
        display_line_diff(&patch.file, &plan.original_lines, &plan.new_lines);
    }

    Ok(())
}

fn cmd_verify(file: &Path) -> Result<()> {
    let hex = HexFile::read(file)?;
    let mismatches = hex.verify()?;

    if mismatches.is_empty() {
        println!(
            "{} {}: {} records, all checksums valid",
            "✓".green(),
            file.display(),
            hex.len()
        );
        return Ok(());
    }

    for mismatch in &mismatches {
        eprintln!(
            "{} line {}: checksum {:02X}, expected {:02X}",
            "✗".red(),
            mismatch.line,
            mismatch.found,
            mismatch.expected
        );
    }
    eprintln!(
        "{} of {} records have bad checksums",
        mismatches.len().to_string().red(),
        hex.len()
    );
    std::process::exit(1);
}

/// Running counts for the `apply` summary.
#[derive(Default)]
struct Tally {
    applied: usize,
    already_applied: usize,
    failed: usize,
}

impl Tally {
    fn print(&self) {
        println!("{}", "Summary:".bold());
        println!("  {} applied", self.applied.to_string().green());
        println!(
            "  {} already applied",
            self.already_applied.to_string().yellow()
        );
        println!("  {} failed", self.failed.to_string().red());
    }
}

fn cmd_apply(
    root: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    let patch_files = patch_files(&root, patches)?;

    println!("Root: {}", root.display());
    println!();

    let mut tally = Tally::default();

    for patch_file in patch_files {
        println!("Loading patches from {}...", patch_file.display());
        let config = load_from_path(&patch_file)?;

        let results = if dry_run {
            println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
            check_patches(&config, &root)
        } else {
            apply_patches(&config, &root)
        };

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied {
                    file,
                    start_line,
                    end_line,
                    original_lines,
                    new_lines,
                }) => {
                    tally.applied += 1;
                    let verb = if dry_run { "Would apply to" } else { "Applied to" };
                    println!(
                        "{} {}: {} {} (lines {}-{})",
                        "✓".green(),
                        patch_id,
                        verb,
                        file.display(),
                        start_line,
                        end_line
                    );

                    if show_diff {
                        display_line_diff(&file, &original_lines, &new_lines);
                    }
                }
                Ok(PatchResult::AlreadyApplied { file }) => {
                    tally.already_applied += 1;
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        patch_id,
                        file.display()
                    );
                }
                Ok(PatchResult::Failed { file, reason }) => {
                    tally.failed += 1;
                    eprintln!("{} {}: Failed - {}", "✗".red(), patch_id, reason);
                    eprintln!("  File: {}", file.display());
                }
                Err(e) => {
                    tally.failed += 1;
                    eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                    if let ApplicationError::Patch(PatchError::Format { line, .. }) = &e {
                        eprintln!("  {}", format!("Malformed record on line {line}").red());
                        eprintln!("  Run `hexpatch verify` on the file for details");
                    }
                }
            }
        }

        println!();
    }

    tally.print();
    if tally.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_group(marker: ColoredString, label: ColoredString, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    println!("{} {} ({} patches)", marker, label, entries.len());
    for entry in entries {
        println!("  - {entry}");
    }
    println!();
}

fn cmd_status(root: Option<PathBuf>, patches: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let patch_files = patch_files(&root, patches)?;

    println!("{}", "Patch Status Report".bold());
    println!("Root: {}", root.display());
    println!();

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut blocked = Vec::new();

    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        for (patch_id, result) in check_patches(&config, &root) {
            match result {
                Ok(PatchResult::AlreadyApplied { .. }) => applied.push(patch_id),
                Ok(PatchResult::Applied { .. }) => pending.push(patch_id),
                Ok(PatchResult::Failed { reason, .. }) => {
                    blocked.push(format!("{patch_id} ({})", reason.dimmed()))
                }
                Err(e) => blocked.push(format!("{patch_id} ({})", e.to_string().dimmed())),
            }
        }
    }

    print_group("✓".green(), "APPLIED".green().bold(), &applied);
    print_group("⊙".yellow(), "NOT APPLIED".yellow().bold(), &pending);
    print_group("✗".red(), "CANNOT APPLY".red().bold(), &blocked);

    Ok(())
}
