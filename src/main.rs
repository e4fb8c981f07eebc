//! Perun CLI - Command-line tool for DXBC shader extraction and transpilation.
//!
//! This is the main entry point for the Perun command-line application.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn, LevelFilter};
use rayon::prelude::*;
use walkdir::WalkDir;

use perun::prelude::*;

/// Perun - DXBC shader extraction and GLSL transpilation tool
#[derive(Parser)]
#[command(name = "perun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transpile a DXBC blob to GLSL
    Glsl {
        /// Input DXBC file
        #[arg(short, long, env = "INPUT_DXBC")]
        input: PathBuf,

        /// Output GLSL file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Uniform block names, one per line; the line number is the binding
        #[arg(short, long)]
        bindings: Option<PathBuf>,

        /// GLSL `#version` to emit
        #[arg(long, default_value_t = 450)]
        glsl_version: u32,
    },

    /// Show the chunks, reflection data and signatures of a DXBC blob
    Info {
        /// Input DXBC file
        #[arg(short, long, env = "INPUT_DXBC")]
        input: PathBuf,

        /// Print the decoded container as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that a DXBC blob serializes back to identical bytes
    Roundtrip {
        /// Input DXBC file
        #[arg(short, long, env = "INPUT_DXBC")]
        input: PathBuf,
    },

    /// Extract embedded DXBC containers from a directory of game files
    Extract {
        /// Input directory
        #[arg(short, long, env = "INPUT_FOLDER")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Filter pattern for relative file paths (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Also write a GLSL transpilation next to each container
        #[arg(long)]
        glsl: bool,

        /// Uniform block names, one per line; the line number is the binding
        #[arg(short, long)]
        bindings: Option<PathBuf>,

        /// GLSL `#version` to emit
        #[arg(long, default_value_t = 450)]
        glsl_version: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialize logger")?;

    match cli.command {
        Commands::Glsl {
            input,
            output,
            bindings,
            glsl_version,
        } => {
            let options = glsl_options(bindings.as_deref(), glsl_version)?;
            cmd_glsl(&input, output.as_deref(), &options)?;
        }
        Commands::Info { input, json } => {
            cmd_info(&input, json)?;
        }
        Commands::Roundtrip { input } => {
            cmd_roundtrip(&input)?;
        }
        Commands::Extract {
            input,
            output,
            filter,
            glsl,
            bindings,
            glsl_version,
        } => {
            let options = glsl.then(|| glsl_options(bindings.as_deref(), glsl_version)).transpose()?;
            cmd_extract(&input, &output, filter.as_deref(), options.as_ref())?;
        }
    }

    Ok(())
}

/// Build emission options, reading the block-name table if one was given.
fn glsl_options(bindings: Option<&Path>, version: u32) -> Result<GlslOptions> {
    let bindings = match bindings {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read bindings file {}", path.display()))?;
            BlockBindings::new(text.lines().map(str::trim))
        }
        None => BlockBindings::default(),
    };
    debug!("{} uniform block bindings", bindings.len());
    Ok(GlslOptions { bindings, version })
}

fn read_container(input: &Path) -> Result<(Vec<u8>, DxbcContainer)> {
    let data = fs::read(input).context("Failed to read input file")?;
    let container = DxbcContainer::parse(&data).context("Failed to parse DXBC container")?;
    Ok((data, container))
}

fn cmd_glsl(input: &Path, output: Option<&Path>, options: &GlslOptions) -> Result<()> {
    let (_, container) = read_container(input)?;
    let glsl = container
        .to_glsl_with(options)
        .context("Failed to transpile to GLSL")?;

    match output {
        Some(path) => {
            fs::write(path, glsl).context("Failed to write output file")?;
            println!("Transpiled: {} -> {}", input.display(), path.display());
        }
        None => print!("{glsl}"),
    }

    Ok(())
}

fn cmd_info(input: &Path, json: bool) -> Result<()> {
    let (_, container) = read_container(input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&container)?);
        return Ok(());
    }

    let header = &container.header;
    println!(
        "DXBC v{}.{}, {} bytes, {} chunks",
        header.major_version, header.minor_version, header.size, header.chunk_count
    );
    for chunk in &container.chunks {
        println!("  {} @ {:#06x} ({} bytes)", chunk.tag, chunk.offset, chunk.data.len());
    }

    if let Some(rdef) = &container.rdef {
        println!("\nReflection ({}):", rdef.creator);
        for cb in &rdef.constant_buffers {
            println!("  {:?} {} ({} bytes)", cb.buffer_type, cb.name, cb.size);
            for variable in &cb.variables {
                println!(
                    "    {:>6} {:>5} {}{}",
                    variable.offset,
                    variable.size,
                    variable.name,
                    if variable.is_used() { "" } else { " (unused)" }
                );
            }
        }
        for binding in &rdef.resource_bindings {
            println!(
                "  {:?} {} slot {} x{} {:?}",
                binding.input_type, binding.name, binding.bind_point, binding.bind_count, binding.dimension
            );
        }
    }

    let signatures = [
        ("Inputs", &container.input_signature),
        ("Outputs", &container.output_signature),
        ("Patch constants", &container.patch_constant_signature),
    ];
    for (label, signature) in signatures {
        let Some(signature) = signature else {
            continue;
        };
        println!("\n{label}:");
        for element in &signature.elements {
            println!(
                "  {}{} r{} mask {:04b} {:?} {:?}",
                element.name,
                element.semantic_index,
                element.register,
                element.mask,
                element.component_type,
                element.system_value
            );
        }
    }

    if let Some(shex) = &container.shex {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for opcode in &shex.opcodes {
            *counts.entry(opcode.mnemonic()).or_default() += 1;
        }

        println!("\nProgram {} ({} opcodes):", shex.profile(), shex.opcodes.len());
        for (mnemonic, count) in counts {
            println!("  {count:>5} {mnemonic}");
        }
    }

    Ok(())
}

fn cmd_roundtrip(input: &Path) -> Result<()> {
    let (data, container) = read_container(input)?;
    let output = container.serialize().context("Failed to serialize container")?;

    if output != data {
        let first = data
            .iter()
            .zip(&output)
            .position(|(a, b)| a != b)
            .unwrap_or(data.len().min(output.len()));
        anyhow::bail!(
            "Round-trip mismatch at byte {first:#x} (input {} bytes, output {} bytes)",
            data.len(),
            output.len()
        );
    }

    println!("Round-trip OK: {} ({} bytes)", input.display(), data.len());

    Ok(())
}

/// Containers found and transpilation failures for one file.
#[derive(Debug, Default)]
struct FileStats {
    containers: usize,
    failed: usize,
}

fn cmd_extract(
    input: &Path,
    output: &Path,
    filter: Option<&str>,
    options: Option<&GlslOptions>,
) -> Result<()> {
    let pattern = filter
        .map(Pattern::new)
        .transpose()
        .context("Invalid filter pattern")?;
    let match_options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };

    let files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let Some(pattern) = &pattern else {
                return true;
            };
            let relative = path.strip_prefix(input).unwrap_or(path);
            let relative = relative.to_string_lossy().replace('\\', "/");
            pattern.matches_with(&relative, match_options)
        })
        .collect();

    println!("Scanning {} files for shaders...", files.len());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)?;

    let start = Instant::now();
    let containers = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    files.par_iter().for_each(|path| {
        match extract_file(path, input, output, options) {
            Ok(stats) => {
                containers.fetch_add(stats.containers, Ordering::Relaxed);
                failed.fetch_add(stats.failed, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("{}: {e:#}", path.display());
                errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        pb.inc(1);
    });

    pb.finish_with_message("Done");
    println!(
        "Extracted {} shaders in {:?} ({} failed to transpile, {} unreadable files)",
        containers.into_inner(),
        start.elapsed(),
        failed.into_inner(),
        errors.into_inner()
    );

    Ok(())
}

/// Write every container embedded in `path` as `<file>.<n>.dxbc`, plus
/// `<file>.<n>.glsl` when GLSL output is enabled.
fn extract_file(
    path: &Path,
    input: &Path,
    output: &Path,
    options: Option<&GlslOptions>,
) -> Result<FileStats> {
    let data = fs::read(path).context("Failed to read file")?;
    let ranges = find_containers(&data);
    if ranges.is_empty() {
        return Ok(FileStats::default());
    }

    let relative = path.strip_prefix(input).unwrap_or(path);
    let base = output.join(relative);
    if let Some(parent) = base.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut stats = FileStats::default();
    for (n, range) in ranges.into_iter().enumerate() {
        let blob = &data[range];
        fs::write(with_suffix(&base, &format!(".{n}.dxbc")), blob)?;
        stats.containers += 1;

        let Some(options) = options else {
            continue;
        };
        match DxbcContainer::parse(blob).and_then(|c| c.to_glsl_with(options)) {
            Ok(glsl) => fs::write(with_suffix(&base, &format!(".{n}.glsl")), glsl)?,
            Err(e) => {
                warn!("{} shader {n}: {e}", path.display());
                stats.failed += 1;
            }
        }
    }

    debug!("{}: {} shaders", path.display(), stats.containers);
    Ok(stats)
}

/// Append `suffix` to the full file name, keeping any existing extension.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
