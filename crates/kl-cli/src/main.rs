mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use kl_core::{
    Assembler, BigramPolicy, CandidatePair, OverrideKind, UnigramsOnly, format_line,
    parse_dictionary,
};
use kl_store::{Dictionary, write_binary, write_database, write_sql_script};

use crate::config::{Overrides, PolicyArg, Settings};

#[derive(Parser)]
#[command(name = "kl", about = "Reading-lattice dictionary compiler and assembler")]
struct Cli {
    /// TOML config file (defaults to $KL_CONFIG when set)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reading separator for keys and text dictionaries
    #[arg(long, global = true)]
    separator: Option<String>,

    /// Longest span, in keys, looked up while assembling
    #[arg(long, global = true)]
    max_span: Option<usize>,

    /// How bigram and unigram scores combine
    #[arg(long, global = true, value_enum, ignore_case = true)]
    bigram_policy: Option<PolicyArg>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a text dictionary into binary, SQL script or SQLite form
    Compile {
        /// Text dictionary: `readings value probability [type] [previous]` per line
        input: PathBuf,

        #[arg(long)]
        bin: Option<PathBuf>,

        #[arg(long)]
        sql: Option<PathBuf>,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Print the grams stored under a reading key
    Query {
        /// Dictionary file (.bin, .sql, .db, or text)
        dictionary: PathBuf,

        /// Readings joined by the separator, e.g. `liu2-yi4`
        readings: String,

        /// Include every gram under the key as a prefix
        #[arg(long)]
        partial: bool,

        /// Only grams with this type id
        #[arg(long = "type")]
        type_id: Option<u32>,
    },

    /// Assemble reading keys into the best-scoring word sequence
    Assemble {
        /// Dictionary file (.bin, .sql, .db, or text)
        dictionary: PathBuf,

        /// Reading keys, separately or joined by the separator
        #[arg(required = true)]
        readings: Vec<String>,

        /// Force a candidate: `readings=value@position` or `value@position`
        #[arg(long = "override", value_parser = parse_override)]
        overrides: Vec<OverrideArg>,

        /// Apply overrides as score lifts instead of hard picks
        #[arg(long)]
        soft: bool,

        /// Ignore bigram grams
        #[arg(long)]
        unigrams_only: bool,

        /// Print the assembled units as JSON
        #[arg(long)]
        json: bool,

        /// Also print the lattice in Graphviz DOT form
        #[arg(long)]
        dot: bool,

        /// Lay the DOT graph out top to bottom
        #[arg(long)]
        vertical: bool,
    },

    /// Show dictionary statistics
    Stats {
        /// Dictionary file (.bin, .sql, .db, or text)
        dictionary: PathBuf,
    },
}

/// One `--override` argument. Readings stay joined until the dictionary
/// separator is known.
#[derive(Clone, Debug, PartialEq)]
struct OverrideArg {
    readings: Option<String>,
    value: String,
    position: usize,
}

fn parse_override(raw: &str) -> Result<OverrideArg> {
    let Some((head, position)) = raw.rsplit_once('@') else {
        bail!("expected `readings=value@position`, got {raw:?}");
    };
    let position: usize = position
        .parse()
        .with_context(|| format!("bad position in {raw:?}"))?;
    let (readings, value) = match head.split_once('=') {
        Some((readings, value)) => (Some(readings.to_string()), value),
        None => (None, head),
    };
    if value.is_empty() || readings.as_deref() == Some("") {
        bail!("empty readings or value in {raw:?}");
    }
    Ok(OverrideArg {
        readings,
        value: value.to_string(),
        position,
    })
}

fn split_readings(joined: &str, separator: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = joined.split(separator).map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        bail!("empty reading in {joined:?}");
    }
    Ok(parts)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn settings(cli: &Cli) -> Result<Settings> {
    config::load(
        cli.config.as_deref(),
        Overrides {
            separator: cli.separator.clone(),
            max_span_length: cli.max_span,
            bigram_policy: cli.bigram_policy.map(BigramPolicy::from),
        },
    )
}

fn open_dictionary(path: &Path, settings: &Settings) -> Result<Dictionary> {
    Dictionary::open(path, &settings.separator)
        .with_context(|| format!("failed to load dictionary {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = settings(&cli)?;

    match &cli.command {
        Commands::Compile { input, bin, sql, db } => cmd_compile(
            &settings,
            input,
            bin.as_deref(),
            sql.as_deref(),
            db.as_deref(),
        ),
        Commands::Query {
            dictionary,
            readings,
            partial,
            type_id,
        } => cmd_query(&settings, dictionary, readings, *partial, *type_id),
        Commands::Assemble {
            dictionary,
            readings,
            overrides,
            soft,
            unigrams_only,
            json,
            dot,
            vertical,
        } => cmd_assemble(
            &settings,
            dictionary,
            readings,
            overrides,
            AssembleOutput {
                soft: *soft,
                unigrams_only: *unigrams_only,
                json: *json,
                dot: *dot,
                vertical: *vertical,
            },
        ),
        Commands::Stats { dictionary } => cmd_stats(&settings, dictionary),
    }
}

fn cmd_compile(
    settings: &Settings,
    input: &Path,
    bin: Option<&Path>,
    sql: Option<&Path>,
    db: Option<&Path>,
) -> Result<()> {
    if bin.is_none() && sql.is_none() && db.is_none() {
        bail!("nothing to write: pass --bin, --sql or --db");
    }
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let trie = parse_dictionary(&text, &settings.separator)
        .with_context(|| format!("failed to parse {}", input.display()))?;
    tracing::info!(
        entries = trie.entry_count(),
        nodes = trie.node_count(),
        "compiled dictionary"
    );
    println!(
        "compiled {} → {} entries, {} nodes",
        input.display(),
        trie.entry_count(),
        trie.node_count()
    );

    if let Some(path) = bin {
        write_binary(&trie, path).with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    if let Some(path) = sql {
        write_sql_script(&trie, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    if let Some(path) = db {
        write_database(&trie, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn cmd_query(
    settings: &Settings,
    path: &Path,
    readings: &str,
    partial: bool,
    type_id: Option<u32>,
) -> Result<()> {
    let dictionary = open_dictionary(path, settings)?;
    let separator = dictionary.separator().to_string();
    let key = split_readings(readings, &separator)?;
    let grams = dictionary
        .query_grams(&key, partial, type_id)
        .context("query failed")?;

    if grams.is_empty() {
        println!("(no grams)");
    }
    for gram in &grams {
        println!("{}", format_line(gram, &separator));
    }
    Ok(())
}

struct AssembleOutput {
    soft: bool,
    unigrams_only: bool,
    json: bool,
    dot: bool,
    vertical: bool,
}

fn cmd_assemble(
    settings: &Settings,
    path: &Path,
    readings: &[String],
    overrides: &[OverrideArg],
    output: AssembleOutput,
) -> Result<()> {
    let dictionary = open_dictionary(path, settings)?;
    let separator = dictionary.separator().to_string();

    let mut assembler = if output.unigrams_only {
        Assembler::new(UnigramsOnly(&dictionary), settings.assembler.clone())
    } else {
        Assembler::new(&dictionary, settings.assembler.clone())
    }
    .context("invalid assembler configuration")?;

    for arg in readings {
        for key in split_readings(arg, &separator)? {
            assembler
                .insert_key(&key)
                .with_context(|| format!("failed to insert {key:?}"))?;
        }
    }

    let kind = if output.soft {
        OverrideKind::TopScore
    } else {
        OverrideKind::Specified
    };
    for arg in overrides {
        let result = match &arg.readings {
            Some(joined) => {
                let parts = split_readings(joined, &separator)?;
                let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
                let pair = CandidatePair::new(&parts, &arg.value);
                assembler.override_candidate(&pair, arg.position, kind)
            }
            None => assembler.override_value(&arg.value, arg.position, kind),
        };
        result.with_context(|| {
            format!("cannot override {:?} at {}", arg.value, arg.position)
        })?;
        tracing::debug!(value = %arg.value, position = arg.position, ?kind, "applied override");
    }

    let units = assembler.assemble();
    if units.is_empty() && !assembler.is_empty() {
        tracing::error!(keys = assembler.key_count(), "lattice has no complete path");
    }

    if output.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&units).context("failed to serialize path")?
        );
    } else {
        let words: Vec<&str> = units.iter().map(|u| u.value.as_str()).collect();
        println!("{}", words.join(" "));
    }
    if output.dot {
        print!("{}", assembler.dump_dot(output.vertical));
    }
    Ok(())
}

fn cmd_stats(settings: &Settings, path: &Path) -> Result<()> {
    let dictionary = open_dictionary(path, settings)?;
    let info = dictionary.info();
    println!("backend:    {}", dictionary.backend());
    println!("separator:  {}", info.separator);
    println!("entries:    {}", info.entry_count);
    println!("nodes:      {}", info.node_count);
    println!("readings:   {}", info.vocabulary_size);
    Ok(())
}
