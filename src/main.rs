use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ue_pak_parser::{
    AesKey, Package, PakFile, PakFilter, PakOptions, PakRegistry, ParseOptions,
    UnknownPropertyMode,
};

#[derive(Parser)]
#[command(name = "ue-pak-parser", about = "Inspect Unreal Engine pak archives and packages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnknownMode {
    Drop,
    Keep,
    Error,
}

impl From<UnknownMode> for UnknownPropertyMode {
    fn from(mode: UnknownMode) -> Self {
        match mode {
            UnknownMode::Drop => UnknownPropertyMode::Drop,
            UnknownMode::Keep => UnknownPropertyMode::Keep,
            UnknownMode::Error => UnknownPropertyMode::Error,
        }
    }
}

#[derive(clap::Args)]
struct PakArgs {
    pak: PathBuf,
    /// AES key in hex; may be repeated, the first that fits is used
    #[arg(long = "key")]
    keys: Vec<AesKey>,
    /// Lowercase all paths
    #[arg(long)]
    case_insensitive: bool,
    /// Only index entries under these prefixes (mount point included)
    #[arg(long)]
    filter: Vec<String>,
}

#[derive(clap::Args)]
struct ParseArgs {
    #[arg(long, value_enum, default_value = "drop")]
    unknown: UnknownMode,
    #[arg(long, default_value_t = 64)]
    max_depth: usize,
}

impl ParseArgs {
    fn options(&self) -> ParseOptions {
        ParseOptions {
            unknown_properties: self.unknown.into(),
            max_depth: self.max_depth,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the footer and every entry path
    List {
        #[command(flatten)]
        pak: PakArgs,
    },
    /// Write one entry's bytes to a file
    Extract {
        #[command(flatten)]
        pak: PakArgs,
        path: String,
        out: PathBuf,
    },
    /// Parse a package stored in an archive and print it as JSON
    Dump {
        #[command(flatten)]
        pak: PakArgs,
        package: String,
        #[command(flatten)]
        parse: ParseArgs,
    },
    /// Parse loose package files and print them as JSON
    Asset {
        uasset: PathBuf,
        #[arg(long)]
        uexp: Option<PathBuf>,
        #[arg(long)]
        ubulk: Option<PathBuf>,
        #[command(flatten)]
        parse: ParseArgs,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::List { pak } => list(&pak),
        Command::Extract { pak, path, out } => extract(&pak, &path, &out),
        Command::Dump {
            pak,
            package,
            parse,
        } => dump(&pak, &package, &parse.options()),
        Command::Asset {
            uasset,
            uexp,
            ubulk,
            parse,
        } => asset(&uasset, uexp, ubulk.as_deref(), &parse.options()),
    }
}

fn open(args: &PakArgs) -> anyhow::Result<PakFile<std::io::BufReader<fs::File>>> {
    let options = PakOptions {
        case_sensitive: !args.case_insensitive,
    };

    let mut pak = PakFile::open_with(&args.pak, options)
        .with_context(|| format!("failed to open {}", args.pak.display()))?;

    let key = if pak.info().encrypted_index {
        match pak.find_key(&args.keys)? {
            Some(index) => Some(args.keys[index].clone()),
            None if args.keys.is_empty() => bail!("the index is encrypted, pass --key"),
            None => bail!("none of the {} keys decrypts the index", args.keys.len()),
        }
    } else {
        args.keys.first().cloned()
    };

    let filter = PakFilter::new(args.filter.iter().cloned());

    pak.read_index(key.as_ref(), Some(&filter))?;

    Ok(pak)
}

fn list(args: &PakArgs) -> anyhow::Result<()> {
    let pak = open(args)?;

    println!("{}", serde_json::to_string_pretty(pak.info())?);
    println!("mount point: {}", pak.mount_point());

    for (path, entry) in pak.iter() {
        println!("{}\t{}", path, entry.uncompressed_size);
    }

    Ok(())
}

fn extract(args: &PakArgs, path: &str, out: &Path) -> anyhow::Result<()> {
    let pak = open(args)?;
    let bytes = pak.get_file(path)?;

    fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;

    info!(path, bytes = bytes.len(), out = %out.display(), "extracted");

    Ok(())
}

fn dump(args: &PakArgs, package: &str, options: &ParseOptions) -> anyhow::Result<()> {
    let registry = PakRegistry::new();
    registry.add(open(args)?)?;

    let package = registry.parse_package(package, options)?;

    println!("{}", serde_json::to_string_pretty(&package)?);

    Ok(())
}

fn asset(
    uasset: &Path,
    uexp: Option<PathBuf>,
    ubulk: Option<&Path>,
    options: &ParseOptions,
) -> anyhow::Result<()> {
    let uexp = uexp.unwrap_or_else(|| uasset.with_extension("uexp"));

    let uasset_bytes = fs::read(uasset)
        .with_context(|| format!("failed to read {}", uasset.display()))?;
    let uexp_bytes = fs::read(&uexp)
        .with_context(|| format!("failed to read {}", uexp.display()))?;
    let ubulk_bytes = ubulk.map(fs::read).transpose()?;

    let package = Package::parse(&uasset_bytes, &uexp_bytes, ubulk_bytes.as_deref(), options)?;

    println!("{}", serde_json::to_string_pretty(&package)?);

    Ok(())
}
