use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use sosym_core::path::SymbolPathParser;
use sosym_core::symbols::{ImageLayout, ManagedImage, MetadataRequest, SymbolStoreKey};
use sosym_core::{ModuleIdentity, SymbolService, SymbolServiceConfig};
use sosym_utils::{debug, init_logging};

type CliResult = Result<(), Box<dyn Error>>;

/// Locate and inspect symbols for managed modules.
#[derive(Parser, Debug)]
#[command(name = "sosym")]
#[command(version)]
#[command(about = "Locate and inspect symbols for managed modules", long_about = None)]
struct Cli
{
    /// Symbol path (overrides SOSYM_SYMBOL_PATH / _NT_SYMBOL_PATH)
    #[arg(long, global = true)]
    symbol_path: Option<String>,
    /// Default cache directory for symbol servers (overrides SOSYM_SYMBOL_CACHE)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Parse a symbol path and print the sources it produces
    Path
    {
        /// Symbol path text, e.g. "srv*C:\cache*https://host/symbols;C:\sym"
        text: String,
    },
    /// Print the symbol-relevant headers of a PE image
    Inspect
    {
        /// Path to the image
        image: PathBuf,
        /// Treat the file as a mapped (in-memory layout) image
        #[arg(long, default_value_t = false)]
        mapped: bool,
    },
    /// Find the symbol file for a module
    Locate
    {
        /// Path to the module image
        image: PathBuf,
        /// Try the embedded portable PDB before any other source
        #[arg(long, default_value_t = false)]
        prefer_embedded: bool,
    },
    /// Extract the CLI metadata of a module located by timestamp and size
    Metadata
    {
        /// Module path as reported by the target
        image: PathBuf,
        /// PE header timestamp (hex with 0x, or decimal)
        #[arg(long, value_parser = parse_u32)]
        timestamp: u32,
        /// PE SizeOfImage (hex with 0x, or decimal)
        #[arg(long, value_parser = parse_u32)]
        size: u32,
        /// Metadata RVA overriding the CLI header
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        metadata_rva: u32,
        /// Write the metadata here instead of printing a summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Find an image file matching timestamp and size
    DebugData
    {
        /// Module path as reported by the target
        image: PathBuf,
        /// PE header timestamp (hex with 0x, or decimal)
        #[arg(long, value_parser = parse_u32)]
        timestamp: u32,
        /// PE SizeOfImage (hex with 0x, or decimal)
        #[arg(long, value_parser = parse_u32)]
        size: u32,
    },
}

fn main()
{
    // RUST_LOG, SOSYM_LOG_FORMAT and SOSYM_LOG_FILE control logging
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    let cli = Cli::parse();
    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn parse_u32(text: &str) -> Result<u32, String>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("invalid number '{text}': {err}"))
}

fn build_service(cli: &Cli) -> Result<SymbolService, Box<dyn Error>>
{
    let mut config = SymbolServiceConfig::from_env();
    if let Some(path) = &cli.symbol_path {
        config = config.with_symbol_path(path.clone());
    }
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir.clone());
    }
    debug!(?config, "building symbol service");

    let service = SymbolService::builder(config)
        .on_symbol_file_loaded(|module, location| {
            debug!(module = %module.display(), location, "symbol file loaded");
        })
        .build()?;
    Ok(service)
}

fn run_command(cli: Cli) -> CliResult
{
    match &cli.command {
        Commands::Path { text } => print_symbol_path(text),
        Commands::Inspect { image, mapped } => inspect_image(image, *mapped),
        Commands::Locate { image, prefer_embedded } => {
            let service = build_service(&cli)?;
            locate_symbols(&service, image, *prefer_embedded)
        }
        Commands::Metadata {
            image,
            timestamp,
            size,
            metadata_rva,
            output,
        } => {
            let service = build_service(&cli)?;
            let request = MetadataRequest::new(image.clone(), *timestamp, *size).with_metadata_rva(*metadata_rva);
            let metadata = service
                .metadata_bytes(&request)
                .ok_or_else(|| format!("no image matching {timestamp:#010x}/{size:#x} found for {}", image.display()))?;
            match output {
                Some(path) => {
                    fs::write(path, &metadata)?;
                    println!("Wrote {} bytes of metadata to {}", metadata.len(), path.display());
                }
                None => println!("Metadata: {} bytes", metadata.len()),
            }
            Ok(())
        }
        Commands::DebugData { image, timestamp, size } => {
            let service = build_service(&cli)?;
            match service.locate_debug_data(image, *timestamp, *size) {
                Some(path) => println!("{}", path.display()),
                None => return Err(format!("no image matching {timestamp:#010x}/{size:#x} found").into()),
            }
            Ok(())
        }
    }
}

fn print_symbol_path(text: &str) -> CliResult
{
    let parsed = SymbolPathParser::new().parse(text)?;
    if parsed.sources().is_empty() {
        println!("(no sources)");
    }
    for (index, source) in parsed.sources().iter().enumerate() {
        println!("{index:>3}  {:?}  {source}", source.kind());
    }
    for warning in parsed.warnings() {
        println!("warning: {warning}");
    }
    Ok(())
}

fn inspect_image(path: &Path, mapped: bool) -> CliResult
{
    let data = fs::read(path)?;
    let layout = if mapped { ImageLayout::Mapped } else { ImageLayout::File };
    let image = ManagedImage::parse(&data, layout)?;
    let key = image.image_key();

    println!("Image:     {}", path.display());
    println!("Timestamp: {:#010x}", key.timestamp);
    println!("Size:      {:#x}", key.size);
    println!("Managed:   {}", image.is_managed());
    if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
        println!("Image key: {}", SymbolStoreKey::pe_image(name, key));
    }

    match image.codeview() {
        Some(record) => {
            println!("PDB path:  {}", record.pdb_path);
            println!("PDB id:    {}", record.pdb_key);
            println!("Portable:  {}", record.portable);
            println!("PDB key:   {}", record.store_key());
        }
        None => println!("PDB:       (no CodeView record)"),
    }

    match image.embedded_portable_pdb() {
        Ok(Some(pdb)) => println!("Embedded:  {} bytes", pdb.len()),
        Ok(None) => println!("Embedded:  none"),
        Err(err) => println!("Embedded:  unreadable ({err})"),
    }
    if let Some(metadata) = image.metadata(0) {
        println!("Metadata:  {} bytes", metadata.len());
    }
    Ok(())
}

fn locate_symbols(service: &SymbolService, path: &Path, prefer_embedded: bool) -> CliResult
{
    let data = fs::read(path)?;
    let image = ManagedImage::parse(&data, ImageLayout::File)?;
    let key = image.image_key();
    let mut identity = ModuleIdentity::new(path).with_image_key(key.timestamp, key.size);
    if let Some(record) = image.codeview() {
        identity = identity.with_pdb_key(record.pdb_key.guid, record.pdb_key.age);
    }

    let request = service.request(identity).prefer_embedded(prefer_embedded || service.config().prefer_embedded);
    let Some(symbols) = service.load_scoped(&request) else {
        return Err(format!("no symbols found for {}", path.display()).into());
    };
    let origin = service.origin(symbols.handle())?;
    println!("{origin}");
    Ok(())
}
