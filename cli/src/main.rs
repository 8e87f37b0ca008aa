use std::{error::Error, fs, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use nsmbw_patcher::{
    catalog::fixes,
    dol::DolImage,
    identify_build,
    riivolution::RiivolutionXml,
    symbols::SymbolTable,
    Build, BuildCode, Catalog, PatchConfig, Patcher, Target,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct CliArgs {
    /// Log every patched site
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print which build a main.dol belongs to
    Identify {
        #[arg(value_name = "DOL")]
        dol: PathBuf,
    },
    /// List the built-in fixes
    List {
        /// Only show the sites that apply to this build
        #[arg(long, value_name = "BUILD")]
        build: Option<Build>,
    },
    /// Check that no two fixes write to the same address
    Check,
    /// Patch a main.dol
    Apply {
        #[arg(value_name = "DOL")]
        dol: PathBuf,

        /// Where to write the patched file. Defaults to overwriting the input.
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Don't write anything, only report what would be patched
        #[arg(long)]
        dry_run: bool,

        /// Skip sites whose current contents are not the expected original ones
        #[arg(long)]
        verify: bool,

        #[command(flatten)]
        selection: Selection,
    },
    /// Write a Riivolution XML with the fixes for one build as memory patches
    Riivolution {
        #[arg(value_name = "XML")]
        output: PathBuf,

        /// Value of the "root" attribute
        #[arg(long, default_value = "/nsmbw_updated")]
        root: String,

        /// Name shown in the Riivolution menu
        #[arg(long, default_value = "NSMBW Updated")]
        title: String,

        /// Folder replacement, as "EXTERNAL,DISC"
        #[arg(long, value_name = "EXTERNAL,DISC")]
        folder: Vec<String>,

        #[command(flatten)]
        selection: Selection,
    },
}

#[derive(Args)]
struct Selection {
    /// Build to patch for. Identified from the file when omitted.
    #[arg(long, value_name = "BUILD")]
    build: Option<Build>,

    /// Leave out a fix by name
    #[arg(long, value_name = "NAME")]
    disable: Vec<String>,

    /// Address of an injected routine, as NAME=ADDRESS
    #[arg(long, value_name = "NAME=ADDRESS")]
    symbol: Vec<String>,

    /// File with one "NAME ADDRESS" pair per line
    #[arg(long, value_name = "FILE")]
    symbols: Option<PathBuf>,
}

impl Selection {
    fn config(&self, verify_original: bool) -> PatchConfig {
        PatchConfig {
            target: self.build.map_or(Target::Dynamic, Target::Fixed),
            disabled: self.disable.iter().cloned().collect(),
            verify_original,
        }
    }

    fn symbol_table(&self) -> Result<SymbolTable, Box<dyn Error>> {
        let mut table = match &self.symbols {
            Some(path) => fs::read_to_string(path)?.parse::<SymbolTable>()?,
            None => SymbolTable::new(),
        };
        for definition in &self.symbol {
            let (name, address) = SymbolTable::parse_definition(definition)
                .ok_or(format!("'{definition}' is not a valid NAME=ADDRESS definition"))?;
            table.insert(name, address);
        }
        Ok(table)
    }
}

/// Leaves out the fixes that would branch to a routine missing from `symbols`
/// on `build`, rather than failing the whole run.
fn skip_unresolved(
    catalog: &Catalog,
    build: BuildCode,
    symbols: &SymbolTable,
    config: &mut PatchConfig,
) {
    let selected = config.select(catalog);
    for (entry, site) in selected.unresolved(symbols) {
        let Some(destination) = site.payload.destination() else {
            continue;
        };
        if site.predicate.matches(build) && config.disabled.insert(entry.name.clone()) {
            log::warn!("Skipping '{}': no address given for {destination}", entry.name);
        }
    }
}

fn load_dol(path: &PathBuf) -> Result<DolImage, Box<dyn Error>> {
    log::debug!("Reading {}", path.to_string_lossy());
    Ok(DolImage::from_bytes(fs::read(path)?)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    simplelog::TermLogger::init(
        if args.verbose {
            simplelog::LevelFilter::Trace
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let catalog = fixes::builtin();

    match args.command {
        Command::Identify { dol } => {
            let image = load_dol(&dol)?;
            let build = identify_build(&image);
            if !build.is_known() {
                return Err(format!("{} is not a known build", dol.to_string_lossy()).into());
            }
            println!("{build}");
        }
        Command::List { build } => {
            let catalog = match build {
                Some(b) => catalog.specialize(b),
                None => catalog,
            };
            for entry in catalog.iter() {
                println!("{}: {}", entry.name, entry.description);
                for site in &entry.sites {
                    println!("    {:08x} {:?} ({})", site.address, site.payload, site.predicate);
                }
            }
        }
        Command::Check => {
            catalog.validate()?;
            log::info!("{} fixes, no conflicts", catalog.len());
        }
        Command::Apply {
            dol,
            output,
            dry_run,
            verify,
            selection,
        } => {
            let mut image = load_dol(&dol)?;
            let symbols = selection.symbol_table()?;
            let mut config = selection.config(verify);
            let build = match config.target {
                Target::Fixed(build) => build.code(),
                Target::Dynamic => identify_build(&image),
            };
            skip_unresolved(&catalog, build, &symbols, &mut config);

            let patcher = Patcher::new(&catalog, config).with_symbols(symbols);
            patcher.catalog().validate()?;

            let report = patcher.apply(&mut image)?;
            if !report.build.is_known() {
                log::warn!("Unrecognized build, only ungated fixes were applied");
            }
            log::info!(
                "{}: applied {} sites, skipped {}",
                report.build,
                report.applied,
                report.skipped
            );
            for (name, address) in &report.mismatched {
                log::warn!("'{name}' not applied at {address:08x}: unexpected original contents");
            }

            if dry_run {
                log::info!("Dry run, nothing written");
            } else {
                let output = output.unwrap_or(dol);
                fs::write(&output, image.as_bytes())?;
                log::info!("Wrote {}", output.to_string_lossy());
            }
        }
        Command::Riivolution {
            output,
            root,
            title,
            folder,
            selection,
        } => {
            let build = selection
                .build
                .ok_or("a build must be given with --build for Riivolution output")?;
            let symbols = selection.symbol_table()?;
            let mut config = selection.config(false);
            skip_unresolved(&catalog, build.code(), &symbols, &mut config);

            let patcher = Patcher::new(&catalog, config);
            patcher.catalog().validate()?;

            let mut xml = RiivolutionXml::new(title, root).region(build.region());
            for f in &folder {
                let (external, disc) = f
                    .split_once(',')
                    .ok_or(format!("'{f}' is not a valid EXTERNAL,DISC pair"))?;
                xml = xml.folder(external, disc);
            }

            let rendered = xml.render(patcher.catalog(), &symbols)?;
            fs::write(&output, rendered)?;
            log::info!(
                "Wrote {} fixes for {build} to {}",
                patcher.catalog().len(),
                output.to_string_lossy()
            );
        }
    }

    Ok(())
}
