use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;

use hasher_core::{run, Alphabet, HasherSettings};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlphabetArg {
    /// a-z
    Lower,
    /// a-z and A-Z
    Mixed,
}

impl From<AlphabetArg> for Alphabet {
    fn from(arg: AlphabetArg) -> Self {
        match arg {
            AlphabetArg::Lower => Alphabet::Lower,
            AlphabetArg::Mixed => Alphabet::Mixed,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "mappings-hasher",
    version,
    about = "Generates stable hashed names for obfuscated classes, methods and fields"
)]
struct Args {
    /// Jar whose classes get hashed names.
    #[arg(long, required_unless_present = "config")]
    input: Option<PathBuf>,

    /// ProGuard mapping of the same release.
    #[arg(long, required_unless_present = "config")]
    mappings: Option<PathBuf>,

    /// Library jar, jmod or directory. Repeatable.
    #[arg(long = "library", value_name = "PATH")]
    libraries: Vec<PathBuf>,

    /// Tiny v2 file to write.
    #[arg(long, required_unless_present = "config")]
    output: Option<PathBuf>,

    #[arg(long)]
    default_package: Option<String>,

    /// Annotation type (obfuscated internal name) that keeps names. Repeatable.
    #[arg(long, value_name = "CLASS")]
    dont_obfuscate: Vec<String>,

    /// Annotation type given by its hashed class name. Repeatable.
    #[arg(long, value_name = "CLASS")]
    hashed_dont_obfuscate: Vec<String>,

    #[arg(long, value_enum)]
    alphabet: Option<AlphabetArg>,

    #[arg(long)]
    digits: Option<usize>,

    /// JSON settings used as the base; explicit flags override it.
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Saves the merged settings as JSON before running.
    #[arg(long, value_name = "JSON")]
    write_config: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    debug: bool,

    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn settings_from(args: &Args, base: HasherSettings) -> HasherSettings {
    let mut settings = base;

    if let Some(input) = &args.input {
        settings.input_jar = input.clone();
    }
    if let Some(mappings) = &args.mappings {
        settings.mappings_path = mappings.clone();
    }
    if let Some(output) = &args.output {
        settings.output_path = output.clone();
    }
    if !args.libraries.is_empty() {
        settings.libraries = args.libraries.clone();
    }
    if let Some(package) = &args.default_package {
        settings.default_package = package.clone();
    }
    if !args.dont_obfuscate.is_empty() {
        settings.dont_obfuscate_annotations = args.dont_obfuscate.clone();
    }
    if !args.hashed_dont_obfuscate.is_empty() {
        settings.hashed_dont_obfuscate_annotations = args.hashed_dont_obfuscate.clone();
    }
    if let Some(alphabet) = args.alphabet {
        settings.alphabet = alphabet.into();
    }
    if let Some(digits) = args.digits {
        settings.digits = digits;
    }
    settings.debug |= args.debug;

    settings
}

fn setup_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<(), fern::InitError> {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    let base = match args.config.as_ref() {
        Some(path) => match HasherSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Failed to read config {:?}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => HasherSettings::default(),
    };
    let settings = settings_from(&args, base);

    if let Err(e) = setup_logging(settings.debug, args.log_file.as_ref()) {
        eprintln!("Failed to set up logging: {e}");
        std::process::exit(1);
    }

    if let Some(path) = args.write_config.as_ref() {
        if let Err(e) = settings.save(path) {
            log::error!("{e}");
            eprintln!("Failed to write config {:?}: {}", path, e);
            std::process::exit(1);
        }
        log::info!("Saved settings to {}", path.display());
    }

    if let Err(err) = run(settings) {
        log::error!("{err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
