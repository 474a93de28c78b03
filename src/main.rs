use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use opentab::{Import, RhythmStrategy, Severity};

#[derive(Parser)]
#[command(name = "opentab", version, about = "OpenTab guitar tablature toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a file and print the document model as JSON
    Parse { file: PathBuf },
    /// Pretty-print a file
    Fmt {
        file: PathBuf,
        /// Overwrite the file instead of printing to stdout
        #[arg(long)]
        write: bool,
    },
    /// Run the semantic validator and print diagnostics
    Check { file: PathBuf },
    /// Convert a file to an external format
    #[command(subcommand)]
    To(Target),
    /// Import an external format as OpenTab
    #[command(subcommand)]
    Import(Source),
}

#[derive(Subcommand)]
enum Target {
    /// Render as ASCII tab
    Ascii { file: PathBuf },
    /// Encode as a Standard MIDI File
    Midi {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Generate MusicXML
    Musicxml {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render as SVG
    Svg {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum Source {
    /// Import a Guitar Pro .gpx archive
    Gp {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import free-form ASCII tab text
    Ascii {
        file: PathBuf,
        /// Rhythm strategy: unknown, fixed-eighth, or column-grid
        #[arg(long, default_value = "unknown")]
        rhythm: RhythmStrategy,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(message) = run(cli.command) {
        eprintln!("{}", message);
        process::exit(1);
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Parse { file } => {
            let source = read(&file)?;
            let json = opentab::parse_json(&source).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
        Command::Fmt { file, write } => {
            let source = read(&file)?;
            let formatted = opentab::format(&source);
            if write {
                fs::write(&file, &formatted)
                    .map_err(|e| format!("cannot write '{}': {}", file.display(), e))?;
            } else {
                print!("{}", formatted);
            }
        }
        Command::Check { file } => {
            let source = read(&file)?;
            let diagnostics = opentab::check(&source);
            for d in &diagnostics {
                println!("{}:{} {}", d.line, d.start_col, d.message);
            }
            let errors = diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Error)
                .count();
            if errors > 0 {
                return Err(format!("{} problem(s) found", errors));
            }
        }
        Command::To(target) => run_target(target)?,
        Command::Import(source) => run_import(source)?,
    }
    Ok(())
}

fn run_target(target: Target) -> Result<(), String> {
    match target {
        Target::Ascii { file } => {
            let source = read(&file)?;
            let tab = opentab::compile_ascii(&source).map_err(|e| e.to_string())?;
            print!("{}", tab);
        }
        Target::Midi { file, output } => {
            let source = read(&file)?;
            let bytes = opentab::compile_midi(&source).map_err(|e| e.to_string())?;
            fs::write(&output, bytes)
                .map_err(|e| format!("cannot write '{}': {}", output.display(), e))?;
        }
        Target::Musicxml { file, output } => {
            let source = read(&file)?;
            let xml = opentab::compile_musicxml(&source).map_err(|e| e.to_string())?;
            emit(output.as_deref(), &xml)?;
        }
        Target::Svg { file, output } => {
            let source = read(&file)?;
            let svg = opentab::compile_svg(&source).map_err(|e| e.to_string())?;
            emit(output.as_deref(), &svg)?;
        }
    }
    Ok(())
}

fn run_import(source: Source) -> Result<(), String> {
    let (import, output) = match source {
        Source::Gp { file, output } => {
            let bytes = fs::read(&file)
                .map_err(|e| format!("cannot read '{}': {}", file.display(), e))?;
            let import = opentab::import_gpx(&bytes).map_err(|e| e.to_string())?;
            (import, output)
        }
        Source::Ascii {
            file,
            rhythm,
            output,
        } => {
            let text = read(&file)?;
            (opentab::import_ascii(&text, rhythm), output)
        }
    };
    let Import { source, warnings } = import;
    for warning in &warnings {
        eprintln!("warning: {}", warning);
    }
    emit(output.as_deref(), &source)?;
    Ok(())
}

fn read(file: &Path) -> Result<String, String> {
    fs::read_to_string(file).map_err(|e| format!("cannot read '{}': {}", file.display(), e))
}

fn emit(output: Option<&Path>, content: &str) -> Result<(), String> {
    match output {
        Some(path) => fs::write(path, content)
            .map_err(|e| format!("cannot write '{}': {}", path.display(), e)),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}
