mod attestation;
mod config;
mod delivery;
mod fit;
mod pdf;
mod session;
mod store;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use attestation::{generate_attestation, AttestationRequest};
use config::{load_profile, load_template, Outing, ReasonKey};
use delivery::{delivery_for, open_in_viewer, DeliveryTarget};
use pdf::template::blank_template;
use session::{maybe_request_review, Session, SessionEvent, TerminalReviewPrompt};
use store::Store;

/// Fill the travel attestation form with a profile and a QR code.
#[derive(Parser, Debug)]
#[command(name = "attestation")]
#[command(about = "Fill the travel attestation form with a profile and a QR code.", long_about = None)]
struct Args {
    /// Directory holding the stored attestation
    /// (defaults to the platform data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the attestation, or reuse the stored one
    Generate {
        /// Profile JSON (firstName, lastName, dateOfBirth, placeOfBirth, address, city, zip)
        #[arg(short, long)]
        profile: PathBuf,

        /// Template PDF to fill
        #[arg(short, long)]
        template: PathBuf,

        /// Outing reason, may be repeated
        #[arg(short, long = "reason", value_enum)]
        reasons: Vec<ReasonKey>,

        /// Outing date as dd/mm/yyyy (defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Outing time as HHhMM (defaults to now)
        #[arg(long)]
        time: Option<String>,

        /// Discard the stored attestation and generate a new one
        #[arg(long)]
        reset: bool,

        /// Also write the attestation to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Save the stored attestation where the user can find it
    Download {
        #[arg(long, value_enum, default_value_t = DeliveryTarget::default())]
        target: DeliveryTarget,

        /// Override the target directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Open the saved file in the default viewer
        #[arg(long)]
        open: bool,
    },
    /// Forget the stored attestation
    Reset,
    /// Write a blank stand-in template
    Template {
        #[arg(short, long, default_value = "template.pdf")]
        output: PathBuf,
    },
}

fn open_session(data_dir: Option<PathBuf>) -> Result<Session> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => Store::default_dir()?,
    };
    Ok(Session::new(Store::open(&dir)?))
}

struct GenerateOptions {
    profile: PathBuf,
    template: PathBuf,
    reasons: Vec<ReasonKey>,
    date: Option<String>,
    time: Option<String>,
    reset: bool,
    output: Option<PathBuf>,
}

fn generate(mut session: Session, opts: GenerateOptions) -> Result<()> {
    let events = session.subscribe();
    session.load();

    if opts.reset {
        session.reset()?;
    }

    if session.state().is_generated() {
        info!("Using the stored attestation, pass --reset to generate a new one");
    } else {
        if opts.reasons.is_empty() {
            warn!("No outing reason selected");
        }

        info!("Loading profile from {:?}...", opts.profile);
        let profile = load_profile(&opts.profile)?;

        info!("Loading template from {:?}...", opts.template);
        let template = load_template(&opts.template)?;

        let now = Local::now().naive_local();
        let outing = Outing::from_parts(opts.date.as_deref(), opts.time.as_deref(), now)?;
        let request = AttestationRequest {
            profile: &profile,
            reasons: &opts.reasons,
            outing,
            created: now,
        };

        info!("Generating attestation...");
        let pdf = generate_attestation(&template, &request)?;
        session.complete_generation(&pdf)?;
    }

    for event in events.try_iter() {
        if matches!(event, SessionEvent::Loaded { generated: true } | SessionEvent::Generated) {
            maybe_request_review(session.store_mut(), &TerminalReviewPrompt)?;
        }
    }

    if let Some(output) = opts.output {
        let pdf = session.pdf_bytes()?
            .ok_or_else(|| anyhow!("No attestation was generated"))?;
        write_file(&output, &pdf)?;
        println!("{}", output.display());
    }

    Ok(())
}

fn download(mut session: Session, target: DeliveryTarget, dir: Option<PathBuf>, open: bool) -> Result<()> {
    session.load();
    let pdf = session.pdf_bytes()?
        .ok_or_else(|| anyhow!("No attestation generated yet, run `generate` first"))?;

    // Refusals are reported but do not fail the command
    let delivered = delivery_for(target, dir).and_then(|d| d.deliver(&pdf));
    let path = match delivered {
        Ok(path) => path,
        Err(e) => {
            warn!("{}", e);
            return Ok(());
        }
    };
    println!("{}", path.display());

    if open {
        open_in_viewer(&path)
            .with_context(|| format!("Failed to open {:?}", path))?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .with_context(|| format!("Failed to write {:?}", path))
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Generate { profile, template, reasons, date, time, reset, output } => {
            let session = open_session(args.data_dir)?;
            generate(session, GenerateOptions { profile, template, reasons, date, time, reset, output })
        }
        Command::Download { target, dir, open } => {
            download(open_session(args.data_dir)?, target, dir, open)
        }
        Command::Reset => {
            let mut session = open_session(args.data_dir)?;
            session.reset()?;
            info!("Stored attestation removed");
            Ok(())
        }
        Command::Template { output } => {
            write_file(&output, &blank_template()?)?;
            println!("{}", output.display());
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("Caused by: {}", cause);
        }
        std::process::exit(1);
    }
}
