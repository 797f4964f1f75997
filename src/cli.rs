//! CLI definitions and the command flow.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cert::{self, LeafOptions, OutputFiles, OutputOverrides};
use crate::config::Settings;
use crate::doctor;
use crate::error::{Backend, Notice, Op};
use crate::exec::{HostSystem, System};
use crate::name;
use crate::store;
use crate::trust::{Report, Session, StoreStatus};

const EXAMPLES: &str = "\
Examples:
  localca --install
      Install the local CA in the system trust store.

  localca example.org
      Generate \"example.org.pem\" and \"example.org-key.pem\".

  localca example.com myapp.dev localhost 127.0.0.1 ::1
      Generate \"example.com+4.pem\" and \"example.com+4-key.pem\".

  localca \"*.example.it\"
      Generate \"_wildcard.example.it.pem\" and \"_wildcard.example.it-key.pem\".

  localca --uninstall
      Uninstall the local CA (but do not delete it).

Environment:
  CAROOT        CA certificate and key storage location
  TRUST_STORES  comma-separated subset of \"system\", \"java\" and \"nss\"
  JAVA_HOME     Java installation whose keystore to manage
  LOCALCA_LOG   log filter, e.g. \"debug\"";

#[derive(Parser, Debug)]
#[command(name = "localca", version)]
#[command(about = "Make locally trusted development certificates")]
#[command(after_help = EXAMPLES)]
pub struct Cli {
    /// Install the local CA in the system trust store
    #[arg(long, conflicts_with = "uninstall")]
    pub install: bool,

    /// Uninstall the local CA (but do not delete it)
    #[arg(long)]
    pub uninstall: bool,

    /// Print the CA certificate and key storage location
    #[arg(long = "CAROOT", conflicts_with_all = ["install", "uninstall"])]
    pub caroot: bool,

    /// Generate a ".p12" PKCS #12 file with certificate and key
    #[arg(long)]
    pub pkcs12: bool,

    /// Generate a certificate with an ECDSA key
    #[arg(long)]
    pub ecdsa: bool,

    /// Generate a certificate for client authentication
    #[arg(long)]
    pub client: bool,

    /// Generate a certificate based on the supplied CSR
    #[arg(long, value_name = "CSR", conflicts_with_all = ["pkcs12", "ecdsa", "client", "names"])]
    pub csr: Option<PathBuf>,

    /// Customize the certificate output path
    #[arg(long, value_name = "FILE")]
    pub cert_file: Option<PathBuf>,

    /// Customize the key output path
    #[arg(long, value_name = "FILE")]
    pub key_file: Option<PathBuf>,

    /// Customize the PKCS #12 output path
    #[arg(long, value_name = "FILE")]
    pub p12_file: Option<PathBuf>,

    /// Hostnames, IPs, emails or URLs to certify
    pub names: Vec<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("LOCALCA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Run CLI and dispatch to handlers.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let settings = Settings::from_env()
        .context("failed to find the default CA location, set one as the CAROOT env var")?;

    if cli.caroot {
        println!("{}", settings.caroot.display());
        return Ok(());
    }
    if !cli.install && !cli.uninstall && cli.csr.is_none() && cli.names.is_empty() {
        Cli::command().print_help()?;
        return Ok(());
    }

    let sys: Arc<dyn System> = Arc::new(HostSystem::detect());
    let mut session = Session::open(&settings, sys)?;
    if session.created() {
        println!("Created a new local CA at {}", settings.caroot.display());
    }

    let report = if cli.install {
        let report = session.install();
        print_install(&report);
        report
    } else if cli.uninstall {
        let report = session.uninstall();
        print_uninstall(&report);
        return finish(&report);
    } else {
        let report = session.check();
        print_check(&report);
        report
    };
    finish(&report)?;
    if cli.names.is_empty() && cli.csr.is_none() {
        return Ok(());
    }

    if let Some(csr) = &cli.csr {
        cmd_csr(&session, csr, cli.cert_file.clone())
    } else {
        cmd_issue(&session, &cli)
    }
}

/// Fail the run if any store reported a fatal error. Nothing is issued
/// after a failed trust step.
fn finish(report: &Report) -> Result<()> {
    if report.has_failures() {
        anyhow::bail!(match report.op {
            Op::Check => "the local CA could not be checked in every trust store",
            Op::Install => "the local CA could not be installed in every trust store",
            Op::Uninstall => "the local CA could not be uninstalled from every trust store",
        });
    }
    Ok(())
}

fn print_notices(notices: &[Notice]) {
    for n in notices {
        eprintln!("Warning: {}", n.hint());
    }
}

fn print_failures(report: &Report) {
    for (store, e) in report.failures() {
        eprintln!("ERROR: {} trust store: {e}", store.name);
    }
}

fn print_install(report: &Report) {
    for store in &report.stores {
        match &store.status {
            StoreStatus::AlreadyInstalled => {
                println!("The local CA is already installed in the {} trust store!", store.name)
            }
            StoreStatus::Installed if store.backend == Backend::Nss => println!(
                "The local CA is now installed in the {} trust store (requires browser restart)!",
                store.name
            ),
            StoreStatus::Installed => {
                println!("The local CA is now installed in the {} trust store!", store.name)
            }
            _ => {}
        }
    }
    print_notices(&report.notices);
    print_failures(report);
    println!();
}

fn print_uninstall(report: &Report) {
    for store in &report.stores {
        if let StoreStatus::Uninstalled = store.status {
            println!(
                "The local CA is now uninstalled from the {} trust store(s)!",
                store.name
            );
        }
    }
    print_notices(&report.notices);
    print_failures(report);
    println!();
}

fn print_check(report: &Report) {
    let results = doctor::run_checks(report);
    for r in results.iter().filter(|r| !r.ok) {
        eprintln!("Note: {}", r.message);
    }
    print_failures(report);
    if doctor::needs_install(&results) && !report.has_failures() {
        eprintln!("Run \"localca --install\" for certificates to be trusted automatically.");
    }
}

fn cmd_issue(session: &Session, cli: &Cli) -> Result<()> {
    let names = name::parse_names(&cli.names)?;
    let opts = LeafOptions {
        ecdsa: cli.ecdsa,
        client: cli.client,
        pkcs12: cli.pkcs12,
    };
    let issued = session.issue(&names, &opts)?;

    let labels: Vec<String> = names.iter().map(ToString::to_string).collect();
    let files = OutputFiles::for_names(
        &labels,
        cli.client,
        &OutputOverrides {
            cert_file: cli.cert_file.clone(),
            key_file: cli.key_file.clone(),
            p12_file: cli.p12_file.clone(),
        },
    );

    if cli.pkcs12 {
        let bundle = cert::to_pkcs12(&issued, session.ca())?;
        store::write_public(&files.p12, &bundle)?;
    } else {
        cert::write_pem_files(&issued, &files)?;
    }

    println!("\nCreated a new certificate valid for the following names");
    for l in &labels {
        println!(" - {l:?}");
    }
    if let Some(wildcard) = names.iter().find(|n| n.is_wildcard()) {
        let rest = wildcard.to_string();
        println!(
            "\nReminder: X.509 wildcards only go one level deep, so this won't match a.b.{}",
            rest.trim_start_matches("*.")
        );
    }

    if cli.pkcs12 {
        println!(
            "\nThe PKCS#12 bundle is at {:?} (password {:?})",
            files.p12,
            cert::PKCS12_PASSWORD
        );
    } else if files.cert == files.key {
        println!("\nThe certificate and key are at {:?}", files.cert);
    } else {
        println!(
            "\nThe certificate is at {:?} and the key at {:?}",
            files.cert, files.key
        );
    }
    print_expiry(issued.not_after);
    Ok(())
}

fn cmd_csr(session: &Session, csr: &Path, cert_file: Option<PathBuf>) -> Result<()> {
    let pem = std::fs::read_to_string(csr)
        .with_context(|| format!("failed to read the CSR {}", csr.display()))?;
    let issued = session.sign_csr(&pem)?;

    let out = cert::csr_output_file(csr, cert_file.as_deref());
    store::write_public(&out, issued.cert_pem.as_bytes())?;

    println!("\nCreated a new certificate from {:?}", csr);
    println!("\nThe certificate is at {:?}", out);
    print_expiry(issued.not_after);
    Ok(())
}

fn print_expiry(not_after: time::OffsetDateTime) {
    println!(
        "\nIt will expire on {} {} {}\n",
        not_after.day(),
        not_after.month(),
        not_after.year()
    );
}

