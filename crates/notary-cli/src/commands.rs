use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use notary_client::{CachedBalance, HttpStatusSource, PollConfig, PollOutcome, StatusPoller};
use notary_crypto::{fingerprint_file, VerifyingKey};
use notary_server::{NotaryServer, ServerConfig};
use notary_types::{RegistrationId, RegistrationStatus};
use notary_verify::{ProofVerifier, Subject, VerificationResult, VerificationStatus, VerifierConfig};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let format = cli.format;
    match cli.command {
        Command::Fingerprint(args) => cmd_fingerprint(args, format),
        Command::Verify(args) => cmd_verify(args, format).await,
        Command::Watch(args) => cmd_watch(args, format).await,
        Command::Balance(args) => cmd_balance(args, format).await,
        Command::Serve(args) => cmd_serve(args).await,
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct FingerprintLine {
    file: String,
    fingerprint: String,
}

fn cmd_fingerprint(args: FingerprintArgs, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let mut lines = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let fingerprint = fingerprint_file(path)?;
        lines.push(FingerprintLine {
            file: path.display().to_string(),
            fingerprint: fingerprint.to_hex(),
        });
    }
    match format {
        OutputFormat::Json => print_json(&lines)?,
        OutputFormat::Text => {
            for line in &lines {
                println!("{}  {}", line.fingerprint.cyan(), line.file);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let result = match (&args.proof, &args.server) {
        (Some(proof), _) => {
            let artifact = std::fs::read(proof)
                .with_context(|| format!("reading proof file {}", proof.display()))?;
            let subject = offline_subject(&args)?;
            let config = VerifierConfig {
                trusted_calendar_keys: trusted_keys(&args).await?,
                ..VerifierConfig::default()
            };
            ProofVerifier::offline(config).verify_artifact(&subject, &artifact)
        }
        (None, Some(server)) => {
            let fingerprint = match (&args.fingerprint, &args.content) {
                (Some(fp), _) => fp.clone(),
                (None, Some(path)) => fingerprint_file(path)?.to_hex(),
                (None, None) => bail!("pass --fingerprint or --content"),
            };
            HttpStatusSource::new(server.as_str())?
                .verify_fingerprint(&fingerprint)
                .await?
        }
        (None, None) => bail!("pass --proof to verify offline, or --server to ask a Notary server"),
    };

    info!(status = ?result.status, fingerprint = %result.fingerprint, "verification finished");
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_verification(&result),
    }
    Ok(if result.is_verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn offline_subject(args: &VerifyArgs) -> anyhow::Result<Subject> {
    match (&args.fingerprint, &args.content) {
        (Some(fp), _) => Ok(Subject::Fingerprint(fp.clone())),
        (None, Some(path)) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading content {}", path.display()))?;
            Ok(Subject::Content(bytes))
        }
        (None, None) => bail!("pass --content or --fingerprint with --proof"),
    }
}

/// Calendar keys for offline verification: `--trusted-key` values, or the
/// key a `--server` reports. The artifact's own key is never used.
async fn trusted_keys(args: &VerifyArgs) -> anyhow::Result<Vec<VerifyingKey>> {
    if !args.trusted_keys.is_empty() {
        return parse_keys(&args.trusted_keys);
    }
    let Some(server) = &args.server else {
        bail!("offline verification needs --trusted-key <hex>, or --server to fetch the calendar key");
    };
    let key = HttpStatusSource::new(server.as_str())?
        .calendar_key()
        .await
        .with_context(|| format!("fetching the calendar key from {server}"))?;
    debug!(server = %server, key = %key, "trusting the server's calendar key");
    parse_keys(&[key])
}

fn parse_keys(keys: &[String]) -> anyhow::Result<Vec<VerifyingKey>> {
    keys.iter()
        .map(|k| VerifyingKey::from_hex(k).with_context(|| format!("invalid trusted key {k}")))
        .collect()
}

fn print_verification(result: &VerificationResult) {
    let status = match result.status {
        VerificationStatus::Verified => "VERIFIED".green().bold(),
        VerificationStatus::Processing => "PROCESSING".yellow().bold(),
        VerificationStatus::NotFound => "NOT FOUND".red().bold(),
        VerificationStatus::InvalidFormat => "INVALID FORMAT".red().bold(),
    };
    println!("{status}  {}", result.fingerprint.cyan());
    println!("  {}", result.message);
    if let Some(registration) = &result.registration {
        println!("  Registration: {} ({})", registration.id, registration.status);
        println!("  Registered:   {}", registration.registered_at);
    }
    if let Some(proof) = &result.proof {
        println!("  Network:      {} / {}", proof.network, proof.method);
        if let Some(block) = &proof.block_reference {
            println!("  Block:        {}", block.yellow());
        }
        if let Some(at) = proof.confirmed_at {
            println!("  Confirmed:    {at}");
        }
    }
    if let Some(notice) = &result.legal_notice {
        println!("\n{}", notice.dimmed());
    }
}

async fn cmd_watch(args: WatchArgs, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let id: RegistrationId = args
        .registration
        .parse()
        .with_context(|| format!("invalid registration id {}", args.registration))?;
    let source = Arc::new(HttpStatusSource::new(args.server.as_str())?);
    let poller = StatusPoller::new(
        source,
        PollConfig {
            interval: Duration::from_secs(args.interval.max(1)),
            max_wait: Duration::from_secs(args.max_wait),
        },
    );

    let handle = poller.spawn(id);
    let mut progress = handle.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = None;
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            if snapshot.status != last && format == OutputFormat::Text {
                if let Some(status) = snapshot.status {
                    eprintln!("[{:>3}%] {status}", snapshot.percent);
                }
            }
            last = snapshot.status;
        }
    });

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome,
        _ = tokio::signal::ctrl_c() => PollOutcome::Cancelled { last: None },
    };
    printer.abort();

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "registrationId": id,
            "status": outcome.last_status(),
            "message": outcome.user_message(),
        }))?,
        OutputFormat::Text => {
            let message = outcome.user_message();
            match outcome.last_status() {
                Some(RegistrationStatus::Confirmed) => println!("{} {message}", "✓".green().bold()),
                Some(RegistrationStatus::Failed) => println!("{} {message}", "✗".red().bold()),
                _ => println!("{} {message}", "…".yellow()),
            }
        }
    }
    Ok(match outcome {
        PollOutcome::Finished(r) if r.status == RegistrationStatus::Confirmed => ExitCode::SUCCESS,
        PollOutcome::Finished(_) => ExitCode::FAILURE,
        // Not a failure: anchoring continues on the server.
        PollOutcome::TimedOut { .. } | PollOutcome::Cancelled { .. } => ExitCode::from(2),
    })
}

async fn cmd_balance(args: BalanceArgs, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let source = HttpStatusSource::new(args.server.as_str())?.with_token(args.token);
    let balance = CachedBalance::new(Arc::new(source)).get().await?;
    match format {
        OutputFormat::Json => print_json(&balance)?,
        OutputFormat::Text => {
            println!("Account {}", balance.account_id.to_string().bold());
            println!("  Available: {}", balance.available_credits.to_string().green().bold());
            println!("  Used:      {}", balance.used_credits);
            println!("  Total:     {}", balance.total_credits);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address {bind}"))?;
    }
    info!(bind = %config.bind_addr, config = ?args.config, "starting notary server");
    NotaryServer::new(config)?.serve().await?;
    Ok(ExitCode::SUCCESS)
}
