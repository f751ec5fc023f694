use clap::Parser;

/// Runs one reconciliation job to completion and exits.
///
/// Meant to be invoked from a scheduler (cron, systemd timer), one invocation per job per
/// tick. The job id is a plain string on purpose: an unknown id is a no-op with a diagnostic,
/// not a usage error.
#[derive(Parser, Debug)]
#[command(name = "recon_runner", version, about = "Runs one token-payment reconciliation job")]
pub struct Cli {
    /// The job to run: payments | orders | retry
    pub job: String,
}
