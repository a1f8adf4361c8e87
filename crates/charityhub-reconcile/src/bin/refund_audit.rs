//! Read-only refund consistency audit. Safe to run against production.

use std::process::ExitCode;

fn main() -> ExitCode {
    charityhub_reconcile::cli::main_with(charityhub_reconcile::cli::audit_command)
}
