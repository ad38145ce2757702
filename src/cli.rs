use crate::export;
use crate::ingest::{self, UploadRequest};
use crate::ledger::{compute_final_fees, FeeStatement};
use crate::models::{Amount, NotificationLevel};
use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

#[derive(Debug, Parser)]
#[command(name = "academy-desk", about = "Student fees and bulk result uploads for the academy CRM")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a student's fee statement
    Fees {
        student_id: String,
        /// Also write the statement to a CSV file
        #[arg(long)]
        export: bool,
    },
    /// Upload test results from a CSV/TSV file, or from stdin when no file is given
    Import {
        test_id: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Final fees after an absolute discount
    FinalFees { base_fees: Amount, discount: Amount },
}

/// `None` means no subcommand: start the TUI.
pub fn parse() -> Option<Command> {
    Cli::parse().command
}

/// Only commands that talk to the backend load configuration.
pub async fn run(command: Command) -> Result<()> {
    match command {
        Command::FinalFees { base_fees, discount } => {
            println!("{}", compute_final_fees(base_fees, discount));
        }
        Command::Fees { student_id, export } => {
            let (config, client) = crate::connect()?;
            let record = client.get_student_fees(&student_id).await?;
            let statement = FeeStatement::build(&record, Local::now().date_naive());
            print_statement(&statement);

            if export {
                let path = export::export_fee_statement(&statement, &config.export_dir)?;
                println!("Saved {}", path.display());
            }
        }
        Command::Import { test_id, file } => {
            let (_, client) = crate::connect()?;
            let mut pasted = String::new();
            if file.is_none() {
                tokio::io::stdin()
                    .read_to_string(&mut pasted)
                    .await
                    .context("Failed to read results from stdin")?;
            }

            let outcome = ingest::upload_results(&client, &UploadRequest { test_id, file, pasted }).await;
            let notification = ingest::notify(&outcome);

            println!("{}", notification.message);
            for detail in &notification.details {
                println!("  {}", detail);
            }
            if notification.level == NotificationLevel::Error {
                anyhow::bail!("upload did not complete");
            }
        }
    }
    Ok(())
}

fn print_statement(statement: &FeeStatement) {
    let student = &statement.student;
    println!(
        "{} ({})",
        student.name,
        student.roll_no.as_deref().unwrap_or(&student.id)
    );
    println!(
        "Final fees {} | Collected {} | Pending {}",
        statement.final_fees, statement.totals.total_collected, statement.totals.total_pending
    );
    for line in &statement.lines {
        println!(
            "  #{:<3} due {}  amount {:>8}  paid {:>8}  pending {:>8}  {}",
            line.installment_no,
            line.due_date.format("%Y-%m-%d"),
            line.amount,
            line.paid,
            line.pending,
            line.status
        );
    }
    if statement.plan_mismatch != 0 {
        println!(
            "Warning: installments differ from final fees by {}",
            statement.plan_mismatch
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_fees() {
        let cli = Cli::try_parse_from(["academy-desk", "final-fees", "50000", "5000"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::FinalFees {
                base_fees: 50000,
                discount: 5000
            })
        ));

        let cli = Cli::try_parse_from(["academy-desk"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[tokio::test]
    async fn test_final_fees_runs_without_configuration() {
        let command = Command::FinalFees {
            base_fees: 3000,
            discount: 5000,
        };
        assert!(run(command).await.is_ok());
    }
}
