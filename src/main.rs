//! `escrowfold` command-line entry point.

use std::error::Error;
use std::sync::Arc;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use escrowfold::{
    Buyer, CommandContext, DealPayload, DealRepository, FileStore, Handover, HandoverAction,
    HandoverVerifier, InvoiceIndex, PickupCenter, VerifyOutcome, demo_seed, project,
};

use crate::config::{Cli, Command, CreateArgs, LogFormat};

mod config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::load().unwrap_or_else(|e| e.exit());
    init_tracing(&cli);

    let repo = DealRepository::builder()
        .store(Arc::new(FileStore::new(cli.data_dir.clone())))
        .policy(cli.policy.into())
        .seed(demo_seed())
        .build();

    tracing::debug!(data_dir = %cli.data_dir.display(), policy = ?cli.policy, "repository ready");

    match cli.command {
        Command::Create(args) => {
            let deal = repo.create(payload(args), CommandContext::default()).await?;
            print_json(&deal)?;
        }
        Command::Show { id, document } => match repo.get(&id).await? {
            Some(deal) if document => print_json(&project(&deal))?,
            Some(deal) => print_json(&deal)?,
            None => return Err(format!("deal {id} not found").into()),
        },
        Command::List => print_json(&repo.list().await?)?,
        Command::Invoices => {
            let deals = repo.list().await?;
            print_json(&InvoiceIndex::compute(&deals))?;
        }
        Command::Op {
            id,
            command,
            actor,
            correlation_id,
        } => {
            let mut ctx = CommandContext::default();
            if let Some(actor) = actor {
                ctx = ctx.with_actor(actor.into());
            }
            if let Some(correlation_id) = correlation_id {
                ctx = ctx.with_correlation_id(correlation_id);
            }
            match repo.execute(&id, command, ctx).await? {
                Some(deal) => print_json(&deal)?,
                None => return Err(format!("deal {id} not found").into()),
            }
        }
        Command::Verify { otp, deal, release } => {
            let verifier = HandoverVerifier::new(repo);
            match deal {
                None => {
                    let matches = verifier.lookup(&otp).await?;
                    let ids: Vec<&str> = matches.iter().map(|d| d.id.as_str()).collect();
                    print_json(&ids)?;
                }
                Some(id) => {
                    let action = if release {
                        HandoverAction::Release
                    } else {
                        HandoverAction::ConfirmHandover
                    };
                    match verifier
                        .confirm(&id, &otp, action, CommandContext::default())
                        .await?
                    {
                        VerifyOutcome::Confirmed(deal) => print_json(&deal)?,
                        VerifyOutcome::NoMatch => return Err("otp does not match".into()),
                        VerifyOutcome::NotFound => {
                            return Err(format!("deal {id} not found").into());
                        }
                    }
                }
            }
        }
        Command::Reset => {
            let deals = repo.reset_demo().await?;
            tracing::info!(count = deals.len(), "demo data restored");
            print_json(&deals)?;
        }
    }

    Ok(())
}

/// Install the global subscriber. Logs go to stderr so stdout stays JSON.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().with_current_span(true).init(),
    }
}

fn payload(args: CreateArgs) -> DealPayload {
    let handover = match args.centre_id {
        Some(id) => Handover::Centre(PickupCenter {
            id,
            name: args.centre_name.unwrap_or_default(),
            address: args.centre_address,
        }),
        None => Handover::Delivery,
    };
    DealPayload {
        title: args.title,
        quantity: args.quantity,
        unit_price: args.unit_price,
        buyer: Buyer {
            name: args.buyer_name,
            phone: args.buyer_phone,
            email: args.buyer_email,
        },
        handover,
        notes: args.notes,
        images: args.images,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
