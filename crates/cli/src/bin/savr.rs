use ai_client::{GoalRequest, LlmClient, LlmClientConfig, SavingsAdvisor};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use models::{CanisterReply, PlanCustomization, SavingRaw};
use serde_json::Value;
use services::PriceService;
use std::{fs, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "savr", about = "SAVR savings plan tools.")]
struct Args {
    /// Settings file; defaults to settings.json when present
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn raw canister savings records (JSON) into display-ready plans
    Plan {
        /// File holding one record, an array, or an {"Ok": [...]} reply
        #[arg(short, long)]
        input: PathBuf,

        /// Evaluate the remaining timeline at this instant (RFC 3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Price a withdrawal: fee, net payout and whether it is early
    Fee {
        /// Amount in ICP, as typed in the form
        #[arg(short, long)]
        amount: String,

        /// Plan target date, e.g. "March 2025" or 2025-03-01
        #[arg(short, long)]
        target_date: String,

        /// Available balance in ICP
        #[arg(long)]
        available: Option<f64>,

        /// Defaults to the local date
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Check plan customizations (JSON object or array) before starting them
    Validate {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Check a top-up amount, or a withdraw amount when --available is given
    CheckAmount {
        #[arg(short, long)]
        amount: String,

        #[arg(long)]
        available: Option<f64>,
    },

    /// Fetch the live ICP/USD price
    Price,

    /// Run the savings goal analysis
    Analyze {
        /// What you are saving for
        #[arg(short, long)]
        goal: String,

        /// Monthly income in USD
        #[arg(short = 'm', long)]
        income: f64,
    },
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Report {
    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
    fn print(&self, name: &str) {
        for w in &self.warnings {
            println!("[WARN] {}: {}", name, w);
        }
        for e in &self.errors {
            println!("[ERROR] {}: {}", name, e);
        }
    }
    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Accepts a single record, an array of records or a canister reply envelope.
fn parse_savings(raw: &str) -> Result<Vec<SavingRaw>> {
    let value: Value = serde_json::from_str(raw).context("parsing savings JSON")?;

    if value.get("Ok").is_some() || value.get("Err").is_some() {
        let reply: CanisterReply<Vec<SavingRaw>> =
            serde_json::from_value(value).context("parsing canister reply")?;
        return reply
            .into_result()
            .map_err(|msg| anyhow!("canister returned an error: {}", msg));
    }

    if value.is_array() {
        serde_json::from_value(value).context("parsing savings records")
    } else {
        let saving: SavingRaw = serde_json::from_value(value).context("parsing savings record")?;
        Ok(vec![saving])
    }
}

fn parse_customizations(raw: &str) -> Result<Vec<PlanCustomization>> {
    let value: Value = serde_json::from_str(raw).context("parsing plan JSON")?;
    if value.is_array() {
        serde_json::from_value(value).context("parsing plan list")
    } else {
        Ok(vec![serde_json::from_value(value).context("parsing plan")?])
    }
}

fn check_plan(plan: &PlanCustomization) -> Report {
    let mut rep = Report::default();

    let error = utils::validate_plan_customization(plan);
    if !error.is_empty() {
        rep.error(error);
        return rep;
    }

    let reachable = plan.monthly_icp * plan.months as f64;
    if reachable + f64::EPSILON < plan.total_icp {
        rep.warn(format!(
            "{} ICP x {} months only reaches {} of {} ICP",
            utils::format_icp(plan.monthly_icp),
            plan.months,
            utils::format_icp(reachable),
            utils::format_icp(plan.total_icp)
        ));
    }
    if plan.savings_rate > 50.0 {
        rep.warn(format!(
            "saving {:.0}% of income is hard to sustain",
            plan.savings_rate
        ));
    }
    rep
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Plan { input, now } => {
            let raw = fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let now = now.unwrap_or_else(Utc::now);
            let plans: Vec<_> = parse_savings(&raw)?
                .iter()
                .map(|saving| utils::transform_saving_data_at(saving, now))
                .collect();
            print_json(&plans)
        }

        Command::Fee {
            amount,
            target_date,
            available,
            today,
        } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let quote = utils::quote_withdrawal(
                &amount,
                available.unwrap_or(f64::MAX),
                &target_date,
                today,
            )
            .map_err(|msg| anyhow!(msg))?;

            println!("Amount:     {} ICP", utils::format_icp(quote.amount));
            println!(
                "Fee:        {} ICP ({:.0}%{})",
                utils::format_icp(quote.fee),
                quote.fee_rate * 100.0,
                if quote.is_force { ", early withdrawal" } else { "" }
            );
            println!("You receive {} ICP", utils::format_icp(quote.net_amount));
            Ok(())
        }

        Command::Validate { input } => {
            let raw = fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let mut any_errors = false;
            for (i, plan) in parse_customizations(&raw)?.iter().enumerate() {
                let report = check_plan(plan);
                report.print(&format!("plan[{}] '{}'", i, plan.name));
                any_errors |= report.has_errors();
            }
            if any_errors {
                Err(anyhow!("Validation failed"))
            } else {
                println!("All plans passed validation.");
                Ok(())
            }
        }

        Command::CheckAmount { amount, available } => {
            let error = match available {
                Some(max) => utils::validate_withdraw_amount(&amount, max),
                None => utils::validate_top_up_amount(&amount),
            };
            if error.is_empty() {
                println!("OK");
                Ok(())
            } else {
                Err(anyhow!(error))
            }
        }

        Command::Price => {
            let settings = settings_loader::load_settings_or_default(args.settings.as_ref())?;
            let prices = PriceService::new(
                &settings.price,
                settings_loader::secret(services::price::PRICE_API_KEY_ENV),
            )?;
            let data = prices.refresh_price().await;
            if let Some(error) = data.error {
                return Err(anyhow!(error));
            }
            println!(
                "ICP/USD {:.4} ({:+.2} / {:+.2}% 24h)",
                data.price, data.change_24h, data.change_percent_24h
            );
            Ok(())
        }

        Command::Analyze { goal, income } => {
            if goal.trim().is_empty() {
                return Err(anyhow!("Please describe your savings goal"));
            }
            let settings = settings_loader::load_settings_or_default(args.settings.as_ref())?;

            let prices = PriceService::new(
                &settings.price,
                settings_loader::secret(services::price::PRICE_API_KEY_ENV),
            )?;
            let price = prices.refresh_price().await;
            if let Some(error) = &price.error {
                tracing::warn!(error = %error, "continuing without a live ICP price");
            }

            let config = LlmClientConfig::from_settings(&settings.llm);
            let client = match config.api_key {
                Some(_) => Some(LlmClient::new(config)?),
                None => None,
            };
            let advisor = SavingsAdvisor::new(client);

            let request = GoalRequest {
                target: goal,
                monthly_income: income,
            };
            let analysis = advisor
                .analyze_savings_goal(&request, price.price, Local::now().date_naive())
                .await;
            print_json(&analysis)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Args::parse()).await
}
