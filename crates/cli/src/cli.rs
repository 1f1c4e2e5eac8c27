//! Command-line surface.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use stockroom_core::MovementId;
use stockroom_production::BatchStatus;
use stockroom_products::Category;

#[derive(Debug, Parser)]
#[command(name = "stockroom", version, about = "Inventory tracking for a small workshop")]
pub struct Cli {
    /// SQLite database URL; overrides STOCKROOM_DATABASE_URL.
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Directory for timestamped backups.
    #[arg(long, global = true, env = "STOCKROOM_BACKUP_DIR", default_value = "data/backups")]
    pub backup_dir: PathBuf,

    /// Skip the automatic startup backup.
    #[arg(long, global = true)]
    pub no_auto_backup: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the product catalog.
    #[command(subcommand)]
    Product(ProductCommand),
    /// Record goods arriving from a supplier.
    Receive(ReceiveArgs),
    /// Record materials used outside a production batch.
    Consume(OutflowArgs),
    /// Record a sale.
    Sell(OutflowArgs),
    /// Correct stock after a count; the delta may be negative.
    Adjust(AdjustArgs),
    /// Undo a movement with a compensating entry.
    Reverse {
        movement: MovementId,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Movement history of one product.
    History {
        sku: String,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Manage bills of materials.
    #[command(subcommand)]
    Recipe(RecipeCommand),
    /// Produce, ship and cancel production batches.
    #[command(subcommand)]
    Batch(BatchCommand),
    /// Read-only reports.
    #[command(subcommand)]
    Report(ReportCommand),
    /// Write a timestamped copy of the database to the backup directory.
    Backup {
        #[arg(long, default_value = "manual")]
        reason: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    Add(AddProductArgs),
    List {
        #[arg(long)]
        category: Option<Category>,
        /// Case-insensitive match on SKU or name.
        #[arg(long)]
        search: Option<String>,
        #[command(flatten)]
        export: ExportArgs,
    },
    Show {
        sku: String,
    },
    /// Change the reorder threshold (and optionally the reorder quantity).
    SetThreshold {
        sku: String,
        threshold: i64,
        #[arg(long)]
        reorder_quantity: Option<i64>,
    },
    /// Remove a product that has no movements, recipes or batches.
    Delete {
        sku: String,
    },
}

#[derive(Debug, Args)]
pub struct AddProductArgs {
    pub sku: String,
    pub name: String,
    pub unit: String,
    /// Register a finished good instead of a raw material.
    #[arg(long)]
    pub finished: bool,
    #[arg(long, default_value_t = 0)]
    pub threshold: i64,
    #[arg(long, default_value_t = 0)]
    pub reorder_quantity: i64,
    /// Cost per unit in minor currency units.
    #[arg(long)]
    pub cost: Option<i64>,
    #[arg(long)]
    pub supplier: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReceiveArgs {
    pub sku: String,
    #[arg(value_parser = clap::value_parser!(i64).range(1..))]
    pub quantity: i64,
    #[arg(long)]
    pub expires: Option<DateTime<Utc>>,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct OutflowArgs {
    pub sku: String,
    #[arg(value_parser = clap::value_parser!(i64).range(1..))]
    pub quantity: i64,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct AdjustArgs {
    pub sku: String,
    #[arg(allow_negative_numbers = true)]
    pub delta: i64,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Subcommand)]
pub enum RecipeCommand {
    /// Define the recipe of a finished good.
    Define(RecipeArgs),
    /// Replace the lines of an existing recipe.
    Replace(RecipeArgs),
    Show { sku: String },
    Delete { sku: String },
}

#[derive(Debug, Args)]
pub struct RecipeArgs {
    /// Finished good SKU.
    pub sku: String,
    /// Material line as `SKU=QUANTITY` per unit produced; repeatable.
    #[arg(long = "line", required = true, value_parser = parse_line)]
    pub lines: Vec<(String, i64)>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum BatchCommand {
    Produce {
        sku: String,
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        quantity: i64,
        /// Explicit batch number; defaults to the next free one.
        #[arg(long)]
        number: Option<i64>,
        /// Record the output without drawing raw materials.
        #[arg(long)]
        no_consume: bool,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    Ship {
        number: i64,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    Cancel {
        number: i64,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    List {
        #[arg(long)]
        status: Option<BatchStatus>,
        #[command(flatten)]
        export: ExportArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Current stock of every product.
    Stock {
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Products at or below their reorder threshold.
    Low {
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Net daily movement of one product.
    Usage {
        sku: String,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Units sold per product.
    Sales {
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Products whose counter disagrees with the ledger or lots.
    Audit {
        #[command(flatten)]
        export: ExportArgs,
    },
}

/// Inclusive range of UTC days.
#[derive(Debug, Args)]
pub struct WindowArgs {
    #[arg(long)]
    pub from: NaiveDate,
    #[arg(long)]
    pub to: NaiveDate,
}

impl WindowArgs {
    /// Half-open `[from 00:00, to+1 00:00)` in UTC.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.from.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = self
            .to
            .succ_opt()
            .unwrap_or(self.to)
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();
        (start, end)
    }
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Emit CSV instead of a table.
    #[arg(long)]
    pub csv: bool,
    /// Write the CSV to a file instead of stdout.
    #[arg(long, short, requires = "csv")]
    pub output: Option<PathBuf>,
}

fn parse_line(raw: &str) -> Result<(String, i64), String> {
    let (sku, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SKU=QUANTITY, got `{raw}`"))?;
    let sku = sku.trim();
    if sku.is_empty() {
        return Err(format!("missing SKU in `{raw}`"));
    }
    let quantity = quantity
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("bad quantity in `{raw}`: {e}"))?;
    Ok((sku.to_string(), quantity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stockroom").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn recipe_lines_parse() {
        let cli = parse(&["recipe", "define", "latte-kit", "--line", "matcha=10", "--line", "milk = 5"]);
        let Command::Recipe(RecipeCommand::Define(args)) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.lines, vec![("matcha".into(), 10), ("milk".into(), 5)]);

        assert!(parse_line("matcha").is_err());
        assert!(parse_line("=3").is_err());
        assert!(parse_line("matcha=lots").is_err());
    }

    #[test]
    fn adjust_accepts_negative_deltas() {
        let cli = parse(&["adjust", "matcha", "-3"]);
        let Command::Adjust(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.delta, -3);
    }

    #[test]
    fn outflows_need_positive_quantities() {
        assert!(Cli::try_parse_from(["stockroom", "sell", "matcha", "0"]).is_err());
        assert!(Cli::try_parse_from(["stockroom", "receive", "matcha", "-4"]).is_err());
    }

    #[test]
    fn typed_arguments_use_domain_parsers() {
        let cli = parse(&["product", "list", "--category", "finished_good", "--csv"]);
        let Command::Product(ProductCommand::List { category, export, .. }) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(category, Some(Category::FinishedGood));
        assert!(export.csv);

        assert!(Cli::try_parse_from(["stockroom", "batch", "list", "--status", "lost"]).is_err());
        assert!(Cli::try_parse_from(["stockroom", "report", "stock", "--output", "x.csv"]).is_err());
    }

    #[test]
    fn window_is_inclusive_of_the_last_day() {
        let window = WindowArgs {
            from: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
        };
        let (start, end) = window.bounds();
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-03-04T00:00:00+00:00");
    }
}
