//! Translate parsed commands into store calls and print the results.

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::warn;

use stockroom_events::EventBus;
use stockroom_inventory::{MovementKind, MovementRecord, NewMovement};
use stockroom_infra::{AlertBus, StockReport, Store, StoreConfig};
use stockroom_production::{ProduceBatch, ProductionBatch};
use stockroom_products::{NewProduct, Product, ProductFilter, ReorderPolicy};

use crate::backup;
use crate::cli::{
    AddProductArgs, AdjustArgs, BatchCommand, Cli, Command, ExportArgs, OutflowArgs, ProductCommand,
    ReceiveArgs, RecipeArgs, RecipeCommand, ReportCommand,
};
use crate::export::{self, BatchRow, ProductRow};

/// Open the store, run one command, then report any low-stock alerts it raised.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = StoreConfig::from_env().context("invalid store configuration")?;
    if let Some(url) = cli.database {
        config = config.with_database_url(url);
    }
    let store = Store::open(&config, AlertBus::default())
        .await
        .with_context(|| format!("cannot open {}", config.database_url))?;
    let alerts = store.bus().subscribe();

    let wants_auto_backup = !cli.no_auto_backup && !config.is_in_memory() && !matches!(cli.command, Command::Backup { .. });
    if wants_auto_backup {
        match backup::backup_if_stale(&store, &cli.backup_dir, Utc::now()).await {
            Ok(Some(path)) => eprintln!("backed up to {}", path.display()),
            Ok(None) => {}
            Err(err) => warn!(error = %format!("{err:#}"), "startup backup failed"),
        }
    }

    let result = execute(&store, &cli.backup_dir, cli.command).await;
    for alert in alerts.drain() {
        eprintln!("{alert}");
    }
    store.close().await;
    result
}

async fn execute(store: &Store, backup_dir: &Path, command: Command) -> Result<()> {
    match command {
        Command::Product(cmd) => product_command(store, cmd).await,
        Command::Receive(args) => receive(store, args).await,
        Command::Consume(args) => outflow(store, MovementKind::ProductionConsumption, args).await,
        Command::Sell(args) => outflow(store, MovementKind::Sale, args).await,
        Command::Adjust(args) => adjust(store, args).await,
        Command::Reverse { movement, at } => {
            let record = store
                .reverse_movement(movement, at_or_now(at))
                .await
                .with_context(|| format!("cannot reverse movement {movement}"))?;
            print_recorded(store, &record).await
        }
        Command::History { sku, export } => {
            let product = resolve(store, &sku).await?;
            let history = store.movement_history(product.id_typed()).await?;
            if export.csv {
                return export::export(&history, export.output.as_deref());
            }
            println!("{:<32} {:<22} {:>8}  {:<36}  NOTE", "WHEN", "KIND", "DELTA", "ID");
            for m in &history {
                let note = match (&m.note, m.reverses) {
                    (_, Some(original)) => format!("reverses {original}"),
                    (Some(note), None) => note.clone(),
                    (None, None) => String::new(),
                };
                println!(
                    "{:<32} {:<22} {:>8}  {}  {note}",
                    m.occurred_at.to_rfc3339(),
                    m.kind.as_str(),
                    m.delta,
                    m.id
                );
            }
            Ok(())
        }
        Command::Recipe(cmd) => recipe_command(store, cmd).await,
        Command::Batch(cmd) => batch_command(store, cmd).await,
        Command::Report(cmd) => report_command(store, cmd).await,
        Command::Backup { reason } => {
            let path = backup::create_backup(store, backup_dir, &reason, Utc::now()).await?;
            println!("backed up to {}", path.display());
            Ok(())
        }
    }
}

fn at_or_now(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or_else(Utc::now)
}

async fn resolve(store: &Store, sku: &str) -> Result<Product> {
    store
        .product_by_sku(sku)
        .await
        .with_context(|| format!("cannot resolve SKU `{sku}`"))
}

async fn print_recorded(store: &Store, record: &MovementRecord) -> Result<()> {
    let product = store.get_product(record.product_id).await?;
    let on_hand = store.on_hand(record.product_id).await?;
    println!(
        "{} {:+} {} {}; on hand {on_hand} (movement {})",
        record.kind,
        record.delta,
        product.unit(),
        product.sku(),
        record.id
    );
    Ok(())
}

async fn product_command(store: &Store, cmd: ProductCommand) -> Result<()> {
    match cmd {
        ProductCommand::Add(args) => add_product(store, args).await,
        ProductCommand::List { category, search, export } => {
            let mut filter = category.map(ProductFilter::category).unwrap_or_else(ProductFilter::all);
            if let Some(needle) = search {
                filter = filter.with_search(needle);
            }
            let products = store.list_products(&filter).await?;
            if export.csv {
                let rows: Vec<ProductRow> = products.iter().map(ProductRow::from).collect();
                return export::export(&rows, export.output.as_deref());
            }
            println!("{:<24} {:<32} {:<14} {:<8} {:>9}", "SKU", "NAME", "CATEGORY", "UNIT", "THRESHOLD");
            for p in &products {
                println!(
                    "{:<24} {:<32} {:<14} {:<8} {:>9}",
                    p.sku(),
                    p.name(),
                    p.category().as_str(),
                    p.unit(),
                    p.reorder_threshold()
                );
            }
            Ok(())
        }
        ProductCommand::Show { sku } => {
            let product = resolve(store, &sku).await?;
            let on_hand = store.on_hand(product.id_typed()).await?;
            println!("{} ({})", product.name(), product.sku());
            println!("  id:        {}", product.id_typed());
            println!("  category:  {}", product.category());
            println!("  on hand:   {on_hand} {}", product.unit());
            println!(
                "  reorder:   at {} -> order {}",
                product.reorder_threshold(),
                product.reorder_quantity()
            );
            if let Some(cost) = product.cost_per_unit() {
                println!("  cost/unit: {cost}");
            }
            if let Some(supplier) = product.supplier() {
                println!("  supplier:  {supplier}");
            }
            if product.is_low(on_hand) {
                println!("  LOW STOCK");
            }
            let lots = store.lots(product.id_typed()).await?;
            for lot in lots.iter().filter(|lot| !lot.is_exhausted()) {
                let expiry = lot
                    .expires_at
                    .map(|at| format!(", expires {}", at.date_naive()))
                    .unwrap_or_default();
                println!(
                    "  lot {}: {}/{} from {}{expiry}",
                    lot.id,
                    lot.remaining,
                    lot.quantity_received,
                    lot.acquired_at.date_naive()
                );
            }
            Ok(())
        }
        ProductCommand::SetThreshold {
            sku,
            threshold,
            reorder_quantity,
        } => {
            let product = resolve(store, &sku).await?;
            let policy = ReorderPolicy::new(threshold, reorder_quantity.unwrap_or(product.reorder_quantity()))?;
            let updated = store.update_reorder_policy(product.id_typed(), policy).await?;
            println!(
                "{}: reorder at {} -> order {}",
                updated.sku(),
                updated.reorder_threshold(),
                updated.reorder_quantity()
            );
            Ok(())
        }
        ProductCommand::Delete { sku } => {
            let product = resolve(store, &sku).await?;
            store
                .delete_product(product.id_typed())
                .await
                .with_context(|| format!("cannot delete {sku}"))?;
            println!("deleted {sku}");
            Ok(())
        }
    }
}

async fn add_product(store: &Store, args: AddProductArgs) -> Result<()> {
    let mut spec = if args.finished {
        NewProduct::finished_good(args.sku, args.name, args.unit)
    } else {
        NewProduct::raw_material(args.sku, args.name, args.unit)
    }
    .with_reorder(args.threshold, args.reorder_quantity);
    if let Some(cost) = args.cost {
        spec = spec.with_cost(cost);
    }
    if let Some(supplier) = args.supplier {
        spec = spec.with_supplier(supplier);
    }
    let id = store
        .create_product(&spec)
        .await
        .with_context(|| format!("cannot add {}", spec.sku))?;
    println!("added {} ({id})", spec.sku.trim());
    Ok(())
}

async fn receive(store: &Store, args: ReceiveArgs) -> Result<()> {
    let product = resolve(store, &args.sku).await?;
    let mut movement = NewMovement::new(
        product.id_typed(),
        MovementKind::Receipt,
        args.quantity,
        at_or_now(args.at),
    );
    if let Some(note) = args.note {
        movement = movement.with_note(note);
    }
    if let Some(expires) = args.expires {
        movement = movement.with_expiry(expires);
    }
    let record = store.record(movement).await?;
    print_recorded(store, &record).await
}

async fn outflow(store: &Store, kind: MovementKind, args: OutflowArgs) -> Result<()> {
    let product = resolve(store, &args.sku).await?;
    let mut movement = NewMovement::new(product.id_typed(), kind, -args.quantity, at_or_now(args.at));
    if let Some(note) = args.note {
        movement = movement.with_note(note);
    }
    let record = store.record(movement).await?;
    print_recorded(store, &record).await
}

async fn adjust(store: &Store, args: AdjustArgs) -> Result<()> {
    let product = resolve(store, &args.sku).await?;
    let mut movement = NewMovement::new(
        product.id_typed(),
        MovementKind::Adjustment,
        args.delta,
        at_or_now(args.at),
    );
    if let Some(note) = args.note {
        movement = movement.with_note(note);
    }
    let record = store.record(movement).await?;
    print_recorded(store, &record).await
}

async fn recipe_command(store: &Store, cmd: RecipeCommand) -> Result<()> {
    match cmd {
        RecipeCommand::Define(args) => save_recipe(store, args, false).await,
        RecipeCommand::Replace(args) => save_recipe(store, args, true).await,
        RecipeCommand::Show { sku } => {
            let finished = resolve(store, &sku).await?;
            let recipe = store.recipe(finished.id_typed()).await?;
            println!("{} per 1 {}:", finished.sku(), finished.unit());
            for line in recipe.lines() {
                let material = store.get_product(line.material_id).await?;
                println!("  {:>8} {} {}", line.quantity_per_unit, material.unit(), material.sku());
            }
            if let Some(notes) = recipe.notes() {
                println!("  notes: {notes}");
            }
            Ok(())
        }
        RecipeCommand::Delete { sku } => {
            let finished = resolve(store, &sku).await?;
            store.delete_recipe(finished.id_typed()).await?;
            println!("deleted recipe for {sku}");
            Ok(())
        }
    }
}

async fn save_recipe(store: &Store, args: RecipeArgs, replace: bool) -> Result<()> {
    let finished = resolve(store, &args.sku).await?;
    let mut lines = Vec::with_capacity(args.lines.len());
    for (sku, quantity) in &args.lines {
        lines.push((resolve(store, sku).await?.id_typed(), *quantity));
    }
    let recipe = if replace {
        store.replace_recipe(finished.id_typed(), &lines, args.notes).await?
    } else {
        store.define_recipe(finished.id_typed(), &lines, args.notes).await?
    };
    println!("recipe for {} has {} material line(s)", finished.sku(), recipe.lines().len());
    Ok(())
}

async fn batch_by_number(store: &Store, number: i64) -> Result<ProductionBatch> {
    let batches = store.batches(None).await?;
    match batches.into_iter().find(|b| b.batch_number == number) {
        Some(batch) => Ok(batch),
        None => bail!("batch {number} not found"),
    }
}

async fn batch_command(store: &Store, cmd: BatchCommand) -> Result<()> {
    match cmd {
        BatchCommand::Produce {
            sku,
            quantity,
            number,
            no_consume,
            notes,
            at,
        } => {
            let product = resolve(store, &sku).await?;
            let mut request = ProduceBatch::new(product.id_typed(), quantity, at_or_now(at));
            if let Some(number) = number {
                request = request.with_batch_number(number);
            }
            if no_consume {
                request = request.without_consumption();
            }
            if let Some(notes) = notes {
                request = request.with_notes(notes);
            }
            let batch = store
                .produce_batch(request)
                .await
                .with_context(|| format!("cannot produce {quantity} {sku}"))?;
            println!(
                "batch {}: produced {} {} ({} material movement(s))",
                batch.batch_number,
                batch.quantity,
                product.sku(),
                batch.consumptions.len()
            );
            Ok(())
        }
        BatchCommand::Ship { number, at } => {
            let batch = batch_by_number(store, number).await?;
            let shipped = store.ship_batch(batch.id, at_or_now(at)).await?;
            println!("batch {} shipped", shipped.batch_number);
            Ok(())
        }
        BatchCommand::Cancel { number, at } => {
            let batch = batch_by_number(store, number).await?;
            let cancelled = store.cancel_batch(batch.id, at_or_now(at)).await?;
            println!("batch {} cancelled; materials restored", cancelled.batch_number);
            Ok(())
        }
        BatchCommand::List { status, export } => {
            let batches = store.reports().batches(status).await?;
            let rows: Vec<BatchRow> = batches.iter().map(BatchRow::from).collect();
            if export.csv {
                return export::export(&rows, export.output.as_deref());
            }
            println!("{:>6} {:<10} {:>8} {:<32} PRODUCT", "BATCH", "STATUS", "QTY", "COMPLETED");
            for b in &batches {
                let product = store.get_product(b.product_id).await?;
                println!(
                    "{:>6} {:<10} {:>8} {:<32} {}",
                    b.batch_number,
                    b.status.as_str(),
                    b.quantity,
                    b.completed_at.to_rfc3339(),
                    product.sku()
                );
            }
            Ok(())
        }
    }
}

fn print_stock(rows: &[StockReport]) {
    println!("{:<24} {:<32} {:>10} {:>9}  UNIT", "SKU", "NAME", "ON HAND", "THRESHOLD");
    for r in rows {
        let flag = if r.is_low() { "  LOW" } else { "" };
        println!(
            "{:<24} {:<32} {:>10} {:>9}  {}{flag}",
            r.sku, r.name, r.on_hand, r.reorder_threshold, r.unit
        );
    }
}

fn export_or<T, F>(rows: &[T], export: &ExportArgs, print: F) -> Result<()>
where
    T: serde::Serialize,
    F: FnOnce(&[T]),
{
    if export.csv {
        export::export(rows, export.output.as_deref())
    } else {
        print(rows);
        Ok(())
    }
}

async fn report_command(store: &Store, cmd: ReportCommand) -> Result<()> {
    let reports = store.reports();
    match cmd {
        ReportCommand::Stock { export } => {
            let rows = reports.current_stock_levels().await?;
            export_or(&rows, &export, print_stock)
        }
        ReportCommand::Low { export } => {
            let rows = reports.low_stock_products().await?;
            export_or(&rows, &export, print_stock)
        }
        ReportCommand::Usage { sku, window, export } => {
            let product = resolve(store, &sku).await?;
            let (start, end) = window.bounds();
            let rows = reports.usage_over_period(product.id_typed(), start, end).await?;
            export_or(&rows, &export, |rows| {
                println!("{:<12} {:>10}", "DATE", "NET");
                for day in rows {
                    println!("{:<12} {:>+10}", day.date, day.net_delta);
                }
            })
        }
        ReportCommand::Sales { window, export } => {
            let (start, end) = window.bounds();
            let rows = reports.sales_summary(start, end).await?;
            export_or(&rows, &export, |rows| {
                println!("{:<24} {:<32} {:>10}", "SKU", "NAME", "SOLD");
                for s in rows {
                    println!("{:<24} {:<32} {:>10}", s.sku, s.name, s.quantity_sold);
                }
            })
        }
        ReportCommand::Audit { export } => {
            let rows = reports.audit_balances().await?;
            export_or(&rows, &export, |rows| {
                if rows.is_empty() {
                    println!("ledger balanced");
                    return;
                }
                println!("{:<24} {:>10} {:>10} {:>10}", "SKU", "ON HAND", "LEDGER", "LOTS");
                for m in rows {
                    println!("{:<24} {:>10} {:>10} {:>10}", m.sku, m.on_hand, m.ledger_sum, m.lot_sum);
                }
            })
        }
    }
}
