use super::{summary, ui};
use crate::AppContext;
use crate::core::{FetchOutcome, FinanceError, MovementType, RecordId};
use anyhow::Result;
use chrono::NaiveDate;

fn report(err: &FinanceError) {
    eprintln!("{}", ui::style_text(&err.to_string(), ui::StyleType::Error));
}

/// Registers a movement and shows the updated summary.
pub async fn run_add(
    ctx: &AppContext,
    value: &str,
    description: &str,
    kind: MovementType,
) -> Result<()> {
    summary::load(&ctx.state, None).await;

    let pb = ui::new_spinner("Registering movement...");
    let result = ctx.state.register_movement(value, description, kind).await;
    pb.finish_and_clear();

    match result {
        Ok(movement) => {
            println!(
                "{} {} ({})\n",
                ui::style_text("Movement registered:", ui::StyleType::TotalLabel),
                movement.description,
                ui::format_amount(movement.value)
            );
            println!("{}", ctx.state.snapshot().display_as_table());
            Ok(())
        }
        Err(e) => {
            report(&e);
            Err(e.into())
        }
    }
}

/// Deletes a movement listed for `date` and shows the updated summary.
pub async fn run_remove(ctx: &AppContext, id: &RecordId, date: Option<NaiveDate>) -> Result<()> {
    if summary::load(&ctx.state, date).await == FetchOutcome::Committed
        && !ctx.state.movements().iter().any(|m| &m.id == id)
    {
        tracing::warn!(%id, "Movement not listed for the selected date");
    }

    let pb = ui::new_spinner("Removing movement...");
    let result = ctx.state.delete_movement(id).await;
    pb.finish_and_clear();

    match result {
        Ok(()) => {
            println!(
                "{} {}\n",
                ui::style_text("Movement removed:", ui::StyleType::TotalLabel),
                id
            );
            println!("{}", ctx.state.snapshot().display_as_table());
            Ok(())
        }
        Err(e) => {
            report(&e);
            Err(e.into())
        }
    }
}
