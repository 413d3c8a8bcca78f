use super::ui;
use crate::AppContext;
use crate::core::date::format_api_date;
use crate::core::{FetchOutcome, FinanceSnapshot, FinanceState};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

impl FinanceSnapshot {
    pub fn display_as_table(&self) -> String {
        let mut balance_table = ui::new_styled_table();
        balance_table.set_header(vec![
            ui::header_cell("Balance"),
            ui::header_cell("Income"),
            ui::header_cell("Expenses"),
        ]);
        balance_table.add_row(vec![
            ui::balance_cell(self.balance.balance),
            ui::balance_cell(self.balance.income),
            ui::balance_cell(-self.balance.expense),
        ]);

        let mut output = format!(
            "Date: {}\n\n",
            ui::style_text(&format_api_date(self.selected_date), ui::StyleType::Title)
        );
        output.push_str(&balance_table.to_string());
        output.push_str("\n\n");

        if self.movements.is_empty() {
            output.push_str(&ui::style_text(
                "No movements for this date",
                ui::StyleType::Subtle,
            ));
            return output;
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Id"),
            ui::header_cell("Type"),
            ui::header_cell("Description"),
            ui::header_cell("Value"),
            ui::header_cell("Date"),
        ]);
        for movement in &self.movements {
            table.add_row(vec![
                Cell::new(movement.id.as_str()),
                Cell::new(movement.kind.to_string()),
                Cell::new(&movement.description),
                ui::amount_cell(movement.value, movement.kind),
                Cell::new(&movement.date),
            ]);
        }
        output.push_str(&table.to_string());
        output
    }
}

/// Fetches for `date` (or the state's current date) behind a spinner.
pub async fn load(state: &FinanceState, date: Option<NaiveDate>) -> FetchOutcome {
    let pb = ui::new_spinner("Loading balance and movements...");
    let outcome = match date {
        Some(date) => state.select_date(date).await,
        None => state.refresh().await,
    };
    pb.finish_and_clear();

    if outcome == FetchOutcome::Failed {
        eprintln!(
            "{}",
            ui::style_text(
                "Could not load finance data; showing last known values",
                ui::StyleType::Error
            )
        );
    }
    outcome
}

pub async fn run(ctx: &AppContext, date: Option<NaiveDate>) -> Result<()> {
    load(&ctx.state, date).await;
    println!("{}", ctx.state.snapshot().display_as_table());
    Ok(())
}
