use super::ui;
use crate::AppContext;
use crate::core::SessionProvider;
use anyhow::{Context, Result};

pub fn run(ctx: &AppContext) -> Result<()> {
    let user = ctx.session.current_user().context("No active session")?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Name"), ui::header_cell("Email")]);
    table.add_row(vec![user.name, user.email]);

    println!(
        "{}\n\n{}",
        ui::style_text("Profile", ui::StyleType::Title),
        table
    );
    Ok(())
}
