//! Colored terminal output helpers.
//!
//! All user-facing feedback goes through these functions so we get
//! consistent styling across every command.  Machine-readable output
//! (URIs, exports) is printed directly by the commands.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::bunker::{key_status, KnoxState, StatusTag};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    eprintln!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    eprintln!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    eprintln!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of keys with their status tags.
pub fn print_status_table(state: &KnoxState) {
    if state.keys.is_empty() {
        info("No keys in this bunker yet.");
        tip("Run `knox add <name>` to add your first key.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Status", "Created"]);

    for key in &state.keys {
        let tags = key_status(state, key)
            .iter()
            .map(render_tag)
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(vec![
            key.name.clone(),
            tags,
            key.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

fn render_tag(tag: &StatusTag) -> String {
    match tag {
        StatusTag::New => style(tag).dim().to_string(),
        StatusTag::Connected => style(tag).green().to_string(),
        _ => style(tag).yellow().to_string(),
    }
}
