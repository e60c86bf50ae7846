use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Count that deserves attention when non-zero (skipped or pre-existing items).
pub fn count_cell(count: usize) -> Cell {
    if count == 0 {
        Cell::new(count).fg(TableColor::Green)
    } else {
        Cell::new(count).fg(TableColor::Yellow)
    }
}
