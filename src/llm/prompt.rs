//! Prompt text for the card-placement call.

use crate::config::GeometryConfig;

pub const SYSTEM_PROMPT: &str = "\
You are an expert assistant for the real-time card game Clash Royale. \
You turn a player's spoken command and a screenshot of the game into exactly one card play.

Rules:
- Reason briefly about the current board before choosing.
- Only choose among the four cards shown at the bottom of the screen.
- Reply with a single JSON object and nothing else.
- If the command cannot be carried out, reply with null for card_slot, grid_x and grid_y.";

/// User prompt for one command. States the grid the model must address and
/// the exact JSON shape the validator expects.
pub fn build_action_prompt(command: &str, geometry: &GeometryConfig) -> String {
    let last_col = geometry.board_cols.saturating_sub(1);
    let last_row = geometry.board_rows.saturating_sub(1);
    format!(
        "Game context:\n\
         - The arena is a grid {cols} columns wide and {rows} rows tall. \
         (0,0) is the top-left cell, ({last_col},{last_row}) the bottom-right.\n\
         - The player's side is the bottom half, the enemy's side the top half.\n\
         - The player's cards are in slots 1, 2, 3 and 4, numbered left to right.\n\n\
         Player's command: \"{command}\"\n\n\
         Steps:\n\
         1. Explain your reasoning: what is happening and which play answers the command.\n\
         2. Pick the card slot that best matches the command.\n\
         3. Pick the target cell, with grid_x in 0..={last_col} and grid_y in 0..={last_row}.\n\n\
         Reply ONLY with JSON:\n\
         {{\"reasoning\": \"<why>\", \"card_slot\": 3, \"grid_x\": 8, \"grid_y\": 15}}",
        cols = geometry.board_cols,
        rows = geometry.board_rows,
        last_col = last_col,
        last_row = last_row,
        command = command.replace('"', "'"),
    )
}
