//! Shared UI icons and emojis.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("\u{2705} ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("\u{274C} ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("\u{2728} ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("\u{26A0}\u{FE0F}  ", "[!]");

// Halting conditions
pub static HUMAN: Emoji<'_, '_> = Emoji("\u{1F64B} ", "[?]");
pub static STOP: Emoji<'_, '_> = Emoji("\u{1F6D1} ", "[STOP]");

// Artifacts
pub static FILE_NEW: Emoji<'_, '_> = Emoji("\u{1F4C4} ", "+");
pub static DENIED: Emoji<'_, '_> = Emoji("\u{1F6AB} ", "[DENY]");
