//! Shared UI icons, with plain-text fallbacks for terminals without emoji.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static CACHED: Emoji<'_, '_> = Emoji("⚡ ", "[cached]");

// Issue card fields
pub static COMMENTS: Emoji<'_, '_> = Emoji("💬 ", "comments:");
pub static AUTHOR: Emoji<'_, '_> = Emoji("👤 ", "by");
pub static LANGUAGE: Emoji<'_, '_> = Emoji("🔤 ", "lang:");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "updated");
pub static BUG: Emoji<'_, '_> = Emoji("🐛 ", "[bug]");
pub static FEATURE: Emoji<'_, '_> = Emoji("✨ ", "[feature]");
