//! Plain-text result lines forwarded by the dispatch layer.
use crate::banner::{BannerSlot, BannerState};
use crate::draw::{DrawBatchResult, DrawResult};
use crate::error::IngestFailure;
use crate::numbers::format_thousands;
use crate::pity::{PityStatus, PityTrigger};
use crate::traits::{Trait, TraitBatchResult, TraitCounts, TraitGroup};

pub const TIER_A_NOTICE: &str = "💥 Mythic pity triggered! Guaranteed Mythic this summon!";
pub const TIER_B_NOTICE: &str = "✨ Legendary pity triggered! Guaranteed Legendary this summon!";
pub const NO_TRAITS_LINE: &str = "You haven't rolled any traits yet.";
pub const TRAITS_CLEARED_LINE: &str = "Your total trait data has been cleared.";

#[must_use]
pub fn draw_line(result: &DrawResult) -> String {
    let mut line = format!("**{}** ({})", result.item, result.tier);
    if result.is_bonus_variant {
        line.push_str(" ✨ *Shiny!*");
    }
    line
}

#[must_use]
pub fn summon_header(amount: usize, cost_total: u64) -> String {
    format!("🎉 You rolled **{amount}** summon(s) and spent **{cost_total}** gems.")
}

/// Notices for every guarantee that fired, tier-A first.
#[must_use]
pub fn pity_notices(batch: &DrawBatchResult) -> Vec<&'static str> {
    batch
        .pity_fired
        .iter()
        .filter_map(|trigger| match trigger {
            PityTrigger::TierA => Some(TIER_A_NOTICE),
            PityTrigger::TierB => Some(TIER_B_NOTICE),
            PityTrigger::None => None,
        })
        .collect()
}

#[must_use]
pub fn pity_countdown(status: &PityStatus) -> String {
    format!(
        "🎯 Summons until next Legendary pity: **{}**\n🔥 Summons until next Mythic pity: **{}**",
        status.until_tier_b, status.until_tier_a
    )
}

/// Full summon reply: header, one line per draw, notices, countdown.
#[must_use]
pub fn summon_message(batch: &DrawBatchResult) -> String {
    let mut out = summon_header(batch.results.len(), batch.cost_total);
    for result in &batch.results {
        out.push('\n');
        out.push_str(&draw_line(result));
    }
    let notices = pity_notices(batch);
    if !notices.is_empty() {
        out.push_str("\n\n");
        out.push_str(&notices.join("\n"));
    }
    out.push_str("\n\n");
    out.push_str(&pity_countdown(&batch.pity_status));
    out
}

#[must_use]
pub fn trait_title(amount: u32) -> String {
    format!(
        "Trait Roll Results ({} Rolls)",
        format_thousands(u64::from(amount))
    )
}

#[must_use]
pub fn trait_line(t: Trait, count: u64) -> String {
    format!("{t} **x{}**", format_thousands(count))
}

/// Count lines grouped by trait rarity, groups and members in declared order.
#[must_use]
pub fn trait_groups(counts: &TraitCounts) -> Vec<(TraitGroup, Vec<String>)> {
    TraitGroup::ALL
        .into_iter()
        .map(|group| {
            let lines = group
                .members()
                .map(|t| trait_line(t, counts.get(t)))
                .collect();
            (group, lines)
        })
        .collect()
}

#[must_use]
pub fn trait_message(batch: &TraitBatchResult) -> String {
    let mut out = trait_title(batch.amount);
    for (group, lines) in trait_groups(&batch.counts) {
        out.push_str("\n\n__**");
        out.push_str(group.label());
        out.push_str("**__");
        for line in lines {
            out.push('\n');
            out.push_str(&line);
        }
    }
    out
}

#[must_use]
pub fn average_trait_line(t: Trait, count: u64) -> String {
    format!(
        "Your average trait is: **{t}** (x{})",
        format_thousands(count)
    )
}

#[must_use]
pub fn banner_announcement(banner: &BannerState) -> String {
    let slot = |slot: BannerSlot| banner.get(slot).unwrap_or("None");
    format!(
        "📢 **Banner Updated!**\n🟣 Middle: {}\n🔵 Left: {}\n🟢 Right: {}",
        slot(BannerSlot::Primary),
        slot(BannerSlot::SecondaryA),
        slot(BannerSlot::SecondaryB)
    )
}

#[must_use]
pub fn ingest_failure_line(failure: &IngestFailure) -> String {
    match failure {
        IngestFailure::FewerThanThree { .. } => {
            "❗ Could not auto-detect all 3 banner units.".to_string()
        }
        other => format!("❗ Banner not updated: {other}"),
    }
}
