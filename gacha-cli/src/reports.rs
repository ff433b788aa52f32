use anyhow::Result;
use colored::Colorize;
use gacha_engine::RarityTier;
use gacha_engine::numbers::format_thousands;
use gacha_engine::report::{
    NO_TRAITS_LINE, TRAITS_CLEARED_LINE, average_trait_line, banner_announcement, pity_countdown,
    summon_message, trait_message,
};
use std::io::Write;

use crate::commands::Outcome;
use crate::simulation::SimulationReport;

pub fn generate_json_report<W: Write + ?Sized>(writer: &mut W, outcome: &Outcome) -> Result<()> {
    let json_output = serde_json::to_string_pretty(outcome)?;
    writeln!(writer, "{json_output}")?;
    Ok(())
}

pub fn generate_console_report<W: Write + ?Sized>(writer: &mut W, outcome: &Outcome) -> Result<()> {
    match outcome {
        Outcome::Summon { user, batch } => {
            writeln!(writer, "{}", format!("Summons for {user}").bright_cyan().bold())?;
            for line in summon_message(batch).lines() {
                writeln!(writer, "{}", highlight(line))?;
            }
        }
        Outcome::Traits { user, batch } => {
            writeln!(writer, "{}", format!("Traits for {user}").bright_cyan().bold())?;
            writeln!(writer, "{}", trait_message(batch))?;
            if batch.pity_awarded {
                writeln!(writer, "{}", "Trait pity awarded a Monarch.".yellow())?;
            }
        }
        Outcome::AverageTrait { top, count, .. } => {
            writeln!(writer, "{}", average_trait_line(*top, *count))?;
        }
        Outcome::NoTraits { .. } => writeln!(writer, "{NO_TRAITS_LINE}")?,
        Outcome::TraitsCleared { .. } => writeln!(writer, "{}", TRAITS_CLEARED_LINE.green())?,
        Outcome::PityStatus { user, status } => {
            writeln!(writer, "{}", format!("Pity for {user}").bright_cyan().bold())?;
            writeln!(writer, "{}", pity_countdown(status))?;
        }
        Outcome::Banner { updated, banner } => {
            if *updated {
                writeln!(writer, "{}", banner_announcement(banner))?;
            } else if banner.is_empty() {
                writeln!(writer, "No banner is set.")?;
            } else {
                for (slot, name) in banner.featured() {
                    writeln!(writer, "{slot}: {}", name.magenta().bold())?;
                }
            }
        }
        Outcome::BannerRejected { message, .. } => writeln!(writer, "{}", message.red())?,
        Outcome::Simulation(report) => simulation_console(writer, report)?,
    }
    Ok(())
}

/// Colour a summon line by the tier it names.
fn highlight(line: &str) -> String {
    let tier = RarityTier::ALL.into_iter().find(|tier| {
        let tag = format!("({})", tier.label());
        line.ends_with(&tag) || line.contains(&format!("{tag} ✨"))
    });
    match tier {
        Some(RarityTier::Secret) => line.bright_red().bold().to_string(),
        Some(RarityTier::Mythic) => line.magenta().bold().to_string(),
        Some(RarityTier::Legendary) => line.yellow().to_string(),
        Some(RarityTier::Epic) => line.blue().to_string(),
        Some(RarityTier::Rare) | None => line.to_string(),
    }
}

fn simulation_console<W: Write + ?Sized>(writer: &mut W, report: &SimulationReport) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Soak Run Summary".bright_cyan().bold())?;
    writeln!(writer, "{}", "===================".cyan())?;
    writeln!(writer, "Seed: {}", report.seed)?;
    writeln!(
        writer,
        "Users: {}  Rolls/user: {}  Summons/user: {}",
        report.users, report.rolls_per_user, report.draws_per_user
    )?;
    writeln!(writer, "Trait batches: {}", report.trait_batches)?;
    writeln!(writer, "Monarch pity awards: {}", report.monarch_awards)?;
    writeln!(
        writer,
        "Summon pity: {} mythic, {} legendary",
        report.tier_a_pities, report.tier_b_pities
    )?;
    writeln!(writer)?;
    writeln!(
        writer,
        "{:<10} {:>10} {:>10} {:>10} {:>10}",
        "Trait", "Count", "Expected", "Observed", "Target"
    )?;
    for freq in &report.frequencies {
        writeln!(
            writer,
            "{:<10} {:>10} {:>10} {:>9.3}% {:>9.3}%",
            freq.name.label(),
            format_thousands(freq.count),
            format_thousands(freq.expected_count),
            freq.observed * 100.0,
            freq.expected * 100.0
        )?;
    }
    writeln!(writer)?;
    if report.passed() {
        writeln!(writer, "{}", "✅ PASS: every user's totals match".green())?;
    } else {
        writeln!(writer, "{}", "❌ FAIL".red())?;
        for mismatch in &report.mismatches {
            writeln!(writer, "  • {}", mismatch.red())?;
        }
    }
    writeln!(writer, "Elapsed: {} ms", report.elapsed_ms)?;
    Ok(())
}
