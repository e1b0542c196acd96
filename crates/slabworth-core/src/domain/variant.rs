//! Rarity and display heuristics over free-text variant names.
//!
//! These feed human-readable output only; match scoring never consults them.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Fixed rarity ladder for parallel/insert variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Mythic,
    Legendary,
}

impl Display for Rarity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Mythic => "mythic",
            Self::Legendary => "legendary",
        };
        f.write_str(label)
    }
}

/// Parse a trailing `/<N>` suffix as the print run.
pub fn parse_print_run(variant: &str) -> Option<u32> {
    let (_, suffix) = variant.trim().rsplit_once('/')?;
    let digits = suffix.trim();
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn rarity_for_print_run(print_run: u32) -> Rarity {
    match print_run {
        0 | 1 => Rarity::Legendary,
        2..=10 => Rarity::Mythic,
        11..=99 => Rarity::Rare,
        _ => Rarity::Common,
    }
}

/// Classify a variant name on the rarity ladder.
///
/// Keyword rank and print-run rank are both computed; the higher wins.
pub fn rarity_for_variant(variant: &str) -> Rarity {
    let lowered = variant.trim().to_ascii_lowercase();

    let keyword_rarity = if lowered.contains("superfractor") || lowered.contains("1/1") {
        Rarity::Legendary
    } else if lowered.contains("black") {
        Rarity::Mythic
    } else if lowered.contains("gold") {
        Rarity::Rare
    } else if lowered.contains("refractor") {
        Rarity::Uncommon
    } else {
        Rarity::Common
    };

    let print_run_rarity = parse_print_run(&lowered)
        .map(rarity_for_print_run)
        .unwrap_or(Rarity::Common);

    keyword_rarity.max(print_run_rarity)
}

/// Human-readable traits a grader would call out for a variant name.
pub fn distinguishing_features(variant: &str) -> Vec<String> {
    let lowered = variant.trim().to_ascii_lowercase();
    let mut features = Vec::new();

    if lowered.contains("superfractor") {
        features.push(String::from("Superfractor parallel"));
    }
    if lowered.contains("1/1") && !lowered.contains("superfractor") {
        features.push(String::from("One-of-one"));
    }
    if lowered.contains("refractor") && !lowered.contains("superfractor") {
        features.push(String::from("Refractor finish"));
    }
    if lowered.contains("gold") {
        features.push(String::from("Gold parallel"));
    }
    if lowered.contains("black") {
        features.push(String::from("Black parallel"));
    }
    if let Some(print_run) = parse_print_run(&lowered) {
        if print_run == 1 {
            if !features.iter().any(|f| f == "One-of-one") {
                features.push(String::from("One-of-one"));
            }
        } else {
            features.push(format!("Serial numbered to {print_run}"));
        }
    }

    features
}
