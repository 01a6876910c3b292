// =============================================================================
// signals/purpose.rs — READING BETWEEN THE LINES OF "PURPOSE OF HOLDING"
// =============================================================================
//
// Every stake disclosure carries a free-text purpose. Most say some flavour of
// "investment". A few say "we intend to talk to the board", and those are the
// ones downstream scoring cares about.
//
// One Aho-Corasick pass per automaton, case-insensitive for ASCII, with the
// Japanese EDINET phrasing included so the same classifier works for both
// repositories. Activist language wins over passive language when a filer
// manages to use both.
// =============================================================================

use aho_corasick::AhoCorasick;
use serde::Serialize;
use std::sync::LazyLock;

/// Phrases that signal intent to influence management or control.
static ACTIVIST_KEYWORDS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        // English (Schedule 13D Item 4 boilerplate and its variations)
        "board representation",
        "board seat",
        "nominate",
        "nomination of directors",
        "proxy contest",
        "proxy solicitation",
        "strategic alternatives",
        "engage with management",
        "discussions with management",
        "change in control",
        "change of control",
        "influence management",
        "management participation",
        "important proposal",
        "shareholder proposal",
        "sale of the company",
        "going private",
        // Japanese (大量保有報告書 保有目的)
        "重要提案行為",
        "経営参加",
        "経営への関与",
        "株主提案",
        "役員の選任",
        "経営陣との対話",
        "支配権",
    ]
});

/// Phrases that signal a purely financial holding.
static PASSIVE_KEYWORDS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "investment purposes",
        "passive investment",
        "ordinary course of business",
        "not for the purpose of changing",
        "no present plans",
        "portfolio investment",
        "純投資",
        "政策投資",
        "資産運用",
        "投資信託",
        "顧客資産",
    ]
});

static ACTIVIST_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&*ACTIVIST_KEYWORDS)
        .expect("activist keyword table is a valid pattern set")
});

static PASSIVE_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&*PASSIVE_KEYWORDS)
        .expect("passive keyword table is a valid pattern set")
});

/// What a purpose statement says the filer intends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PurposeIntent {
    Activist,
    Passive,
    Unstated,
}

/// Result of scanning one purpose statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurposeScan {
    pub intent: PurposeIntent,
    /// Distinct matched phrases, lowercased, sorted.
    pub matched: Vec<String>,
}

/// Classify a purpose statement. `None` and blank text are `Unstated`.
pub fn scan_purpose(text: Option<&str>) -> PurposeScan {
    let text = match text.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => {
            return PurposeScan {
                intent: PurposeIntent::Unstated,
                matched: vec![],
            }
        }
    };

    let activist = matches(&ACTIVIST_AUTOMATON, text);
    if !activist.is_empty() {
        return PurposeScan {
            intent: PurposeIntent::Activist,
            matched: activist,
        };
    }

    let passive = matches(&PASSIVE_AUTOMATON, text);
    let intent = if passive.is_empty() {
        PurposeIntent::Unstated
    } else {
        PurposeIntent::Passive
    };
    PurposeScan {
        intent,
        matched: passive,
    }
}

/// Shorthand for the only question the aggregators ask.
pub fn is_activist_purpose(text: Option<&str>) -> bool {
    scan_purpose(text).intent == PurposeIntent::Activist
}

fn matches(automaton: &AhoCorasick, text: &str) -> Vec<String> {
    let mut found: Vec<String> = automaton
        .find_iter(text)
        .map(|m| text[m.start()..m.end()].to_lowercase())
        .collect();
    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_purpose_is_unstated() {
        assert_eq!(scan_purpose(None).intent, PurposeIntent::Unstated);
        assert_eq!(scan_purpose(Some("   ")).intent, PurposeIntent::Unstated);
    }

    #[test]
    fn test_english_13d_item_4_is_activist() {
        let scan = scan_purpose(Some(
            "The Reporting Persons intend to seek Board Representation and may \
             engage with management regarding strategic alternatives.",
        ));
        assert_eq!(scan.intent, PurposeIntent::Activist);
        assert_eq!(
            scan.matched,
            vec!["board representation", "engage with management", "strategic alternatives"]
        );
    }

    #[test]
    fn test_japanese_important_proposal_is_activist() {
        assert!(is_activist_purpose(Some("純投資及び状況に応じて重要提案行為を行うこと")));
    }

    #[test]
    fn test_japanese_pure_investment_is_passive() {
        let scan = scan_purpose(Some("純投資"));
        assert_eq!(scan.intent, PurposeIntent::Passive);
    }

    #[test]
    fn test_unrelated_text_is_unstated() {
        let scan = scan_purpose(Some("See Item 6 of the cover page."));
        assert_eq!(scan.intent, PurposeIntent::Unstated);
        assert!(scan.matched.is_empty());
    }
}
