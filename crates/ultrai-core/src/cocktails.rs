/// A named pool of models: positional primaries and their 1:1 fallbacks.
/// Read-only after process start.
#[derive(Debug, Clone)]
pub struct CocktailSpec {
    pub name: String,
    pub primaries: Vec<String>,
    pub fallbacks: Vec<String>,
}

pub const COCKTAIL_NAMES: [&str; 5] = ["LUXE", "PREMIUM", "SPEEDY", "BUDGET", "DEPTH"];

/// Resolves a cocktail name (already normalized to uppercase) to its roster.
pub fn cocktail(name: &str) -> Option<CocktailSpec> {
    match name {
        "LUXE" => Some(spec(
            "LUXE",
            &[
                "anthropic/claude-3.7-sonnet",
                "openai/gpt-4o",
                "google/gemini-2.0-pro",
            ],
            &[
                "anthropic/claude-3.5-sonnet",
                "openai/gpt-4o-mini",
                "google/gemini-2.0-flash-001",
            ],
        )),
        "PREMIUM" => Some(spec(
            "PREMIUM",
            &[
                "openai/gpt-4o",
                "anthropic/claude-3.5-sonnet",
                "google/gemini-2.0-flash-thinking",
            ],
            &[
                "openai/gpt-4o-mini",
                "anthropic/claude-3.5-haiku",
                "google/gemini-2.0-flash-001",
            ],
        )),
        "SPEEDY" => Some(spec(
            "SPEEDY",
            &[
                "openai/gpt-4o-mini",
                "anthropic/claude-3.5-haiku",
                "google/gemini-2.0-flash-001",
            ],
            &[
                "openai/gpt-3.5-turbo",
                "meta-llama/llama-3.3-70b",
                "mistralai/mistral-small",
            ],
        )),
        "BUDGET" => Some(spec(
            "BUDGET",
            &[
                "openai/gpt-4o-mini",
                "meta-llama/llama-3.1-8b-instruct",
                "mistralai/mistral-7b-instruct",
            ],
            &[
                "openai/gpt-3.5-turbo",
                "meta-llama/llama-3.3-70b",
                "google/gemini-flash-1.5-8b",
            ],
        )),
        "DEPTH" => Some(spec(
            "DEPTH",
            &[
                "anthropic/claude-3.7-sonnet",
                "openai/gpt-4o",
                "google/gemini-2.0-flash-thinking",
                "meta-llama/llama-3.3-70b",
            ],
            &[
                "anthropic/claude-3.5-sonnet",
                "openai/gpt-4o-mini",
                "google/gemini-2.0-flash-001",
                "meta-llama/llama-3.1-70b-instruct",
            ],
        )),
        _ => None,
    }
}

fn spec(name: &str, primaries: &[&str], fallbacks: &[&str]) -> CocktailSpec {
    CocktailSpec {
        name: name.to_string(),
        primaries: primaries.iter().map(|s| s.to_string()).collect(),
        fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_cocktail_resolves_with_paired_fallbacks() {
        for name in COCKTAIL_NAMES {
            let spec = cocktail(name).expect("known cocktail");
            assert_eq!(spec.name, name);
            assert_eq!(spec.primaries.len(), spec.fallbacks.len());
            assert!(spec.primaries.len() >= 3, "{name} needs at least 3 models");
        }
    }

    #[test]
    fn unknown_cocktail_is_none() {
        assert!(cocktail("FANCY").is_none());
        assert!(cocktail("speedy").is_none());
    }

    #[test]
    fn rosters_have_no_duplicate_primaries() {
        for name in COCKTAIL_NAMES {
            let spec = cocktail(name).expect("known cocktail");
            let mut seen = spec.primaries.clone();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), spec.primaries.len(), "{name} has duplicates");
        }
    }
}
