use ultrai_types::RunInputs;

use crate::cocktails::COCKTAIL_NAMES;
use crate::error::EngineError;

pub const ANALYSIS_SYNTHESIS: &str = "Synthesis";

/// Normalizes and validates the user-facing run inputs into the `01_inputs`
/// artifact. Add-ons are inactive in this design, so anything but an empty
/// list is rejected.
pub fn validate_inputs(
    query: &str,
    cocktail: &str,
    analysis: &str,
    addons: &[String],
) -> Result<RunInputs, EngineError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(EngineError::UserInput("QUERY must not be empty".to_string()));
    }

    let cocktail = cocktail.trim().to_uppercase();
    if !COCKTAIL_NAMES.contains(&cocktail.as_str()) {
        return Err(EngineError::UserInput(format!(
            "unknown COCKTAIL {:?}; expected one of {}",
            cocktail,
            COCKTAIL_NAMES.join(", ")
        )));
    }

    if analysis != ANALYSIS_SYNTHESIS {
        return Err(EngineError::UserInput(format!(
            "ANALYSIS must be {ANALYSIS_SYNTHESIS:?}, got {analysis:?}"
        )));
    }

    if !addons.is_empty() {
        return Err(EngineError::UserInput(format!(
            "ADDONS must be empty, got {} entries",
            addons.len()
        )));
    }

    Ok(RunInputs {
        query: query.to_string(),
        analysis: ANALYSIS_SYNTHESIS.to_string(),
        cocktail,
        addons: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_normalizes_valid_inputs() {
        let inputs =
            validate_inputs("  why is the sky blue?  ", "speedy", "Synthesis", &[]).expect("valid");
        assert_eq!(inputs.query, "why is the sky blue?");
        assert_eq!(inputs.cocktail, "SPEEDY");
        assert_eq!(inputs.analysis, "Synthesis");
        assert!(inputs.addons.is_empty());
    }

    #[test]
    fn rejects_blank_query() {
        let err = validate_inputs("   ", "SPEEDY", "Synthesis", &[]).unwrap_err();
        assert!(matches!(err, EngineError::UserInput(_)));
    }

    #[test]
    fn rejects_unknown_cocktail() {
        let err = validate_inputs("q", "MYSTERY", "Synthesis", &[]).unwrap_err();
        assert!(err.to_string().contains("COCKTAIL"));
    }

    #[test]
    fn rejects_non_synthesis_analysis() {
        let err = validate_inputs("q", "SPEEDY", "Critique", &[]).unwrap_err();
        assert!(matches!(err, EngineError::UserInput(_)));
    }

    #[test]
    fn rejects_active_addons() {
        let err =
            validate_inputs("q", "SPEEDY", "Synthesis", &["citations".to_string()]).unwrap_err();
        assert!(err.to_string().contains("ADDONS"));
    }
}
